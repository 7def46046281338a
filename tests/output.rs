use lixian::output::HumanOutput;

#[test]
fn human_output_renders_sections_in_order() {
    let mut human = HumanOutput::new("lixian tasks: 2 task(s)");
    human.push_summary("running", "1");
    human.push_detail("[Complete] Foo 100.0% 1.0 GB | /Movies");
    human.push_warning("folder not found within the explore depth");
    human.push_next_step("lixian cache build");

    assert_eq!(
        human.to_string(),
        "lixian tasks: 2 task(s)\n\
         \n\
         Summary:\n\
         - running: 1\n\
         \n\
         Details:\n\
         - [Complete] Foo 100.0% 1.0 GB | /Movies\n\
         \n\
         Warnings:\n\
         - folder not found within the explore depth\n\
         \n\
         Next steps:\n\
         - lixian cache build"
    );
}

#[test]
fn human_output_omits_empty_sections() {
    let mut human = HumanOutput::new("lixian clear-completed: removed 0 task(s)");
    assert_eq!(human.to_string(), "lixian clear-completed: removed 0 task(s)");

    human.push_summary("flag", "");
    assert_eq!(
        human.to_string(),
        "lixian clear-completed: removed 0 task(s)\n\nSummary:\n- flag"
    );
}
