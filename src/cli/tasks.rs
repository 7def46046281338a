//! Task commands: add, add-many, tasks, rm, clear-completed

use std::path::PathBuf;

use serde::Serialize;

use crate::error::Result;
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::reconcile::TaskView;

use super::open_reconciler;

/// Options for the add command
pub struct AddOptions {
    pub url: String,
    pub folder: Option<String>,
    pub config: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

/// Options for the add-many command
pub struct AddManyOptions {
    pub folder: String,
    pub urls: Vec<String>,
    pub config: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

/// Options for the tasks command
pub struct ListOptions {
    pub config: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

/// Options for the rm command
pub struct RmOptions {
    pub task_id: String,
    pub with_folder: bool,
    pub config: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

/// Options for the clear-completed command
pub struct ClearOptions {
    pub config: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

#[derive(Serialize)]
struct RemovedReport {
    removed: Vec<String>,
    with_folder: bool,
}

pub fn run_add(options: AddOptions) -> Result<()> {
    let mut reconciler = open_reconciler(options.config.as_deref())?;
    let reply = reconciler.add(&options.url, options.folder.as_deref())?;

    let mut human = HumanOutput::new("lixian add: task submitted");
    human.push_summary("task", reply.result.as_str());
    human.push_next_step("lixian tasks");

    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "add",
        &reply,
        &human,
    )
}

pub fn run_add_many(options: AddManyOptions) -> Result<()> {
    let mut reconciler = open_reconciler(options.config.as_deref())?;
    let reply = reconciler.add_batch(&options.urls.join("\n"), &options.folder)?;

    let mut human = HumanOutput::new(format!(
        "lixian add-many: {} task(s) submitted",
        reply.result.len()
    ));
    human.push_summary("folder", options.folder.as_str());
    for task_id in &reply.result {
        human.push_detail(task_id.as_str());
    }
    human.push_next_step("lixian tasks");

    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "add-many",
        &reply,
        &human,
    )
}

pub fn run_list(options: ListOptions) -> Result<()> {
    let mut reconciler = open_reconciler(options.config.as_deref())?;
    reconciler.prime_namespace()?;
    let listing = reconciler.reconcile()?;

    let mut human = HumanOutput::new(format!("lixian tasks: {} task(s)", listing.tasks.len()));
    human.push_summary("running", listing.running_count.to_string());
    human.push_summary("complete", listing.complete_count.to_string());
    for task in &listing.tasks {
        human.push_detail(task_line(task));
    }

    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "tasks",
        &listing,
        &human,
    )
}

pub fn run_rm(options: RmOptions) -> Result<()> {
    let mut reconciler = open_reconciler(options.config.as_deref())?;
    if options.with_folder {
        reconciler.delete_with_folder(&options.task_id)?;
    } else {
        reconciler.delete(&options.task_id)?;
    }

    let report = RemovedReport {
        removed: vec![options.task_id.clone()],
        with_folder: options.with_folder,
    };
    let mut human = HumanOutput::new(format!("lixian rm: removed {}", options.task_id));
    if options.with_folder {
        human.push_detail("downloaded file deleted first");
    }

    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "rm",
        &report,
        &human,
    )
}

pub fn run_clear_completed(options: ClearOptions) -> Result<()> {
    let mut reconciler = open_reconciler(options.config.as_deref())?;
    let cleared = reconciler.clear_completed()?;

    let report = RemovedReport {
        removed: cleared,
        with_folder: false,
    };
    let mut human = HumanOutput::new(format!(
        "lixian clear-completed: removed {} task(s)",
        report.removed.len()
    ));
    for task_id in &report.removed {
        human.push_detail(task_id.as_str());
    }

    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "clear-completed",
        &report,
        &human,
    )
}

fn task_line(task: &TaskView) -> String {
    let mut line = format!(
        "[{}] {} {}% {} | {} | added {}",
        task.status, task.name, task.percent, task.size, task.folder_name, task.created_time
    );
    if !task.completed_time.is_empty() {
        line.push_str(&format!(" | done {}", task.completed_time));
    }
    line.push_str(&format!(" ({})", task.task_id));
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(completed: &str) -> TaskView {
        TaskView {
            task_id: "H1".to_string(),
            name: "Foo".to_string(),
            status: "Complete",
            created_time: "2024-01-01 10:00:00".to_string(),
            completed_time: completed.to_string(),
            size: "1.0 GB".to_string(),
            percent: "100.0".to_string(),
            folder_id: "100".to_string(),
            folder_name: "/Movies".to_string(),
        }
    }

    #[test]
    fn task_line_shows_completion_only_when_known() {
        let line = task_line(&view("2024-01-01 11:00:00"));
        assert!(line.contains("[Complete] Foo 100.0% 1.0 GB | /Movies"));
        assert!(line.contains("done 2024-01-01 11:00:00"));
        assert!(line.ends_with("(H1)"));

        assert!(!task_line(&view("")).contains("done"));
    }
}
