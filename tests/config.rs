use std::fs;
use std::path::PathBuf;

use lixian::config::Config;
use lixian::error::Error;
use lixian::storage::Storage;

#[test]
fn defaults_are_usable_without_a_file() {
    let config = Config::default();
    assert_eq!(config.default_folder_id, "0");
    assert_eq!(config.namespace.root_path, "/");
    assert_eq!(config.tasks.complete_status_code, 2);
    assert_eq!(config.storage.ledger_file, "task_times.json");
    assert_eq!(config.storage.folder_cache_file, "folder_cache.json");
    assert!(matches!(config.require_remote(), Err(Error::InvalidConfig(_))));
}

#[test]
fn storage_follows_configured_data_dir() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("config.toml");
    let data_dir = dir.path().join("state");
    let content = format!(
        "[remote]\ncookie = \"UID=1\"\n\n[storage]\ndata_dir = \"{}\"\nledger_file = \"ledger.json\"\n",
        data_dir.display()
    );
    fs::write(&path, content)?;

    let config = Config::load(&path)?;
    config.require_remote()?;
    let storage = Storage::from_config(&config);
    assert_eq!(storage.data_dir(), data_dir.as_path());
    assert_eq!(storage.ledger_file(), data_dir.join("ledger.json"));
    assert_eq!(storage.folder_cache_file(), data_dir.join("folder_cache.json"));
    Ok(())
}

#[test]
fn malformed_file_is_invalid_config() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    fs::write(&path, "default_folder_id = [").expect("write config");

    assert!(matches!(Config::load(&path), Err(Error::InvalidConfig(_))));
}

#[test]
fn missing_explicit_file_is_invalid_config() {
    let path = PathBuf::from("/nonexistent/lixian/config.toml");
    assert!(matches!(
        Config::discover(Some(&path)),
        Err(Error::InvalidConfig(_))
    ));
}
