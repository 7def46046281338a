//! Remote gateway interfaces
//!
//! The remote offline-download service is reached through two traits: one for
//! offline tasks, one for the folder namespace. Every call is a single
//! blocking request with no retry.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;

/// Snapshot of one remote task, as listed right now
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveTask {
    pub task_id: String,
    pub name: String,
    /// Bytes
    pub size: u64,
    pub percent_done: f64,
    /// Epoch seconds, 0 when unknown
    pub add_time: i64,
    /// Epoch seconds, 0 when unknown
    pub last_update: i64,
    /// Target folder (`wp_path_id`)
    pub folder_id: String,
    /// Path of the downloaded item relative to its folder (`del_path`)
    pub delete_path: String,
    pub status_code: i64,
    /// Identifier of the downloaded file/folder, empty when none
    pub file_id: String,
}

impl LiveTask {
    /// Finished downloads report 100 percent; status codes are not consulted.
    pub fn is_complete(&self) -> bool {
        self.percent_done >= 100.0
    }

    /// Name of the downloaded item: the last segment of the delete path
    pub fn item_name(&self) -> Option<&str> {
        self.delete_path
            .trim_matches('/')
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
    }
}

/// Result of a successful task creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddedTask {
    pub task_id: String,
    pub name: String,
    /// Bytes
    pub size: u64,
}

/// One child in a folder listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamespaceEntry {
    pub id: String,
    pub name: String,
    pub is_directory: bool,
    pub modified_time: Option<DateTime<Utc>>,
}

/// Offline-download task operations
pub trait OfflineGateway {
    fn add(&self, url: &str, folder_id: &str) -> Result<AddedTask>;

    fn add_batch(&self, urls: &[String], folder_id: &str) -> Result<Vec<AddedTask>>;

    fn list(&self) -> Result<Vec<LiveTask>>;

    fn remove(&self, task_id: &str) -> Result<()>;

    /// Delete a downloaded file inside `folder_id`; `Ok(false)` when the
    /// remote answered but refused.
    fn remove_file(&self, folder_id: &str, file_id: &str) -> Result<bool>;
}

/// Folder namespace operations.
///
/// A path the remote does not have is reported as
/// [`Error::RemoteFolderMissing`](crate::error::Error::RemoteFolderMissing).
pub trait NamespaceGateway {
    fn list_children(&self, path: &str) -> Result<Vec<NamespaceEntry>>;

    /// Folder id of an absolute path
    fn path_id(&self, path: &str) -> Result<String>;

    fn change_dir(&mut self, path: &str) -> Result<()>;

    fn current_path(&self) -> String;

    fn current_id(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(delete_path: &str, percent_done: f64) -> LiveTask {
        LiveTask {
            task_id: "H1".to_string(),
            name: "Foo".to_string(),
            size: 0,
            percent_done,
            add_time: 0,
            last_update: 0,
            folder_id: "100".to_string(),
            delete_path: delete_path.to_string(),
            status_code: 1,
            file_id: String::new(),
        }
    }

    #[test]
    fn item_name_is_last_segment() {
        assert_eq!(task("/Foo", 0.0).item_name(), Some("Foo"));
        assert_eq!(task("Season 1/Foo.mkv/", 0.0).item_name(), Some("Foo.mkv"));
        assert_eq!(task("", 0.0).item_name(), None);
        assert_eq!(task("/", 0.0).item_name(), None);
    }

    #[test]
    fn completion_is_percent_only() {
        assert!(task("/Foo", 100.0).is_complete());
        assert!(!task("/Foo", 99.9).is_complete());
    }
}
