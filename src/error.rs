//! Error types for lixian
//!
//! Exit codes:
//! - 2: User error (bad args, bad config, unknown task)
//! - 3: Remote failure (gateway unreachable, malformed reply, rejected call)
//! - 4: Local failure (ledger/cache storage, locking)

use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the lixian CLI
pub mod exit_codes {
    pub const USER_ERROR: i32 = 2;
    pub const REMOTE_FAILED: i32 = 3;
    pub const LOCAL_FAILED: i32 = 4;
}

/// Main error type for lixian operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Task not found in live listing: {0}")]
    TaskNotFound(String),

    #[error("Task {0} has no associated folder")]
    NoAssociatedFolder(String),

    // Remote failures (exit code 3)
    #[error("Gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Unexpected gateway response for {operation}: {reason}")]
    GatewayProtocol { operation: String, reason: String },

    #[error("Remote rejected {operation}: {message}")]
    RemoteRejected { operation: String, message: String },

    /// The remote has no folder at this path (renamed, moved or deleted)
    #[error("Remote folder not found: {0}")]
    RemoteFolderMissing(String),

    #[error("Partial failure on task {task_id}: {message}")]
    PartialFailure { task_id: String, message: String },

    // Local failures (exit code 4)
    #[error("Storage corrupt at {path}: {reason}")]
    StorageCorrupt { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidConfig(_)
            | Error::InvalidArgument(_)
            | Error::TaskNotFound(_)
            | Error::NoAssociatedFolder(_) => exit_codes::USER_ERROR,

            Error::GatewayUnavailable(_)
            | Error::GatewayProtocol { .. }
            | Error::RemoteRejected { .. }
            | Error::RemoteFolderMissing(_)
            | Error::PartialFailure { .. } => exit_codes::REMOTE_FAILED,

            Error::StorageCorrupt { .. }
            | Error::Io(_)
            | Error::Json(_)
            | Error::LockFailed(_) => exit_codes::LOCAL_FAILED,
        }
    }

    /// Machine-readable class, one per exit code
    pub fn kind(&self) -> &'static str {
        match self.exit_code() {
            exit_codes::USER_ERROR => "user_error",
            exit_codes::REMOTE_FAILED => "remote_failed",
            _ => "local_failed",
        }
    }

    /// Structured fields for JSON error output
    pub fn details(&self) -> Option<serde_json::Value> {
        use serde_json::json;

        match self {
            Error::InvalidConfig(message)
            | Error::InvalidArgument(message)
            | Error::GatewayUnavailable(message) => Some(json!({ "message": message })),
            Error::TaskNotFound(task_id) | Error::NoAssociatedFolder(task_id) => {
                Some(json!({ "task_id": task_id }))
            }
            Error::GatewayProtocol { operation, reason } => {
                Some(json!({ "operation": operation, "reason": reason }))
            }
            Error::RemoteRejected { operation, message } => {
                Some(json!({ "operation": operation, "message": message }))
            }
            Error::RemoteFolderMissing(path) => Some(json!({ "path": path })),
            Error::PartialFailure { task_id, message } => {
                Some(json!({ "task_id": task_id, "message": message }))
            }
            Error::StorageCorrupt { path, reason } => Some(json!({
                "path": path.display().to_string(),
                "reason": reason,
            })),
            Error::LockFailed(path) => Some(json!({ "path": path.display().to_string() })),
            Error::Io(_) | Error::Json(_) => None,
        }
    }

    /// Command the operator can run next, if there is an obvious one
    pub fn next_step(&self) -> Option<String> {
        match self {
            Error::InvalidConfig(_) => {
                Some("fix the config file (or export P115_COOKIE) and retry".to_string())
            }
            Error::TaskNotFound(_) => Some("lixian tasks".to_string()),
            Error::NoAssociatedFolder(task_id) | Error::PartialFailure { task_id, .. } => {
                Some(format!("lixian rm {task_id}"))
            }
            Error::RemoteFolderMissing(_) => Some("lixian cache build".to_string()),
            Error::StorageCorrupt { path, .. } => {
                Some(format!("inspect or move aside {}", path.display()))
            }
            Error::LockFailed(_) => Some("wait for the other lixian process, then retry".to_string()),
            _ => None,
        }
    }
}

/// Result type alias for lixian operations
pub type Result<T> = std::result::Result<T, Error>;
