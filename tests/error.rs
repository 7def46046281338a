use std::path::PathBuf;

use serde_json::Value;
use lixian::error::{exit_codes, Error};

#[test]
fn exit_code_user_error() {
    let err = Error::InvalidArgument("bad input".to_string());
    assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
    assert_eq!(
        Error::TaskNotFound("H1".to_string()).exit_code(),
        exit_codes::USER_ERROR
    );
}

#[test]
fn exit_code_remote_failed() {
    let errors = [
        Error::GatewayUnavailable("connection refused".to_string()),
        Error::GatewayProtocol {
            operation: "list".to_string(),
            reason: "expected value".to_string(),
        },
        Error::RemoteRejected {
            operation: "add".to_string(),
            message: "task exists".to_string(),
        },
        Error::RemoteFolderMissing("/Movies".to_string()),
        Error::PartialFailure {
            task_id: "H1".to_string(),
            message: "file kept".to_string(),
        },
    ];
    for err in errors {
        assert_eq!(err.exit_code(), exit_codes::REMOTE_FAILED, "{err}");
    }
}

#[test]
fn exit_code_local_failed() {
    let err = Error::StorageCorrupt {
        path: PathBuf::from("/data/task_times.json"),
        reason: "EOF while parsing".to_string(),
    };
    assert_eq!(err.exit_code(), exit_codes::LOCAL_FAILED);
    assert_eq!(
        Error::LockFailed(PathBuf::from("x.lock")).exit_code(),
        exit_codes::LOCAL_FAILED
    );
}

#[test]
fn details_include_partial_failure_fields() {
    let err = Error::PartialFailure {
        task_id: "H1".to_string(),
        message: "file F1 was not deleted".to_string(),
    };
    let details = err.details().expect("details");
    assert_eq!(details["task_id"], Value::String("H1".to_string()));
    assert_eq!(
        details["message"],
        Value::String("file F1 was not deleted".to_string())
    );
}

#[test]
fn storage_details_name_the_file() {
    let err = Error::StorageCorrupt {
        path: PathBuf::from("/data/folder_cache.json"),
        reason: "trailing characters".to_string(),
    };
    assert!(err.to_string().contains("Storage corrupt"));
    let details = err.details().expect("details");
    assert_eq!(
        details["path"],
        Value::String("/data/folder_cache.json".to_string())
    );
    assert_eq!(
        err.next_step().as_deref(),
        Some("inspect or move aside /data/folder_cache.json")
    );
}

#[test]
fn kind_matches_exit_code_class() {
    assert_eq!(Error::InvalidConfig("x".to_string()).kind(), "user_error");
    assert_eq!(Error::RemoteFolderMissing("/Films".to_string()).kind(), "remote_failed");
    assert_eq!(Error::LockFailed(PathBuf::from("x.lock")).kind(), "local_failed");
}

#[test]
fn missing_folder_points_at_cache_rebuild() {
    let err = Error::RemoteFolderMissing("/Movies".to_string());
    assert_eq!(err.to_string(), "Remote folder not found: /Movies");
    assert_eq!(err.details().expect("details")["path"], "/Movies");
    assert_eq!(err.next_step().as_deref(), Some("lixian cache build"));
}
