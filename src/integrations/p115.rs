//! 115 web API client
//!
//! Implements both gateway traits over blocking HTTP. The session cookie is
//! taken from configuration and sent as-is; no login is attempted.

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;

use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::gateway::{AddedTask, LiveTask, NamespaceEntry, NamespaceGateway, OfflineGateway};
use crate::ledger::from_epoch_seconds;
use crate::namespace::normalize_path;

const ADD_TASK_URL: &str = "https://115.com/web/lixian/?ct=lixian&ac=add_task_url";
const ADD_TASK_URLS: &str = "https://115.com/web/lixian/?ct=lixian&ac=add_task_urls";
const TASK_LISTS: &str = "https://lixian.115.com/lixian/?ct=lixian&ac=task_lists";
const TASK_DEL: &str = "https://lixian.115.com/lixian/?ct=lixian&ac=task_del";
const FILE_DELETE: &str = "https://webapi.115.com/rb/delete";
const FILES_GETID: &str = "https://webapi.115.com/files/getid";
const FILES_LIST: &str = "https://webapi.115.com/files";

const ROOT_ID: &str = "0";
const MAX_PAGES: usize = 1000;

/// Accept a string, a number, or null as a string
fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => return Err(de::Error::custom(format!("expected string, got {other}"))),
    })
}

/// Accept a number or a numeric string; null and "" are 0
fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<f64, D::Error> {
    let value = match Value::deserialize(d)? {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| de::Error::custom(format!("number out of range: {n}")))?,
        Value::String(s) if s.trim().is_empty() => 0.0,
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("expected number, got '{s}'")))?,
        Value::Null => 0.0,
        other => return Err(de::Error::custom(format!("expected number, got {other}"))),
    };
    if !value.is_finite() {
        return Err(de::Error::custom(format!("number is not finite: {value}")));
    }
    Ok(value)
}

/// Whole-number part of a JSON number or numeric string; null and "" are 0
fn whole_number(value: Value) -> std::result::Result<i128, String> {
    let text = match value {
        Value::Null => return Ok(0),
        Value::Number(n) => {
            if let Some(int) = n.as_i64() {
                return Ok(int.into());
            }
            if let Some(int) = n.as_u64() {
                return Ok(int.into());
            }
            n.to_string()
        }
        Value::String(s) => s.trim().to_string(),
        other => return Err(format!("expected number, got {other}")),
    };
    if text.is_empty() {
        return Ok(0);
    }
    if let Ok(int) = text.parse::<i128>() {
        return Ok(int);
    }

    let float: f64 = text
        .parse()
        .map_err(|_| format!("expected number, got '{text}'"))?;
    // Bounded well inside i128, so the truncating cast is exact.
    if !float.is_finite() || float.abs() >= 1e36 {
        return Err(format!("number out of range: {text}"));
    }
    Ok(float.trunc() as i128)
}

fn lenient_i64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<i64, D::Error> {
    let int = whole_number(Value::deserialize(d)?).map_err(de::Error::custom)?;
    i64::try_from(int).map_err(|_| de::Error::custom(format!("number out of range: {int}")))
}

fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u64, D::Error> {
    let int = whole_number(Value::deserialize(d)?).map_err(de::Error::custom)?;
    u64::try_from(int).map_err(|_| de::Error::custom(format!("expected unsigned number, got {int}")))
}

#[derive(Debug, Deserialize)]
struct RawAdded {
    #[serde(default, deserialize_with = "lenient_string")]
    info_hash: String,
    #[serde(default, deserialize_with = "lenient_string")]
    name: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    size: u64,
}

impl RawAdded {
    fn into_added(self) -> Option<AddedTask> {
        if self.info_hash.trim().is_empty() {
            return None;
        }
        Some(AddedTask {
            task_id: self.info_hash,
            name: self.name,
            size: self.size,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawBatch {
    #[serde(default)]
    result: Vec<RawAdded>,
}

#[derive(Debug, Deserialize)]
struct RawTask {
    #[serde(default, deserialize_with = "lenient_string")]
    info_hash: String,
    #[serde(default, deserialize_with = "lenient_string")]
    name: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    size: u64,
    #[serde(default, rename = "percentDone", deserialize_with = "lenient_f64")]
    percent_done: f64,
    #[serde(default, deserialize_with = "lenient_i64")]
    add_time: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    last_update: i64,
    #[serde(default, deserialize_with = "lenient_string")]
    wp_path_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    del_path: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    status: i64,
    #[serde(default, deserialize_with = "lenient_string")]
    file_id: String,
}

impl From<RawTask> for LiveTask {
    fn from(raw: RawTask) -> Self {
        LiveTask {
            task_id: raw.info_hash,
            name: raw.name,
            size: raw.size,
            percent_done: raw.percent_done,
            add_time: raw.add_time,
            last_update: raw.last_update,
            folder_id: raw.wp_path_id,
            delete_path: raw.del_path,
            status_code: raw.status,
            file_id: raw.file_id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawTaskPage {
    #[serde(default)]
    tasks: Option<Vec<RawTask>>,
    #[serde(default, deserialize_with = "lenient_i64")]
    page_count: i64,
}

#[derive(Debug, Deserialize)]
struct RawGetId {
    #[serde(default, deserialize_with = "lenient_string")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    /// Present for files only
    #[serde(default, deserialize_with = "lenient_string")]
    fid: String,
    /// Own id for folders, parent id for files
    #[serde(default, deserialize_with = "lenient_string")]
    cid: String,
    #[serde(default, deserialize_with = "lenient_string")]
    n: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    te: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    tu: i64,
}

impl From<RawFile> for NamespaceEntry {
    fn from(raw: RawFile) -> Self {
        let is_directory = raw.fid.trim().is_empty();
        NamespaceEntry {
            id: if is_directory { raw.cid } else { raw.fid },
            name: raw.n,
            is_directory,
            modified_time: from_epoch_seconds(raw.te).or_else(|| from_epoch_seconds(raw.tu)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawFilePage {
    #[serde(default)]
    data: Vec<RawFile>,
    #[serde(default, deserialize_with = "lenient_i64")]
    count: i64,
}

/// Blocking 115 client; clones share one connection pool
#[derive(Clone)]
pub struct P115Client {
    agent: ureq::Agent,
    cookie: String,
    uid: String,
    app_ver: String,
    user_agent: String,
    page_size: usize,
    cwd_path: String,
    cwd_id: String,
}

impl P115Client {
    pub fn new(remote: &RemoteConfig) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
            cookie: remote.cookie.clone(),
            uid: remote.uid.clone(),
            app_ver: remote.app_ver.clone(),
            user_agent: remote.user_agent.clone(),
            page_size: remote.page_size,
            cwd_path: "/".to_string(),
            cwd_id: ROOT_ID.to_string(),
        }
    }

    fn request(&self, method: &str, url: &str) -> ureq::Request {
        self.agent
            .request(method, url)
            .set("Cookie", &self.cookie)
            .set("User-Agent", &self.user_agent)
    }

    fn post_form(&self, operation: &str, url: &str, fields: &[(&str, &str)]) -> Result<Value> {
        tracing::debug!(operation, url, "POST");
        read_json(operation, self.request("POST", url).send_form(fields))
    }

    fn get(&self, operation: &str, url: &str, query: &[(&str, &str)]) -> Result<Value> {
        tracing::debug!(operation, url, "GET");
        let request = query
            .iter()
            .fold(self.request("GET", url), |request, (key, value)| {
                request.query(key, value)
            });
        read_json(operation, request.call())
    }

    /// Folder id for an absolute path
    fn path_to_id(&self, path: &str) -> Result<String> {
        let path = normalize_path(path);
        if path == "/" {
            return Ok(ROOT_ID.to_string());
        }

        let body = self.get("getid", FILES_GETID, &[("path", path.as_str())])?;
        ensure_state("getid", &body)?;
        let parsed: RawGetId = decode("getid", body)?;
        if parsed.id.is_empty() || parsed.id == ROOT_ID {
            return Err(Error::RemoteFolderMissing(path));
        }
        Ok(parsed.id)
    }
}

fn read_json(
    operation: &str,
    result: std::result::Result<ureq::Response, ureq::Error>,
) -> Result<Value> {
    let response = match result {
        Ok(response) => response,
        Err(ureq::Error::Status(code, response)) => {
            let raw = response.into_string().unwrap_or_default();
            tracing::error!(operation, code, raw = %raw, "remote returned error status");
            if code >= 500 {
                return Err(Error::GatewayUnavailable(format!("{operation}: HTTP {code}")));
            }
            return Err(Error::GatewayProtocol {
                operation: operation.to_string(),
                reason: format!("HTTP {code}"),
            });
        }
        Err(ureq::Error::Transport(transport)) => {
            return Err(Error::GatewayUnavailable(format!("{operation}: {transport}")));
        }
    };

    let raw = response
        .into_string()
        .map_err(|err| Error::GatewayUnavailable(format!("{operation}: {err}")))?;
    serde_json::from_str(&raw).map_err(|err| {
        tracing::error!(operation, raw = %raw, "response is not JSON");
        Error::GatewayProtocol {
            operation: operation.to_string(),
            reason: err.to_string(),
        }
    })
}

/// Map `state: false` to `RemoteRejected`
fn ensure_state(operation: &str, body: &Value) -> Result<()> {
    if body.get("state").and_then(Value::as_bool).unwrap_or(false) {
        return Ok(());
    }
    let message = ["error_msg", "error", "msg"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .filter(|message| !message.is_empty())
        .unwrap_or("unknown error")
        .to_string();
    tracing::warn!(operation, message = %message, "remote rejected request");
    Err(Error::RemoteRejected {
        operation: operation.to_string(),
        message,
    })
}

fn decode<T: DeserializeOwned>(operation: &str, body: Value) -> Result<T> {
    let raw = body.to_string();
    serde_json::from_value(body).map_err(|err| {
        tracing::error!(operation, raw = %raw, "unexpected response shape");
        Error::GatewayProtocol {
            operation: operation.to_string(),
            reason: err.to_string(),
        }
    })
}

impl OfflineGateway for P115Client {
    fn add(&self, url: &str, folder_id: &str) -> Result<AddedTask> {
        let body = self.post_form(
            "add",
            ADD_TASK_URL,
            &[
                ("url", url),
                ("wp_path_id", folder_id),
                ("uid", self.uid.as_str()),
                ("app_ver", self.app_ver.as_str()),
            ],
        )?;
        ensure_state("add", &body)?;
        let raw: RawAdded = decode("add", body)?;
        raw.into_added().ok_or_else(|| Error::GatewayProtocol {
            operation: "add".to_string(),
            reason: "response has no info_hash".to_string(),
        })
    }

    fn add_batch(&self, urls: &[String], folder_id: &str) -> Result<Vec<AddedTask>> {
        let keys: Vec<String> = (0..urls.len()).map(|i| format!("url[{i}]")).collect();
        let mut fields: Vec<(&str, &str)> = keys
            .iter()
            .map(String::as_str)
            .zip(urls.iter().map(String::as_str))
            .collect();
        fields.push(("wp_path_id", folder_id));
        fields.push(("uid", self.uid.as_str()));
        fields.push(("app_ver", self.app_ver.as_str()));

        let body = self.post_form("add_batch", ADD_TASK_URLS, &fields)?;
        ensure_state("add_batch", &body)?;
        let batch: RawBatch = decode("add_batch", body)?;

        let requested = batch.result.len();
        let added: Vec<AddedTask> = batch
            .result
            .into_iter()
            .filter_map(RawAdded::into_added)
            .collect();
        if added.len() < requested {
            tracing::warn!(
                skipped = requested - added.len(),
                "batch results without info_hash were skipped"
            );
        }
        Ok(added)
    }

    fn list(&self) -> Result<Vec<LiveTask>> {
        let mut tasks = Vec::new();
        let mut page = 1usize;

        loop {
            let page_str = page.to_string();
            let body = self.post_form("list", TASK_LISTS, &[("page", page_str.as_str())])?;
            ensure_state("list", &body)?;
            let parsed: RawTaskPage = decode("list", body)?;
            tasks.extend(parsed.tasks.unwrap_or_default().into_iter().map(LiveTask::from));

            if page as i64 >= parsed.page_count || page >= MAX_PAGES {
                break;
            }
            page += 1;
        }

        tracing::debug!(tasks = tasks.len(), pages = page, "live tasks listed");
        Ok(tasks)
    }

    fn remove(&self, task_id: &str) -> Result<()> {
        let body = self.post_form(
            "remove",
            TASK_DEL,
            &[("hash[0]", task_id), ("uid", self.uid.as_str()), ("flag", "0")],
        )?;
        ensure_state("remove", &body)
    }

    fn remove_file(&self, folder_id: &str, file_id: &str) -> Result<bool> {
        let body = self.post_form(
            "remove_file",
            FILE_DELETE,
            &[("pid", folder_id), ("fid[0]", file_id), ("ignore_warn", "1")],
        )?;
        Ok(ensure_state("remove_file", &body).is_ok())
    }
}

impl NamespaceGateway for P115Client {
    fn list_children(&self, path: &str) -> Result<Vec<NamespaceEntry>> {
        let cid = self.path_to_id(path)?;
        let limit = self.page_size.to_string();
        let mut entries = Vec::new();

        for _ in 0..MAX_PAGES {
            let offset = entries.len().to_string();
            let body = self.get(
                "list_children",
                FILES_LIST,
                &[
                    ("aid", "1"),
                    ("cid", cid.as_str()),
                    ("show_dir", "1"),
                    ("limit", limit.as_str()),
                    ("offset", offset.as_str()),
                ],
            )?;
            ensure_state("list_children", &body)?;
            let page: RawFilePage = decode("list_children", body)?;

            let received = page.data.len();
            entries.extend(page.data.into_iter().map(NamespaceEntry::from));
            if received == 0 || entries.len() as i64 >= page.count {
                break;
            }
        }

        Ok(entries)
    }

    fn path_id(&self, path: &str) -> Result<String> {
        self.path_to_id(path)
    }

    fn change_dir(&mut self, path: &str) -> Result<()> {
        let path = normalize_path(path);
        let id = self.path_to_id(&path)?;
        tracing::debug!(path = %path, id = %id, "changed directory");
        self.cwd_path = path;
        self.cwd_id = id;
        Ok(())
    }

    fn current_path(&self) -> String {
        self.cwd_path.clone()
    }

    fn current_id(&self) -> String {
        self.cwd_id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_task_accepts_mixed_types() {
        let raw: RawTask = serde_json::from_value(json!({
            "info_hash": "H1",
            "name": "Foo",
            "size": "1073741824",
            "percentDone": 100,
            "add_time": 1_700_000_000,
            "last_update": "1700003600",
            "wp_path_id": 100,
            "del_path": "/Foo",
            "status": 2,
            "file_id": null
        }))
        .expect("decode");

        let task = LiveTask::from(raw);
        assert_eq!(task.task_id, "H1");
        assert_eq!(task.size, 1_073_741_824);
        assert!(task.is_complete());
        assert_eq!(task.last_update, 1_700_003_600);
        assert_eq!(task.folder_id, "100");
        assert_eq!(task.status_code, 2);
        assert!(task.file_id.is_empty());
    }

    #[test]
    fn numbers_reject_non_finite_and_out_of_range() {
        let nan: std::result::Result<RawTask, _> =
            serde_json::from_value(json!({"info_hash": "H1", "percentDone": "NaN"}));
        assert!(nan.is_err());

        let inf: std::result::Result<RawTask, _> =
            serde_json::from_value(json!({"info_hash": "H1", "add_time": "inf"}));
        assert!(inf.is_err());

        let huge: std::result::Result<RawTask, _> =
            serde_json::from_value(json!({"info_hash": "H1", "last_update": 1e300}));
        assert!(huge.is_err());

        let too_wide: std::result::Result<RawTask, _> =
            serde_json::from_value(json!({"info_hash": "H1", "add_time": "9223372036854775808"}));
        assert!(too_wide.is_err());

        let negative: std::result::Result<RawAdded, _> =
            serde_json::from_value(json!({"info_hash": "H1", "size": -5}));
        assert!(negative.is_err());
    }

    #[test]
    fn numbers_accept_floats_and_full_u64_range() {
        let raw: RawTask = serde_json::from_value(json!({
            "info_hash": "H1",
            "size": 18_446_744_073_709_551_615u64,
            "add_time": 1_700_000_000.75,
            "last_update": " 1700000100.2 ",
            "status": ""
        }))
        .expect("decode");
        assert_eq!(raw.size, u64::MAX);
        assert_eq!(raw.add_time, 1_700_000_000);
        assert_eq!(raw.last_update, 1_700_000_100);
        assert_eq!(raw.status, 0);
    }

    #[test]
    fn raw_file_distinguishes_folders() {
        let folder: RawFile =
            serde_json::from_value(json!({"cid": "100", "n": "Movies", "te": "1700000000"}))
                .expect("folder");
        let file: RawFile = serde_json::from_value(
            json!({"fid": "9", "cid": "100", "n": "Foo.mkv", "te": 0, "tu": 1_700_000_100}),
        )
        .expect("file");

        let folder = NamespaceEntry::from(folder);
        assert!(folder.is_directory);
        assert_eq!(folder.id, "100");
        assert!(folder.modified_time.is_some());

        let file = NamespaceEntry::from(file);
        assert!(!file.is_directory);
        assert_eq!(file.id, "9");
        assert_eq!(file.modified_time, from_epoch_seconds(1_700_000_100));
    }

    #[test]
    fn ensure_state_reports_remote_message() {
        assert!(ensure_state("add", &json!({"state": true})).is_ok());

        match ensure_state("add", &json!({"state": false, "error_msg": "task exists"})) {
            Err(Error::RemoteRejected { operation, message }) => {
                assert_eq!(operation, "add");
                assert_eq!(message, "task exists");
            }
            other => panic!("unexpected result: {other:?}"),
        }

        match ensure_state("list", &json!({"tasks": []})) {
            Err(Error::RemoteRejected { message, .. }) => assert_eq!(message, "unknown error"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn decode_shape_error_is_protocol_error() {
        let result: Result<RawTaskPage> = decode("list", json!({"tasks": "nope"}));
        assert!(matches!(result, Err(Error::GatewayProtocol { .. })));
    }

    #[test]
    fn batch_skips_results_without_hash() {
        let batch: RawBatch = serde_json::from_value(json!({
            "state": true,
            "result": [
                {"info_hash": "H1", "name": "A", "size": 10},
                {"state": false, "error_msg": "bad url"}
            ]
        }))
        .expect("decode");
        let added: Vec<AddedTask> = batch.result.into_iter().filter_map(RawAdded::into_added).collect();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].task_id, "H1");
    }

    #[test]
    fn new_client_starts_at_root() {
        let client = P115Client::new(&RemoteConfig::default());
        assert_eq!(client.current_path(), "/");
        assert_eq!(client.current_id(), "0");
    }
}
