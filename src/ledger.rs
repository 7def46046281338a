//! Task ledger
//!
//! Durable per-task lifecycle facts the remote service does not keep:
//! when a task was first seen, which folder it targets, the size reported
//! when it was added, and when it finished.
//!
//! Merging is field-level. Once `created_time` or `completed_time` is
//! recorded it is never replaced, and a real size is never replaced by the
//! zero-size sentinel.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::lock::{self, FileLock};
use crate::storage::Storage;

/// Size recorded when the remote reported nothing useful
pub const SIZE_SENTINEL: &str = "0.0 B";

const SIZE_UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

/// Placeholder some deployments wrote for a missing folder id
const LEGACY_FOLDER_PLACEHOLDER: &str = "N/A";

/// Render a byte count as `<value:.1> <unit>` in 1024 steps.
pub fn format_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in &SIZE_UNITS[..SIZE_UNITS.len() - 1] {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} {}", SIZE_UNITS[SIZE_UNITS.len() - 1])
}

/// True when a size string carries no information and may be refreshed
pub fn is_sentinel_size(size: &str) -> bool {
    let size = size.trim();
    size.is_empty() || size == SIZE_SENTINEL || size.eq_ignore_ascii_case("unknown")
}

/// True for an empty folder id or the legacy `N/A` placeholder
pub fn is_unset_folder(folder_id: &str) -> bool {
    let folder_id = folder_id.trim();
    folder_id.is_empty() || folder_id == LEGACY_FOLDER_PLACEHOLDER
}

/// Parse a stored timestamp.
///
/// RFC 3339 is what we write. Naive ISO-8601 (with `T` or a space) is what
/// older ledgers contain; those are local wall-clock times.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|local| local.with_timezone(&Utc))
}

/// Timestamp from remote epoch seconds; `None` for zero or out of range
pub fn from_epoch_seconds(seconds: i64) -> Option<DateTime<Utc>> {
    if seconds <= 0 {
        return None;
    }
    DateTime::from_timestamp(seconds, 0)
}

/// Format a timestamp for display (`%Y-%m-%d %H:%M:%S`, local time)
pub fn display_timestamp(value: &DateTime<Utc>) -> String {
    value
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_timestamp(&raw)
            .ok_or_else(|| D::Error::custom(format!("invalid timestamp '{raw}'")))
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(value) => super::serialize(value, s),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(d)? {
                None => Ok(None),
                Some(raw) if raw.trim().is_empty() => Ok(None),
                Some(raw) => super::super::parse_timestamp(&raw)
                    .map(Some)
                    .ok_or_else(|| D::Error::custom(format!("invalid timestamp '{raw}'"))),
            }
        }
    }
}

fn default_original_size() -> String {
    SIZE_SENTINEL.to_string()
}

/// Lifecycle facts for one remote task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    #[serde(with = "timestamp")]
    pub created_time: DateTime<Utc>,
    #[serde(default)]
    pub folder_id: String,
    #[serde(default = "default_original_size")]
    pub original_size: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "timestamp::option"
    )]
    pub completed_time: Option<DateTime<Utc>>,
}

/// Fields offered to [`Ledger::upsert`]; `None` means "not provided"
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPatch {
    pub created_time: Option<DateTime<Utc>>,
    pub folder_id: Option<String>,
    pub original_size: Option<String>,
    pub completed_time: Option<DateTime<Utc>>,
}

impl RecordPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created_time(mut self, value: DateTime<Utc>) -> Self {
        self.created_time = Some(value);
        self
    }

    pub fn folder_id(mut self, value: impl Into<String>) -> Self {
        self.folder_id = Some(value.into());
        self
    }

    pub fn original_size(mut self, value: impl Into<String>) -> Self {
        self.original_size = Some(value.into());
        self
    }

    pub fn completed_time(mut self, value: DateTime<Utc>) -> Self {
        self.completed_time = Some(value);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordField {
    CreatedTime,
    FolderId,
    OriginalSize,
    CompletedTime,
}

/// What an upsert did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub created: bool,
    pub applied: Vec<RecordField>,
    pub rejected: Vec<RecordField>,
}

impl UpsertOutcome {
    pub fn changed(&self) -> bool {
        self.created || !self.applied.is_empty()
    }
}

/// In-memory view of the ledger file with explicit load/persist
#[derive(Debug)]
pub struct Ledger {
    storage: Storage,
    path: PathBuf,
    records: BTreeMap<String, TaskRecord>,
    dirty: bool,
}

impl Ledger {
    /// Ledger backed by the storage's ledger file; nothing is read yet
    pub fn open(storage: &Storage) -> Self {
        Self {
            path: storage.ledger_file(),
            storage: storage.clone(),
            records: BTreeMap::new(),
            dirty: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the exclusive ledger lock for a read-modify-write cycle
    pub fn lock(&self) -> Result<FileLock> {
        FileLock::acquire(lock::lock_path_for(&self.path), self.storage.lock_timeout_ms())
    }

    /// Replace the in-memory state with what is on disk.
    ///
    /// A missing file is an empty ledger; a damaged one is `StorageCorrupt`.
    pub fn load(&mut self) -> Result<&BTreeMap<String, TaskRecord>> {
        self.records = self.storage.read_json_or_default(&self.path)?;
        self.dirty = false;
        tracing::debug!(path = %self.path.display(), records = self.records.len(), "ledger loaded");
        Ok(&self.records)
    }

    pub fn records(&self) -> &BTreeMap<String, TaskRecord> {
        &self.records
    }

    pub fn get(&self, task_id: &str) -> Option<&TaskRecord> {
        self.records.get(task_id)
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.records.contains_key(task_id)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Field-level merge of `patch` into the record for `task_id`.
    ///
    /// New ids get a full record (`created_time` defaults to now, size to the
    /// sentinel). For existing ids, `created_time` and `completed_time` are
    /// first-write-wins, `original_size` is taken when the incoming value is
    /// real or the stored one is the sentinel, and `folder_id` only fills an
    /// unset value.
    pub fn upsert(&mut self, task_id: &str, patch: RecordPatch) -> UpsertOutcome {
        let mut outcome = UpsertOutcome::default();

        let Some(record) = self.records.get_mut(task_id) else {
            let record = TaskRecord {
                created_time: patch.created_time.unwrap_or_else(Utc::now),
                folder_id: patch.folder_id.unwrap_or_default(),
                original_size: patch
                    .original_size
                    .filter(|size| !size.trim().is_empty())
                    .unwrap_or_else(default_original_size),
                completed_time: patch.completed_time,
            };
            tracing::info!(
                task_id,
                created_time = %record.created_time.to_rfc3339_opts(SecondsFormat::Secs, true),
                folder_id = %record.folder_id,
                original_size = %record.original_size,
                "ledger record created"
            );
            self.records.insert(task_id.to_string(), record);
            self.dirty = true;
            outcome.created = true;
            return outcome;
        };

        if patch.created_time.is_some() {
            outcome.rejected.push(RecordField::CreatedTime);
        }

        if let Some(folder_id) = patch.folder_id {
            if folder_id != record.folder_id {
                if is_unset_folder(&record.folder_id) && !is_unset_folder(&folder_id) {
                    record.folder_id = folder_id;
                    outcome.applied.push(RecordField::FolderId);
                } else {
                    outcome.rejected.push(RecordField::FolderId);
                }
            }
        }

        if let Some(size) = patch.original_size {
            if size != record.original_size {
                if !is_sentinel_size(&size) || is_sentinel_size(&record.original_size) {
                    record.original_size = size;
                    outcome.applied.push(RecordField::OriginalSize);
                } else {
                    outcome.rejected.push(RecordField::OriginalSize);
                }
            }
        }

        if let Some(completed) = patch.completed_time {
            if record.completed_time.is_none() {
                record.completed_time = Some(completed);
                outcome.applied.push(RecordField::CompletedTime);
            } else {
                outcome.rejected.push(RecordField::CompletedTime);
            }
        }

        if !outcome.applied.is_empty() {
            self.dirty = true;
            tracing::info!(task_id, applied = ?outcome.applied, "ledger record updated");
        }
        if !outcome.rejected.is_empty() {
            tracing::debug!(task_id, rejected = ?outcome.rejected, "ledger kept existing fields");
        }

        outcome
    }

    /// Drop the record for `task_id`; no-op when absent
    pub fn remove(&mut self, task_id: &str) -> Option<TaskRecord> {
        let removed = self.records.remove(task_id);
        if removed.is_some() {
            self.dirty = true;
            tracing::info!(task_id, "ledger record removed");
        }
        removed
    }

    /// Write the whole mapping atomically
    pub fn persist(&mut self) -> Result<()> {
        self.storage.write_json(&self.path, &self.records)?;
        self.dirty = false;
        tracing::debug!(path = %self.path.display(), records = self.records.len(), "ledger persisted");
        Ok(())
    }
}
