//! Storage layer for lixian
//!
//! All persistent state lives in one data directory:
//!
//! ```text
//! <data_dir>/
//!   task_times.json        # Task ledger: task_id -> lifecycle record
//!   task_times.json.lock   # Advisory lock held across ledger read-modify-write
//!   folder_cache.json      # Namespace cache: folder_id -> resolved path
//! ```
//!
//! Both files are plain JSON objects written atomically (temp + rename).

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::config::Config;
use crate::error::{Error, Result};

/// Storage manager for lixian state
#[derive(Debug, Clone)]
pub struct Storage {
    data_dir: PathBuf,
    ledger_file: String,
    folder_cache_file: String,
    lock_timeout_ms: u64,
}

impl Storage {
    /// Storage rooted at `data_dir` with the default file names
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let defaults = crate::config::StorageConfig::default();
        Self {
            data_dir: data_dir.into(),
            ledger_file: defaults.ledger_file,
            folder_cache_file: defaults.folder_cache_file,
            lock_timeout_ms: defaults.lock_timeout_ms,
        }
    }

    /// Storage as described by the configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            data_dir: config.data_dir(),
            ledger_file: config.storage.ledger_file.clone(),
            folder_cache_file: config.storage.folder_cache_file.clone(),
            lock_timeout_ms: config.storage.lock_timeout_ms,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path to the task ledger
    pub fn ledger_file(&self) -> PathBuf {
        self.data_dir.join(&self.ledger_file)
    }

    /// Path to the namespace cache
    pub fn folder_cache_file(&self) -> PathBuf {
        self.data_dir.join(&self.folder_cache_file)
    }

    pub fn lock_timeout_ms(&self) -> u64 {
        self.lock_timeout_ms
    }

    /// Create the data directory if needed
    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }

    /// Read a JSON document, or `T::default()` when the file does not exist.
    ///
    /// Any other read failure, and any parse failure, is reported as
    /// `StorageCorrupt`; nothing is salvaged from a damaged file.
    pub fn read_json_or_default<T>(&self, path: &Path) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(T::default()),
            Err(err) => {
                return Err(Error::StorageCorrupt {
                    path: path.to_path_buf(),
                    reason: err.to_string(),
                })
            }
        };

        // Older deployments could leave a zero-length file behind
        if content.trim().is_empty() {
            return Ok(T::default());
        }

        serde_json::from_str(&content).map_err(|err| Error::StorageCorrupt {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })
    }

    /// Write JSON data atomically (pretty, 4-space indent like the legacy files)
    pub fn write_json<T: Serialize>(&self, path: &Path, data: &T) -> Result<()> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        data.serialize(&mut ser)?;
        replace_file(path, &buf)
    }
}

/// Swap `path` for a fully written and synced sibling, so a crash mid-write
/// leaves the previous ledger or cache intact
fn replace_file(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut staged = path.as_os_str().to_owned();
    staged.push(format!(".{}.tmp", std::process::id()));
    let staged = PathBuf::from(staged);

    let mut file = File::create(&staged)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&staged, path)?;
    Ok(())
}
