//! Configuration loading and management
//!
//! Handles parsing of `config.toml` and the environment overrides used by
//! existing deployments (`P115_COOKIE`, `UID`, `C_FolderId`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable pointing at an explicit config file
pub const CONFIG_ENV: &str = "LIXIAN_CONFIG";

const COOKIE_ENV: &str = "P115_COOKIE";
const UID_ENV: &str = "UID";
const DEFAULT_FOLDER_ENV: &str = "C_FolderId";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Folder new tasks land in when the caller names none
    #[serde(default = "default_folder_id")]
    pub default_folder_id: String,

    /// Remote service configuration
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Ledger and cache storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Folder namespace walking
    #[serde(default)]
    pub namespace: NamespaceConfig,

    /// Task classification
    #[serde(default)]
    pub tasks: TasksConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_folder_id: default_folder_id(),
            remote: RemoteConfig::default(),
            storage: StorageConfig::default(),
            namespace: NamespaceConfig::default(),
            tasks: TasksConfig::default(),
        }
    }
}

fn default_folder_id() -> String {
    "0".to_string()
}

/// Remote (115) connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Session cookie, passed through verbatim
    #[serde(default)]
    pub cookie: String,

    /// Account uid sent with task creation
    #[serde(default)]
    pub uid: String,

    /// Client version reported to the offline endpoints
    #[serde(default = "default_app_ver")]
    pub app_ver: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Entries requested per folder listing page
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_app_ver() -> String {
    "25.0.2.1".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/127.0.0.0 Safari/537.36".to_string()
}

fn default_page_size() -> usize {
    1000
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            cookie: String::new(),
            uid: String::new(),
            app_ver: default_app_ver(),
            user_agent: default_user_agent(),
            page_size: default_page_size(),
        }
    }
}

/// Storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the ledger and folder cache (platform data dir if unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    #[serde(default = "default_ledger_file")]
    pub ledger_file: String,

    #[serde(default = "default_folder_cache_file")]
    pub folder_cache_file: String,

    /// How long to wait for the ledger lock
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_ledger_file() -> String {
    "task_times.json".to_string()
}

fn default_folder_cache_file() -> String {
    "folder_cache.json".to_string()
}

fn default_lock_timeout_ms() -> u64 {
    crate::lock::DEFAULT_LOCK_TIMEOUT_MS
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            ledger_file: default_ledger_file(),
            folder_cache_file: default_folder_cache_file(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

/// Namespace walk limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceConfig {
    /// Path the walks start from
    #[serde(default = "default_root_path")]
    pub root_path: String,

    /// Levels walked by `build`
    #[serde(default = "default_build_depth")]
    pub build_depth: usize,

    /// Levels walked by `explore`
    #[serde(default = "default_explore_depth")]
    pub explore_depth: usize,
}

fn default_root_path() -> String {
    "/".to_string()
}

fn default_build_depth() -> usize {
    1
}

fn default_explore_depth() -> usize {
    4
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            root_path: default_root_path(),
            build_depth: default_build_depth(),
            explore_depth: default_explore_depth(),
        }
    }
}

/// Tasks configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksConfig {
    /// Remote status code meaning "complete", used by clear-completed
    #[serde(default = "default_complete_status_code")]
    pub complete_status_code: i64,
}

fn default_complete_status_code() -> i64 {
    2
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            complete_status_code: default_complete_status_code(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|err| {
            Error::InvalidConfig(format!("cannot read {}: {err}", path.display()))
        })?;
        let config: Config = toml::from_str(&content)
            .map_err(|err| Error::InvalidConfig(format!("{}: {err}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the config the CLI should use.
    ///
    /// An explicit path must exist. Without one, the platform config file is
    /// read when present and defaults are used otherwise. Environment
    /// overrides are applied last.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::load(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply environment-style overrides; empty values are ignored
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(cookie) = get(COOKIE_ENV) {
            self.remote.cookie = cookie;
        }
        if let Some(uid) = get(UID_ENV) {
            self.remote.uid = uid;
        }
        if let Some(folder) = get(DEFAULT_FOLDER_ENV) {
            self.default_folder_id = folder.trim().to_string();
        }
    }

    /// Directory for the ledger and folder cache
    pub fn data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.storage.data_dir {
            return dir.clone();
        }
        directories::ProjectDirs::from("", "", "lixian")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("data"))
    }

    /// Fail unless the remote credentials needed by the HTTP gateway are set
    pub fn require_remote(&self) -> Result<()> {
        if self.remote.cookie.trim().is_empty() {
            return Err(Error::InvalidConfig(format!(
                "remote.cookie is not set (set it in the config file or {COOKIE_ENV})"
            )));
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.default_folder_id.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "default_folder_id cannot be empty".to_string(),
            ));
        }
        if self.remote.page_size == 0 || self.remote.page_size > 1150 {
            return Err(Error::InvalidConfig(
                "remote.page_size must be between 1 and 1150".to_string(),
            ));
        }
        self.storage.validate()?;
        self.namespace.validate()?;
        Ok(())
    }
}

impl StorageConfig {
    fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("storage.ledger_file", &self.ledger_file),
            ("storage.folder_cache_file", &self.folder_cache_file),
        ] {
            if value.trim().is_empty() {
                return Err(Error::InvalidConfig(format!("{field} cannot be empty")));
            }
        }
        if self.ledger_file == self.folder_cache_file {
            return Err(Error::InvalidConfig(
                "storage.ledger_file and storage.folder_cache_file must differ".to_string(),
            ));
        }
        if self.lock_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "storage.lock_timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl NamespaceConfig {
    fn validate(&self) -> Result<()> {
        if !self.root_path.starts_with('/') {
            return Err(Error::InvalidConfig(format!(
                "namespace.root_path must be absolute, got '{}'",
                self.root_path
            )));
        }
        if self.explore_depth == 0 {
            return Err(Error::InvalidConfig(
                "namespace.explore_depth must be >= 1".to_string(),
            ));
        }
        if self.build_depth > 16 || self.explore_depth > 16 {
            return Err(Error::InvalidConfig(
                "namespace depths must be <= 16".to_string(),
            ));
        }
        Ok(())
    }
}

/// Platform config file location (`<config dir>/lixian/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "lixian")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}
