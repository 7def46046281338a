//! Reconciliation engine
//!
//! Merges live remote task listings with the ledger, fills in facts the
//! remote does not keep, and carries out the two-step task operations
//! (remote call first, ledger second).
//!
//! Every ledger read-modify-write runs under the ledger file lock, so two
//! processes reconciling at once serialize instead of losing updates.

use std::collections::HashSet;

use chrono::Utc;
use serde::Serialize;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::gateway::{AddedTask, LiveTask, NamespaceEntry, NamespaceGateway, OfflineGateway};
use crate::ledger::{
    self, display_timestamp, format_size, from_epoch_seconds, is_sentinel_size, Ledger,
    RecordPatch,
};
use crate::namespace::{NamespaceCache, UNKNOWN_FOLDER};
use crate::storage::Storage;

/// Generic `{status, result}` reply used by the add operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply<T> {
    pub status: &'static str,
    pub result: T,
}

impl<T> Reply<T> {
    pub fn success(result: T) -> Self {
        Self {
            status: "success",
            result,
        }
    }
}

/// One task as shown to the operator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskView {
    pub task_id: String,
    pub name: String,
    /// `Complete` or `Running`
    pub status: &'static str,
    pub created_time: String,
    /// Empty until known
    pub completed_time: String,
    pub size: String,
    pub percent: String,
    pub folder_id: String,
    pub folder_name: String,
}

/// Result of a reconciliation pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskListing {
    pub tasks: Vec<TaskView>,
    pub running_count: usize,
    pub complete_count: usize,
}

/// Folders under the current remote directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderListing {
    pub current_id: String,
    pub current_path: String,
    pub folders: Vec<FolderItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderItem {
    pub id: String,
    pub name: String,
}

/// Knobs the engine takes from configuration
#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub default_folder_id: String,
    pub complete_status_code: i64,
}

impl From<&Config> for ReconcilerSettings {
    fn from(config: &Config) -> Self {
        Self {
            default_folder_id: config.default_folder_id.clone(),
            complete_status_code: config.tasks.complete_status_code,
        }
    }
}

/// Owns the ledger, the namespace cache and both gateways
pub struct Reconciler<O, N> {
    offline: O,
    namespace: N,
    ledger: Ledger,
    cache: NamespaceCache,
    settings: ReconcilerSettings,
}

impl<O, N> Reconciler<O, N>
where
    O: OfflineGateway,
    N: NamespaceGateway,
{
    pub fn new(
        offline: O,
        namespace: N,
        ledger: Ledger,
        cache: NamespaceCache,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            offline,
            namespace,
            ledger,
            cache,
            settings,
        }
    }

    /// Open the ledger and cache from storage.
    ///
    /// Both are read up front so a damaged file stops the process before any
    /// remote call is made.
    pub fn open(config: &Config, storage: &Storage, offline: O, namespace: N) -> Result<Self> {
        storage.init()?;
        let mut ledger = Ledger::open(storage);
        ledger.load()?;
        let cache = NamespaceCache::load(storage, &config.namespace)?;
        Ok(Self::new(
            offline,
            namespace,
            ledger,
            cache,
            ReconcilerSettings::from(config),
        ))
    }

    pub fn offline(&self) -> &O {
        &self.offline
    }

    pub fn namespace(&self) -> &N {
        &self.namespace
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn cache(&self) -> &NamespaceCache {
        &self.cache
    }

    /// Build the namespace cache from the root unless it is already there
    pub fn prime_namespace(&mut self) -> Result<()> {
        if self.cache.has_root() {
            return Ok(());
        }
        let root = self.cache.root_path().to_string();
        self.cache.build(&mut self.namespace, &root)?;
        Ok(())
    }

    /// Full namespace walk from `root` (the configured root when `None`)
    pub fn build_namespace(&mut self, root: Option<&str>) -> Result<usize> {
        let root = root
            .map(str::to_string)
            .unwrap_or_else(|| self.cache.root_path().to_string());
        self.cache.build(&mut self.namespace, &root)
    }

    pub fn explore_folder(&mut self, folder_id: &str) -> Result<Option<String>> {
        self.cache.explore(&self.namespace, folder_id)
    }

    // =========================================================================
    // Task creation
    // =========================================================================

    /// Add one task; the folder falls back to the configured default
    pub fn add(&mut self, url: &str, folder_id: Option<&str>) -> Result<Reply<String>> {
        let url = url.trim();
        if url.is_empty() {
            return Err(Error::InvalidArgument("no magnet URL provided".to_string()));
        }
        let folder_id = folder_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or(self.settings.default_folder_id.as_str())
            .to_string();

        tracing::info!(url, folder_id = %folder_id, "adding task");
        let added = self.offline.add(url, &folder_id)?;
        let task_id = added.task_id.clone();
        self.record_added(&[added], &folder_id)?;

        Ok(Reply::success(task_id))
    }

    /// Add every non-blank line of `urls` into `folder_id`
    pub fn add_batch(&mut self, urls: &str, folder_id: &str) -> Result<Reply<Vec<String>>> {
        let urls: Vec<String> = urls
            .lines()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .collect();
        if urls.is_empty() {
            return Err(Error::InvalidArgument("no URLs provided".to_string()));
        }
        let folder_id = folder_id.trim();
        if folder_id.is_empty() {
            return Err(Error::InvalidArgument("no folder ID provided".to_string()));
        }

        tracing::info!(count = urls.len(), folder_id, "adding tasks");
        let added = self.offline.add_batch(&urls, folder_id)?;
        self.record_added(&added, folder_id)?;

        Ok(Reply::success(
            added.into_iter().map(|task| task.task_id).collect(),
        ))
    }

    fn record_added(&mut self, added: &[AddedTask], folder_id: &str) -> Result<()> {
        let _lock = self.ledger.lock()?;
        self.ledger.load()?;

        let now = Utc::now();
        for task in added {
            let outcome = self.ledger.upsert(
                &task.task_id,
                RecordPatch::new()
                    .created_time(now)
                    .folder_id(folder_id)
                    .original_size(format_size(task.size)),
            );
            tracing::info!(
                task_id = %task.task_id,
                name = %task.name,
                folder_id,
                created = outcome.created,
                "task added"
            );
        }

        if self.ledger.is_dirty() {
            self.ledger.persist()?;
        }
        Ok(())
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Merge the live listing into the ledger and return the consolidated view
    pub fn reconcile(&mut self) -> Result<TaskListing> {
        let live = self.offline.list()?;

        let _lock = self.ledger.lock()?;
        self.ledger.load()?;

        let mut explored = HashSet::new();
        let mut listing = TaskListing {
            tasks: Vec::with_capacity(live.len()),
            running_count: 0,
            complete_count: 0,
        };

        for task in &live {
            self.backfill(task);

            let folder_id = self.folder_id_for(task);
            let mut folder_path = self.resolve_folder(&folder_id, &mut explored)?;

            if task.is_complete() {
                folder_path = self.infer_completion(task, &folder_id, folder_path, &mut explored)?;
                listing.complete_count += 1;
            } else {
                listing.running_count += 1;
            }

            listing.tasks.push(self.view(task, folder_id, folder_path));
        }

        if self.ledger.is_dirty() {
            self.ledger.persist()?;
        }

        tracing::info!(
            tasks = live.len(),
            running = listing.running_count,
            complete = listing.complete_count,
            "reconciled"
        );
        Ok(listing)
    }

    /// Record first sighting, or refresh a sentinel size
    fn backfill(&mut self, task: &LiveTask) {
        let live_size = format_size(task.size);

        let Some(record) = self.ledger.get(&task.task_id) else {
            let created = from_epoch_seconds(task.add_time).unwrap_or_else(Utc::now);
            self.ledger.upsert(
                &task.task_id,
                RecordPatch::new()
                    .created_time(created)
                    .folder_id(task.folder_id.clone())
                    .original_size(live_size),
            );
            return;
        };

        let mut patch = RecordPatch::new();
        if is_sentinel_size(&record.original_size) {
            patch = patch.original_size(live_size);
        }
        if ledger::is_unset_folder(&record.folder_id) && !task.folder_id.trim().is_empty() {
            patch = patch.folder_id(task.folder_id.clone());
        }
        if patch != RecordPatch::default() {
            self.ledger.upsert(&task.task_id, patch);
        }
    }

    fn folder_id_for(&self, task: &LiveTask) -> String {
        if !task.folder_id.trim().is_empty() {
            return task.folder_id.clone();
        }
        self.ledger
            .get(&task.task_id)
            .map(|record| record.folder_id.clone())
            .unwrap_or_default()
    }

    /// Cached path, exploring each unknown folder at most once per pass
    fn resolve_folder(
        &mut self,
        folder_id: &str,
        explored: &mut HashSet<String>,
    ) -> Result<Option<String>> {
        if ledger::is_unset_folder(folder_id) {
            return Ok(None);
        }
        if let Some(path) = self.cache.resolve(folder_id) {
            return Ok(Some(path.to_string()));
        }
        if explored.insert(folder_id.to_string()) {
            return self.cache.explore(&self.namespace, folder_id);
        }
        Ok(None)
    }

    /// Fill `completed_time` for a finished task that has none yet.
    ///
    /// Priority: the ledger value, then the modified time of the matching
    /// item in the task's folder, then the remote last-update time. Returns
    /// the folder path, which changes when a stale cached path was replaced.
    fn infer_completion(
        &mut self,
        task: &LiveTask,
        folder_id: &str,
        mut folder_path: Option<String>,
        explored: &mut HashSet<String>,
    ) -> Result<Option<String>> {
        let recorded = self
            .ledger
            .get(&task.task_id)
            .and_then(|record| record.completed_time);
        if recorded.is_some() {
            return Ok(folder_path);
        }

        let mut completed = None;
        if let Some(item) = task.item_name() {
            if let Some(entries) = self.list_task_folder(folder_id, &mut folder_path, explored)? {
                completed = entries
                    .iter()
                    .find(|entry| entry.name == item)
                    .and_then(|entry| entry.modified_time);
                if completed.is_none() {
                    tracing::debug!(task_id = %task.task_id, folder_id, item, "no matching item in folder");
                }
            }
        }

        match completed.or_else(|| from_epoch_seconds(task.last_update)) {
            Some(completed) => {
                self.ledger
                    .upsert(&task.task_id, RecordPatch::new().completed_time(completed));
            }
            None => tracing::warn!(
                task_id = %task.task_id,
                "finished task has no completion time available yet"
            ),
        }
        Ok(folder_path)
    }

    /// Children of the task's folder, or `None` when it cannot be listed.
    ///
    /// A cached path the remote no longer has is explored again (at most once
    /// per folder per pass) and `folder_path` is updated to the new location.
    fn list_task_folder(
        &mut self,
        folder_id: &str,
        folder_path: &mut Option<String>,
        explored: &mut HashSet<String>,
    ) -> Result<Option<Vec<NamespaceEntry>>> {
        let Some(path) = folder_path.clone() else {
            return Ok(None);
        };
        match self.namespace.list_children(&path) {
            Ok(entries) => return Ok(Some(entries)),
            Err(Error::RemoteFolderMissing(_)) => {
                tracing::warn!(folder_id, path = %path, "cached folder path is gone");
            }
            Err(err) => return Err(err),
        }

        *folder_path = None;
        if !explored.insert(folder_id.to_string()) {
            return Ok(None);
        }
        let Some(found) = self.cache.explore(&self.namespace, folder_id)? else {
            return Ok(None);
        };

        match self.namespace.list_children(&found) {
            Ok(entries) => {
                *folder_path = Some(found);
                Ok(Some(entries))
            }
            Err(Error::RemoteFolderMissing(missing)) => {
                tracing::warn!(folder_id, path = %missing, "folder moved again while listing");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn view(&self, task: &LiveTask, folder_id: String, folder_path: Option<String>) -> TaskView {
        let record = self.ledger.get(&task.task_id);

        TaskView {
            task_id: task.task_id.clone(),
            name: task.name.clone(),
            status: if task.is_complete() { "Complete" } else { "Running" },
            created_time: record
                .map(|record| display_timestamp(&record.created_time))
                .unwrap_or_default(),
            completed_time: record
                .and_then(|record| record.completed_time.as_ref())
                .map(display_timestamp)
                .unwrap_or_default(),
            size: record
                .map(|record| record.original_size.clone())
                .unwrap_or_else(|| format_size(task.size)),
            percent: format!("{:.1}", task.percent_done),
            folder_id,
            folder_name: folder_path.unwrap_or_else(|| UNKNOWN_FOLDER.to_string()),
        }
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    /// Remove a task remotely, then forget it locally.
    ///
    /// A remote failure leaves the ledger alone. A ledger failure after the
    /// remote removal is reported as a partial failure naming the stale entry.
    pub fn delete(&mut self, task_id: &str) -> Result<()> {
        self.offline.remove(task_id)?;
        tracing::info!(task_id, "remote task removed");

        self.forget(task_id).map_err(|err| {
            tracing::error!(task_id, error = %err, "ledger entry left stale");
            Error::PartialFailure {
                task_id: task_id.to_string(),
                message: format!("remote task removed but ledger entry is stale: {err}"),
            }
        })
    }

    fn forget(&mut self, task_id: &str) -> Result<()> {
        let _lock = self.ledger.lock()?;
        self.ledger.load()?;
        if self.ledger.remove(task_id).is_some() {
            self.ledger.persist()?;
        }
        Ok(())
    }

    /// Delete every task whose remote status is the "complete" code
    pub fn clear_completed(&mut self) -> Result<Vec<String>> {
        let live = self.offline.list()?;
        let code = self.settings.complete_status_code;

        let mut cleared = Vec::new();
        for task in live.iter().filter(|task| task.status_code == code) {
            self.delete(&task.task_id)?;
            cleared.push(task.task_id.clone());
        }

        tracing::info!(cleared = cleared.len(), "completed tasks cleared");
        Ok(cleared)
    }

    /// Delete the task's downloaded file, and only then the task itself
    pub fn delete_with_folder(&mut self, task_id: &str) -> Result<()> {
        let live = self.offline.list()?;
        let task = live
            .into_iter()
            .find(|task| task.task_id == task_id)
            .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))?;

        let folder_id = task.folder_id.trim();
        let file_id = task.file_id.trim();
        if folder_id.is_empty() || file_id.is_empty() {
            return Err(Error::NoAssociatedFolder(task_id.to_string()));
        }

        let partial = |reason: String| Error::PartialFailure {
            task_id: task_id.to_string(),
            message: format!(
                "file {file_id} in folder {folder_id} was not deleted ({reason}); task left in place"
            ),
        };

        match self.offline.remove_file(folder_id, file_id) {
            Ok(true) => {
                tracing::info!(task_id, folder_id, file_id, "remote file removed");
            }
            Ok(false) => return Err(partial("remote refused".to_string())),
            Err(err) => return Err(partial(err.to_string())),
        }

        self.delete(task_id)
    }

    // =========================================================================
    // Folder navigation
    // =========================================================================

    /// Change to `path` (the root when `None`) and list its folders,
    /// remembering them in the cache
    pub fn browse(&mut self, path: Option<&str>) -> Result<FolderListing> {
        let target = path
            .map(crate::namespace::normalize_path)
            .unwrap_or_else(|| self.cache.root_path().to_string());

        self.namespace.change_dir(&target)?;
        let current_path = self.namespace.current_path();
        let current_id = self.namespace.current_id();

        let entries = self.namespace.list_children(&current_path)?;
        self.cache
            .record_listing(&current_id, &current_path, &entries)?;

        let folders = entries
            .into_iter()
            .filter(|entry| entry.is_directory)
            .map(|entry| FolderItem {
                id: entry.id,
                name: entry.name,
            })
            .collect();

        Ok(FolderListing {
            current_id,
            current_path,
            folders,
        })
    }
}
