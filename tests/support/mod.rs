#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use chrono::{DateTime, TimeZone, Utc};
use lixian::config::Config;
use lixian::error::{Error, Result};
use lixian::gateway::{AddedTask, LiveTask, NamespaceEntry, NamespaceGateway, OfflineGateway};
use lixian::reconcile::Reconciler;
use lixian::storage::Storage;
use tempfile::TempDir;

#[derive(Default)]
struct FakeState {
    tasks: Vec<LiveTask>,
    /// path -> folder id
    folder_ids: BTreeMap<String, String>,
    /// path -> children
    children: BTreeMap<String, Vec<NamespaceEntry>>,
    /// size reported for added tasks, by URL
    added: BTreeMap<String, AddedTask>,
    remove_file_result: Option<bool>,
    fail_remove: bool,
    calls: Vec<String>,
}

/// In-memory remote serving both gateways; clones share state
#[derive(Clone)]
pub struct FakeRemote {
    state: Rc<RefCell<FakeState>>,
    cwd: String,
}

impl FakeRemote {
    pub fn new() -> Self {
        let remote = Self {
            state: Rc::new(RefCell::new(FakeState::default())),
            cwd: "/".to_string(),
        };
        remote.state.borrow_mut().folder_ids.insert("/".to_string(), "0".to_string());
        remote
    }

    pub fn push_task(&self, task: LiveTask) {
        self.state.borrow_mut().tasks.push(task);
    }

    pub fn update_task<F: FnOnce(&mut LiveTask)>(&self, task_id: &str, update: F) {
        let mut state = self.state.borrow_mut();
        if let Some(task) = state.tasks.iter_mut().find(|task| task.task_id == task_id) {
            update(task);
        }
    }

    pub fn task_ids(&self) -> Vec<String> {
        self.state
            .borrow()
            .tasks
            .iter()
            .map(|task| task.task_id.clone())
            .collect()
    }

    /// Register a folder at `path` with `id` under its parent path
    pub fn add_folder(&self, path: &str, id: &str) {
        let (parent, name) = split_path(path);
        let mut state = self.state.borrow_mut();
        state.folder_ids.insert(path.to_string(), id.to_string());
        state.children.entry(path.to_string()).or_default();
        state.children.entry(parent).or_default().push(NamespaceEntry {
            id: id.to_string(),
            name: name.to_string(),
            is_directory: true,
            modified_time: None,
        });
    }

    /// Register a file named `name` in the folder at `parent`
    pub fn add_file(&self, parent: &str, id: &str, name: &str, modified: DateTime<Utc>) {
        self.state
            .borrow_mut()
            .children
            .entry(parent.to_string())
            .or_default()
            .push(NamespaceEntry {
                id: id.to_string(),
                name: name.to_string(),
                is_directory: false,
                modified_time: Some(modified),
            });
    }

    /// Rename the folder at `from` to `to` (same parent), keeping its id
    /// and moving everything below it
    pub fn rename_folder(&self, from: &str, to: &str) {
        let (parent, _) = split_path(from);
        let (_, new_name) = split_path(to);
        let mut state = self.state.borrow_mut();

        let below = format!("{from}/");
        let moved = |path: &str| {
            if path == from {
                Some(to.to_string())
            } else {
                path.strip_prefix(&below).map(|rest| format!("{to}/{rest}"))
            }
        };

        let folder_ids: BTreeMap<String, String> = std::mem::take(&mut state.folder_ids)
            .into_iter()
            .map(|(path, id)| (moved(&path).unwrap_or(path), id))
            .collect();
        state.folder_ids = folder_ids;
        let children: BTreeMap<String, Vec<NamespaceEntry>> = std::mem::take(&mut state.children)
            .into_iter()
            .map(|(path, entries)| (moved(&path).unwrap_or(path), entries))
            .collect();
        state.children = children;

        let id = state.folder_ids.get(to).cloned().unwrap_or_default();
        if let Some(siblings) = state.children.get_mut(&parent) {
            for entry in siblings.iter_mut().filter(|entry| entry.id == id) {
                entry.name = new_name.to_string();
            }
        }
    }

    pub fn on_add(&self, url: &str, task_id: &str, name: &str, size: u64) {
        self.state.borrow_mut().added.insert(
            url.to_string(),
            AddedTask {
                task_id: task_id.to_string(),
                name: name.to_string(),
                size,
            },
        );
    }

    pub fn set_remove_file_result(&self, result: Option<bool>) {
        self.state.borrow_mut().remove_file_result = result;
    }

    pub fn fail_remove(&self) {
        self.state.borrow_mut().fail_remove = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    fn log(&self, call: String) {
        self.state.borrow_mut().calls.push(call);
    }
}

impl OfflineGateway for FakeRemote {
    fn add(&self, url: &str, folder_id: &str) -> Result<AddedTask> {
        self.log(format!("add:{url}:{folder_id}"));
        self.state
            .borrow()
            .added
            .get(url)
            .cloned()
            .ok_or_else(|| Error::RemoteRejected {
                operation: "add".to_string(),
                message: "invalid link".to_string(),
            })
    }

    fn add_batch(&self, urls: &[String], folder_id: &str) -> Result<Vec<AddedTask>> {
        self.log(format!("add_batch:{}:{folder_id}", urls.len()));
        let state = self.state.borrow();
        Ok(urls
            .iter()
            .filter_map(|url| state.added.get(url).cloned())
            .collect())
    }

    fn list(&self) -> Result<Vec<LiveTask>> {
        self.log("list".to_string());
        Ok(self.state.borrow().tasks.clone())
    }

    fn remove(&self, task_id: &str) -> Result<()> {
        self.log(format!("remove:{task_id}"));
        let mut state = self.state.borrow_mut();
        if state.fail_remove {
            return Err(Error::GatewayUnavailable("connection reset".to_string()));
        }
        state.tasks.retain(|task| task.task_id != task_id);
        Ok(())
    }

    fn remove_file(&self, folder_id: &str, file_id: &str) -> Result<bool> {
        self.log(format!("remove_file:{folder_id}:{file_id}"));
        match self.state.borrow().remove_file_result {
            Some(result) => Ok(result),
            None => Err(Error::GatewayUnavailable("timed out".to_string())),
        }
    }
}

impl NamespaceGateway for FakeRemote {
    fn list_children(&self, path: &str) -> Result<Vec<NamespaceEntry>> {
        self.log(format!("list_children:{path}"));
        let state = self.state.borrow();
        if !state.folder_ids.contains_key(path) {
            return Err(Error::RemoteFolderMissing(path.to_string()));
        }
        Ok(state.children.get(path).cloned().unwrap_or_default())
    }

    fn path_id(&self, path: &str) -> Result<String> {
        self.log(format!("path_id:{path}"));
        self.state
            .borrow()
            .folder_ids
            .get(path)
            .cloned()
            .ok_or_else(|| Error::RemoteFolderMissing(path.to_string()))
    }

    fn change_dir(&mut self, path: &str) -> Result<()> {
        self.log(format!("change_dir:{path}"));
        if !self.state.borrow().folder_ids.contains_key(path) {
            return Err(Error::RemoteFolderMissing(path.to_string()));
        }
        self.cwd = path.to_string();
        Ok(())
    }

    fn current_path(&self) -> String {
        self.cwd.clone()
    }

    fn current_id(&self) -> String {
        self.state
            .borrow()
            .folder_ids
            .get(&self.cwd)
            .cloned()
            .unwrap_or_default()
    }
}

fn split_path(path: &str) -> (String, &str) {
    match path.rfind('/') {
        Some(0) => ("/".to_string(), &path[1..]),
        Some(index) => (path[..index].to_string(), &path[index + 1..]),
        None => ("/".to_string(), path),
    }
}

pub fn epoch(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0).single().expect("valid epoch")
}

pub fn live_task(task_id: &str, name: &str, percent_done: f64, folder_id: &str) -> LiveTask {
    LiveTask {
        task_id: task_id.to_string(),
        name: name.to_string(),
        size: 0,
        percent_done,
        add_time: 1_700_000_000,
        last_update: 1_700_000_500,
        folder_id: folder_id.to_string(),
        delete_path: format!("/{name}"),
        status_code: if percent_done >= 100.0 { 2 } else { 1 },
        file_id: String::new(),
    }
}

/// Temporary data directory plus config pointing at it
pub struct TestEnv {
    pub dir: TempDir,
    pub config: Config,
    pub storage: Storage,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = Config::default();
        config.storage.data_dir = Some(dir.path().to_path_buf());
        config.default_folder_id = "100".to_string();
        let storage = Storage::from_config(&config);
        Self {
            dir,
            config,
            storage,
        }
    }

    /// Same, but giving up on a busy ledger lock after `timeout_ms`
    pub fn with_lock_timeout(timeout_ms: u64) -> Self {
        let mut env = Self::new();
        env.config.storage.lock_timeout_ms = timeout_ms;
        env.storage = Storage::from_config(&env.config);
        env
    }

    pub fn open(&self, remote: &FakeRemote) -> Reconciler<FakeRemote, FakeRemote> {
        Reconciler::open(&self.config, &self.storage, remote.clone(), remote.clone())
            .expect("open reconciler")
    }
}
