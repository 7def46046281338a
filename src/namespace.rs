//! Namespace cache
//!
//! Maps remote folder ids to human-readable paths. The remote namespace is
//! authoritative; this is a read-through accelerator filled by walking the
//! folder tree breadth-first. `resolve` never talks to the remote, only
//! `explore` and `build` do, and every change is saved immediately.
//!
//! A cached path can go stale when a folder is renamed or moved remotely.
//! `explore` notices this (the gateway reports [`Error::RemoteFolderMissing`]),
//! drops the stale subtree with `forget` and searches again from the root.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use crate::config::NamespaceConfig;
use crate::error::{Error, Result};
use crate::gateway::{NamespaceEntry, NamespaceGateway};
use crate::storage::Storage;

/// Display value for a folder that could not be resolved
pub const UNKNOWN_FOLDER: &str = "unknown";

/// Normalize a remote path: leading `/`, no trailing `/`, no empty segments
pub fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

/// Child path of `parent`
pub fn join_path(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{parent}{name}")
    } else {
        format!("{parent}/{name}")
    }
}

#[derive(Debug, Default)]
struct Walk {
    discovered: usize,
    changed: bool,
    found: bool,
}

#[derive(Debug)]
pub struct NamespaceCache {
    storage: Storage,
    path: PathBuf,
    entries: BTreeMap<String, String>,
    /// path -> id, rebuilt on load
    paths: HashMap<String, String>,
    root_path: String,
    build_depth: usize,
    explore_depth: usize,
}

impl NamespaceCache {
    /// Load the persisted cache; a damaged file is `StorageCorrupt`
    pub fn load(storage: &Storage, config: &NamespaceConfig) -> Result<Self> {
        let path = storage.folder_cache_file();
        let entries: BTreeMap<String, String> = storage.read_json_or_default(&path)?;
        tracing::debug!(path = %path.display(), folders = entries.len(), "folder cache loaded");
        let paths = entries
            .iter()
            .map(|(id, path)| (path.clone(), id.clone()))
            .collect();
        Ok(Self {
            storage: storage.clone(),
            path,
            entries,
            paths,
            root_path: normalize_path(&config.root_path),
            build_depth: config.build_depth,
            explore_depth: config.explore_depth,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached path for `folder_id`; never walks
    pub fn resolve(&self, folder_id: &str) -> Option<&str> {
        self.entries.get(folder_id).map(String::as_str)
    }

    /// Cached path, or [`UNKNOWN_FOLDER`]
    pub fn resolve_or_unknown(&self, folder_id: &str) -> &str {
        self.resolve(folder_id).unwrap_or(UNKNOWN_FOLDER)
    }

    /// True once the configured root has been recorded by `build`
    pub fn has_root(&self) -> bool {
        self.paths.contains_key(&self.root_path)
    }

    /// Drop `folder_id` and every cached folder below it. Returns how many
    /// entries were removed.
    pub fn forget(&mut self, folder_id: &str) -> Result<usize> {
        let Some(path) = self.entries.get(folder_id).cloned() else {
            return Ok(0);
        };
        let prefix = join_path(&path, "");
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|(id, cached)| id.as_str() == folder_id || cached.starts_with(&prefix))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &stale {
            if let Some(cached) = self.entries.remove(id) {
                if self.paths.get(&cached) == Some(id) {
                    self.paths.remove(&cached);
                }
            }
        }
        self.save()?;

        tracing::info!(folder_id, path = %path, removed = stale.len(), "stale folders dropped");
        Ok(stale.len())
    }

    /// Walk from `root_path` down `build_depth` levels, recording the root's
    /// own id as well. Returns the number of folders seen.
    pub fn build<G>(&mut self, gateway: &mut G, root_path: &str) -> Result<usize>
    where
        G: NamespaceGateway + ?Sized,
    {
        gateway.change_dir(&normalize_path(root_path))?;
        let root = normalize_path(&gateway.current_path());
        let mut changed = self.insert(gateway.current_id(), root.clone());

        let walk = self.walk(&*gateway, &root, self.build_depth, None)?;
        changed |= walk.changed;
        if changed {
            self.save()?;
        }

        tracing::info!(root = %root, discovered = walk.discovered, "folder cache built");
        Ok(walk.discovered)
    }

    /// Deepen the cache around `folder_id`.
    ///
    /// A cached folder has its subtree re-walked; an unknown one is searched
    /// for breadth-first from the root, the root itself included. A cached
    /// path the remote no longer has is forgotten and searched for from the
    /// root. Returns the resolved path, or `None` (with a warning) when the
    /// folder was not found within the depth limit.
    pub fn explore<G>(&mut self, gateway: &G, folder_id: &str) -> Result<Option<String>>
    where
        G: NamespaceGateway + ?Sized,
    {
        let root = self.root_path.clone();
        let (start, walk) = match self.resolve(folder_id).map(str::to_string) {
            Some(cached) => match self.walk_from(gateway, &cached, None) {
                Err(Error::RemoteFolderMissing(missing)) => {
                    tracing::warn!(folder_id, path = %missing, "cached folder path is gone");
                    self.forget(folder_id)?;
                    (root.clone(), self.walk_from(gateway, &root, Some(folder_id))?)
                }
                walk => (cached, walk?),
            },
            None => (root.clone(), self.walk_from(gateway, &root, Some(folder_id))?),
        };
        if walk.changed {
            self.save()?;
        }

        let resolved = self.resolve(folder_id).map(str::to_string);
        match &resolved {
            Some(path) => tracing::debug!(
                folder_id,
                path = %path,
                discovered = walk.discovered,
                "folder explored"
            ),
            None => tracing::warn!(
                folder_id,
                start = %start,
                depth = self.explore_depth,
                "folder not found in remote namespace"
            ),
        }
        Ok(resolved)
    }

    /// Record folders seen in a listing of `parent_path` (whose id is
    /// `parent_id`). Returns how many entries changed.
    pub fn record_listing(
        &mut self,
        parent_id: &str,
        parent_path: &str,
        entries: &[NamespaceEntry],
    ) -> Result<usize> {
        let parent_path = normalize_path(parent_path);
        let mut changed = usize::from(self.insert(parent_id.to_string(), parent_path.clone()));
        for entry in entries.iter().filter(|entry| entry.is_directory) {
            if self.insert(entry.id.clone(), join_path(&parent_path, &entry.name)) {
                changed += 1;
            }
        }
        if changed > 0 {
            self.save()?;
        }
        Ok(changed)
    }

    /// Record the id of `start` itself, then walk below it unless it is
    /// already the target
    fn walk_from<G>(&mut self, gateway: &G, start: &str, target: Option<&str>) -> Result<Walk>
    where
        G: NamespaceGateway + ?Sized,
    {
        let start_id = gateway.path_id(start)?;
        let recorded = self.insert(start_id.clone(), start.to_string());
        if target == Some(start_id.as_str()) {
            return Ok(Walk {
                discovered: 0,
                changed: recorded,
                found: true,
            });
        }

        let mut walk = self.walk(gateway, start, self.explore_depth, target)?;
        walk.changed |= recorded;
        Ok(walk)
    }

    fn walk<G>(
        &mut self,
        gateway: &G,
        start: &str,
        max_depth: usize,
        target: Option<&str>,
    ) -> Result<Walk>
    where
        G: NamespaceGateway + ?Sized,
    {
        let mut walk = Walk::default();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([(start.to_string(), 0usize)]);

        while let Some((path, depth)) = queue.pop_front() {
            if depth >= max_depth || !visited.insert(path.clone()) {
                continue;
            }

            let children = gateway.list_children(&path)?;
            for child in children.into_iter().filter(|child| child.is_directory) {
                let child_path = join_path(&path, &child.name);
                walk.discovered += 1;
                walk.changed |= self.insert(child.id.clone(), child_path.clone());
                if target == Some(child.id.as_str()) {
                    walk.found = true;
                }
                queue.push_back((child_path, depth + 1));
            }

            if walk.found {
                break;
            }
        }

        Ok(walk)
    }

    fn insert(&mut self, folder_id: String, path: String) -> bool {
        if folder_id.trim().is_empty() {
            return false;
        }
        match self.entries.get(&folder_id) {
            Some(existing) if *existing == path => false,
            _ => {
                tracing::debug!(folder_id = %folder_id, path = %path, "folder cached");
                self.paths.insert(path.clone(), folder_id.clone());
                if let Some(previous) = self.entries.insert(folder_id.clone(), path) {
                    if self.paths.get(&previous) == Some(&folder_id) {
                        self.paths.remove(&previous);
                    }
                }
                true
            }
        }
    }

    fn save(&self) -> Result<()> {
        self.storage.write_json(&self.path, &self.entries)
    }
}
