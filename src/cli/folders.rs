//! Folder commands: folders, cache build, cache explore, cache show

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::config::Config;
use crate::error::Result;
use crate::gateway::NamespaceGateway;
use crate::namespace::NamespaceCache;
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::storage::Storage;

use super::open_reconciler;

/// Options for the folders command
pub struct BrowseOptions {
    pub path: Option<String>,
    pub config: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

/// Options for the cache build command
pub struct CacheBuildOptions {
    pub root: Option<String>,
    pub config: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

/// Options for the cache explore command
pub struct CacheExploreOptions {
    pub folder_id: String,
    pub config: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

/// Options for the cache show command
pub struct CacheShowOptions {
    pub config: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

#[derive(Serialize)]
struct BuildReport {
    root: String,
    discovered: usize,
    cached: usize,
}

#[derive(Serialize)]
struct ExploreReport {
    folder_id: String,
    path: Option<String>,
}

#[derive(Serialize)]
struct ShowReport<'a> {
    path: String,
    folders: &'a BTreeMap<String, String>,
}

pub fn run_browse(options: BrowseOptions) -> Result<()> {
    let mut reconciler = open_reconciler(options.config.as_deref())?;
    let listing = reconciler.browse(options.path.as_deref())?;

    let mut human = HumanOutput::new(format!("lixian folders: {}", listing.current_path));
    human.push_summary("id", listing.current_id.as_str());
    human.push_summary("folders", listing.folders.len().to_string());
    for folder in &listing.folders {
        human.push_detail(format!("{} ({})", folder.name, folder.id));
    }

    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "folders",
        &listing,
        &human,
    )
}

pub fn run_cache_build(options: CacheBuildOptions) -> Result<()> {
    let mut reconciler = open_reconciler(options.config.as_deref())?;
    let discovered = reconciler.build_namespace(options.root.as_deref())?;

    let report = BuildReport {
        root: reconciler.namespace().current_path(),
        discovered,
        cached: reconciler.cache().len(),
    };
    let mut human = HumanOutput::new(format!("lixian cache build: {}", report.root));
    human.push_summary("discovered", report.discovered.to_string());
    human.push_summary("cached", report.cached.to_string());

    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "cache build",
        &report,
        &human,
    )
}

pub fn run_cache_explore(options: CacheExploreOptions) -> Result<()> {
    let mut reconciler = open_reconciler(options.config.as_deref())?;
    let path = reconciler.explore_folder(&options.folder_id)?;

    let mut human = HumanOutput::new(format!("lixian cache explore: {}", options.folder_id));
    match &path {
        Some(path) => human.push_summary("path", path.as_str()),
        None => human.push_warning("folder not found within the explore depth"),
    }

    let report = ExploreReport {
        folder_id: options.folder_id,
        path,
    };
    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "cache explore",
        &report,
        &human,
    )
}

/// Reads the cache file only; no credentials are needed
pub fn run_cache_show(options: CacheShowOptions) -> Result<()> {
    let config = Config::discover(options.config.as_deref())?;
    let storage = Storage::from_config(&config);
    let cache = NamespaceCache::load(&storage, &config.namespace)?;

    let report = ShowReport {
        path: cache.path().display().to_string(),
        folders: cache.entries(),
    };
    let mut human = HumanOutput::new(format!("lixian cache show: {} folder(s)", cache.len()));
    human.push_summary("file", report.path.as_str());
    for (id, path) in cache.entries() {
        human.push_detail(format!("{id} -> {path}"));
    }
    if cache.is_empty() {
        human.push_next_step("lixian cache build");
    }

    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "cache show",
        &report,
        &human,
    )
}
