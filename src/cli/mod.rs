//! Command-line interface for lixian
//!
//! This module defines the CLI structure using clap derive macros.
//! Task commands live in `tasks`, folder and cache commands in `folders`.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::config::{Config, CONFIG_ENV};
use crate::error::Result;
use crate::integrations::p115::P115Client;
use crate::reconcile::Reconciler;
use crate::storage::Storage;

mod folders;
mod tasks;

/// lixian - offline download task ledger
///
/// Submits magnet links to the 115 offline-download service and keeps a
/// local ledger of the facts the service forgets: when a task was added,
/// where it was saved, how large it was and when it finished.
#[derive(Parser, Debug)]
#[command(name = "lixian")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the config file
    #[arg(long, global = true, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add one magnet link
    Add {
        /// Magnet URL
        url: String,

        /// Destination folder id (defaults to the configured folder)
        #[arg(long)]
        folder: Option<String>,
    },

    /// Add several magnet links into one folder
    AddMany {
        /// Destination folder id
        #[arg(long, required = true)]
        folder: String,

        /// Magnet URLs; each argument may hold several newline-separated links
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Reconcile and list live tasks
    Tasks,

    /// Delete a task
    Rm {
        /// Task id (info hash)
        task_id: String,

        /// Also delete the downloaded file, before the task
        #[arg(long)]
        with_folder: bool,
    },

    /// Delete every completed task
    ClearCompleted,

    /// List folders under a remote path
    Folders {
        /// Remote path (defaults to the configured root)
        path: Option<String>,
    },

    /// Folder cache maintenance
    #[command(subcommand)]
    Cache(CacheCommands),
}

/// Folder cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Walk the remote namespace from a root and record every folder
    Build {
        /// Remote root path (defaults to the configured root)
        root: Option<String>,
    },

    /// Locate one folder id in the remote namespace
    Explore {
        /// Folder id to look up
        folder_id: String,
    },

    /// Print the cached folder map without contacting the remote
    Show,
}

impl Commands {
    /// Name reported in the output envelope
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Add { .. } => "add",
            Commands::AddMany { .. } => "add-many",
            Commands::Tasks => "tasks",
            Commands::Rm { .. } => "rm",
            Commands::ClearCompleted => "clear-completed",
            Commands::Folders { .. } => "folders",
            Commands::Cache(CacheCommands::Build { .. }) => "cache build",
            Commands::Cache(CacheCommands::Explore { .. }) => "cache explore",
            Commands::Cache(CacheCommands::Show) => "cache show",
        }
    }
}

/// Reconciler wired to the live 115 service
pub(crate) type LiveReconciler = Reconciler<P115Client, P115Client>;

/// Load config, check credentials and open the ledger and folder cache
pub(crate) fn open_reconciler(config_path: Option<&Path>) -> Result<LiveReconciler> {
    let config = Config::discover(config_path)?;
    config.require_remote()?;
    let storage = Storage::from_config(&config);
    tracing::debug!(data_dir = %storage.data_dir().display(), "opening storage");

    let client = P115Client::new(&config.remote);
    Reconciler::open(&config, &storage, client.clone(), client)
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Add { url, folder } => tasks::run_add(tasks::AddOptions {
                url,
                folder,
                config: self.config,
                json: self.json,
                quiet: self.quiet,
            }),
            Commands::AddMany { folder, urls } => tasks::run_add_many(tasks::AddManyOptions {
                folder,
                urls,
                config: self.config,
                json: self.json,
                quiet: self.quiet,
            }),
            Commands::Tasks => tasks::run_list(tasks::ListOptions {
                config: self.config,
                json: self.json,
                quiet: self.quiet,
            }),
            Commands::Rm {
                task_id,
                with_folder,
            } => tasks::run_rm(tasks::RmOptions {
                task_id,
                with_folder,
                config: self.config,
                json: self.json,
                quiet: self.quiet,
            }),
            Commands::ClearCompleted => tasks::run_clear_completed(tasks::ClearOptions {
                config: self.config,
                json: self.json,
                quiet: self.quiet,
            }),
            Commands::Folders { path } => folders::run_browse(folders::BrowseOptions {
                path,
                config: self.config,
                json: self.json,
                quiet: self.quiet,
            }),
            Commands::Cache(cmd) => match cmd {
                CacheCommands::Build { root } => {
                    folders::run_cache_build(folders::CacheBuildOptions {
                        root,
                        config: self.config,
                        json: self.json,
                        quiet: self.quiet,
                    })
                }
                CacheCommands::Explore { folder_id } => {
                    folders::run_cache_explore(folders::CacheExploreOptions {
                        folder_id,
                        config: self.config,
                        json: self.json,
                        quiet: self.quiet,
                    })
                }
                CacheCommands::Show => folders::run_cache_show(folders::CacheShowOptions {
                    config: self.config,
                    json: self.json,
                    quiet: self.quiet,
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_names_follow_subcommands() {
        let cli = Cli::parse_from(["lixian", "--config", "tasks", "cache", "explore", "100"]);
        assert_eq!(cli.command.name(), "cache explore");
        assert_eq!(cli.config.as_deref(), Some(Path::new("tasks")));

        let cli = Cli::parse_from(["lixian", "--json", "add-many", "--folder", "7", "magnet:?xt=1"]);
        assert_eq!(cli.command.name(), "add-many");
        assert!(cli.json);
    }
}
