//! lixian - offline download task ledger
//!
//! The 115 offline-download service reports live task state but forgets when
//! a task was added, where its output went, how large it originally was and
//! when it finished. This crate keeps those facts in a durable local ledger
//! and reconciles them against each live listing.
//!
//! # Module Organization
//!
//! - `cli`: Command-line interface using clap
//! - `config`: Configuration loading from TOML plus environment overrides
//! - `error`: Error types, exit codes and result alias
//! - `gateway`: Traits for the remote task service and file namespace
//! - `integrations`: The 115 HTTP implementation of those traits
//! - `ledger`: Durable per-task records with field-level merge rules
//! - `namespace`: Folder id to path cache filled by bounded tree walks
//! - `reconcile`: Merges live listings with the ledger; add and delete flows
//! - `storage`: Data directory and JSON file access
//! - `lock`: File locking and atomic writes
//! - `output`: JSON envelope and human-readable output

pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod integrations;
pub mod ledger;
pub mod lock;
pub mod namespace;
pub mod output;
pub mod reconcile;
pub mod storage;

pub use error::{Error, Result};
