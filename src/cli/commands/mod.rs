//! Command implementations for commentsync.
//!
//! This module contains the implementation of all CLI commands. Every command
//! returns the rendered output; `main` prints it.

mod config;
mod queue;
mod scopes;

pub use config::config;
pub use queue::queue;
pub use scopes::scopes;

use std::sync::Arc;

use clap::CommandFactory;
use clap_complete::Shell;

use crate::cli::args::{Cli, OutputFormat};
use crate::config::Config;
use crate::core::SystemClock;
use crate::error::SyncError;
use crate::features::engine::ConflictRecord;
use crate::features::sync::SyncQueue;
use crate::output::{format_conflicts, format_status};
use crate::storage::{Database, EntityMetaStore, ScopeMetaStore};

/// Open the queue on `db` with the configured retry policy.
fn open_queue(db: &Database, config: &Config) -> SyncQueue {
    SyncQueue::with_database(db.clone(), config.queue.clone(), Arc::new(SystemClock))
}

/// Execute status command
///
/// # Errors
///
/// Returns an error if the database query fails or output formatting fails.
pub fn status(db: &Database, config: &Config, format: OutputFormat) -> Result<String, SyncError> {
    let stats = open_queue(db, config).stats()?;
    let scopes = ScopeMetaStore::new(db.clone()).list()?;
    format_status(&stats, &scopes, format)
}

/// Execute conflicts command
///
/// # Errors
///
/// Returns an error if a stored conflict record cannot be read.
pub fn conflicts(db: &Database, format: OutputFormat) -> Result<String, SyncError> {
    let records = EntityMetaStore::new(db.clone())
        .list_conflicts()?
        .into_iter()
        .filter_map(|meta| meta.conflict_data)
        .map(|data| ConflictRecord::from_stored(&data))
        .collect::<Result<Vec<_>, _>>()?;
    format_conflicts(&records, format)
}

/// Generate a completion script for `shell`.
///
/// # Errors
///
/// Returns an error if the generated script is not valid UTF-8.
pub fn completions(shell: Shell) -> Result<String, SyncError> {
    let mut cmd = Cli::command();
    let mut buf = Vec::new();
    clap_complete::generate(shell, &mut cmd, "commentsync", &mut buf);
    String::from_utf8(buf).map_err(|e| SyncError::InvalidRequest(format!("UTF-8 error: {e}")))
}
