//! Scope metadata command implementation.

use colored::Colorize;

use crate::cli::args::{OutputFormat, ScopesCommands};
use crate::error::SyncError;
use crate::output::{format_scopes, to_json};
use crate::storage::{Database, ScopeMetaStore};

/// Execute scopes subcommands.
///
/// # Errors
///
/// Returns `SyncError::NotFound` when resetting an unknown scope, or a
/// database error.
pub fn scopes(db: &Database, cmd: ScopesCommands, format: OutputFormat) -> Result<String, SyncError> {
    let store = ScopeMetaStore::new(db.clone());

    match cmd {
        ScopesCommands::List => format_scopes(&store.list()?, format),
        ScopesCommands::Reset { key } => {
            if !store.reset(&key)? {
                return Err(SyncError::NotFound(format!("scope {key}")));
            }
            tracing::info!(scope = %key, "scope metadata reset");
            match format {
                OutputFormat::Json => to_json(&serde_json::json!({ "reset": key })),
                OutputFormat::Pretty => Ok(format!(
                    "{} {}\n{}",
                    "Reset".green(),
                    key.bold(),
                    "The next pull of this scope is a full sync.".dimmed()
                )),
            }
        }
    }
}
