//! Queue command implementation.
//!
//! Handles inspection and maintenance of the outbound operation queue.

use colored::Colorize;

use super::open_queue;
use crate::cli::args::{OutputFormat, QueueCommands};
use crate::config::Config;
use crate::error::SyncError;
use crate::features::sync::{OperationStatus, SyncQueue};
use crate::output::{format_operations, to_json};
use crate::storage::Database;

/// Execute queue subcommands.
///
/// # Errors
///
/// Returns an error if the status filter is unknown or a database call fails.
pub fn queue(
    db: &Database,
    config: &Config,
    cmd: QueueCommands,
    format: OutputFormat,
) -> Result<String, SyncError> {
    let queue = open_queue(db, config);

    match cmd {
        QueueCommands::List { status, limit } => list_operations(&queue, status.as_deref(), limit, format),
        QueueCommands::RetryDead => {
            let moved = queue.retry_all_dead_letter()?;
            report("requeued", moved, "dead-lettered operation", format)
        }
        QueueCommands::ClearCompleted => {
            let purged = queue.clear_completed()?;
            report("cleared", purged, "completed operation", format)
        }
        QueueCommands::Recover => {
            let recovered = queue.recover_in_flight()?;
            report("recovered", recovered, "in-flight operation", format)
        }
    }
}

fn list_operations(
    queue: &SyncQueue,
    status: Option<&str>,
    limit: usize,
    format: OutputFormat,
) -> Result<String, SyncError> {
    let status = status.map(str::parse::<OperationStatus>).transpose()?;
    let operations = queue.list_by_status(status, limit)?;
    format_operations(&operations, format)
}

fn report(verb: &str, count: usize, noun: &str, format: OutputFormat) -> Result<String, SyncError> {
    match format {
        OutputFormat::Json => to_json(&serde_json::json!({ verb: count })),
        OutputFormat::Pretty => {
            let plural = if count == 1 { "" } else { "s" };
            let line = format!("{} {count} {noun}{plural}", capitalize(verb));
            Ok(if count > 0 {
                line.green().to_string()
            } else {
                line.dimmed().to_string()
            })
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}
