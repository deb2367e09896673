//! Output formatting for commentsync.
//!
//! This module provides formatters for displaying sync state in various formats.

mod json;
mod pretty;

use chrono::Utc;

use crate::cli::args::OutputFormat;
use crate::error::SyncError;
use crate::features::engine::ConflictRecord;
use crate::features::sync::{QueueStats, SyncOperation};
use crate::models::SyncMetadata;

pub use json::*;
pub use pretty::*;

/// Format queue counts and scope summaries based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_status(
    stats: &QueueStats,
    scopes: &[SyncMetadata],
    format: OutputFormat,
) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_status_pretty(stats, scopes, Utc::now())),
        OutputFormat::Json => format_status_json(stats, scopes),
    }
}

/// Format queued operations based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_operations(
    operations: &[SyncOperation],
    format: OutputFormat,
) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_operations_pretty(operations)),
        OutputFormat::Json => format_operations_json(operations),
    }
}

/// Format scope metadata based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_scopes(scopes: &[SyncMetadata], format: OutputFormat) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_scopes_pretty(scopes)),
        OutputFormat::Json => format_scopes_json(scopes),
    }
}

/// Format conflicts based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_conflicts(
    conflicts: &[ConflictRecord],
    format: OutputFormat,
) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_conflicts_pretty(conflicts)),
        OutputFormat::Json => format_conflicts_json(conflicts),
    }
}
