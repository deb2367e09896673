//! JSON output formatting for commentsync.
//!
//! This module provides functions for formatting sync state as JSON.

use serde::Serialize;
use serde_json::json;

use crate::error::SyncError;
use crate::features::engine::ConflictRecord;
use crate::features::sync::{QueueStats, SyncOperation};
use crate::models::SyncMetadata;

/// Format queue statistics and scope metadata as JSON
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_status_json(stats: &QueueStats, scopes: &[SyncMetadata]) -> Result<String, SyncError> {
    let output = json!({
        "queue": stats,
        "queueLength": stats.queue_length(),
        "deadLetter": stats.dead_letter,
        "scopes": scopes,
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Format queued operations as JSON
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_operations_json(operations: &[SyncOperation]) -> Result<String, SyncError> {
    let output = json!({
        "count": operations.len(),
        "items": operations
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Format scope metadata as JSON
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_scopes_json(scopes: &[SyncMetadata]) -> Result<String, SyncError> {
    let output = json!({
        "count": scopes.len(),
        "items": scopes
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Format conflicts as JSON
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_conflicts_json(conflicts: &[ConflictRecord]) -> Result<String, SyncError> {
    let output = json!({
        "count": conflicts.len(),
        "items": conflicts
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Generic JSON formatter for any serializable type
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn to_json<T: Serialize>(value: &T) -> Result<String, SyncError> {
    Ok(serde_json::to_string_pretty(value)?)
}
