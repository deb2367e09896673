//! Engine state broadcast to observers, and the outcome of a sync pass.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Coarse engine state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Idle,
    Syncing,
    Error,
    Offline,
    UpToDate,
}

impl SyncState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::Error => "error",
            Self::Offline => "offline",
            Self::UpToDate => "up_to_date",
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot published on every state transition and queue-count change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub state: SyncState,
    /// Progress of the running pass in `[0, 1]`.
    pub progress: f64,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Pending, in-flight and failed queue operations.
    pub pending_operations: usize,
    /// Failed and dead-lettered queue operations.
    pub failed_operations: usize,
}

/// Result of one sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    /// No hard error and every scope pulled.
    pub success: bool,
    /// The pass never ran (offline, or another pass was running).
    pub skipped: bool,
    /// Operations acknowledged by the remote
    pub items_pushed: usize,
    /// Remote items applied to the replica
    pub items_pulled: usize,
    /// Pulled items whose resolution found a conflict
    pub conflicts: usize,
    /// Dispatched operations that failed and will retry or were dead-lettered
    pub failed_pushes: usize,
    /// First error of the pass
    pub error: Option<String>,
}

impl SyncResult {
    /// A pass that did not run.
    #[must_use]
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            skipped: true,
            error: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Record an error, keeping the first one.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.success = false;
        if self.error.is_none() {
            self.error = Some(error.into());
        }
    }
}
