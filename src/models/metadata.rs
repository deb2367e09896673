//! Sync bookkeeping records: one per entity, one per pull scope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EntityType;

/// Version of the persisted sync record format. Scope records written by an
/// older version are re-fetched in full on the next pull.
pub const SCHEMA_VERSION: i32 = 1;

/// Per-entity sync metadata.
///
/// `modified_after_last_sync` is true exactly when a local write happened
/// after `last_synced_at` and has not yet been pushed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncableEntity {
    pub entity_type: EntityType,
    pub entity_id: String,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub local_updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub remote_updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
    #[serde(default = "default_version")]
    pub version: u64,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub modified_after_last_sync: bool,
    /// Diagnostic blob from the last resolution that needed attention.
    #[serde(default)]
    pub conflict_data: Option<String>,
}

const fn default_version() -> u64 {
    1
}

impl SyncableEntity {
    /// Metadata for an entity the replica has never synced.
    #[must_use]
    pub fn new(entity_type: EntityType, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
            etag: None,
            local_updated_at: None,
            remote_updated_at: None,
            last_synced_at: None,
            version: default_version(),
            deleted: false,
            modified_after_last_sync: false,
            conflict_data: None,
        }
    }

    /// Record a local write.
    pub fn mark_local_edit(&mut self, now: DateTime<Utc>) {
        if self.local_updated_at.is_some() || self.last_synced_at.is_some() {
            self.version += 1;
        }
        self.local_updated_at = Some(now);
        self.modified_after_last_sync = true;
    }

    /// Record a local delete (tombstone).
    pub fn mark_deleted(&mut self, now: DateTime<Utc>) {
        self.mark_local_edit(now);
        self.deleted = true;
    }

    /// Record that local and remote agree as of `now`.
    pub fn mark_synced(&mut self, now: DateTime<Utc>) {
        self.last_synced_at = Some(now);
        self.modified_after_last_sync = false;
    }
}

/// Per-scope pull cursor and counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    pub key: String,
    #[serde(default)]
    pub last_sync_token: Option<String>,
    #[serde(default)]
    pub last_full_sync_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_incremental_sync_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub sync_count: u64,
    #[serde(default)]
    pub failed_sync_count: u64,
    #[serde(default)]
    pub items_synced: u64,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub last_error_time: Option<DateTime<Utc>>,
    #[serde(default = "default_schema_version")]
    pub schema_version: i32,
    #[serde(default)]
    pub migration_completed: bool,
}

const fn default_schema_version() -> i32 {
    SCHEMA_VERSION
}

impl SyncMetadata {
    /// A fresh record for a scope that has never been pulled.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            last_sync_token: None,
            last_full_sync_time: None,
            last_incremental_sync_time: None,
            etag: None,
            sync_count: 0,
            failed_sync_count: 0,
            items_synced: 0,
            last_error: None,
            last_error_time: None,
            schema_version: SCHEMA_VERSION,
            migration_completed: false,
        }
    }

    /// True if the record predates the current format and needs a full pull.
    #[must_use]
    pub const fn needs_migration(&self) -> bool {
        self.schema_version < SCHEMA_VERSION
    }

    /// Watermark for the next incremental pull.
    #[must_use]
    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        self.last_incremental_sync_time.or(self.last_full_sync_time)
    }

    /// Record a failed pull.
    pub fn record_failure(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.failed_sync_count += 1;
        self.last_error = Some(error.into());
        self.last_error_time = Some(now);
    }
}
