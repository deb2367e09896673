//! Persistence for per-scope pull metadata.

use rusqlite::{params, OptionalExtension, Row};

use super::Database;
use crate::core::datetime;
use crate::error::SyncError;
use crate::models::SyncMetadata;

const COLUMNS: &str = "key, last_sync_token, last_full_sync_time, last_incremental_sync_time, \
                       etag, sync_count, failed_sync_count, items_synced, last_error, \
                       last_error_time, schema_version, migration_completed";

/// Store for [`SyncMetadata`] records, keyed by scope key.
#[derive(Debug, Clone)]
pub struct ScopeMetaStore {
    db: Database,
}

impl ScopeMetaStore {
    /// Create a store on an existing database connection.
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Load one scope record.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the record is corrupt.
    pub fn get(&self, key: &str) -> Result<Option<SyncMetadata>, SyncError> {
        let conn = self.db.connection()?;
        let raw = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM sync_metadata WHERE key = ?1"),
                [key],
                RawScope::from_row,
            )
            .optional()
            .map_err(|e| SyncError::Database(format!("Failed to load scope metadata: {e}")))?;

        raw.map(RawScope::decode).transpose()
    }

    /// Insert or replace a scope record.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn upsert(&self, meta: &SyncMetadata) -> Result<(), SyncError> {
        let conn = self.db.connection()?;
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO sync_metadata ({COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            ),
            params![
                meta.key,
                meta.last_sync_token,
                datetime::opt_to_storage(meta.last_full_sync_time),
                datetime::opt_to_storage(meta.last_incremental_sync_time),
                meta.etag,
                to_i64(meta.sync_count),
                to_i64(meta.failed_sync_count),
                to_i64(meta.items_synced),
                meta.last_error,
                datetime::opt_to_storage(meta.last_error_time),
                meta.schema_version,
                meta.migration_completed,
            ],
        )
        .map_err(|e| SyncError::Database(format!("Failed to save scope metadata: {e}")))?;
        Ok(())
    }

    /// All scope records, ordered by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a record is corrupt.
    pub fn list(&self) -> Result<Vec<SyncMetadata>, SyncError> {
        let conn = self.db.connection()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {COLUMNS} FROM sync_metadata ORDER BY key ASC"))
            .map_err(|e| SyncError::Database(format!("Failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map([], RawScope::from_row)
            .map_err(|e| SyncError::Database(format!("Failed to query scope metadata: {e}")))?;

        let mut scopes = Vec::new();
        for row in rows {
            scopes.push(row?.decode()?);
        }
        Ok(scopes)
    }

    /// Delete a scope record outright. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn reset(&self, key: &str) -> Result<bool, SyncError> {
        let conn = self.db.connection()?;
        let rows = conn
            .execute("DELETE FROM sync_metadata WHERE key = ?1", [key])
            .map_err(|e| SyncError::Database(format!("Failed to reset scope metadata: {e}")))?;
        Ok(rows > 0)
    }

    /// Drop every scope's validation token, continuation cursor and
    /// watermarks so the next pull re-fetches everything. Counters are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn clear_cursors(&self) -> Result<usize, SyncError> {
        let conn = self.db.connection()?;
        let rows = conn
            .execute(
                r"UPDATE sync_metadata SET
                  etag = NULL,
                  last_sync_token = NULL,
                  last_full_sync_time = NULL,
                  last_incremental_sync_time = NULL",
                [],
            )
            .map_err(|e| SyncError::Database(format!("Failed to clear scope cursors: {e}")))?;
        Ok(rows)
    }
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn to_u64(field: &str, n: i64) -> Result<u64, SyncError> {
    u64::try_from(n).map_err(|_| SyncError::LocalCorruption(format!("negative {field}: {n}")))
}

struct RawScope {
    key: String,
    last_sync_token: Option<String>,
    last_full_sync_time: Option<String>,
    last_incremental_sync_time: Option<String>,
    etag: Option<String>,
    sync_count: i64,
    failed_sync_count: i64,
    items_synced: i64,
    last_error: Option<String>,
    last_error_time: Option<String>,
    schema_version: i32,
    migration_completed: bool,
}

impl RawScope {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            key: row.get(0)?,
            last_sync_token: row.get(1)?,
            last_full_sync_time: row.get(2)?,
            last_incremental_sync_time: row.get(3)?,
            etag: row.get(4)?,
            sync_count: row.get(5)?,
            failed_sync_count: row.get(6)?,
            items_synced: row.get(7)?,
            last_error: row.get(8)?,
            last_error_time: row.get(9)?,
            schema_version: row.get(10)?,
            migration_completed: row.get(11)?,
        })
    }

    fn decode(self) -> Result<SyncMetadata, SyncError> {
        Ok(SyncMetadata {
            key: self.key,
            last_sync_token: self.last_sync_token,
            last_full_sync_time: datetime::opt_from_storage(self.last_full_sync_time.as_deref())?,
            last_incremental_sync_time: datetime::opt_from_storage(
                self.last_incremental_sync_time.as_deref(),
            )?,
            etag: self.etag,
            sync_count: to_u64("sync_count", self.sync_count)?,
            failed_sync_count: to_u64("failed_sync_count", self.failed_sync_count)?,
            items_synced: to_u64("items_synced", self.items_synced)?,
            last_error: self.last_error,
            last_error_time: datetime::opt_from_storage(self.last_error_time.as_deref())?,
            schema_version: self.schema_version,
            migration_completed: self.migration_completed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn create_test_store() -> ScopeMetaStore {
        ScopeMetaStore::new(Database::open_in_memory().unwrap())
    }

    fn populated(key: &str) -> SyncMetadata {
        let mut meta = SyncMetadata::new(key);
        meta.etag = Some("etag-1".to_string());
        meta.last_sync_token = Some("page-2".to_string());
        meta.last_full_sync_time = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        meta.last_incremental_sync_time = Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
        meta.sync_count = 3;
        meta.items_synced = 42;
        meta
    }

    #[test]
    fn test_upsert_and_get() {
        let store = create_test_store();
        let meta = populated("channel:UC1");
        store.upsert(&meta).unwrap();

        assert_eq!(store.get("channel:UC1").unwrap(), Some(meta));
        assert!(store.get("channel:other").unwrap().is_none());
    }

    #[test]
    fn test_list_sorted() {
        let store = create_test_store();
        store.upsert(&SyncMetadata::new("video:b")).unwrap();
        store.upsert(&SyncMetadata::new("channel:a")).unwrap();

        let keys: Vec<_> = store.list().unwrap().into_iter().map(|m| m.key).collect();
        assert_eq!(keys, vec!["channel:a", "video:b"]);
    }

    #[test]
    fn test_clear_cursors_keeps_counters() {
        let store = create_test_store();
        store.upsert(&populated("channel:UC1")).unwrap();

        assert_eq!(store.clear_cursors().unwrap(), 1);

        let meta = store.get("channel:UC1").unwrap().unwrap();
        assert_eq!(meta.etag, None);
        assert_eq!(meta.last_sync_token, None);
        assert_eq!(meta.watermark(), None);
        assert_eq!(meta.sync_count, 3);
        assert_eq!(meta.items_synced, 42);
    }

    #[test]
    fn test_reset() {
        let store = create_test_store();
        store.upsert(&populated("channel:UC1")).unwrap();

        assert!(store.reset("channel:UC1").unwrap());
        assert!(!store.reset("channel:UC1").unwrap());
        assert!(store.list().unwrap().is_empty());
    }
}
