//! Persistence for per-entity sync metadata.

use rusqlite::{params, OptionalExtension, Row};

use super::Database;
use crate::core::datetime;
use crate::error::SyncError;
use crate::models::{EntityType, SyncableEntity};

const COLUMNS: &str = "entity_type, entity_id, etag, local_updated_at, remote_updated_at, \
                       last_synced_at, version, deleted, modified_after_last_sync, conflict_data";

/// Store for [`SyncableEntity`] records, keyed by `(entity_type, entity_id)`.
#[derive(Debug, Clone)]
pub struct EntityMetaStore {
    db: Database,
}

impl EntityMetaStore {
    /// Create a store on an existing database connection.
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Load the metadata for one entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the record is corrupt.
    pub fn get(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Option<SyncableEntity>, SyncError> {
        let conn = self.db.connection()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM sync_entities WHERE entity_type = ?1 AND entity_id = ?2"
                ),
                params![entity_type.as_str(), entity_id],
                RawEntity::from_row,
            )
            .optional()
            .map_err(|e| SyncError::Database(format!("Failed to load entity metadata: {e}")))?;

        raw.map(RawEntity::decode).transpose()
    }

    /// Load the metadata for one entity, or a fresh record if none exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the record is corrupt.
    pub fn get_or_new(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<SyncableEntity, SyncError> {
        Ok(self
            .get(entity_type, entity_id)?
            .unwrap_or_else(|| SyncableEntity::new(entity_type, entity_id)))
    }

    /// Insert or replace a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn upsert(&self, meta: &SyncableEntity) -> Result<(), SyncError> {
        let conn = self.db.connection()?;
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO sync_entities ({COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                meta.entity_type.as_str(),
                meta.entity_id,
                meta.etag,
                datetime::opt_to_storage(meta.local_updated_at),
                datetime::opt_to_storage(meta.remote_updated_at),
                datetime::opt_to_storage(meta.last_synced_at),
                i64::try_from(meta.version).unwrap_or(i64::MAX),
                meta.deleted,
                meta.modified_after_last_sync,
                meta.conflict_data,
            ],
        )
        .map_err(|e| SyncError::Database(format!("Failed to save entity metadata: {e}")))?;
        Ok(())
    }

    /// Remove a record. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete(&self, entity_type: EntityType, entity_id: &str) -> Result<bool, SyncError> {
        let conn = self.db.connection()?;
        let rows = conn
            .execute(
                "DELETE FROM sync_entities WHERE entity_type = ?1 AND entity_id = ?2",
                params![entity_type.as_str(), entity_id],
            )
            .map_err(|e| SyncError::Database(format!("Failed to delete entity metadata: {e}")))?;
        Ok(rows > 0)
    }

    /// Every entity with an unpushed local write.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a record is corrupt.
    pub fn list_dirty(&self) -> Result<Vec<SyncableEntity>, SyncError> {
        self.list_where("modified_after_last_sync = 1")
    }

    /// Every entity whose last resolution left diagnostics behind.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a record is corrupt.
    pub fn list_conflicts(&self) -> Result<Vec<SyncableEntity>, SyncError> {
        self.list_where("conflict_data IS NOT NULL")
    }

    fn list_where(&self, predicate: &str) -> Result<Vec<SyncableEntity>, SyncError> {
        let conn = self.db.connection()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM sync_entities WHERE {predicate}
                 ORDER BY entity_type ASC, entity_id ASC"
            ))
            .map_err(|e| SyncError::Database(format!("Failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map([], RawEntity::from_row)
            .map_err(|e| SyncError::Database(format!("Failed to query entity metadata: {e}")))?;

        let mut entities = Vec::new();
        for row in rows {
            entities.push(row?.decode()?);
        }
        Ok(entities)
    }
}

/// Column values as stored, before timestamp and enum decoding.
struct RawEntity {
    entity_type: String,
    entity_id: String,
    etag: Option<String>,
    local_updated_at: Option<String>,
    remote_updated_at: Option<String>,
    last_synced_at: Option<String>,
    version: i64,
    deleted: bool,
    modified_after_last_sync: bool,
    conflict_data: Option<String>,
}

impl RawEntity {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            entity_type: row.get(0)?,
            entity_id: row.get(1)?,
            etag: row.get(2)?,
            local_updated_at: row.get(3)?,
            remote_updated_at: row.get(4)?,
            last_synced_at: row.get(5)?,
            version: row.get(6)?,
            deleted: row.get(7)?,
            modified_after_last_sync: row.get(8)?,
            conflict_data: row.get(9)?,
        })
    }

    fn decode(self) -> Result<SyncableEntity, SyncError> {
        Ok(SyncableEntity {
            entity_type: self.entity_type.parse()?,
            entity_id: self.entity_id,
            etag: self.etag,
            local_updated_at: datetime::opt_from_storage(self.local_updated_at.as_deref())?,
            remote_updated_at: datetime::opt_from_storage(self.remote_updated_at.as_deref())?,
            last_synced_at: datetime::opt_from_storage(self.last_synced_at.as_deref())?,
            version: u64::try_from(self.version).map_err(|_| {
                SyncError::LocalCorruption(format!("negative version: {}", self.version))
            })?,
            deleted: self.deleted,
            modified_after_last_sync: self.modified_after_last_sync,
            conflict_data: self.conflict_data,
        })
    }
}
