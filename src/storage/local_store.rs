//! The local replica of synchronized entities.
//!
//! Reads always come from here; the sync engine writes resolved entities back
//! after every pull.

use std::sync::Arc;

use rusqlite::{params, OptionalExtension};

use super::Database;
use crate::core::{datetime, Clock, SystemClock, Syncable};
use crate::error::SyncError;
use crate::models::{EntitySnapshot, EntityType};

/// Synchronous, durable, single-writer entity store.
pub trait LocalStore: Send + Sync {
    /// Load one entity.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::LocalCorruption` if the stored record cannot be decoded.
    fn get(&self, entity_type: EntityType, id: &str) -> Result<Option<EntitySnapshot>, SyncError>;

    /// Insert or replace an entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn put(&self, entity: &EntitySnapshot) -> Result<(), SyncError>;

    /// Remove an entity. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    fn delete(&self, entity_type: EntityType, id: &str) -> Result<bool, SyncError>;

    /// Load every entity of one type.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::LocalCorruption` if any stored record cannot be decoded.
    fn get_all(&self, entity_type: EntityType) -> Result<Vec<EntitySnapshot>, SyncError>;
}

/// [`LocalStore`] backed by the `local_records` table.
pub struct SqliteLocalStore {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl SqliteLocalStore {
    /// Create a store on an existing database connection.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self::with_clock(db, Arc::new(SystemClock))
    }

    /// Create a store that stamps writes with `clock`.
    #[must_use]
    pub fn with_clock(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }
}

fn decode(entity_type: EntityType, id: &str, data: &str) -> Result<EntitySnapshot, SyncError> {
    serde_json::from_str(data).map_err(|e| {
        SyncError::LocalCorruption(format!("local record {entity_type}/{id}: {e}"))
    })
}

impl LocalStore for SqliteLocalStore {
    fn get(&self, entity_type: EntityType, id: &str) -> Result<Option<EntitySnapshot>, SyncError> {
        let conn = self.db.connection()?;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM local_records WHERE entity_type = ?1 AND entity_id = ?2",
                params![entity_type.as_str(), id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| SyncError::Database(format!("Failed to load local record: {e}")))?;

        data.map(|d| decode(entity_type, id, &d)).transpose()
    }

    fn put(&self, entity: &EntitySnapshot) -> Result<(), SyncError> {
        let data = serde_json::to_string(entity)?;
        let conn = self.db.connection()?;
        conn.execute(
            r"INSERT INTO local_records (entity_type, entity_id, data, updated_at)
              VALUES (?1, ?2, ?3, ?4)
              ON CONFLICT(entity_type, entity_id)
              DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
            params![
                entity.entity_type().as_str(),
                entity.entity_id(),
                data,
                datetime::to_storage(self.clock.now()),
            ],
        )
        .map_err(|e| SyncError::Database(format!("Failed to save local record: {e}")))?;
        Ok(())
    }

    fn delete(&self, entity_type: EntityType, id: &str) -> Result<bool, SyncError> {
        let conn = self.db.connection()?;
        let rows = conn
            .execute(
                "DELETE FROM local_records WHERE entity_type = ?1 AND entity_id = ?2",
                params![entity_type.as_str(), id],
            )
            .map_err(|e| SyncError::Database(format!("Failed to delete local record: {e}")))?;
        Ok(rows > 0)
    }

    fn get_all(&self, entity_type: EntityType) -> Result<Vec<EntitySnapshot>, SyncError> {
        let conn = self.db.connection()?;
        let mut stmt = conn
            .prepare(
                r"SELECT entity_id, data FROM local_records
                  WHERE entity_type = ?1
                  ORDER BY entity_id ASC",
            )
            .map_err(|e| SyncError::Database(format!("Failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map([entity_type.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| SyncError::Database(format!("Failed to query local records: {e}")))?;

        let mut entities = Vec::new();
        for row in rows {
            let (id, data) = row?;
            entities.push(decode(entity_type, &id, &data)?);
        }
        Ok(entities)
    }
}
