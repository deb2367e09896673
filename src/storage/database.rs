//! `SQLite` database connection.
//!
//! The database is stored at `~/.commentsync/commentsync.db` and holds the
//! three durable sync collections plus the built-in local entity store:
//! - Operation queue
//! - Per-entity sync metadata
//! - Per-scope sync metadata
//! - Local entity records
//!
//! The handle is cheap to clone; every clone shares one connection behind a
//! mutex. Callers lock for the duration of a statement and never across an
//! `.await`.

use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::config::Paths;
use crate::error::SyncError;

use super::migrations;

/// Shared database connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Open the database at the default location.
    ///
    /// Creates the database file and runs migrations if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub fn open() -> Result<Self, SyncError> {
        let paths = Paths::new()?;
        paths.ensure_dirs()?;
        Self::open_at(&paths.database)
    }

    /// Open the database at a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub fn open_at(path: &std::path::Path) -> Result<Self, SyncError> {
        let conn = Connection::open(path).map_err(|e| {
            SyncError::Database(format!("Failed to open database {}: {e}", path.display()))
        })?;

        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(|e| SyncError::Database(format!("Failed to enable WAL: {e}")))?;

        Self::from_connection(conn)
    }

    /// Open an in-memory database (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub fn open_in_memory() -> Result<Self, SyncError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            SyncError::Database(format!("Failed to open in-memory database: {e}"))
        })?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, SyncError> {
        migrations::run(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Get the current schema version.
    ///
    /// # Errors
    ///
    /// Returns an error if the version cannot be read.
    pub fn schema_version(&self) -> Result<i32, SyncError> {
        migrations::get_version(&*self.connection()?)
    }

    /// Lock the underlying connection.
    ///
    /// # Errors
    ///
    /// Returns an error if a previous holder panicked while holding the lock.
    pub fn connection(&self) -> Result<MutexGuard<'_, Connection>, SyncError> {
        self.conn
            .lock()
            .map_err(|_| SyncError::Database("database lock poisoned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.schema_version().unwrap() > 0);
    }

    #[test]
    fn test_open_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let db = Database::open_at(&db_path).unwrap();
        assert!(db.schema_version().unwrap() > 0);
        assert!(db_path.exists());
    }

    #[test]
    fn test_reopen_database() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        {
            let db = Database::open_at(&db_path).unwrap();
            assert!(db.schema_version().unwrap() > 0);
        }

        // Reopen - should not run migrations again
        {
            let db = Database::open_at(&db_path).unwrap();
            assert!(db.schema_version().unwrap() > 0);
        }
    }

    #[test]
    fn test_clones_share_connection() {
        let db = Database::open_in_memory().unwrap();
        let other = db.clone();
        db.connection()
            .unwrap()
            .execute(
                "INSERT INTO local_records (entity_type, entity_id, data, updated_at)
                 VALUES ('comment', 'c1', '{}', '2024-01-01T00:00:00.000000Z')",
                [],
            )
            .unwrap();

        let count: i64 = other
            .connection()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM local_records", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
