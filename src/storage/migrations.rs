//! Database migrations for commentsync.
//!
//! Each migration is a function that upgrades the schema by one version.
//! Migrations are run automatically when the database is opened.

use rusqlite::Connection;

use crate::error::SyncError;

/// Current schema version. Also stamped into every `SyncMetadata` record.
pub const CURRENT_VERSION: i32 = 2;

/// Get the current schema version from the database.
///
/// Returns 0 if no version has been set (new database).
pub fn get_version(conn: &Connection) -> Result<i32, SyncError> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| SyncError::Database(format!("Failed to get schema version: {e}")))?;

    Ok(version)
}

/// Set the schema version in the database.
fn set_version(conn: &Connection, version: i32) -> Result<(), SyncError> {
    conn.execute_batch(&format!("PRAGMA user_version = {version};"))
        .map_err(|e| SyncError::Database(format!("Failed to set schema version: {e}")))
}

/// Run all pending migrations.
pub fn run(conn: &Connection) -> Result<(), SyncError> {
    let current = get_version(conn)?;

    if current >= CURRENT_VERSION {
        return Ok(());
    }

    for version in (current + 1)..=CURRENT_VERSION {
        tracing::debug!(version, "running migration");
        run_migration(conn, version)?;
        set_version(conn, version)?;
    }

    Ok(())
}

fn run_migration(conn: &Connection, version: i32) -> Result<(), SyncError> {
    match version {
        1 => migrate_v1(conn),
        2 => migrate_v2(conn),
        _ => Err(SyncError::Database(format!(
            "Unknown migration version: {version}"
        ))),
    }
}

/// Migration v1: Initial schema.
///
/// Creates tables for:
/// - `sync_queue`: Outbound mutation intents
/// - `sync_entities`: Per-entity sync metadata
/// - `sync_metadata`: Per-scope pull cursors and counters
/// - `local_records`: Built-in local entity store
fn migrate_v1(conn: &Connection) -> Result<(), SyncError> {
    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS sync_queue (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            op_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            payload TEXT,
            attempts INTEGER NOT NULL DEFAULT 0,
            next_attempt_at TEXT,
            last_error TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL,
            completed_at TEXT,
            priority INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_sync_queue_status
        ON sync_queue(status);

        CREATE INDEX IF NOT EXISTS idx_sync_queue_entity
        ON sync_queue(entity_type, entity_id);

        CREATE TABLE IF NOT EXISTS sync_entities (
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            etag TEXT,
            local_updated_at TEXT,
            remote_updated_at TEXT,
            last_synced_at TEXT,
            version INTEGER NOT NULL DEFAULT 1,
            deleted INTEGER NOT NULL DEFAULT 0,
            modified_after_last_sync INTEGER NOT NULL DEFAULT 0,
            conflict_data TEXT,
            PRIMARY KEY (entity_type, entity_id)
        );

        CREATE TABLE IF NOT EXISTS sync_metadata (
            key TEXT PRIMARY KEY,
            last_sync_token TEXT,
            last_full_sync_time TEXT,
            last_incremental_sync_time TEXT,
            etag TEXT,
            sync_count INTEGER NOT NULL DEFAULT 0,
            failed_sync_count INTEGER NOT NULL DEFAULT 0,
            items_synced INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            last_error_time TEXT,
            schema_version INTEGER NOT NULL DEFAULT 1,
            migration_completed INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS local_records (
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (entity_type, entity_id)
        );
        ",
    )
    .map_err(|e| SyncError::Database(format!("Migration v1 failed: {e}")))
}

/// Migration v2: record when a queued operation was first dispatched.
///
/// Rows that already show an attempt or left the pending state are taken as
/// dispatched.
fn migrate_v2(conn: &Connection) -> Result<(), SyncError> {
    conn.execute_batch(
        r"
        ALTER TABLE sync_queue ADD COLUMN first_sent_at TEXT;

        UPDATE sync_queue SET first_sent_at = created_at
        WHERE attempts > 0 OR status NOT IN ('pending', 'cancelled');
        ",
    )
    .map_err(|e| SyncError::Database(format!("Migration v2 failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_v1() {
        let conn = Connection::open_in_memory().unwrap();

        run(&conn).unwrap();
        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);

        conn.execute(
            "INSERT INTO sync_queue (id, op_type, entity_type, entity_id, created_at)
             VALUES ('op-1', 'create', 'comment', 'c1', '2024-01-01T10:00:00.000000Z')",
            [],
        )
        .unwrap();

        conn.execute(
            "INSERT INTO sync_entities (entity_type, entity_id) VALUES ('comment', 'c1')",
            [],
        )
        .unwrap();

        conn.execute("INSERT INTO sync_metadata (key) VALUES ('channel:UC1')", [])
            .unwrap();
    }

    #[test]
    fn test_migration_v2_marks_dispatched_rows() {
        let conn = Connection::open_in_memory().unwrap();
        migrate_v1(&conn).unwrap();
        set_version(&conn, 1).unwrap();
        conn.execute_batch(
            "INSERT INTO sync_queue (id, op_type, entity_type, entity_id, created_at)
             VALUES ('fresh', 'create', 'comment', 'c1', '2024-01-01T10:00:00.000000Z');
             INSERT INTO sync_queue (id, op_type, entity_type, entity_id, attempts, status, created_at)
             VALUES ('retried', 'create', 'comment', 'c2', 2, 'failed', '2024-01-01T10:00:00.000000Z');",
        )
        .unwrap();

        run(&conn).unwrap();
        assert_eq!(get_version(&conn).unwrap(), 2);

        let sent = |id: &str| -> Option<String> {
            conn.query_row("SELECT first_sent_at FROM sync_queue WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .unwrap()
        };
        assert_eq!(sent("fresh"), None);
        assert_eq!(sent("retried").as_deref(), Some("2024-01-01T10:00:00.000000Z"));
    }

    #[test]
    fn test_migration_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        run(&conn).unwrap();
        run(&conn).unwrap();

        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_get_version_new_database() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(get_version(&conn).unwrap(), 0);
    }
}
