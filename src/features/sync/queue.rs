//! Sync queue storage and processing.
//!
//! Provides persistence, intent collapsing and retry scheduling for queued
//! operations.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use super::backoff::Backoff;
use super::operation::{OpType, OperationStatus, SyncOperation};
use crate::config::QueueConfig;
use crate::core::{datetime, Clock, Syncable, SystemClock};
use crate::error::{ErrorClass, RemoteError, SyncError};
use crate::models::{EntitySnapshot, EntityType};
use crate::remote::RemoteWriter;
use crate::storage::Database;

const COLUMNS: &str = "id, op_type, entity_type, entity_id, payload, attempts, next_attempt_at, \
                       last_error, status, created_at, completed_at, priority, first_sent_at";

/// Sends one operation to the remote.
#[async_trait]
pub trait OperationExecutor: Send + Sync {
    async fn execute(&self, operation: &SyncOperation) -> Result<(), RemoteError>;
}

/// Route an operation to the matching writer call. Payloads go out with
/// their local-only fields cleared.
///
/// # Errors
///
/// Returns the writer's error, or `RemoteError::InvalidOperation` for a
/// create or update without a payload.
pub async fn dispatch(writer: &dyn RemoteWriter, operation: &SyncOperation) -> Result<(), RemoteError> {
    let id = operation.entity_id.as_str();
    match (operation.op_type, &operation.payload) {
        (OpType::Create, Some(payload)) => {
            writer
                .create(operation.entity_type, id, &payload.without_local_only())
                .await
        }
        (OpType::Update, Some(payload)) => {
            writer
                .update(operation.entity_type, id, &payload.without_local_only())
                .await
        }
        (OpType::Delete, _) => writer.delete(operation.entity_type, id).await,
        (op_type, None) => Err(RemoteError::InvalidOperation(format!(
            "{op_type} for {id} has no payload"
        ))),
    }
}

/// Executes operations directly against a writer, with no auth handling.
pub struct WriterExecutor<'a>(pub &'a dyn RemoteWriter);

#[async_trait]
impl OperationExecutor for WriterExecutor<'_> {
    async fn execute(&self, operation: &SyncOperation) -> Result<(), RemoteError> {
        dispatch(self.0, operation).await
    }
}

/// What one `process_next` call did, with each operation in its new state.
#[derive(Debug, Default)]
pub struct ProcessReport {
    pub completed: Vec<SyncOperation>,
    pub retrying: Vec<SyncOperation>,
    pub dead_lettered: Vec<SyncOperation>,
}

impl ProcessReport {
    /// Number of operations dispatched.
    #[must_use]
    pub fn dispatched(&self) -> usize {
        self.completed.len() + self.retrying.len() + self.dead_lettered.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dispatched() == 0
    }
}

/// Queue statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub in_progress: usize,
    pub failed: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub dead_letter: usize,
    /// Oldest pending operation timestamp
    pub oldest_pending: Option<DateTime<Utc>>,
}

impl QueueStats {
    /// Pending, in-flight and failed operations.
    #[must_use]
    pub const fn queue_length(&self) -> usize {
        self.pending + self.in_progress + self.failed
    }
}

/// Durable queue of outbound mutation intents.
pub struct SyncQueue {
    db: Database,
    config: QueueConfig,
    backoff: Backoff,
    clock: Arc<dyn Clock>,
}

impl SyncQueue {
    /// Open the queue in the default database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open(config: QueueConfig) -> Result<Self, SyncError> {
        let db = Database::open()?;
        Ok(Self::with_database(db, config, Arc::new(SystemClock)))
    }

    /// Create a sync queue with an existing database connection.
    #[must_use]
    pub fn with_database(db: Database, config: QueueConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            backoff: Backoff::from_config(&config),
            config,
            clock,
        }
    }

    /// Override the retry delay policy.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Add an intent to the queue, collapsing it against earlier pending or
    /// failed intents for the same entity.
    ///
    /// Returns the operation that now represents the intent: a new record, an
    /// earlier record that absorbed it, or a cancelled record if the intent
    /// annulled an unsent create.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidRequest` for a create or update without a
    /// payload, or a database error.
    #[tracing::instrument(skip(self, payload))]
    pub fn enqueue(
        &self,
        op_type: OpType,
        entity_type: EntityType,
        entity_id: &str,
        payload: Option<EntitySnapshot>,
        priority: i32,
    ) -> Result<SyncOperation, SyncError> {
        if op_type.needs_payload() && payload.is_none() {
            return Err(SyncError::InvalidRequest(format!(
                "{op_type} for {entity_type}/{entity_id} needs a payload"
            )));
        }
        let payload = if op_type.needs_payload() { payload } else { None };
        let now = self.clock.now();

        let mut conn = self.db.connection()?;
        let tx = conn.transaction()?;
        let waiting = load_where(
            &tx,
            "entity_type = ?1 AND entity_id = ?2 AND status IN ('pending', 'failed')",
            params![entity_type.as_str(), entity_id],
        )?;

        let result = match op_type {
            OpType::Delete => collapse_delete(&tx, &waiting, entity_type, entity_id, priority, now)?,
            OpType::Update => {
                collapse_update(&tx, waiting.last(), entity_type, entity_id, payload, priority, now)?
            }
            OpType::Create => {
                let op = SyncOperation::new(op_type, entity_type, entity_id, payload, priority, now);
                insert(&tx, &op)?;
                op
            }
        };
        tx.commit()?;

        tracing::debug!(operation_id = %result.id, status = %result.status, "enqueued");
        Ok(result)
    }

    /// Dispatch the next batch of ready operations.
    ///
    /// Only the oldest active operation of each entity is eligible, so one
    /// entity's intents reach the remote in creation order. Eligible heads are
    /// taken in `(priority desc, created_at asc)` order, at most
    /// `max_concurrent` of them and never more than the configured
    /// `max_concurrent_operations`, and run concurrently.
    ///
    /// # Errors
    ///
    /// Returns an error only for local storage failures; remote failures are
    /// recorded on the operations.
    pub async fn process_next(
        &self,
        executor: &dyn OperationExecutor,
        max_concurrent: usize,
    ) -> Result<ProcessReport, SyncError> {
        let limit = max_concurrent.min(self.config.max_concurrent_operations).max(1);
        let batch = self.claim_ready(limit)?;
        if batch.is_empty() {
            return Ok(ProcessReport::default());
        }

        let results = futures::future::join_all(batch.into_iter().map(|op| async move {
            let result = executor.execute(&op).await;
            (op, result)
        }))
        .await;

        let mut report = ProcessReport::default();
        for (op, result) in results {
            let updated = self.record_result(op, result)?;
            match updated.status {
                OperationStatus::Completed => report.completed.push(updated),
                OperationStatus::DeadLetter => report.dead_lettered.push(updated),
                _ => report.retrying.push(updated),
            }
        }
        Ok(report)
    }

    /// Select and mark in-progress the next batch of entity heads.
    fn claim_ready(&self, limit: usize) -> Result<Vec<SyncOperation>, SyncError> {
        let now = self.clock.now();
        let mut conn = self.db.connection()?;
        let tx = conn.transaction()?;

        let active = load_where(
            &tx,
            "status IN ('pending', 'in_progress', 'failed')",
            params![],
        )?;

        let mut seen = HashSet::new();
        let mut heads: Vec<SyncOperation> = active
            .into_iter()
            .filter(|op| seen.insert((op.entity_type, op.entity_id.clone())))
            .filter(|op| op.is_ready(now))
            .collect();
        // Stable sort keeps insertion order as the final tiebreak.
        heads.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        heads.truncate(limit);

        let stamp = datetime::to_storage(now);
        for op in &mut heads {
            tx.execute(
                "UPDATE sync_queue SET status = 'in_progress',
                 first_sent_at = COALESCE(first_sent_at, ?2) WHERE id = ?1",
                params![op.id, stamp],
            )?;
            op.status = OperationStatus::InProgress;
            op.first_sent_at.get_or_insert(now);
            tracing::debug!(operation_id = %op.id, entity_id = %op.entity_id, "dispatching");
        }
        tx.commit()?;
        Ok(heads)
    }

    /// Apply the outcome of one dispatch.
    fn record_result(
        &self,
        mut op: SyncOperation,
        result: Result<(), RemoteError>,
    ) -> Result<SyncOperation, SyncError> {
        let now = self.clock.now();
        match result {
            Ok(()) => {
                op.status = OperationStatus::Completed;
                op.completed_at = Some(now);
                op.last_error = None;
                op.next_attempt_at = None;
                tracing::debug!(operation_id = %op.id, "completed");
            }
            Err(err) if err.class() == ErrorClass::NonRetryable => {
                op.attempts = self.config.max_retry_attempts;
                op.status = OperationStatus::DeadLetter;
                op.last_error = Some(err.to_string());
                op.next_attempt_at = None;
                tracing::warn!(operation_id = %op.id, error = %err, "rejected, dead-lettered");
            }
            Err(err) => {
                op.attempts += 1;
                op.last_error = Some(err.to_string());
                if op.attempts >= self.config.max_retry_attempts {
                    op.status = OperationStatus::DeadLetter;
                    op.next_attempt_at = None;
                    tracing::warn!(
                        operation_id = %op.id,
                        attempts = op.attempts,
                        error = %err,
                        "retry budget exhausted, dead-lettered"
                    );
                } else {
                    let mut delay = self.backoff.delay(op.attempts - 1);
                    if let RemoteError::RateLimited {
                        retry_after_secs: Some(secs),
                    } = err
                    {
                        delay = delay.max(chrono::Duration::seconds(
                            i64::try_from(secs).unwrap_or(i64::MAX / 1000),
                        ));
                    }
                    op.status = OperationStatus::Failed;
                    op.next_attempt_at = Some(now + delay);
                    tracing::warn!(
                        operation_id = %op.id,
                        attempts = op.attempts,
                        delay_secs = delay.num_milliseconds() as f64 / 1000.0,
                        error = %err,
                        "scheduling retry"
                    );
                }
            }
        }

        let conn = self.db.connection()?;
        update(&conn, &op)?;
        Ok(op)
    }

    /// Move every dead-lettered operation back to pending with a fresh retry
    /// budget. Returns the count moved.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn retry_all_dead_letter(&self) -> Result<usize, SyncError> {
        let conn = self.db.connection()?;
        let rows = conn
            .execute(
                r"UPDATE sync_queue SET
                  status = 'pending',
                  attempts = 0,
                  next_attempt_at = NULL
                  WHERE status = 'dead_letter'",
                [],
            )
            .map_err(|e| SyncError::Database(format!("Failed to retry dead letters: {e}")))?;

        tracing::info!(count = rows, "dead-lettered operations re-queued");
        Ok(rows)
    }

    /// Purge completed operations. Returns the count purged.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn clear_completed(&self) -> Result<usize, SyncError> {
        let conn = self.db.connection()?;
        let rows = conn
            .execute("DELETE FROM sync_queue WHERE status = 'completed'", [])
            .map_err(|e| SyncError::Database(format!("Failed to clear completed: {e}")))?;
        Ok(rows)
    }

    /// Cancel every waiting operation for one entity, e.g. when a pull
    /// resolution discarded the local edit they carry. In-flight operations
    /// are left alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn cancel_pending_for(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<usize, SyncError> {
        let conn = self.db.connection()?;
        let rows = cancel_where(
            &conn,
            "entity_type = ?2 AND entity_id = ?3 AND status IN ('pending', 'failed')",
            params![
                datetime::to_storage(self.clock.now()),
                entity_type.as_str(),
                entity_id
            ],
        )?;
        if rows > 0 {
            tracing::debug!(entity_id, count = rows, "cancelled pending operations");
        }
        Ok(rows)
    }

    /// Return operations left in progress by an interrupted process to
    /// pending. Delivery is at-least-once, so they will be sent again.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn recover_in_flight(&self) -> Result<usize, SyncError> {
        let conn = self.db.connection()?;
        let rows = conn
            .execute(
                "UPDATE sync_queue SET status = 'pending' WHERE status = 'in_progress'",
                [],
            )
            .map_err(|e| SyncError::Database(format!("Failed to recover operations: {e}")))?;
        if rows > 0 {
            tracing::info!(count = rows, "recovered in-flight operations");
        }
        Ok(rows)
    }

    /// Whether the entity has any pending, in-flight or failed operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn has_active_for(&self, entity_type: EntityType, entity_id: &str) -> Result<bool, SyncError> {
        let conn = self.db.connection()?;
        let count: i64 = conn.query_row(
            r"SELECT COUNT(*) FROM sync_queue
              WHERE entity_type = ?1 AND entity_id = ?2
              AND status IN ('pending', 'in_progress', 'failed')",
            params![entity_type.as_str(), entity_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Get a specific operation by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, id: &str) -> Result<Option<SyncOperation>, SyncError> {
        let conn = self.db.connection()?;
        let raw = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM sync_queue WHERE id = ?1"),
                [id],
                RawOperation::from_row,
            )
            .optional()
            .map_err(|e| SyncError::Database(format!("Failed to query operation: {e}")))?;
        raw.map(RawOperation::decode).transpose()
    }

    /// List operations, optionally filtered by status, in queue order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_by_status(
        &self,
        status: Option<OperationStatus>,
        limit: usize,
    ) -> Result<Vec<SyncOperation>, SyncError> {
        let conn = self.db.connection()?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        match status {
            Some(status) => load_where(
                &conn,
                "status = ?1 ORDER BY priority DESC, created_at ASC, seq ASC LIMIT ?2",
                params![status.as_str(), limit],
            ),
            None => load_where(
                &conn,
                "1 = 1 ORDER BY priority DESC, created_at ASC, seq ASC LIMIT ?1",
                params![limit],
            ),
        }
    }

    /// Pending, in-flight and failed operations.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn queue_length(&self) -> Result<usize, SyncError> {
        Ok(self.stats()?.queue_length())
    }

    /// Dead-lettered operations awaiting manual retry.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn dead_letter_length(&self) -> Result<usize, SyncError> {
        Ok(self.stats()?.dead_letter)
    }

    /// Get queue statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn stats(&self) -> Result<QueueStats, SyncError> {
        let conn = self.db.connection()?;
        let mut stats = QueueStats::default();

        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM sync_queue GROUP BY status")
            .map_err(|e| SyncError::Database(format!("Failed to prepare query: {e}")))?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (status, count) = row?;
            let count = usize::try_from(count).unwrap_or(0);
            match status.parse::<OperationStatus>() {
                Ok(OperationStatus::Pending) => stats.pending = count,
                Ok(OperationStatus::InProgress) => stats.in_progress = count,
                Ok(OperationStatus::Failed) => stats.failed = count,
                Ok(OperationStatus::Completed) => stats.completed = count,
                Ok(OperationStatus::Cancelled) => stats.cancelled = count,
                Ok(OperationStatus::DeadLetter) => stats.dead_letter = count,
                Err(_) => {
                    return Err(SyncError::LocalCorruption(format!(
                        "unknown queue status: {status}"
                    )))
                }
            }
        }

        let oldest: Option<String> = conn
            .query_row(
                "SELECT MIN(created_at) FROM sync_queue WHERE status = 'pending'",
                [],
                |row| row.get(0),
            )
            .map_err(|e| SyncError::Database(format!("Failed to get oldest pending: {e}")))?;
        stats.oldest_pending = datetime::opt_from_storage(oldest.as_deref())?;

        Ok(stats)
    }
}

/// Delete intent: annul an unsent create, or supersede waiting updates.
fn collapse_delete(
    conn: &Connection,
    waiting: &[SyncOperation],
    entity_type: EntityType,
    entity_id: &str,
    priority: i32,
    now: DateTime<Utc>,
) -> Result<SyncOperation, SyncError> {
    let stamp = datetime::to_storage(now);
    let mut op = SyncOperation::new(OpType::Delete, entity_type, entity_id, None, priority, now);

    if let Some(create) = waiting.iter().find(|o| o.is_unsent_create()) {
        // The remote never saw the entity: drop the create, everything queued
        // after it, and the delete itself.
        let seq = seq_of(conn, &create.id)?;
        cancel_where(
            conn,
            "entity_type = ?2 AND entity_id = ?3 AND status IN ('pending', 'failed') AND seq >= ?4",
            params![stamp, entity_type.as_str(), entity_id, seq],
        )?;
        op.status = OperationStatus::Cancelled;
        op.completed_at = Some(now);
        insert(conn, &op)?;
        tracing::debug!(entity_id, "delete annulled unsent create");
        return Ok(op);
    }

    cancel_where(
        conn,
        "entity_type = ?2 AND entity_id = ?3 AND status IN ('pending', 'failed') AND op_type = 'update'",
        params![stamp, entity_type.as_str(), entity_id],
    )?;
    insert(conn, &op)?;
    Ok(op)
}

/// Update intent: fold into the latest waiting update or unsent create.
fn collapse_update(
    conn: &Connection,
    last_waiting: Option<&SyncOperation>,
    entity_type: EntityType,
    entity_id: &str,
    payload: Option<EntitySnapshot>,
    priority: i32,
    now: DateTime<Utc>,
) -> Result<SyncOperation, SyncError> {
    if let Some(previous) = last_waiting {
        if previous.op_type == OpType::Update || previous.is_unsent_create() {
            let mut merged = previous.clone();
            merged.payload = payload;
            merged.priority = merged.priority.max(priority);
            update(conn, &merged)?;
            tracing::debug!(operation_id = %merged.id, "coalesced update");
            return Ok(merged);
        }
    }

    let op = SyncOperation::new(OpType::Update, entity_type, entity_id, payload, priority, now);
    insert(conn, &op)?;
    Ok(op)
}

fn seq_of(conn: &Connection, id: &str) -> Result<i64, SyncError> {
    Ok(conn.query_row("SELECT seq FROM sync_queue WHERE id = ?1", [id], |row| {
        row.get(0)
    })?)
}

/// Cancel matching rows. `?1` is bound to the completion timestamp.
fn cancel_where(
    conn: &Connection,
    predicate: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<usize, SyncError> {
    conn.execute(
        &format!(
            "UPDATE sync_queue SET status = 'cancelled', completed_at = ?1, next_attempt_at = NULL
             WHERE {predicate}"
        ),
        params,
    )
    .map_err(|e| SyncError::Database(format!("Failed to cancel operations: {e}")))
}

fn insert(conn: &Connection, op: &SyncOperation) -> Result<(), SyncError> {
    let payload = op.payload.as_ref().map(serde_json::to_string).transpose()?;
    conn.execute(
        &format!(
            "INSERT INTO sync_queue ({COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
        ),
        params![
            op.id,
            op.op_type.as_str(),
            op.entity_type.as_str(),
            op.entity_id,
            payload,
            op.attempts,
            datetime::opt_to_storage(op.next_attempt_at),
            op.last_error,
            op.status.as_str(),
            datetime::to_storage(op.created_at),
            datetime::opt_to_storage(op.completed_at),
            op.priority,
            datetime::opt_to_storage(op.first_sent_at),
        ],
    )
    .map_err(|e| SyncError::Database(format!("Failed to enqueue operation: {e}")))?;
    Ok(())
}

fn update(conn: &Connection, op: &SyncOperation) -> Result<(), SyncError> {
    let payload = op.payload.as_ref().map(serde_json::to_string).transpose()?;
    conn.execute(
        r"UPDATE sync_queue SET
          payload = ?1,
          attempts = ?2,
          next_attempt_at = ?3,
          last_error = ?4,
          status = ?5,
          completed_at = ?6,
          priority = ?7,
          first_sent_at = ?8
          WHERE id = ?9",
        params![
            payload,
            op.attempts,
            datetime::opt_to_storage(op.next_attempt_at),
            op.last_error,
            op.status.as_str(),
            datetime::opt_to_storage(op.completed_at),
            op.priority,
            datetime::opt_to_storage(op.first_sent_at),
            op.id,
        ],
    )
    .map_err(|e| SyncError::Database(format!("Failed to update operation: {e}")))?;
    Ok(())
}

/// Load operations matching `predicate`, in insertion order unless the
/// predicate carries its own `ORDER BY`.
fn load_where(
    conn: &Connection,
    predicate: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<SyncOperation>, SyncError> {
    let order = if predicate.contains("ORDER BY") {
        ""
    } else {
        " ORDER BY seq ASC"
    };
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {COLUMNS} FROM sync_queue WHERE {predicate}{order}"
        ))
        .map_err(|e| SyncError::Database(format!("Failed to prepare query: {e}")))?;

    let rows = stmt
        .query_map(params, RawOperation::from_row)
        .map_err(|e| SyncError::Database(format!("Failed to query operations: {e}")))?;

    let mut operations = Vec::new();
    for row in rows {
        operations.push(row?.decode()?);
    }
    Ok(operations)
}

struct RawOperation {
    id: String,
    op_type: String,
    entity_type: String,
    entity_id: String,
    payload: Option<String>,
    attempts: u32,
    next_attempt_at: Option<String>,
    last_error: Option<String>,
    status: String,
    created_at: String,
    completed_at: Option<String>,
    priority: i32,
    first_sent_at: Option<String>,
}

impl RawOperation {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            op_type: row.get(1)?,
            entity_type: row.get(2)?,
            entity_id: row.get(3)?,
            payload: row.get(4)?,
            attempts: row.get(5)?,
            next_attempt_at: row.get(6)?,
            last_error: row.get(7)?,
            status: row.get(8)?,
            created_at: row.get(9)?,
            completed_at: row.get(10)?,
            priority: row.get(11)?,
            first_sent_at: row.get(12)?,
        })
    }

    fn decode(self) -> Result<SyncOperation, SyncError> {
        let corrupt = |e: SyncError| SyncError::LocalCorruption(format!("operation {}: {e}", self.id));
        let payload = self
            .payload
            .as_deref()
            .map(serde_json::from_str::<EntitySnapshot>)
            .transpose()
            .map_err(|e| corrupt(e.into()))?;

        Ok(SyncOperation {
            op_type: self.op_type.parse().map_err(corrupt)?,
            entity_type: self.entity_type.parse()?,
            status: self.status.parse().map_err(corrupt)?,
            payload,
            attempts: self.attempts,
            next_attempt_at: datetime::opt_from_storage(self.next_attempt_at.as_deref())?,
            last_error: self.last_error,
            created_at: datetime::from_storage(&self.created_at)?,
            completed_at: datetime::opt_from_storage(self.completed_at.as_deref())?,
            priority: self.priority,
            first_sent_at: datetime::opt_from_storage(self.first_sent_at.as_deref())?,
            entity_id: self.entity_id,
            id: self.id,
        })
    }
}
