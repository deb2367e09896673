//! The sync orchestrator.
//!
//! A pass pushes the queue, then pulls every configured scope and reconciles
//! each remote item against the replica. Only one pass runs at a time; a
//! request that arrives while one is running is skipped, not queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::auth::{AuthExecutor, AuthGate};
use super::status::{SyncResult, SyncState, SyncStatus};
use crate::config::{EngineConfig, QueueConfig};
use crate::core::{Clock, SystemClock, Syncable};
use crate::error::{RemoteError, SyncError};
use crate::features::conflict::{
    resolve, resolve_delete_conflict, ConflictStrategy, ResolutionOutcome, ResolutionResult,
};
use crate::features::delta::{DeltaRequest, DeltaResponse, RemoteDeltaClient, SyncScope};
use crate::features::sync::{Backoff, OpType, OperationStatus, QueueStats, SyncOperation, SyncQueue};
use crate::models::{EntitySnapshot, EntityType, SyncMetadata, SyncableEntity};
use crate::remote::{ConnectivityEvent, RemoteItem, RemoteReader, RemoteWriter, TokenRefresher};
use crate::storage::{Database, EntityMetaStore, LocalStore, ScopeMetaStore, SqliteLocalStore};

const STATUS_CHANNEL_CAPACITY: usize = 64;

/// Both sides of a conflict left for a human, stored in the entity's
/// `conflict_data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub strategy: ConflictStrategy,
    /// The replica's version before the remote was written over it.
    pub local: Option<EntitySnapshot>,
    pub remote: EntitySnapshot,
    pub conflicted_fields: Vec<String>,
    pub detected_at: DateTime<Utc>,
}

impl ConflictRecord {
    /// Decode a record from an entity's `conflict_data`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::LocalCorruption` if the stored JSON is unreadable.
    pub fn from_stored(data: &str) -> Result<Self, SyncError> {
        serde_json::from_str(data)
            .map_err(|e| SyncError::LocalCorruption(format!("Unreadable conflict record: {e}")))
    }
}

/// How to settle a conflict left for manual review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictChoice {
    /// Re-apply the local version and push it.
    KeepLocal,
    /// Keep the remote version already in the replica.
    KeepRemote,
}

/// Items and conflicts from one scope.
#[derive(Debug, Default)]
struct PullTally {
    items: usize,
    conflicts: usize,
}

/// Clears the running flag when a pass ends, however it ends.
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct EngineInner {
    config: EngineConfig,
    queue: SyncQueue,
    entities: EntityMetaStore,
    scopes: ScopeMetaStore,
    local: Arc<dyn LocalStore>,
    delta: RemoteDeltaClient,
    writer: Arc<dyn RemoteWriter>,
    auth: AuthGate,
    clock: Arc<dyn Clock>,
    syncing: AtomicBool,
    online: AtomicBool,
    status: Mutex<SyncStatus>,
    status_tx: broadcast::Sender<SyncStatus>,
}

/// Orchestrates push, pull and status broadcasting. Cheap to clone; clones
/// share one engine.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

/// Assembles a [`SyncEngine`] from its collaborators.
pub struct SyncEngineBuilder {
    db: Database,
    reader: Arc<dyn RemoteReader>,
    writer: Arc<dyn RemoteWriter>,
    local: Option<Arc<dyn LocalStore>>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    clock: Arc<dyn Clock>,
    engine: EngineConfig,
    queue: QueueConfig,
    backoff: Option<Backoff>,
    online: bool,
}

impl SyncEngineBuilder {
    /// Use a caller-supplied replica instead of the SQLite one.
    #[must_use]
    pub fn local_store(mut self, store: Arc<dyn LocalStore>) -> Self {
        self.local = Some(store);
        self
    }

    #[must_use]
    pub fn token_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn engine_config(mut self, config: EngineConfig) -> Self {
        self.engine = config;
        self
    }

    #[must_use]
    pub fn queue_config(mut self, config: QueueConfig) -> Self {
        self.queue = config;
        self
    }

    #[must_use]
    pub const fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Connectivity at startup. Defaults to online.
    #[must_use]
    pub const fn online(mut self, online: bool) -> Self {
        self.online = online;
        self
    }

    /// Validate the configuration, recover operations interrupted by a
    /// previous process and build the engine.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Config` for invalid settings, or a database error.
    pub fn build(self) -> Result<SyncEngine, SyncError> {
        let Self {
            db,
            reader,
            writer,
            local,
            refresher,
            clock,
            engine,
            queue,
            backoff,
            online,
        } = self;

        queue.validate()?;
        engine.validate()?;

        let local = local
            .unwrap_or_else(|| Arc::new(SqliteLocalStore::with_clock(db.clone(), clock.clone())));
        let mut sync_queue = SyncQueue::with_database(db.clone(), queue, clock.clone());
        if let Some(backoff) = backoff {
            sync_queue = sync_queue.with_backoff(backoff);
        }
        sync_queue.recover_in_flight()?;

        let (status_tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        let initial = SyncStatus {
            state: if online {
                SyncState::Idle
            } else {
                SyncState::Offline
            },
            ..SyncStatus::default()
        };

        let engine = SyncEngine {
            inner: Arc::new(EngineInner {
                config: engine,
                queue: sync_queue,
                entities: EntityMetaStore::new(db.clone()),
                scopes: ScopeMetaStore::new(db),
                local,
                delta: RemoteDeltaClient::new(reader, clock.clone()),
                writer,
                auth: AuthGate::new(refresher),
                clock,
                syncing: AtomicBool::new(false),
                online: AtomicBool::new(online),
                status: Mutex::new(initial),
                status_tx,
            }),
        };
        engine.refresh_counts()?;
        Ok(engine)
    }
}

impl SyncEngine {
    /// Start building an engine over `db` with the given remote collaborators.
    #[must_use]
    pub fn builder(
        db: Database,
        reader: Arc<dyn RemoteReader>,
        writer: Arc<dyn RemoteWriter>,
    ) -> SyncEngineBuilder {
        SyncEngineBuilder {
            db,
            reader,
            writer,
            local: None,
            refresher: None,
            clock: Arc::new(SystemClock),
            engine: EngineConfig::default(),
            queue: QueueConfig::default(),
            backoff: None,
            online: true,
        }
    }

    /// A new receiver of status updates. Receivers that fall behind lose the
    /// oldest updates; the engine never waits for them.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncStatus> {
        self.inner.status_tx.subscribe()
    }

    /// The latest published status.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.inner
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn queue(&self) -> &SyncQueue {
        &self.inner.queue
    }

    #[must_use]
    pub fn entities(&self) -> &EntityMetaStore {
        &self.inner.entities
    }

    #[must_use]
    pub fn scopes(&self) -> &ScopeMetaStore {
        &self.inner.scopes
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.inner.syncing.load(Ordering::SeqCst)
    }

    /// Write an entity to the replica, mark it dirty and queue it for push.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidRequest` for `OpType::Delete` (use
    /// [`SyncEngine::delete_local`]), or a storage error.
    #[tracing::instrument(skip(self, snapshot))]
    pub fn save_local(
        &self,
        snapshot: EntitySnapshot,
        op_type: OpType,
    ) -> Result<SyncOperation, SyncError> {
        if op_type == OpType::Delete {
            return Err(SyncError::InvalidRequest(
                "deletes go through delete_local".to_string(),
            ));
        }
        let inner = &self.inner;
        let entity_type = snapshot.entity_type();
        let id = snapshot.entity_id().to_string();

        inner.local.put(&snapshot)?;
        let mut meta = inner.entities.get_or_new(entity_type, &id)?;
        meta.deleted = false;
        meta.mark_local_edit(inner.clock.now());
        inner.entities.upsert(&meta)?;

        let op = inner
            .queue
            .enqueue(op_type, entity_type, &id, Some(snapshot), 0)?;
        debug!(entity_id = %id, version = meta.version, "Saved local edit");
        self.refresh_counts()?;
        Ok(op)
    }

    /// Remove an entity from the replica and queue the delete. Deleting an
    /// entity whose create was never sent leaves no trace.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    #[tracing::instrument(skip(self))]
    pub fn delete_local(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<SyncOperation, SyncError> {
        let inner = &self.inner;
        inner.local.delete(entity_type, entity_id)?;
        let op = inner
            .queue
            .enqueue(OpType::Delete, entity_type, entity_id, None, 0)?;

        if op.status == OperationStatus::Cancelled {
            inner.entities.delete(entity_type, entity_id)?;
        } else {
            let mut meta = inner.entities.get_or_new(entity_type, entity_id)?;
            meta.mark_deleted(inner.clock.now());
            inner.entities.upsert(&meta)?;
        }
        self.refresh_counts()?;
        Ok(op)
    }

    /// Run one push-then-pull pass. Skipped when offline or when a pass is
    /// already running.
    #[tracing::instrument(skip(self))]
    pub async fn sync_now(&self) -> SyncResult {
        let _guard = match self.begin_pass() {
            Ok(guard) => guard,
            Err(skipped) => return skipped,
        };
        self.run_pass(false).await
    }

    /// Forget every validation token and watermark, then run a pass that
    /// re-fetches every scope in full. The recovery path for a suspected
    /// desync or corrupt replica.
    #[tracing::instrument(skip(self))]
    pub async fn force_full_sync(&self) -> SyncResult {
        let _guard = match self.begin_pass() {
            Ok(guard) => guard,
            Err(skipped) => return skipped,
        };
        self.run_pass(true).await
    }

    /// Apply a connectivity change; on reconnect with `sync_on_reconnect`,
    /// run a pass and return its result.
    pub async fn handle_connectivity(&self, event: ConnectivityEvent) -> Option<SyncResult> {
        if self.note_connectivity(event) {
            Some(self.sync_now().await)
        } else {
            None
        }
    }

    /// Move every dead-lettered operation back to pending.
    ///
    /// # Errors
    ///
    /// Returns a database error.
    pub fn retry_all_dead_letter(&self) -> Result<usize, SyncError> {
        let moved = self.inner.queue.retry_all_dead_letter()?;
        self.refresh_counts()?;
        Ok(moved)
    }

    /// Purge completed operations.
    ///
    /// # Errors
    ///
    /// Returns a database error.
    pub fn clear_completed(&self) -> Result<usize, SyncError> {
        let purged = self.inner.queue.clear_completed()?;
        self.refresh_counts()?;
        Ok(purged)
    }

    /// Conflicts waiting for a human decision.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::LocalCorruption` if a stored record cannot be read.
    pub fn pending_conflicts(&self) -> Result<Vec<ConflictRecord>, SyncError> {
        self.inner
            .entities
            .list_conflicts()?
            .into_iter()
            .filter_map(|meta| meta.conflict_data)
            .map(|data| ConflictRecord::from_stored(&data))
            .collect()
    }

    /// Settle a conflict left for manual review. Keeping the local version
    /// writes it back and queues an update.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::NotFound` if no conflict is recorded for the
    /// entity, or a storage error.
    pub fn settle_conflict(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        choice: ConflictChoice,
    ) -> Result<Option<SyncOperation>, SyncError> {
        let inner = &self.inner;
        let mut meta = inner
            .entities
            .get(entity_type, entity_id)?
            .ok_or_else(|| SyncError::NotFound(format!("{entity_type}/{entity_id}")))?;
        let data = meta.conflict_data.take().ok_or_else(|| {
            SyncError::NotFound(format!("no conflict recorded for {entity_type}/{entity_id}"))
        })?;
        let record = ConflictRecord::from_stored(&data)?;
        inner.entities.upsert(&meta)?;

        match (choice, record.local) {
            (ConflictChoice::KeepLocal, Some(local)) => {
                info!(entity_id, "Conflict settled in favour of the local version");
                self.save_local(local, OpType::Update).map(Some)
            }
            _ => {
                info!(entity_id, "Conflict settled in favour of the remote version");
                Ok(None)
            }
        }
    }

    /// Record a connectivity change. Returns whether a pass should follow.
    pub(super) fn note_connectivity(&self, event: ConnectivityEvent) -> bool {
        match event {
            ConnectivityEvent::Disconnected => {
                if self.inner.online.swap(false, Ordering::SeqCst) {
                    info!("Connectivity lost");
                }
                self.publish(|s| s.state = SyncState::Offline);
                false
            }
            ConnectivityEvent::Connected => {
                if self.inner.online.swap(true, Ordering::SeqCst) {
                    return false;
                }
                info!("Connectivity restored");
                self.publish(|s| {
                    if s.state == SyncState::Offline {
                        s.state = SyncState::Idle;
                    }
                });
                self.inner.config.sync_on_reconnect
            }
        }
    }

    fn begin_pass(&self) -> Result<PassGuard<'_>, SyncResult> {
        if !self.is_online() {
            debug!("Offline, sync skipped");
            return Err(SyncResult::skipped(SyncError::Offline.to_string()));
        }
        if self
            .inner
            .syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Sync already running, request skipped");
            return Err(SyncResult::skipped("sync already in progress"));
        }
        Ok(PassGuard(&self.inner.syncing))
    }

    async fn run_pass(&self, full: bool) -> SyncResult {
        info!(full, "Sync pass started");
        self.publish(|s| {
            s.state = SyncState::Syncing;
            s.progress = 0.0;
        });

        let mut result = SyncResult {
            success: true,
            ..SyncResult::default()
        };
        if let Err(err) = self.run_flows(full, &mut result).await {
            error!(error = %err, "Sync pass aborted");
            result.fail(err.to_string());
        }
        self.finish(&result);

        info!(
            success = result.success,
            pushed = result.items_pushed,
            pulled = result.items_pulled,
            conflicts = result.conflicts,
            failed_pushes = result.failed_pushes,
            "Sync pass finished"
        );
        result
    }

    async fn run_flows(&self, full: bool, result: &mut SyncResult) -> Result<(), SyncError> {
        if full {
            self.inner.delta.clear_cache().await;
            let cleared = self.inner.scopes.clear_cursors()?;
            debug!(scopes = cleared, "Cleared pull cursors");
        }

        self.push(result).await?;
        self.pull(full, result).await?;

        if !self.is_online() {
            result.fail(SyncError::Offline.to_string());
        }
        Ok(())
    }

    fn finish(&self, result: &SyncResult) {
        let now = self.inner.clock.now();
        let online = self.is_online();
        let stats = self.inner.queue.stats();
        if let Err(err) = &stats {
            error!(error = %err, "Failed to read queue counts");
        }

        self.publish(|s| {
            if let Ok(stats) = &stats {
                apply_counts(s, stats);
            }
            s.progress = 1.0;
            if !online {
                s.state = SyncState::Offline;
            } else if let Some(err) = &result.error {
                s.state = SyncState::Error;
                s.last_error = Some(err.clone());
            } else {
                s.state = SyncState::UpToDate;
                s.last_synced_at = Some(now);
                s.last_error = None;
            }
        });
    }

    /// Drain the queue in batches until nothing is ready.
    async fn push(&self, result: &mut SyncResult) -> Result<(), SyncError> {
        let inner = &self.inner;
        let total = inner.queue.queue_length()?;
        if total == 0 {
            return Ok(());
        }

        let executor = AuthExecutor {
            writer: inner.writer.as_ref(),
            gate: &inner.auth,
        };
        let mut dispatched = 0usize;

        while self.is_online() {
            let report = inner
                .queue
                .process_next(&executor, inner.config.max_concurrent_push)
                .await?;
            if report.is_empty() {
                break;
            }

            for op in &report.completed {
                self.mark_pushed(op)?;
            }
            result.items_pushed += report.completed.len();
            result.failed_pushes += report.retrying.len() + report.dead_lettered.len();
            dispatched += report.dispatched();

            let stats = inner.queue.stats()?;
            let progress = 0.5 * ratio(dispatched, total.max(dispatched));
            self.publish(|s| {
                apply_counts(s, &stats);
                s.progress = progress;
            });
        }
        Ok(())
    }

    /// Clear the dirty flag unless later edits are still queued.
    fn mark_pushed(&self, op: &SyncOperation) -> Result<(), SyncError> {
        let inner = &self.inner;
        if inner.queue.has_active_for(op.entity_type, &op.entity_id)? {
            debug!(entity_id = %op.entity_id, "Later edits still queued");
            return Ok(());
        }
        let mut meta = inner.entities.get_or_new(op.entity_type, &op.entity_id)?;
        meta.mark_synced(inner.clock.now());
        inner.entities.upsert(&meta)
    }

    /// Pull every scope. Remote failures are recorded per scope and do not
    /// stop the other scopes; local storage failures abort the pass.
    async fn pull(&self, full: bool, result: &mut SyncResult) -> Result<(), SyncError> {
        let scopes = &self.inner.config.scopes;
        for (index, scope) in scopes.iter().enumerate() {
            if !self.is_online() {
                break;
            }

            match self.pull_scope(scope, full).await {
                Ok(tally) => {
                    result.items_pulled += tally.items;
                    result.conflicts += tally.conflicts;
                }
                Err(err @ (SyncError::Remote(_) | SyncError::Offline)) => {
                    warn!(scope = %scope, error = %err, "Pull failed");
                    self.record_pull_failure(scope, &err)?;
                    result.fail(format!("{scope}: {err}"));
                }
                Err(err) => return Err(err),
            }

            let progress = 0.5 + 0.5 * ratio(index + 1, scopes.len());
            self.publish(|s| s.progress = progress);
        }
        Ok(())
    }

    async fn pull_scope(&self, scope: &SyncScope, force_full: bool) -> Result<PullTally, SyncError> {
        let inner = &self.inner;
        let key = scope.key();
        let existing = inner.scopes.get(&key)?;

        let full = force_full
            || existing
                .as_ref()
                .map_or(true, |meta| meta.needs_migration() || meta.watermark().is_none());
        let watermark = match scope {
            SyncScope::Channel { .. } if !full => {
                existing.as_ref().and_then(SyncMetadata::watermark)
            }
            _ => None,
        };
        let builder = scope.request().updated_after(watermark);
        let builder = if full {
            builder.skip_validation()
        } else {
            builder.if_none_match(existing.as_ref().and_then(|meta| meta.etag.clone()))
        };

        let started = inner.clock.now();
        let mut request = builder.build()?;
        debug!(scope = %key, full, ?watermark, "Pulling scope");

        let mut summary = DeltaResponse {
            items: Vec::new(),
            next_page_token: None,
            etag: None,
            was_modified: false,
            sync_time: started,
            full_sync: request.is_full_sync(),
        };
        let mut tally = PullTally::default();
        let mut first_page = true;

        loop {
            let response = self.fetch_page(&request).await?;
            for item in &response.items {
                if self.apply_remote(item)? {
                    tally.conflicts += 1;
                }
            }
            tally.items += response.items.len();

            if first_page {
                summary.etag.clone_from(&response.etag);
                summary.was_modified = response.was_modified;
                first_page = false;
            }

            match response.next_page_token {
                Some(token) => {
                    if !self.is_online() {
                        return Err(SyncError::Offline);
                    }
                    request = request.next_page(token);
                }
                None => break,
            }
        }

        let meta = summary.to_sync_metadata_counting(&key, existing.as_ref(), tally.items);
        inner.scopes.upsert(&meta)?;
        debug!(
            scope = %key,
            items = tally.items,
            conflicts = tally.conflicts,
            modified = summary.was_modified,
            "Scope pulled"
        );
        Ok(tally)
    }

    /// Fetch one page, refreshing credentials once on `AuthInvalid`.
    async fn fetch_page(&self, request: &DeltaRequest) -> Result<DeltaResponse, SyncError> {
        let inner = &self.inner;
        let seen = inner.auth.generation().await;
        match inner.delta.fetch(request).await {
            Err(SyncError::Remote(RemoteError::AuthInvalid)) => {
                inner.auth.refresh_since(seen).await?;
                inner.delta.fetch(request).await
            }
            other => other,
        }
    }

    /// Reconcile one remote item with the replica. Returns whether the
    /// resolution found a conflict.
    fn apply_remote(&self, item: &RemoteItem) -> Result<bool, SyncError> {
        let inner = &self.inner;
        let entity_type = item.entity.entity_type();
        let id = item.entity.entity_id();
        let now = inner.clock.now();

        let local = inner.local.get(entity_type, id)?;
        let mut meta = inner.entities.get_or_new(entity_type, id)?;
        let remote_meta = SyncableEntity {
            etag: item.etag.clone(),
            remote_updated_at: Some(item.updated_at),
            deleted: item.deleted,
            ..SyncableEntity::new(entity_type, id)
        };

        let result = if item.deleted || meta.deleted {
            resolve_delete_conflict(local.as_ref(), Some(&item.entity), &meta, &remote_meta)
        } else if let Some(local) = &local {
            resolve(
                local,
                &item.entity,
                &meta,
                &remote_meta,
                inner.config.conflict_strategy,
            )
        } else {
            ResolutionResult::new(id, Some(item.entity.clone()), ResolutionOutcome::New)
        };
        let ResolutionResult {
            resolved,
            had_conflict,
            conflicted_fields,
            outcome,
            ..
        } = result;
        if had_conflict {
            debug!(entity_id = id, ?outcome, fields = ?conflicted_fields, "Conflict resolved");
        }

        if item.etag.is_some() {
            meta.etag.clone_from(&item.etag);
        }
        meta.remote_updated_at = Some(item.updated_at);

        match outcome {
            ResolutionOutcome::AcceptedRemote
            | ResolutionOutcome::New
            | ResolutionOutcome::Resurrected => {
                let accepted = resolved.unwrap_or_else(|| item.entity.clone());
                let accepted = match &local {
                    Some(local) => accepted.overlay_local_only(local),
                    None => accepted,
                };
                inner.local.put(&accepted)?;
                inner.queue.cancel_pending_for(entity_type, id)?;
                meta.deleted = false;
                meta.conflict_data = None;
                meta.mark_synced(now);
            }
            ResolutionOutcome::KeptLocal | ResolutionOutcome::PendingPush => {}
            ResolutionOutcome::Merged => {
                let merged = resolved.unwrap_or_else(|| item.entity.clone());
                inner.local.put(&merged)?;
                if merged.differing_fields(&item.entity).is_empty() {
                    inner.queue.cancel_pending_for(entity_type, id)?;
                    meta.mark_synced(now);
                } else {
                    inner
                        .queue
                        .enqueue(OpType::Update, entity_type, id, Some(merged), 0)?;
                    meta.last_synced_at = Some(now);
                    meta.modified_after_last_sync = true;
                }
            }
            ResolutionOutcome::ManualReview => {
                let record = ConflictRecord {
                    entity_type,
                    entity_id: id.to_string(),
                    strategy: inner.config.conflict_strategy,
                    local: local.clone(),
                    remote: item.entity.clone(),
                    conflicted_fields,
                    detected_at: now,
                };
                let written = resolved.unwrap_or_else(|| item.entity.clone());
                inner.local.put(&written)?;
                inner.queue.cancel_pending_for(entity_type, id)?;
                meta.conflict_data = Some(serde_json::to_string(&record)?);
                meta.mark_synced(now);
                warn!(entity_id = id, fields = ?record.conflicted_fields, "Conflict left for manual review");
            }
            ResolutionOutcome::Deleted => {
                // A local delete that stands keeps its queued push.
                if item.deleted {
                    inner.local.delete(entity_type, id)?;
                    inner.queue.cancel_pending_for(entity_type, id)?;
                    meta.deleted = true;
                    meta.mark_synced(now);
                }
            }
        }

        inner.entities.upsert(&meta)?;
        Ok(had_conflict)
    }

    fn record_pull_failure(&self, scope: &SyncScope, err: &SyncError) -> Result<(), SyncError> {
        let key = scope.key();
        let mut meta = self
            .inner
            .scopes
            .get(&key)?
            .unwrap_or_else(|| SyncMetadata::new(&key));
        meta.record_failure(err.to_string(), self.inner.clock.now());
        self.inner.scopes.upsert(&meta)
    }

    fn refresh_counts(&self) -> Result<(), SyncError> {
        let stats = self.inner.queue.stats()?;
        self.publish(|s| apply_counts(s, &stats));
        Ok(())
    }

    fn publish(&self, update: impl FnOnce(&mut SyncStatus)) {
        let snapshot = {
            let mut status = self
                .inner
                .status
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            update(&mut status);
            status.clone()
        };
        // No subscribers is fine.
        let _ = self.inner.status_tx.send(snapshot);
    }
}

fn apply_counts(status: &mut SyncStatus, stats: &QueueStats) {
    status.pending_operations = stats.queue_length();
    status.failed_operations = stats.failed + stats.dead_letter;
}

#[allow(clippy::cast_precision_loss)]
fn ratio(done: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        (done as f64 / total as f64).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use crate::models::Comment;
    use crate::remote::fakes::{FakeReader, FakeRefresher, FakeWriter};
    use crate::remote::ListPage;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    struct Harness {
        engine: SyncEngine,
        reader: Arc<FakeReader>,
        writer: Arc<FakeWriter>,
        refresher: Arc<FakeRefresher>,
        clock: Arc<ManualClock>,
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    fn channel() -> SyncScope {
        SyncScope::Channel {
            id: "UC1".to_string(),
        }
    }

    fn harness(strategy: ConflictStrategy) -> Harness {
        let db = Database::open_in_memory().unwrap();
        let reader = Arc::new(FakeReader::default());
        let writer = Arc::new(FakeWriter::default());
        let refresher = Arc::new(FakeRefresher::new(true));
        let clock = Arc::new(ManualClock::new(t0()));

        let engine = SyncEngine::builder(db, reader.clone(), writer.clone())
            .token_refresher(refresher.clone())
            .clock(clock.clone())
            .engine_config(EngineConfig {
                conflict_strategy: strategy,
                scopes: vec![channel()],
                ..EngineConfig::default()
            })
            .backoff(Backoff::new(2.0, 300.0, 0.0))
            .build()
            .unwrap();

        Harness {
            engine,
            reader,
            writer,
            refresher,
            clock,
        }
    }

    fn comment(id: &str, text: &str, likes: u64) -> Comment {
        Comment {
            id: id.to_string(),
            video_id: "v1".to_string(),
            channel_id: "UC1".to_string(),
            parent_id: None,
            author_name: "viewer".to_string(),
            author_channel_id: None,
            text: text.to_string(),
            like_count: likes,
            reply_count: 0,
            published_at: t0(),
            updated_at: None,
            is_bookmarked: false,
        }
    }

    fn remote(c: Comment, updated_at: DateTime<Utc>) -> RemoteItem {
        RemoteItem {
            entity: EntitySnapshot::Comment(c),
            updated_at,
            etag: None,
            deleted: false,
        }
    }

    fn page(items: Vec<RemoteItem>) -> ListPage {
        ListPage {
            items,
            next_page_token: None,
            etag: Some("e1".to_string()),
            not_modified: false,
        }
    }

    fn paged(items: Vec<RemoteItem>, etag: Option<&str>, next: Option<&str>) -> ListPage {
        ListPage {
            items,
            next_page_token: next.map(String::from),
            etag: etag.map(String::from),
            not_modified: false,
        }
    }

    fn local_comment(h: &Harness, id: &str) -> Option<Comment> {
        match h.engine.inner.local.get(EntityType::Comment, id).unwrap() {
            Some(EntitySnapshot::Comment(c)) => Some(c),
            _ => None,
        }
    }

    fn meta(h: &Harness, id: &str) -> SyncableEntity {
        h.engine
            .entities()
            .get_or_new(EntityType::Comment, id)
            .unwrap()
    }

    /// Pull `c` so the replica holds it as synced.
    async fn seed(h: &Harness, c: Comment) {
        h.reader.push_page(page(vec![remote(c, t0())]));
        let result = h.engine.sync_now().await;
        assert!(result.success, "{result:?}");
    }

    #[tokio::test]
    async fn test_save_then_push_clears_dirty() {
        let h = harness(ConflictStrategy::default());
        let op = h
            .engine
            .save_local(comment("c1", "hi", 0).into(), OpType::Create)
            .unwrap();
        assert_eq!(op.status, OperationStatus::Pending);
        assert!(meta(&h, "c1").modified_after_last_sync);
        assert_eq!(h.engine.status().pending_operations, 1);

        let result = h.engine.sync_now().await;
        assert!(result.success);
        assert_eq!(result.items_pushed, 1);
        assert_eq!(
            h.writer.calls(),
            vec![("create".to_string(), EntityType::Comment, "c1".to_string())]
        );

        let meta = meta(&h, "c1");
        assert!(!meta.modified_after_last_sync);
        assert_eq!(meta.last_synced_at, Some(t0()));

        let status = h.engine.status();
        assert_eq!(status.state, SyncState::UpToDate);
        assert_eq!(status.pending_operations, 0);
        assert_eq!(status.progress, 1.0);
    }

    #[tokio::test]
    async fn test_auth_failure_refreshes_once_and_retries() {
        let h = harness(ConflictStrategy::default());
        h.engine
            .save_local(comment("c1", "hi", 0).into(), OpType::Create)
            .unwrap();
        h.writer.fail("c1", vec![RemoteError::AuthInvalid]);

        let result = h.engine.sync_now().await;
        assert_eq!(result.items_pushed, 1);
        assert_eq!(result.failed_pushes, 0);
        assert_eq!(h.refresher.calls(), 1);
        assert_eq!(h.writer.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_retryable_push_failure_keeps_entity_dirty() {
        let h = harness(ConflictStrategy::default());
        h.engine
            .save_local(comment("c1", "hi", 0).into(), OpType::Create)
            .unwrap();
        h.writer.fail("c1", vec![RemoteError::ServerError { status: 503 }]);

        let result = h.engine.sync_now().await;
        assert!(result.success);
        assert_eq!(result.failed_pushes, 1);
        assert!(meta(&h, "c1").modified_after_last_sync);
        assert_eq!(h.engine.status().failed_operations, 1);
        assert_eq!(h.engine.status().pending_operations, 1);
    }

    #[tokio::test]
    async fn test_pull_accepts_new_items_and_records_scope() {
        let h = harness(ConflictStrategy::default());
        h.reader.push_page(page(vec![
            remote(comment("c1", "one", 1), t0()),
            remote(comment("c2", "two", 2), t0()),
        ]));

        let result = h.engine.sync_now().await;
        assert!(result.success);
        assert_eq!(result.items_pulled, 2);
        assert_eq!(result.conflicts, 0);
        assert_eq!(local_comment(&h, "c2").unwrap().text, "two");
        assert!(!meta(&h, "c1").modified_after_last_sync);

        let scope = h.engine.scopes().get("channel:UC1").unwrap().unwrap();
        assert_eq!(scope.sync_count, 1);
        assert_eq!(scope.items_synced, 2);
        assert_eq!(scope.etag.as_deref(), Some("e1"));
        assert_eq!(scope.last_full_sync_time, Some(t0()));
        assert!(scope.migration_completed);
    }

    #[tokio::test]
    async fn test_second_pull_is_incremental_and_validated() {
        let h = harness(ConflictStrategy::default());
        seed(&h, comment("c1", "one", 1)).await;
        h.clock.advance(Duration::minutes(15));
        h.reader.push_page(ListPage {
            not_modified: true,
            ..ListPage::default()
        });

        let result = h.engine.sync_now().await;
        assert!(result.success);
        assert_eq!(result.items_pulled, 0);

        let (query, validator) = h.reader.calls().pop().unwrap();
        assert_eq!(validator.as_deref(), Some("e1"));
        assert_eq!(query.get("updatedAfter"), Some("2024-05-01T09:00:00Z"));

        let scope = h.engine.scopes().get("channel:UC1").unwrap().unwrap();
        assert_eq!(scope.sync_count, 2);
        assert_eq!(scope.last_full_sync_time, Some(t0()));
        assert_eq!(
            scope.last_incremental_sync_time,
            Some(t0() + Duration::minutes(15))
        );
    }

    #[tokio::test]
    async fn test_force_full_sync_drops_cursors() {
        let h = harness(ConflictStrategy::default());
        seed(&h, comment("c1", "one", 1)).await;
        h.clock.advance(Duration::minutes(5));

        let result = h.engine.force_full_sync().await;
        assert!(result.success);

        let (query, validator) = h.reader.calls().pop().unwrap();
        assert_eq!(validator, None);
        assert_eq!(query.get("updatedAfter"), None);
    }

    #[tokio::test]
    async fn test_multi_page_pull_validates_first_page_only() {
        let h = harness(ConflictStrategy::default());
        seed(&h, comment("c1", "one", 1)).await;
        h.clock.advance(Duration::minutes(15));
        h.reader.push_page(paged(
            vec![
                remote(comment("c2", "two", 0), t0() + Duration::minutes(1)),
                remote(comment("c3", "three", 0), t0() + Duration::minutes(2)),
            ],
            Some("e2"),
            Some("p2"),
        ));
        h.reader.push_page(paged(
            vec![remote(comment("c4", "four", 0), t0() + Duration::minutes(3))],
            Some("e-late"),
            Some("p3"),
        ));
        h.reader.push_page(paged(
            vec![remote(comment("c5", "five", 0), t0() + Duration::minutes(4))],
            None,
            None,
        ));

        let result = h.engine.sync_now().await;
        assert!(result.success, "{result:?}");
        assert_eq!(result.items_pulled, 4);
        assert_eq!(local_comment(&h, "c5").unwrap().text, "five");

        let calls = h.reader.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[1].1.as_deref(), Some("e1"));
        assert_eq!(calls[1].0.get("pageToken"), None);
        for (call, token) in calls[2..].iter().zip(["p2", "p3"]) {
            assert_eq!(call.1, None);
            assert_eq!(call.0.get("pageToken"), Some(token));
            assert_eq!(call.0.get("updatedAfter"), Some("2024-05-01T09:00:00Z"));
        }

        let scope = h.engine.scopes().get("channel:UC1").unwrap().unwrap();
        assert_eq!(scope.sync_count, 2);
        assert_eq!(scope.items_synced, 5);
        assert_eq!(scope.etag.as_deref(), Some("e2"));
    }

    #[tokio::test]
    async fn test_interrupted_full_pull_is_refetched_unvalidated() {
        let h = harness(ConflictStrategy::default());
        h.reader.push_page(paged(
            vec![remote(comment("c1", "one", 1), t0())],
            Some("e1"),
            Some("p2"),
        ));
        h.reader.push_error(RemoteError::Network("connection reset".to_string()));

        let failed = h.engine.sync_now().await;
        assert!(!failed.success);
        let scope = h.engine.scopes().get("channel:UC1").unwrap().unwrap();
        assert_eq!(scope.failed_sync_count, 1);
        assert_eq!(scope.watermark(), None);

        h.clock.advance(Duration::minutes(5));
        h.reader.push_page(paged(
            vec![remote(comment("c1", "one", 1), t0())],
            Some("e1"),
            Some("p2"),
        ));
        h.reader.push_page(paged(
            vec![remote(comment("c2", "two", 2), t0())],
            Some("e-page2"),
            None,
        ));

        let retried = h.engine.sync_now().await;
        assert!(retried.success, "{retried:?}");
        assert_eq!(retried.items_pulled, 2);
        assert_eq!(local_comment(&h, "c2").unwrap().text, "two");

        let calls = h.reader.calls();
        assert_eq!(calls[2].1, None);
        assert_eq!(calls[2].0.get("updatedAfter"), None);
        assert_eq!(calls[3].0.get("pageToken"), Some("p2"));

        let scope = h.engine.scopes().get("channel:UC1").unwrap().unwrap();
        assert_eq!(scope.items_synced, 2);
        assert_eq!(scope.etag.as_deref(), Some("e1"));
        assert_eq!(scope.last_full_sync_time, Some(t0() + Duration::minutes(5)));

        h.clock.advance(Duration::minutes(10));
        h.reader.push_page(ListPage {
            not_modified: true,
            ..ListPage::default()
        });
        assert!(h.engine.sync_now().await.success);

        let (query, validator) = h.reader.calls().pop().unwrap();
        assert_eq!(validator.as_deref(), Some("e1"));
        assert_eq!(query.get("updatedAfter"), Some("2024-05-01T09:05:00Z"));
    }

    #[tokio::test]
    async fn test_field_merge_keeps_local_text_and_max_likes() {
        let h = harness(ConflictStrategy::FieldLevelMerge);
        seed(&h, comment("c1", "Orig", 5)).await;

        h.clock.advance(Duration::minutes(1));
        h.engine
            .save_local(comment("c1", "Fixed typo", 5).into(), OpType::Update)
            .unwrap();
        h.writer.fail("c1", vec![RemoteError::ServerError { status: 500 }]);
        h.reader.push_page(page(vec![remote(
            comment("c1", "Orig", 12),
            t0() + Duration::minutes(2),
        )]));
        h.clock.advance(Duration::minutes(5));

        let result = h.engine.sync_now().await;
        assert_eq!(result.conflicts, 1);

        let merged = local_comment(&h, "c1").unwrap();
        assert_eq!(merged.text, "Fixed typo");
        assert_eq!(merged.like_count, 12);
        assert!(meta(&h, "c1").modified_after_last_sync);

        let waiting = h
            .engine
            .queue()
            .list_by_status(Some(OperationStatus::Failed), 10)
            .unwrap();
        assert_eq!(waiting.len(), 1);
        assert_eq!(
            waiting[0].payload,
            Some(EntitySnapshot::Comment(merged))
        );
    }

    #[tokio::test]
    async fn test_remote_wins_cancels_local_edit() {
        let h = harness(ConflictStrategy::RemoteWins);
        seed(&h, comment("c1", "Orig", 1)).await;

        h.clock.advance(Duration::minutes(1));
        let mut edited = comment("c1", "Mine", 1);
        edited.is_bookmarked = true;
        h.engine.save_local(edited.into(), OpType::Update).unwrap();
        h.writer.fail("c1", vec![RemoteError::Timeout]);
        h.reader.push_page(page(vec![remote(
            comment("c1", "Theirs", 3),
            t0() + Duration::minutes(2),
        )]));
        h.clock.advance(Duration::minutes(5));

        let result = h.engine.sync_now().await;
        assert_eq!(result.conflicts, 1);

        let local = local_comment(&h, "c1").unwrap();
        assert_eq!(local.text, "Theirs");
        assert!(local.is_bookmarked);
        assert!(!meta(&h, "c1").modified_after_last_sync);
        assert!(!h
            .engine
            .queue()
            .has_active_for(EntityType::Comment, "c1")
            .unwrap());
    }

    #[tokio::test]
    async fn test_manual_conflict_is_recorded_and_settled() {
        let h = harness(ConflictStrategy::Manual);
        seed(&h, comment("c1", "Orig", 1)).await;

        h.clock.advance(Duration::minutes(1));
        h.engine
            .save_local(comment("c1", "Mine", 1).into(), OpType::Update)
            .unwrap();
        h.writer.fail("c1", vec![RemoteError::Timeout]);
        h.reader.push_page(page(vec![remote(
            comment("c1", "Theirs", 1),
            t0() + Duration::minutes(2),
        )]));
        h.clock.advance(Duration::minutes(5));
        h.engine.sync_now().await;

        assert_eq!(local_comment(&h, "c1").unwrap().text, "Theirs");
        let conflicts = h.engine.pending_conflicts().unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflicted_fields, vec!["text".to_string()]);
        assert_eq!(
            conflicts[0].local,
            Some(EntitySnapshot::Comment(comment("c1", "Mine", 1)))
        );

        let op = h
            .engine
            .settle_conflict(EntityType::Comment, "c1", ConflictChoice::KeepLocal)
            .unwrap()
            .unwrap();
        assert_eq!(op.op_type, OpType::Update);
        assert_eq!(local_comment(&h, "c1").unwrap().text, "Mine");
        assert!(h.engine.pending_conflicts().unwrap().is_empty());

        let err = h
            .engine
            .settle_conflict(EntityType::Comment, "c1", ConflictChoice::KeepRemote)
            .unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_remote_tombstone_removes_local() {
        let h = harness(ConflictStrategy::default());
        seed(&h, comment("c1", "Orig", 1)).await;

        let mut tombstone = remote(comment("c1", "Orig", 1), t0() + Duration::minutes(1));
        tombstone.deleted = true;
        h.reader.push_page(page(vec![tombstone]));

        let result = h.engine.sync_now().await;
        assert_eq!(result.conflicts, 1);
        assert!(local_comment(&h, "c1").is_none());
        assert!(meta(&h, "c1").deleted);
    }

    #[tokio::test]
    async fn test_remote_edit_after_local_delete_resurrects() {
        let h = harness(ConflictStrategy::default());
        seed(&h, comment("c1", "Orig", 1)).await;

        h.clock.advance(Duration::minutes(1));
        let delete = h.engine.delete_local(EntityType::Comment, "c1").unwrap();
        assert!(meta(&h, "c1").deleted);
        h.writer.fail("c1", vec![RemoteError::Timeout]);
        h.reader.push_page(page(vec![remote(
            comment("c1", "Edited elsewhere", 4),
            t0() + Duration::minutes(2),
        )]));
        h.clock.advance(Duration::minutes(5));

        let result = h.engine.sync_now().await;
        assert_eq!(result.conflicts, 1);
        assert_eq!(local_comment(&h, "c1").unwrap().text, "Edited elsewhere");

        let meta = meta(&h, "c1");
        assert!(!meta.deleted);
        assert!(!meta.modified_after_last_sync);
        assert_eq!(
            h.engine.queue().get(&delete.id).unwrap().unwrap().status,
            OperationStatus::Cancelled
        );
        assert!(!h
            .engine
            .queue()
            .has_active_for(EntityType::Comment, "c1")
            .unwrap());
        assert_eq!(
            h.writer.calls(),
            vec![("delete".to_string(), EntityType::Comment, "c1".to_string())]
        );
    }

    #[tokio::test]
    async fn test_remote_tombstone_drops_pending_update() {
        let h = harness(ConflictStrategy::default());
        seed(&h, comment("c1", "Orig", 1)).await;

        h.clock.advance(Duration::minutes(1));
        let update = h
            .engine
            .save_local(comment("c1", "Mine", 1).into(), OpType::Update)
            .unwrap();
        h.writer.fail("c1", vec![RemoteError::Timeout]);
        let mut tombstone = remote(comment("c1", "Orig", 1), t0() + Duration::minutes(2));
        tombstone.deleted = true;
        h.reader.push_page(page(vec![tombstone]));
        h.clock.advance(Duration::minutes(5));

        let result = h.engine.sync_now().await;
        assert_eq!(result.conflicts, 1);
        assert!(local_comment(&h, "c1").is_none());

        let meta = meta(&h, "c1");
        assert!(meta.deleted);
        assert!(!meta.modified_after_last_sync);
        assert_eq!(
            h.engine.queue().get(&update.id).unwrap().unwrap().status,
            OperationStatus::Cancelled
        );
        assert!(!h
            .engine
            .queue()
            .has_active_for(EntityType::Comment, "c1")
            .unwrap());
    }

    #[tokio::test]
    async fn test_delete_of_unsent_create_leaves_nothing() {
        let h = harness(ConflictStrategy::default());
        h.engine
            .save_local(comment("c1", "draft", 0).into(), OpType::Create)
            .unwrap();
        let op = h.engine.delete_local(EntityType::Comment, "c1").unwrap();

        assert_eq!(op.status, OperationStatus::Cancelled);
        assert_eq!(h.engine.queue().queue_length().unwrap(), 0);
        assert!(h
            .engine
            .entities()
            .get(EntityType::Comment, "c1")
            .unwrap()
            .is_none());
        assert!(local_comment(&h, "c1").is_none());
    }

    #[tokio::test]
    async fn test_delete_after_requeued_create_reaches_remote() {
        let h = harness(ConflictStrategy::default());
        h.engine
            .save_local(comment("c1", "hi", 0).into(), OpType::Create)
            .unwrap();
        h.writer.fail("c1", vec![RemoteError::Timeout; 5]);
        for _ in 0..5 {
            h.engine.sync_now().await;
            h.clock.advance(Duration::minutes(10));
        }
        assert_eq!(h.engine.queue().dead_letter_length().unwrap(), 1);
        assert_eq!(h.engine.retry_all_dead_letter().unwrap(), 1);

        let delete = h.engine.delete_local(EntityType::Comment, "c1").unwrap();
        assert_eq!(delete.status, OperationStatus::Pending);
        assert!(meta(&h, "c1").deleted);

        let result = h.engine.sync_now().await;
        assert_eq!(result.items_pushed, 2);
        let calls = h.writer.calls();
        assert_eq!(calls.len(), 7);
        assert_eq!(
            calls.last(),
            Some(&("delete".to_string(), EntityType::Comment, "c1".to_string()))
        );
    }

    #[tokio::test]
    async fn test_delete_rejected_through_save_local() {
        let h = harness(ConflictStrategy::default());
        let err = h
            .engine
            .save_local(comment("c1", "x", 0).into(), OpType::Delete)
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_pull_failure_is_recorded_on_scope() {
        let h = harness(ConflictStrategy::default());
        h.reader.push_error(RemoteError::ServerError { status: 502 });

        let result = h.engine.sync_now().await;
        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("channel:UC1"));

        let scope = h.engine.scopes().get("channel:UC1").unwrap().unwrap();
        assert_eq!(scope.failed_sync_count, 1);
        assert_eq!(scope.last_error_time, Some(t0()));
        assert_eq!(h.engine.status().state, SyncState::Error);
    }

    #[tokio::test]
    async fn test_pull_refreshes_token_once() {
        let h = harness(ConflictStrategy::default());
        h.reader.push_error(RemoteError::AuthInvalid);
        h.reader.push_page(page(vec![remote(comment("c1", "one", 1), t0())]));

        let result = h.engine.sync_now().await;
        assert!(result.success);
        assert_eq!(result.items_pulled, 1);
        assert_eq!(h.refresher.calls(), 1);
    }

    #[tokio::test]
    async fn test_overlapping_requests_are_skipped() {
        let h = harness(ConflictStrategy::default());
        h.engine
            .save_local(comment("c1", "hi", 0).into(), OpType::Create)
            .unwrap();

        let (first, second) = tokio::join!(h.engine.sync_now(), h.engine.sync_now());
        assert!(!first.skipped);
        assert!(second.skipped);
        assert_eq!(h.writer.calls().len(), 1);
        assert!(!h.engine.is_syncing());
    }

    #[tokio::test]
    async fn test_offline_and_reconnect() {
        let h = harness(ConflictStrategy::default());

        assert!(h
            .engine
            .handle_connectivity(ConnectivityEvent::Disconnected)
            .await
            .is_none());
        assert_eq!(h.engine.status().state, SyncState::Offline);

        let skipped = h.engine.sync_now().await;
        assert!(skipped.skipped);
        assert!(h.reader.calls().is_empty());

        let resumed = h
            .engine
            .handle_connectivity(ConnectivityEvent::Connected)
            .await
            .unwrap();
        assert!(resumed.success);
        assert_eq!(h.engine.status().state, SyncState::UpToDate);

        // Already online: no second pass.
        assert!(h
            .engine
            .handle_connectivity(ConnectivityEvent::Connected)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_status_is_broadcast() {
        let h = harness(ConflictStrategy::default());
        let mut first = h.engine.subscribe();
        let mut second = h.engine.subscribe();

        h.engine.sync_now().await;

        let mut states = Vec::new();
        while let Ok(status) = first.try_recv() {
            states.push(status.state);
        }
        assert_eq!(states.first(), Some(&SyncState::Syncing));
        assert_eq!(states.last(), Some(&SyncState::UpToDate));
        assert!(second.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_dead_letter_retry_updates_counts() {
        let h = harness(ConflictStrategy::default());
        h.engine
            .save_local(comment("c1", "hi", 0).into(), OpType::Create)
            .unwrap();
        h.writer.fail(
            "c1",
            vec![RemoteError::Rejected {
                status: 422,
                message: "bad".to_string(),
            }],
        );
        h.engine.sync_now().await;
        assert_eq!(h.engine.queue().dead_letter_length().unwrap(), 1);
        assert_eq!(h.engine.status().failed_operations, 1);

        assert_eq!(h.engine.retry_all_dead_letter().unwrap(), 1);
        assert_eq!(h.engine.status().failed_operations, 0);
        assert_eq!(h.engine.status().pending_operations, 1);
    }
}
