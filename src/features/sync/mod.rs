//! Sync queue for offline mutations.
//!
//! This module provides the durable queue of create/update/delete intents
//! that are waiting to be sent to the remote.
//!
//! Features:
//! - Collapsing of contradictory intents at enqueue time
//! - Per-entity ordering with bounded concurrent dispatch
//! - Exponential backoff with jitter, dead-lettering on exhaustion
//! - Crash recovery of in-flight operations

pub mod backoff;
pub mod operation;
pub mod queue;

pub use backoff::Backoff;
pub use operation::{OpType, OperationStatus, SyncOperation};
pub use queue::{
    dispatch, OperationExecutor, ProcessReport, QueueStats, SyncQueue, WriterExecutor,
};
