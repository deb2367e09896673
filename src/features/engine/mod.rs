//! Sync orchestration.
//!
//! This module composes the queue, the conflict resolver and the delta client
//! into push and pull passes, schedules them, and broadcasts status.
//!
//! Features:
//! - Push with a single shared token refresh path
//! - Per-scope incremental pull with validation tokens
//! - Offline handling and sync on reconnect
//! - Status stream with any number of subscribers

mod auth;
mod background;
mod status;
mod sync_engine;

pub use auth::{AuthExecutor, AuthGate};
pub use background::BackgroundHandle;
pub use status::{SyncResult, SyncState, SyncStatus};
pub use sync_engine::{ConflictChoice, ConflictRecord, SyncEngine, SyncEngineBuilder};
