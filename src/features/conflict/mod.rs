//! Conflict resolution between the local replica and the remote.
//!
//! Stateless: given both sides and their sync metadata, produce the entity
//! the replica should hold plus diagnostics. Never fails.

pub mod resolver;
pub mod strategy;

pub use resolver::{resolve, resolve_batch, resolve_delete_conflict};
pub use strategy::{ConflictStrategy, ResolutionOutcome, ResolutionResult};
