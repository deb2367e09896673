//! Storage layer for commentsync.
//!
//! This module provides SQLite-based persistence for:
//! - The outbound operation queue (see `features::sync`)
//! - Per-entity sync metadata
//! - Per-scope pull metadata
//! - The local entity replica

mod database;
mod entity_meta;
mod local_store;
mod migrations;
mod scope_meta;

pub use database::Database;
pub use entity_meta::EntityMetaStore;
pub use local_store::{LocalStore, SqliteLocalStore};
pub use scope_meta::ScopeMetaStore;
