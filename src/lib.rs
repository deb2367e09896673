//! commentsync - offline-first synchronization core for comment data
//!
//! This crate keeps a local replica of comments and videos in step with a
//! remote system of record under intermittent connectivity: a durable queue
//! of outbound intents with retry and dead-lettering, a field-level conflict
//! resolver, a delta-fetch client with validation tokens, and an engine that
//! drives push and pull passes. A small CLI inspects and maintains the state.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod features;
pub mod models;
pub mod output;
pub mod remote;
pub mod storage;

pub use cli::args::{Cli, Commands, OutputFormat};
pub use error::{ErrorClass, RemoteError, SyncError};
pub use features::engine::{SyncEngine, SyncEngineBuilder, SyncResult, SyncState, SyncStatus};
