//! Sync subsystems.
//!
//! - `sync`: durable queue of outbound intents
//! - `conflict`: strategies and the resolver
//! - `delta`: delta-fetch client and request builder
//! - `engine`: push/pull orchestration and scheduling

pub mod conflict;
pub mod delta;
pub mod engine;
pub mod sync;
