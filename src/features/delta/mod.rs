//! Delta pulls from the remote.
//!
//! A fluent builder assembles either a single-video delta or a channel-wide
//! incremental delta; the client remembers validation tokens per scope so
//! unchanged scopes cost one cheap round trip.

mod client;
mod request;

pub use client::{CacheEntry, DeltaResponse, RemoteDeltaClient};
pub use request::{
    DeltaRequest, DeltaRequestBuilder, DeltaTarget, SyncScope, Validation, COMMENT_THREADS,
};
