//! Contracts for the remote system of record.
//!
//! The remote API client, OAuth and connectivity detection are supplied by
//! the embedding application through these traits.

mod client;
#[cfg(test)]
pub(crate) mod fakes;
mod types;

#[cfg(test)]
pub use client::MockRemoteWriter;
pub use client::{RemoteReader, RemoteWriter, TokenRefresher};
pub use types::{ConnectivityEvent, ListPage, ListQuery, RemoteItem};
