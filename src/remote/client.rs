//! Remote collaborator contracts.
//!
//! Implementations live with the caller (HTTP clients, OAuth handling). The
//! sync core only depends on these traits.

use async_trait::async_trait;

use super::types::{ListPage, ListQuery};
use crate::error::RemoteError;
use crate::models::{EntitySnapshot, EntityType};

/// Paginated reads from the system of record.
#[async_trait]
pub trait RemoteReader: Send + Sync {
    /// List one page. `if_none_match` is the previously returned validation
    /// token; a match is reported as `not_modified` or `RemoteError::NotModified`.
    async fn list(
        &self,
        query: &ListQuery,
        if_none_match: Option<&str>,
    ) -> Result<ListPage, RemoteError>;
}

/// Mutations against the system of record. Operations are idempotent by id.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteWriter: Send + Sync {
    async fn create(
        &self,
        entity_type: EntityType,
        id: &str,
        payload: &EntitySnapshot,
    ) -> Result<(), RemoteError>;

    async fn update(
        &self,
        entity_type: EntityType,
        id: &str,
        payload: &EntitySnapshot,
    ) -> Result<(), RemoteError>;

    async fn delete(&self, entity_type: EntityType, id: &str) -> Result<(), RemoteError>;
}

/// Obtains a fresh access token after the remote reports `AuthInvalid`.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self) -> Result<(), RemoteError>;
}
