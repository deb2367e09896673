use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::EntitySnapshot;

/// A paginated list request sent to the remote reader.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListQuery {
    /// Remote collection, e.g. `commentThreads`.
    pub resource: String,
    /// Query parameters.
    pub params: BTreeMap<String, String>,
}

impl ListQuery {
    #[must_use]
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            params: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// One item returned by the remote, with the remote's sync metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteItem {
    pub entity: EntitySnapshot,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub etag: Option<String>,
    /// Tombstone: the remote deleted this entity.
    #[serde(default)]
    pub deleted: bool,
}

/// One page of a remote list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListPage {
    pub items: Vec<RemoteItem>,
    pub next_page_token: Option<String>,
    pub etag: Option<String>,
    /// The validation token still matched; `items` is empty.
    pub not_modified: bool,
}

/// Events emitted by the connectivity observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    Connected,
    Disconnected,
}
