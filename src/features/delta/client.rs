//! Delta fetching with validation-token and watermark caching.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::request::{DeltaRequest, SyncScope, Validation};
use crate::core::Clock;
use crate::error::{RemoteError, SyncError};
use crate::models::{SyncMetadata, SCHEMA_VERSION};
use crate::remote::{ListPage, RemoteItem, RemoteReader};

/// What the client remembers about a cache key between fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub etag: Option<String>,
    pub last_sync_time: DateTime<Utc>,
}

/// One page of changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaResponse {
    pub items: Vec<RemoteItem>,
    pub next_page_token: Option<String>,
    pub etag: Option<String>,
    /// False when the remote reported the validation token still matches.
    pub was_modified: bool,
    pub sync_time: DateTime<Utc>,
    /// The request carried no watermark.
    pub full_sync: bool,
}

impl DeltaResponse {
    /// Fold this response into the scope record for `key`.
    #[must_use]
    pub fn to_sync_metadata(&self, key: &str, existing: Option<&SyncMetadata>) -> SyncMetadata {
        self.to_sync_metadata_counting(key, existing, self.items.len())
    }

    /// Like [`Self::to_sync_metadata`], for a pull whose pages were applied
    /// and dropped as they arrived. `items` is the total across pages.
    #[must_use]
    pub fn to_sync_metadata_counting(
        &self,
        key: &str,
        existing: Option<&SyncMetadata>,
        items: usize,
    ) -> SyncMetadata {
        let mut meta = existing
            .cloned()
            .unwrap_or_else(|| SyncMetadata::new(key));

        meta.sync_count += 1;
        meta.items_synced += items as u64;
        meta.last_sync_token.clone_from(&self.next_page_token);
        if self.etag.is_some() {
            meta.etag.clone_from(&self.etag);
        }

        if self.full_sync {
            meta.last_full_sync_time = Some(self.sync_time);
            meta.schema_version = SCHEMA_VERSION;
            meta.migration_completed = true;
        } else {
            meta.last_incremental_sync_time = Some(self.sync_time);
        }

        meta
    }
}

/// Wraps a [`RemoteReader`] with a soft per-key cache of validation tokens
/// and sync times. The cache is rebuildable and never authoritative.
///
/// A first page's token only becomes the cached validator once the last page
/// of that read has arrived. Until then it is held aside, and any failure
/// discards it.
pub struct RemoteDeltaClient {
    reader: Arc<dyn RemoteReader>,
    clock: Arc<dyn Clock>,
    cache: RwLock<HashMap<String, CacheEntry>>,
    staged: RwLock<HashMap<String, String>>,
}

impl RemoteDeltaClient {
    #[must_use]
    pub fn new(reader: Arc<dyn RemoteReader>, clock: Arc<dyn Clock>) -> Self {
        Self {
            reader,
            clock,
            cache: RwLock::new(HashMap::new()),
            staged: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch one page of `scope`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidRequest` for a watermark on a video scope,
    /// or `SyncError::Remote` if the reader fails.
    pub async fn fetch_delta(
        &self,
        scope: &SyncScope,
        page_token: Option<String>,
        updated_after: Option<DateTime<Utc>>,
    ) -> Result<DeltaResponse, SyncError> {
        let request = scope
            .request()
            .with_page_token(page_token)
            .updated_after(updated_after)
            .build()?;
        self.fetch(&request).await
    }

    /// Execute a built request.
    ///
    /// Only first pages are validated, as the request's [`Validation`] says.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Remote` for any reader failure other than
    /// not-modified.
    pub async fn fetch(&self, request: &DeltaRequest) -> Result<DeltaResponse, SyncError> {
        let key = request.cache_key();
        let first_page = request.page_token().is_none();

        let validator = if first_page {
            match &request.validation {
                Validation::Etag(etag) => Some(etag.clone()),
                Validation::Cached => self.cached(&key).await.and_then(|entry| entry.etag),
                Validation::Skip => None,
            }
        } else {
            None
        };

        let query = request.to_list_query();
        let page = match self.reader.list(&query, validator.as_deref()).await {
            Ok(page) => page,
            Err(RemoteError::NotModified) => ListPage {
                not_modified: true,
                ..ListPage::default()
            },
            Err(err) => {
                warn!(scope = %key, error = %err, "Delta fetch failed");
                self.staged.write().await.remove(&key);
                return Err(err.into());
            }
        };

        let now = self.clock.now();
        let full_sync = request.is_full_sync();

        if page.not_modified {
            debug!(scope = %key, "Delta not modified");
            self.staged.write().await.remove(&key);
            self.touch(&key, None, now).await;
            return Ok(DeltaResponse {
                items: Vec::new(),
                next_page_token: None,
                etag: validator,
                was_modified: false,
                sync_time: now,
                full_sync,
            });
        }

        let fresh_etag = {
            let mut staged = self.staged.write().await;
            let read_etag = if first_page {
                staged.remove(&key);
                page.etag.clone()
            } else {
                staged.remove(&key)
            };
            match (read_etag, &page.next_page_token) {
                (Some(etag), Some(_)) => {
                    staged.insert(key.clone(), etag);
                    None
                }
                (etag, _) => etag,
            }
        };
        self.touch(&key, fresh_etag, now).await;

        debug!(
            scope = %key,
            items = page.items.len(),
            more = page.next_page_token.is_some(),
            "Delta page fetched"
        );

        Ok(DeltaResponse {
            items: page.items,
            next_page_token: page.next_page_token,
            etag: page.etag,
            was_modified: true,
            sync_time: now,
            full_sync,
        })
    }

    /// The cache entry for `key`, if any.
    pub async fn cached(&self, key: &str) -> Option<CacheEntry> {
        self.cache.read().await.get(key).cloned()
    }

    /// Forget every validation token and sync time.
    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
        self.staged.write().await.clear();
    }

    /// Forget one key.
    pub async fn invalidate(&self, key: &str) {
        self.cache.write().await.remove(key);
        self.staged.write().await.remove(key);
    }

    async fn touch(&self, key: &str, etag: Option<String>, now: DateTime<Utc>) {
        let mut cache = self.cache.write().await;
        let entry = cache.entry(key.to_string()).or_insert_with(|| CacheEntry {
            etag: None,
            last_sync_time: now,
        });
        if etag.is_some() {
            entry.etag = etag;
        }
        entry.last_sync_time = now;
    }
}
