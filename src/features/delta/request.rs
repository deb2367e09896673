//! Delta request shapes and their builder.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::remote::ListQuery;

/// Remote collection that holds comment threads.
pub const COMMENT_THREADS: &str = "commentThreads";

/// A configured pull scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncScope {
    /// Every comment across a channel, pulled incrementally by watermark.
    Channel { id: String },
    /// One video's comments, paginated.
    Video { id: String },
}

impl SyncScope {
    /// Key for the scope's metadata record and delta cache entry.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::Channel { id } => format!("channel:{id}"),
            Self::Video { id } => format!("video:{id}"),
        }
    }

    /// A builder already targeting this scope.
    #[must_use]
    pub fn request(&self) -> DeltaRequestBuilder {
        match self {
            Self::Channel { id } => DeltaRequest::builder().for_channel(id),
            Self::Video { id } => DeltaRequest::builder().for_video(id),
        }
    }
}

impl std::fmt::Display for SyncScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

/// What a delta request fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaTarget {
    /// Single-resource delta: one video's threads, page by page.
    Video {
        video_id: String,
        page_token: Option<String>,
    },
    /// Scope-wide incremental delta: a channel's threads changed after a
    /// watermark.
    Channel {
        channel_id: String,
        updated_after: Option<DateTime<Utc>>,
        page_token: Option<String>,
    },
}

/// How the first page of a request is validated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Validation {
    /// Send the client's cached token, if it holds one.
    #[default]
    Cached,
    /// Send this token.
    Etag(String),
    /// Send no token. Full re-reads must not be answered with not-modified.
    Skip,
}

/// A validated delta request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaRequest {
    pub target: DeltaTarget,
    pub validation: Validation,
}

impl DeltaRequest {
    #[must_use]
    pub fn builder() -> DeltaRequestBuilder {
        DeltaRequestBuilder::default()
    }

    /// Key for the client's delta cache.
    #[must_use]
    pub fn cache_key(&self) -> String {
        match &self.target {
            DeltaTarget::Video { video_id, .. } => format!("video:{video_id}"),
            DeltaTarget::Channel { channel_id, .. } => format!("channel:{channel_id}"),
        }
    }

    #[must_use]
    pub fn page_token(&self) -> Option<&str> {
        match &self.target {
            DeltaTarget::Video { page_token, .. } | DeltaTarget::Channel { page_token, .. } => {
                page_token.as_deref()
            }
        }
    }

    /// A request with no watermark re-reads the whole scope.
    #[must_use]
    pub const fn is_full_sync(&self) -> bool {
        match &self.target {
            DeltaTarget::Video { .. } => true,
            DeltaTarget::Channel { updated_after, .. } => updated_after.is_none(),
        }
    }

    /// The same request, one page further.
    #[must_use]
    pub fn next_page(&self, token: impl Into<String>) -> Self {
        let mut next = self.clone();
        match &mut next.target {
            DeltaTarget::Video { page_token, .. } | DeltaTarget::Channel { page_token, .. } => {
                *page_token = Some(token.into());
            }
        }
        next
    }

    /// Translate into the reader's query form.
    #[must_use]
    pub fn to_list_query(&self) -> ListQuery {
        let query = match &self.target {
            DeltaTarget::Video { video_id, .. } => {
                ListQuery::new(COMMENT_THREADS).param("videoId", video_id)
            }
            DeltaTarget::Channel {
                channel_id,
                updated_after,
                ..
            } => {
                let query = ListQuery::new(COMMENT_THREADS)
                    .param("allThreadsRelatedToChannelId", channel_id)
                    .param("order", "time");
                match updated_after {
                    Some(ts) => {
                        query.param("updatedAfter", ts.to_rfc3339_opts(SecondsFormat::Secs, true))
                    }
                    None => query,
                }
            }
        };
        match self.page_token() {
            Some(token) => query.param("pageToken", token),
            None => query,
        }
    }
}

/// Fluent builder for [`DeltaRequest`]. Exactly one of `for_channel` and
/// `for_video` must be called.
#[derive(Debug, Clone, Default)]
pub struct DeltaRequestBuilder {
    channel_id: Option<String>,
    video_id: Option<String>,
    updated_after: Option<DateTime<Utc>>,
    page_token: Option<String>,
    validation: Validation,
}

impl DeltaRequestBuilder {
    #[must_use]
    pub fn for_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    #[must_use]
    pub fn for_video(mut self, video_id: impl Into<String>) -> Self {
        self.video_id = Some(video_id.into());
        self
    }

    #[must_use]
    pub const fn updated_after(mut self, watermark: Option<DateTime<Utc>>) -> Self {
        self.updated_after = watermark;
        self
    }

    #[must_use]
    pub fn with_page_token(mut self, token: Option<String>) -> Self {
        self.page_token = token;
        self
    }

    /// Validate with `etag` when given; otherwise the client's cache decides.
    #[must_use]
    pub fn if_none_match(mut self, etag: Option<String>) -> Self {
        self.validation = etag.map_or(Validation::Cached, Validation::Etag);
        self
    }

    /// Send no validation token at all.
    #[must_use]
    pub fn skip_validation(mut self) -> Self {
        self.validation = Validation::Skip;
        self
    }

    /// Validate and assemble the request.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidRequest` if no target or both targets were
    /// chosen, or a watermark was given for a single-video delta.
    pub fn build(self) -> Result<DeltaRequest, SyncError> {
        let target = match (self.channel_id, self.video_id) {
            (Some(channel_id), None) => DeltaTarget::Channel {
                channel_id,
                updated_after: self.updated_after,
                page_token: self.page_token,
            },
            (None, Some(video_id)) => {
                if self.updated_after.is_some() {
                    return Err(SyncError::InvalidRequest(
                        "updated_after applies to channel deltas only".to_string(),
                    ));
                }
                DeltaTarget::Video {
                    video_id,
                    page_token: self.page_token,
                }
            }
            (None, None) => {
                return Err(SyncError::InvalidRequest(
                    "delta request needs a channel or a video".to_string(),
                ))
            }
            (Some(_), Some(_)) => {
                return Err(SyncError::InvalidRequest(
                    "delta request cannot target both a channel and a video".to_string(),
                ))
            }
        };

        Ok(DeltaRequest {
            target,
            validation: self.validation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_build_channel_delta() {
        let since = Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap();
        let request = DeltaRequest::builder()
            .for_channel("UC1")
            .updated_after(Some(since))
            .with_page_token(Some("p2".to_string()))
            .if_none_match(Some("etag".to_string()))
            .build()
            .unwrap();

        assert!(!request.is_full_sync());
        assert_eq!(request.cache_key(), "channel:UC1");
        assert_eq!(request.validation, Validation::Etag("etag".to_string()));

        let query = request.to_list_query();
        assert_eq!(query.resource, COMMENT_THREADS);
        assert_eq!(query.get("allThreadsRelatedToChannelId"), Some("UC1"));
        assert_eq!(query.get("updatedAfter"), Some("2024-08-01T00:00:00Z"));
        assert_eq!(query.get("pageToken"), Some("p2"));
    }

    #[test]
    fn test_build_video_delta() {
        let request = DeltaRequest::builder().for_video("v1").build().unwrap();
        assert!(request.is_full_sync());
        assert_eq!(request.page_token(), None);

        let next = request.next_page("p2");
        assert_eq!(next.page_token(), Some("p2"));
        assert_eq!(next.to_list_query().get("videoId"), Some("v1"));
    }

    #[test]
    fn test_validation_modes() {
        let cached = DeltaRequest::builder().for_video("v1").build().unwrap();
        assert_eq!(cached.validation, Validation::Cached);

        let none_given = DeltaRequest::builder()
            .for_video("v1")
            .if_none_match(None)
            .build()
            .unwrap();
        assert_eq!(none_given.validation, Validation::Cached);

        let skipped = DeltaRequest::builder()
            .for_channel("UC1")
            .if_none_match(Some("stale".to_string()))
            .skip_validation()
            .build()
            .unwrap();
        assert_eq!(skipped.validation, Validation::Skip);
        assert_eq!(skipped.next_page("p2").validation, Validation::Skip);
    }

    #[test]
    fn test_exactly_one_target() {
        assert!(matches!(
            DeltaRequest::builder().build(),
            Err(SyncError::InvalidRequest(_))
        ));
        assert!(DeltaRequest::builder()
            .for_channel("UC1")
            .for_video("v1")
            .build()
            .is_err());
        assert!(DeltaRequest::builder()
            .for_video("v1")
            .updated_after(Some(Utc::now()))
            .build()
            .is_err());
    }

    #[test]
    fn test_scope_keys() {
        let channel = SyncScope::Channel {
            id: "UC1".to_string(),
        };
        assert_eq!(channel.key(), "channel:UC1");
        assert_eq!(channel.request().build().unwrap().cache_key(), channel.key());

        let video = SyncScope::Video {
            id: "v1".to_string(),
        };
        assert_eq!(video.to_string(), "video:v1");
    }
}
