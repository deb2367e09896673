use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EntityType;
use crate::core::{FieldMerge, FieldMerger, Syncable};

/// A comment (top-level or reply) on a video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub video_id: String,
    pub channel_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub author_name: String,
    #[serde(default)]
    pub author_channel_id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub reply_count: u64,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Never sent to nor taken from the remote; cleared on outbound payloads.
    #[serde(default)]
    pub is_bookmarked: bool,
}

impl Comment {
    #[must_use]
    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }
}

impl Syncable for Comment {
    fn entity_id(&self) -> &str {
        &self.id
    }

    fn entity_type(&self) -> EntityType {
        EntityType::Comment
    }

    fn merge_fields(&self, remote: &Self) -> FieldMerge<Self> {
        let mut m = FieldMerger::new();
        let merged = Self {
            id: m.server_owned("id", &self.id, &remote.id),
            video_id: m.server_owned("videoId", &self.video_id, &remote.video_id),
            channel_id: m.server_owned("channelId", &self.channel_id, &remote.channel_id),
            parent_id: m.server_owned("parentId", &self.parent_id, &remote.parent_id),
            author_name: m.server_owned("authorName", &self.author_name, &remote.author_name),
            author_channel_id: m.server_owned(
                "authorChannelId",
                &self.author_channel_id,
                &remote.author_channel_id,
            ),
            text: m.user_text("text", &self.text, &remote.text),
            like_count: m.counter_max("likeCount", self.like_count, remote.like_count),
            reply_count: m.server_owned("replyCount", &self.reply_count, &remote.reply_count),
            published_at: m.server_owned("publishedAt", &self.published_at, &remote.published_at),
            updated_at: m.latest_timestamp("updatedAt", self.updated_at, remote.updated_at),
            is_bookmarked: m.local_only("isBookmarked", &self.is_bookmarked),
        };
        m.finish(merged)
    }

    fn overlay_local_only(&self, local: &Self) -> Self {
        Self {
            is_bookmarked: local.is_bookmarked,
            ..self.clone()
        }
    }

    fn without_local_only(&self) -> Self {
        Self {
            is_bookmarked: false,
            ..self.clone()
        }
    }
}
