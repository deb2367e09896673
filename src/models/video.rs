use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EntityType;
use crate::core::{FieldMerge, FieldMerger, Syncable};

/// A video owned by a synchronized channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: String,
    pub channel_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub view_count: u64,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub comment_count: u64,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_starred: bool,
}

impl Syncable for Video {
    fn entity_id(&self) -> &str {
        &self.id
    }

    fn entity_type(&self) -> EntityType {
        EntityType::Video
    }

    fn merge_fields(&self, remote: &Self) -> FieldMerge<Self> {
        let mut m = FieldMerger::new();
        let merged = Self {
            id: m.server_owned("id", &self.id, &remote.id),
            channel_id: m.server_owned("channelId", &self.channel_id, &remote.channel_id),
            title: m.user_text("title", &self.title, &remote.title),
            description: m.user_text("description", &self.description, &remote.description),
            view_count: m.counter_max("viewCount", self.view_count, remote.view_count),
            like_count: m.counter_max("likeCount", self.like_count, remote.like_count),
            comment_count: m.server_owned(
                "commentCount",
                &self.comment_count,
                &remote.comment_count,
            ),
            published_at: m.server_owned("publishedAt", &self.published_at, &remote.published_at),
            updated_at: m.latest_timestamp("updatedAt", self.updated_at, remote.updated_at),
            is_starred: m.local_only("isStarred", &self.is_starred),
        };
        m.finish(merged)
    }

    fn overlay_local_only(&self, local: &Self) -> Self {
        Self {
            is_starred: local.is_starred,
            ..self.clone()
        }
    }

    fn without_local_only(&self) -> Self {
        Self {
            is_starred: false,
            ..self.clone()
        }
    }
}
