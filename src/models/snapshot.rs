//! Typed entity snapshots carried by queued operations and remote pages.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{Comment, Video};
use crate::core::{FieldMerge, Syncable};
use crate::error::SyncError;

/// Discriminates the collection an entity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Comment,
    Video,
}

impl EntityType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Comment => "comment",
            Self::Video => "video",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "comment" => Ok(Self::Comment),
            "video" => Ok(Self::Video),
            other => Err(SyncError::LocalCorruption(format!(
                "unknown entity type: {other}"
            ))),
        }
    }
}

/// A full snapshot of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entity_type", content = "data", rename_all = "snake_case")]
pub enum EntitySnapshot {
    Comment(Comment),
    Video(Video),
}

impl From<Comment> for EntitySnapshot {
    fn from(comment: Comment) -> Self {
        Self::Comment(comment)
    }
}

impl From<Video> for EntitySnapshot {
    fn from(video: Video) -> Self {
        Self::Video(video)
    }
}

impl Syncable for EntitySnapshot {
    fn entity_id(&self) -> &str {
        match self {
            Self::Comment(c) => c.entity_id(),
            Self::Video(v) => v.entity_id(),
        }
    }

    fn entity_type(&self) -> EntityType {
        match self {
            Self::Comment(_) => EntityType::Comment,
            Self::Video(_) => EntityType::Video,
        }
    }

    fn merge_fields(&self, remote: &Self) -> FieldMerge<Self> {
        match (self, remote) {
            (Self::Comment(l), Self::Comment(r)) => {
                let merged = l.merge_fields(r);
                FieldMerge {
                    value: Self::Comment(merged.value),
                    conflicted: merged.conflicted,
                }
            }
            (Self::Video(l), Self::Video(r)) => {
                let merged = l.merge_fields(r);
                FieldMerge {
                    value: Self::Video(merged.value),
                    conflicted: merged.conflicted,
                }
            }
            _ => FieldMerge {
                value: remote.clone(),
                conflicted: vec!["entityType".to_string()],
            },
        }
    }

    fn overlay_local_only(&self, local: &Self) -> Self {
        match (self, local) {
            (Self::Comment(r), Self::Comment(l)) => Self::Comment(r.overlay_local_only(l)),
            (Self::Video(r), Self::Video(l)) => Self::Video(r.overlay_local_only(l)),
            _ => self.clone(),
        }
    }

    fn without_local_only(&self) -> Self {
        match self {
            Self::Comment(c) => Self::Comment(c.without_local_only()),
            Self::Video(v) => Self::Video(v.without_local_only()),
        }
    }
}
