//! Operation types for the sync queue.
//!
//! A [`SyncOperation`] is one mutation intent waiting to be sent to the remote.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SyncError;
use crate::models::{EntitySnapshot, EntityType};

/// The kind of mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpType {
    Create,
    Update,
    Delete,
}

impl OpType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Whether the operation must carry an entity snapshot.
    #[must_use]
    pub const fn needs_payload(self) -> bool {
        !matches!(self, Self::Delete)
    }
}

impl std::fmt::Display for OpType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(SyncError::InvalidRequest(format!(
                "unknown operation type: {other}"
            ))),
        }
    }
}

/// Status of a queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Waiting to be executed
    Pending,
    /// Currently being executed
    InProgress,
    /// Acknowledged by the remote
    Completed,
    /// Failed, waiting for `next_attempt_at`
    Failed,
    /// Collapsed away by a later intent
    Cancelled,
    /// Retry budget exhausted or rejected outright
    DeadLetter,
}

impl OperationStatus {
    pub const ALL: [Self; 6] = [
        Self::Pending,
        Self::InProgress,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
        Self::DeadLetter,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::DeadLetter => "dead_letter",
        }
    }

    /// Check if this status is terminal (no more action without a human).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::DeadLetter)
    }

    /// Counted towards the queue length.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::InProgress | Self::Failed)
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| SyncError::InvalidRequest(format!("unknown operation status: {s}")))
    }
}

/// A queued mutation intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOperation {
    pub id: String,
    pub op_type: OpType,
    pub entity_type: EntityType,
    pub entity_id: String,
    /// Snapshot at enqueue time; absent for deletes.
    #[serde(default)]
    pub payload: Option<EntitySnapshot>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub next_attempt_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
    pub status: OperationStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Higher runs sooner.
    #[serde(default)]
    pub priority: i32,
    /// When the operation was first handed to the remote. Survives retries
    /// and crash recovery.
    #[serde(default)]
    pub first_sent_at: Option<DateTime<Utc>>,
}

impl SyncOperation {
    /// Create a new pending operation with a fresh id.
    #[must_use]
    pub fn new(
        op_type: OpType,
        entity_type: EntityType,
        entity_id: impl Into<String>,
        payload: Option<EntitySnapshot>,
        priority: i32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            op_type,
            entity_type,
            entity_id: entity_id.into(),
            payload,
            attempts: 0,
            next_attempt_at: None,
            last_error: None,
            status: OperationStatus::Pending,
            created_at: now,
            completed_at: None,
            priority,
            first_sent_at: None,
        }
    }

    /// Eligible for dispatch at `now`.
    #[must_use]
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            OperationStatus::Pending => true,
            OperationStatus::Failed => self.next_attempt_at.map_or(true, |at| at <= now),
            _ => false,
        }
    }

    /// A waiting create that was never dispatched, so the remote cannot know
    /// the entity.
    #[must_use]
    pub fn is_unsent_create(&self) -> bool {
        self.op_type == OpType::Create
            && self.status == OperationStatus::Pending
            && self.first_sent_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Comment;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn snapshot() -> EntitySnapshot {
        Comment {
            id: "c1".to_string(),
            video_id: "v1".to_string(),
            channel_id: "ch1".to_string(),
            parent_id: Some("c0".to_string()),
            author_name: "Ana".to_string(),
            author_channel_id: Some("UCana".to_string()),
            text: "hello".to_string(),
            like_count: 2,
            reply_count: 0,
            published_at: now(),
            updated_at: Some(now()),
            is_bookmarked: true,
        }
        .into()
    }

    #[test]
    fn test_operation_status_terminal() {
        assert!(OperationStatus::Completed.is_terminal());
        assert!(OperationStatus::DeadLetter.is_terminal());
        assert!(OperationStatus::Cancelled.is_terminal());
        assert!(!OperationStatus::Failed.is_terminal());
        assert!(!OperationStatus::Pending.is_terminal());
        assert!(OperationStatus::InProgress.is_active());
    }

    #[test]
    fn test_status_parse() {
        for status in OperationStatus::ALL {
            assert_eq!(status.as_str().parse::<OperationStatus>().unwrap(), status);
        }
        assert_eq!(
            "dead-letter".parse::<OperationStatus>().unwrap(),
            OperationStatus::DeadLetter
        );
        assert!("skipped".parse::<OperationStatus>().is_err());
    }

    #[test]
    fn test_is_ready() {
        let mut op = SyncOperation::new(OpType::Update, EntityType::Comment, "c1", None, 0, now());
        assert!(op.is_ready(now()));

        op.status = OperationStatus::Failed;
        op.next_attempt_at = Some(now() + chrono::Duration::seconds(5));
        assert!(!op.is_ready(now()));
        assert!(op.is_ready(now() + chrono::Duration::seconds(5)));

        op.status = OperationStatus::InProgress;
        assert!(!op.is_ready(now() + chrono::Duration::hours(1)));
    }

    #[test]
    fn test_json_round_trip() {
        let mut op = SyncOperation::new(
            OpType::Create,
            EntityType::Comment,
            "c1",
            Some(snapshot()),
            3,
            now(),
        );
        op.attempts = 2;
        op.next_attempt_at = Some(now());
        op.last_error = Some("timeout".to_string());
        op.status = OperationStatus::Failed;

        let json = serde_json::to_string(&op).unwrap();
        let back: SyncOperation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, op);
    }

    #[test]
    fn test_json_defaults_on_absence() {
        let json = r#"{
            "id": "op-1",
            "opType": "delete",
            "entityType": "comment",
            "entityId": "c1",
            "status": "pending",
            "createdAt": "2024-05-01T12:00:00Z"
        }"#;
        let op: SyncOperation = serde_json::from_str(json).unwrap();
        assert_eq!(op.attempts, 0);
        assert_eq!(op.priority, 0);
        assert!(op.payload.is_none());
        assert!(!op.is_unsent_create());
        assert!(op.first_sent_at.is_none());
    }

    #[test]
    fn test_dispatched_create_is_never_unsent_again() {
        let mut op = SyncOperation::new(
            OpType::Create,
            EntityType::Comment,
            "c1",
            Some(snapshot()),
            0,
            now(),
        );
        assert!(op.is_unsent_create());

        // Requeued after a dead letter or a crash: back to pending, no attempts.
        op.first_sent_at = Some(now());
        op.attempts = 0;
        op.status = OperationStatus::Pending;
        assert!(!op.is_unsent_create());
    }
}
