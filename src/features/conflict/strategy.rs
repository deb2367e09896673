//! Conflict strategies and resolution results.

use serde::{Deserialize, Serialize};

/// How to settle an entity that changed on both sides since the last sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Take the remote entity.
    RemoteWins,
    /// Keep the local entity.
    LocalWins,
    /// Take whichever side was written last.
    LastWriteWins,
    /// Merge per field: user text stays local, counters take the maximum,
    /// server fields come from the remote, local-only fields stay local.
    #[default]
    FieldLevelMerge,
    /// Take the remote entity with local-only fields kept, and flag it for a
    /// human decision.
    Manual,
}

impl ConflictStrategy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RemoteWins => "remote_wins",
            Self::LocalWins => "local_wins",
            Self::LastWriteWins => "last_write_wins",
            Self::FieldLevelMerge => "field_level_merge",
            Self::Manual => "manual",
        }
    }
}

impl std::fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which way a resolution went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionOutcome {
    /// The remote entity replaces the local one.
    AcceptedRemote,
    /// The local entity stands; any pending push still applies.
    KeptLocal,
    /// A field-level merge of both sides.
    Merged,
    /// Remote written locally, left for a human decision.
    ManualReview,
    /// The entity is gone.
    Deleted,
    /// A stale local delete was overridden by a newer remote update.
    Resurrected,
    /// Present remotely only.
    New,
    /// Present locally only; waiting to be pushed.
    PendingPush,
}

/// Result of resolving one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionResult<T> {
    pub entity_id: String,
    /// `None` when the entity should not exist locally.
    pub resolved: Option<T>,
    pub had_conflict: bool,
    /// Wire names of fields that differed between the two sides.
    pub conflicted_fields: Vec<String>,
    pub notes: Vec<String>,
    pub outcome: ResolutionOutcome,
}

impl<T> ResolutionResult<T> {
    pub(crate) fn new(
        entity_id: impl Into<String>,
        resolved: Option<T>,
        outcome: ResolutionOutcome,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            resolved,
            had_conflict: false,
            conflicted_fields: Vec::new(),
            notes: Vec::new(),
            outcome,
        }
    }

    pub(crate) fn conflicted(mut self, fields: Vec<String>) -> Self {
        self.had_conflict = !fields.is_empty();
        self.conflicted_fields = fields;
        self
    }

    pub(crate) fn note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}
