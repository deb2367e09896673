//! Shared traits for synchronized entities.
//!
//! [`Syncable`] is what the conflict resolver needs from an entity, and
//! [`FieldMerger`] implements the per-field merge policies once so each
//! entity only has to declare which policy applies to which field.

use chrono::{DateTime, Utc};

use crate::models::EntityType;

/// Outcome of a field-by-field merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMerge<T> {
    /// The merged value.
    pub value: T,
    /// Wire names of fields whose local and remote values differed.
    pub conflicted: Vec<String>,
}

/// An entity that can be reconciled between the local replica and the remote.
pub trait Syncable: Clone + PartialEq + std::fmt::Debug {
    /// The entity's stable identifier.
    fn entity_id(&self) -> &str;

    /// The collection the entity belongs to.
    fn entity_type(&self) -> EntityType;

    /// Merge `self` (local) with `remote` using per-field policies.
    fn merge_fields(&self, remote: &Self) -> FieldMerge<Self>;

    /// Return `self` (remote) with the local-only fields taken from `local`.
    #[must_use]
    fn overlay_local_only(&self, local: &Self) -> Self;

    /// Return `self` with the local-only fields reset, as sent to the remote.
    #[must_use]
    fn without_local_only(&self) -> Self;

    /// Wire names of shared fields whose values differ from `other`.
    fn differing_fields(&self, other: &Self) -> Vec<String> {
        self.merge_fields(other).conflicted
    }
}

/// Accumulates merged field values and records which fields conflicted.
///
/// Every policy flags the field when the two sides differ, except
/// [`FieldMerger::local_only`]: the remote never owns those, so a difference
/// is not a conflict.
#[derive(Debug, Default)]
pub struct FieldMerger {
    conflicted: Vec<String>,
}

impl FieldMerger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn flag_if<T: PartialEq>(&mut self, field: &str, local: &T, remote: &T) {
        if local != remote {
            self.conflicted.push(field.to_string());
        }
    }

    /// User-editable content: the local value wins.
    pub fn user_text<T: PartialEq + Clone>(&mut self, field: &str, local: &T, remote: &T) -> T {
        self.flag_if(field, local, remote);
        local.clone()
    }

    /// Monotonic counter: the larger value wins.
    pub fn counter_max<T: Ord + Copy>(&mut self, field: &str, local: T, remote: T) -> T {
        self.flag_if(field, &local, &remote);
        local.max(remote)
    }

    /// Server-authoritative value: the remote wins.
    pub fn server_owned<T: PartialEq + Clone>(&mut self, field: &str, local: &T, remote: &T) -> T {
        self.flag_if(field, local, remote);
        remote.clone()
    }

    /// Timestamp: the most recent non-null value wins.
    pub fn latest_timestamp(
        &mut self,
        field: &str,
        local: Option<DateTime<Utc>>,
        remote: Option<DateTime<Utc>>,
    ) -> Option<DateTime<Utc>> {
        self.flag_if(field, &local, &remote);
        match (local, remote) {
            (Some(l), Some(r)) => Some(l.max(r)),
            (l, r) => l.or(r),
        }
    }

    /// Local-only state: never taken from the remote, never a conflict.
    pub fn local_only<T: Clone>(&mut self, _field: &str, local: &T) -> T {
        local.clone()
    }

    /// Finish the merge with the assembled value.
    pub fn finish<T>(self, value: T) -> FieldMerge<T> {
        FieldMerge {
            value,
            conflicted: self.conflicted,
        }
    }
}
