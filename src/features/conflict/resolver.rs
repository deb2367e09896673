//! Reconciliation of a local entity against its remote counterpart.
//!
//! Everything here is pure: no storage access, no queue mutation. The engine
//! applies the results.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use super::strategy::{ConflictStrategy, ResolutionOutcome, ResolutionResult};
use crate::core::Syncable;
use crate::models::SyncableEntity;

fn or_epoch(ts: Option<DateTime<Utc>>) -> DateTime<Utc> {
    ts.unwrap_or_default()
}

/// Resolve one entity present on both sides.
///
/// Without an unpushed local edit the remote is accepted as is. With one, the
/// remote is only a conflict if it changed after the last sync; otherwise the
/// local edit stands and waits for its push.
#[must_use]
pub fn resolve<T: Syncable>(
    local: &T,
    remote: &T,
    local_meta: &SyncableEntity,
    remote_meta: &SyncableEntity,
    strategy: ConflictStrategy,
) -> ResolutionResult<T> {
    let id = local.entity_id();

    if !local_meta.modified_after_last_sync {
        return ResolutionResult::new(id, Some(remote.clone()), ResolutionOutcome::AcceptedRemote);
    }

    let remote_is_newer =
        or_epoch(remote_meta.remote_updated_at) > or_epoch(local_meta.last_synced_at);
    if !remote_is_newer {
        return ResolutionResult::new(id, Some(local.clone()), ResolutionOutcome::KeptLocal)
            .note("remote unchanged since last sync; local edit pending push");
    }

    let differing = local.differing_fields(remote);
    match strategy {
        ConflictStrategy::RemoteWins => {
            ResolutionResult::new(id, Some(remote.clone()), ResolutionOutcome::AcceptedRemote)
                .conflicted(differing)
                .note("remote wins")
        }
        ConflictStrategy::LocalWins => {
            ResolutionResult::new(id, Some(local.clone()), ResolutionOutcome::KeptLocal)
                .conflicted(differing)
                .note("local wins")
        }
        ConflictStrategy::LastWriteWins => {
            let local_at = or_epoch(local_meta.local_updated_at);
            let remote_at = or_epoch(remote_meta.remote_updated_at);
            if local_at > remote_at {
                ResolutionResult::new(id, Some(local.clone()), ResolutionOutcome::KeptLocal)
                    .conflicted(differing)
                    .note(format!("local write at {local_at} is later than remote {remote_at}"))
            } else {
                ResolutionResult::new(id, Some(remote.clone()), ResolutionOutcome::AcceptedRemote)
                    .conflicted(differing)
                    .note(format!("remote write at {remote_at} is not older than local {local_at}"))
            }
        }
        ConflictStrategy::FieldLevelMerge => {
            let merged = local.merge_fields(remote);
            ResolutionResult::new(id, Some(merged.value), ResolutionOutcome::Merged)
                .conflicted(merged.conflicted)
        }
        ConflictStrategy::Manual => {
            if differing.is_empty() {
                return ResolutionResult::new(
                    id,
                    Some(remote.overlay_local_only(local)),
                    ResolutionOutcome::AcceptedRemote,
                );
            }
            ResolutionResult::new(
                id,
                Some(remote.overlay_local_only(local)),
                ResolutionOutcome::ManualReview,
            )
            .conflicted(differing)
            .note("awaiting manual resolution")
        }
    }
}

/// Resolve an entity where at least one side carries a tombstone.
///
/// A remote tombstone always wins. A local tombstone yields to a remote update
/// made after the local delete; otherwise the local delete stands.
#[must_use]
pub fn resolve_delete_conflict<T: Syncable>(
    local: Option<&T>,
    remote: Option<&T>,
    local_meta: &SyncableEntity,
    remote_meta: &SyncableEntity,
) -> ResolutionResult<T> {
    let id = local_meta.entity_id.as_str();

    if remote_meta.deleted {
        let result = ResolutionResult::new(id, None, ResolutionOutcome::Deleted)
            .note("remote tombstone honored");
        return if local.is_some() {
            ResolutionResult {
                had_conflict: true,
                ..result.note("local copy discarded")
            }
        } else {
            result
        };
    }

    if local_meta.deleted {
        let deleted_at = or_epoch(local_meta.local_updated_at);
        if let Some(remote) = remote {
            if or_epoch(remote_meta.remote_updated_at) > deleted_at {
                let differing = local.map(|l| l.differing_fields(remote)).unwrap_or_default();
                return ResolutionResult {
                    had_conflict: true,
                    conflicted_fields: differing,
                    ..ResolutionResult::new(id, Some(remote.clone()), ResolutionOutcome::Resurrected)
                        .note(format!("remote updated after local delete at {deleted_at}"))
                };
            }
        }
        return ResolutionResult::new(id, None, ResolutionOutcome::Deleted)
            .note("local delete stands");
    }

    match (local, remote) {
        (Some(local), Some(remote)) => resolve(
            local,
            remote,
            local_meta,
            remote_meta,
            ConflictStrategy::default(),
        ),
        (Some(local), None) => {
            ResolutionResult::new(id, Some(local.clone()), ResolutionOutcome::PendingPush)
        }
        (None, Some(remote)) => ResolutionResult::new(id, Some(remote.clone()), ResolutionOutcome::New),
        (None, None) => ResolutionResult::new(id, None, ResolutionOutcome::Deleted),
    }
}

/// Resolve every id present on either side.
///
/// Ids with a tombstone on either side go through
/// [`resolve_delete_conflict`]; local-only ids are kept for push, remote-only
/// ids are accepted as new, and the rest go through [`resolve`]. Results are
/// ordered by id.
#[must_use]
pub fn resolve_batch<T: Syncable>(
    local: &HashMap<String, T>,
    remote: &HashMap<String, T>,
    local_meta: &HashMap<String, SyncableEntity>,
    remote_meta: &HashMap<String, SyncableEntity>,
    strategy: ConflictStrategy,
) -> Vec<ResolutionResult<T>> {
    let ids: BTreeSet<&String> = local
        .keys()
        .chain(remote.keys())
        .chain(local_meta.keys().filter(|id| local_meta[*id].deleted))
        .chain(remote_meta.keys().filter(|id| remote_meta[*id].deleted))
        .collect();

    ids.into_iter()
        .filter_map(|id| {
            let l = local.get(id);
            let r = remote.get(id);
            let entity_type = l.or(r).map(T::entity_type).or_else(|| {
                local_meta
                    .get(id)
                    .or_else(|| remote_meta.get(id))
                    .map(|m| m.entity_type)
            })?;
            let lm = local_meta
                .get(id)
                .cloned()
                .unwrap_or_else(|| SyncableEntity::new(entity_type, id.as_str()));
            let rm = remote_meta
                .get(id)
                .cloned()
                .unwrap_or_else(|| SyncableEntity::new(entity_type, id.as_str()));

            if lm.deleted || rm.deleted {
                return Some(resolve_delete_conflict(l, r, &lm, &rm));
            }

            Some(match (l, r) {
                (Some(l), Some(r)) => resolve(l, r, &lm, &rm, strategy),
                (Some(l), None) => {
                    ResolutionResult::new(id.as_str(), Some(l.clone()), ResolutionOutcome::PendingPush)
                }
                (None, Some(r)) => {
                    ResolutionResult::new(id.as_str(), Some(r.clone()), ResolutionOutcome::New)
                }
                (None, None) => return None,
            })
        })
        .collect()
}
