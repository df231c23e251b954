//! Conflict detection and resolution for sync.
//!
//! This module handles:
//! - Detecting items that diverged between a local and a remote snapshot
//! - Resolving a conflict with a user-chosen policy (keep local, keep
//!   remote, merge, skip)
//! - Automatic last-writer-wins resolution used by background cycles

use std::collections::HashMap;

use crate::error::SyncResult;
use crate::merge::merge_items;
use crate::models::{ConflictItem, ItemValue, Resolution, Snapshot, SyncItem};

/// A conflict together with the policy applied to it and its outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConflict {
    pub conflict: ConflictItem,
    pub resolution: Resolution,
    /// The surviving version, `None` when the conflict was skipped
    pub value: Option<ItemValue>,
}

fn detect_in<T: SyncItem>(local: &[T], remote: &[T], out: &mut Vec<ConflictItem>) {
    let mut remote_by_id: HashMap<&str, &T> = HashMap::with_capacity(remote.len());
    for item in remote {
        remote_by_id.entry(item.item_id()).or_insert(item);
    }

    let mut local_sorted: Vec<&T> = local.iter().collect();
    local_sorted.sort_by(|a, b| a.item_id().cmp(b.item_id()));
    local_sorted.dedup_by(|a, b| a.item_id() == b.item_id());

    for local_item in local_sorted {
        let Some(remote_item) = remote_by_id.get(local_item.item_id()) else {
            continue;
        };
        if local_item.updated_at() != remote_item.updated_at() {
            out.push(ConflictItem::new(
                local_item.clone().into_value(),
                (*remote_item).clone().into_value(),
            ));
        }
    }
}

/// Find every item present in both snapshots whose update times differ.
///
/// Items that exist on only one side are not conflicts. Conflicts are
/// returned notes first, then apps, then cheat sheets, each by ascending ID.
pub fn detect_conflicts(local: &Snapshot, remote: &Snapshot) -> Vec<ConflictItem> {
    let mut conflicts = Vec::new();
    detect_in(
        &local.collections.notes,
        &remote.collections.notes,
        &mut conflicts,
    );
    detect_in(
        &local.collections.apps,
        &remote.collections.apps,
        &mut conflicts,
    );
    detect_in(
        &local.collections.cheat_sheets,
        &remote.collections.cheat_sheets,
        &mut conflicts,
    );
    conflicts
}

/// Apply a policy to one conflict and return the surviving version.
///
/// Returns `Ok(None)` for [`Resolution::Skip`]: nothing changes and the
/// conflict stays pending.
pub fn resolve(conflict: &ConflictItem, resolution: Resolution) -> SyncResult<Option<ItemValue>> {
    let value = match resolution {
        Resolution::KeepLocal => Some(conflict.local.clone()),
        Resolution::KeepRemote => Some(conflict.remote.clone()),
        Resolution::Merge => Some(merge_items(&conflict.local, &conflict.remote)?),
        Resolution::Skip => None,
    };
    Ok(value)
}

/// The last-writer-wins choice for a conflict.
///
/// Local wins when its update time is strictly later or equal; remote wins
/// only when strictly later.
pub fn last_writer_wins(conflict: &ConflictItem) -> Resolution {
    if conflict.remote.updated_at() > conflict.local.updated_at() {
        Resolution::KeepRemote
    } else {
        Resolution::KeepLocal
    }
}

/// Resolve every conflict with last-writer-wins.
pub fn auto_resolve(conflicts: &[ConflictItem]) -> Vec<ResolvedConflict> {
    conflicts
        .iter()
        .map(|conflict| {
            let resolution = last_writer_wins(conflict);
            let value = match resolution {
                Resolution::KeepRemote => conflict.remote.clone(),
                _ => conflict.local.clone(),
            };
            ResolvedConflict {
                conflict: conflict.clone(),
                resolution,
                value: Some(value),
            }
        })
        .collect()
}
