//! Merge utilities for sync.
//!
//! Two levels of merging happen during a cycle:
//! - item level: the `merge` resolution combines two versions of one item
//!   by concatenating their bodies under a remote-version banner
//! - snapshot level: the collections of the local and remote snapshots are
//!   combined into the snapshot that gets pushed and persisted

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};

use crate::error::{SyncError, SyncResult};
use crate::models::{Collections, ItemValue, Snapshot, SyncItem};

/// Banner separating the local body from the appended remote body
pub const REMOTE_BANNER: &str = "--- REMOTE VERSION ---";

/// How the collections of two snapshots are combined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Take every collection from whichever snapshot was captured later
    /// (local on a tie). Resolved conflicts do not alter the result.
    #[default]
    Snapshot,
    /// Union both snapshots by item ID; items present on both sides take
    /// the resolved winner.
    PerItem,
}

/// Concatenate two bodies, local first, remote after the banner.
///
/// The local body is kept byte for byte; a blank line is added before the
/// banner only when the local body does not already end with one.
pub fn merge_bodies(local: &str, remote: &str) -> String {
    if local == remote {
        return local.to_string();
    }
    let separator = if local.is_empty() || local.ends_with("\n\n") {
        ""
    } else if local.ends_with('\n') {
        "\n"
    } else {
        "\n\n"
    };
    format!("{}{}{}\n\n{}", local, separator, REMOTE_BANNER, remote)
}

fn union(local: &BTreeSet<String>, remote: &BTreeSet<String>) -> BTreeSet<String> {
    local.union(remote).cloned().collect()
}

fn remote_is_newer(local: DateTime<Utc>, remote: DateTime<Utc>) -> bool {
    remote > local
}

/// Merge two versions of the same item.
///
/// Bodies are concatenated, tag sets unioned and flags OR'd. Scalar fields
/// (title, name, category, command, source) come from the side with the
/// later update time, local on a tie. The result is stamped with the
/// current time so it supersedes both inputs on the next cycle.
pub fn merge_items(local: &ItemValue, remote: &ItemValue) -> SyncResult<ItemValue> {
    let now = Utc::now();
    match (local, remote) {
        (ItemValue::Note(l), ItemValue::Note(r)) => {
            let newer = if remote_is_newer(l.updated_at, r.updated_at) { r } else { l };
            let mut merged = newer.clone();
            merged.id = l.id.clone();
            merged.content = merge_bodies(&l.content, &r.content);
            merged.tags = union(&l.tags, &r.tags);
            merged.favorite = l.favorite || r.favorite;
            merged.created_at = l.created_at.min(r.created_at);
            merged.updated_at = now;
            Ok(ItemValue::Note(merged))
        }
        (ItemValue::App(l), ItemValue::App(r)) => {
            let newer = if remote_is_newer(l.updated_at, r.updated_at) { r } else { l };
            let mut merged = newer.clone();
            merged.id = l.id.clone();
            merged.description = merge_bodies(&l.description, &r.description);
            merged.tags = union(&l.tags, &r.tags);
            merged.favorite = l.favorite || r.favorite;
            merged.updated_at = now;
            Ok(ItemValue::App(merged))
        }
        (ItemValue::CheatSheet(l), ItemValue::CheatSheet(r)) => {
            let newer = if remote_is_newer(l.updated_at, r.updated_at) { r } else { l };
            let mut merged = newer.clone();
            merged.id = l.id.clone();
            merged.content = merge_bodies(&l.content, &r.content);
            merged.tags = union(&l.tags, &r.tags);
            merged.updated_at = now;
            Ok(ItemValue::CheatSheet(merged))
        }
        _ => Err(SyncError::Other(format!(
            "Cannot merge {} {} with {} {}",
            local.kind(),
            local.id(),
            remote.kind(),
            remote.id()
        ))),
    }
}

fn add_missing<T: SyncItem>(target: &mut Vec<T>, source: &[T]) {
    let present: HashSet<String> = target.iter().map(|i| i.item_id().to_string()).collect();
    target.extend(
        source
            .iter()
            .filter(|i| !present.contains(i.item_id()))
            .cloned(),
    );
}

/// Combine a local and a remote snapshot.
///
/// `resolved` holds the winning version of every conflict resolved in this
/// cycle and is only consulted by [`MergeStrategy::PerItem`]. The result
/// carries the local snapshot's metadata and an empty checksum; the caller
/// must seal it before use.
pub fn merge_snapshots(
    local: &Snapshot,
    remote: &Snapshot,
    strategy: MergeStrategy,
    resolved: &[ItemValue],
) -> Snapshot {
    let collections = match strategy {
        MergeStrategy::Snapshot => {
            if remote.timestamp > local.timestamp {
                remote.collections.clone()
            } else {
                local.collections.clone()
            }
        }
        MergeStrategy::PerItem => {
            let mut merged: Collections = local.collections.clone();
            add_missing(&mut merged.apps, &remote.collections.apps);
            add_missing(&mut merged.notes, &remote.collections.notes);
            add_missing(&mut merged.cheat_sheets, &remote.collections.cheat_sheets);
            for value in resolved {
                merged.upsert(value.clone());
            }
            merged
        }
    };

    Snapshot {
        version: local.version.clone(),
        timestamp: local.timestamp,
        device_id: local.device_id.clone(),
        collections,
        checksum: String::new(),
    }
}

/// Get a human-readable line diff between two versions of a body.
pub fn diff_preview(local: &str, remote: &str) -> String {
    let diff = TextDiff::from_lines(local, remote);

    let mut output = String::from("--- Local\n+++ Remote\n");
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "-",
            ChangeTag::Insert => "+",
            ChangeTag::Equal => " ",
        };
        output.push_str(sign);
        output.push_str(change.value());
        if change.missing_newline() {
            output.push('\n');
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppDefinition, Note};
    use chrono::Duration;

    fn note(id: &str, content: &str, updated_at: DateTime<Utc>) -> Note {
        Note {
            id: id.to_string(),
            title: format!("title {}", content),
            content: content.to_string(),
            category: String::new(),
            tags: BTreeSet::new(),
            favorite: false,
            created_at: updated_at,
            updated_at,
        }
    }

    #[test]
    fn test_merge_bodies_appends_remote_after_banner() {
        let merged = merge_bodies("local text", "remote text");
        assert!(merged.starts_with("local text"));
        let banner_at = merged.find(REMOTE_BANNER).unwrap();
        let remote_at = merged.find("remote text").unwrap();
        assert!(banner_at < remote_at);
    }

    #[test]
    fn test_merge_bodies_keeps_local_verbatim() {
        assert_eq!(
            merge_bodies("local", "remote"),
            format!("local\n\n{}\n\nremote", REMOTE_BANNER)
        );
        assert_eq!(
            merge_bodies("local  \n", "remote"),
            format!("local  \n\n{}\n\nremote", REMOTE_BANNER)
        );
        assert_eq!(
            merge_bodies("local\n\n", "remote"),
            format!("local\n\n{}\n\nremote", REMOTE_BANNER)
        );
    }

    #[test]
    fn test_merge_bodies_identical() {
        assert_eq!(merge_bodies("same", "same"), "same");
    }

    #[test]
    fn test_merge_notes() {
        let t0 = Utc::now() - Duration::hours(2);
        let mut local = note("n1", "A", t0);
        local.tags = ["rust".to_string()].into_iter().collect();
        local.category = "local-cat".to_string();
        let mut remote = note("n1", "B", t0 + Duration::hours(1));
        remote.tags = ["go".to_string(), "rust".to_string()].into_iter().collect();
        remote.favorite = true;
        remote.category = "remote-cat".to_string();

        let merged = merge_items(&ItemValue::Note(local), &ItemValue::Note(remote)).unwrap();
        let ItemValue::Note(merged) = merged else {
            panic!("expected a note");
        };

        assert!(merged.content.starts_with("A"));
        assert!(merged.content.contains(REMOTE_BANNER));
        assert!(merged.content.ends_with("B"));
        assert_eq!(merged.tags.len(), 2);
        assert!(merged.favorite);
        // Remote is newer, so its scalar fields win
        assert_eq!(merged.category, "remote-cat");
        assert_eq!(merged.title, "title B");
        assert!(merged.updated_at > t0 + Duration::hours(1));
    }

    #[test]
    fn test_merge_scalars_tie_prefers_local() {
        let t0 = Utc::now();
        let local = note("n1", "A", t0);
        let remote = note("n1", "B", t0);

        let merged = merge_items(&ItemValue::Note(local), &ItemValue::Note(remote)).unwrap();
        let ItemValue::Note(merged) = merged else {
            panic!("expected a note");
        };
        assert_eq!(merged.title, "title A");
    }

    #[test]
    fn test_merge_apps_uses_description_as_body() {
        let t0 = Utc::now() - Duration::hours(1);
        let mut local = AppDefinition::new("htop", "htop");
        local.description = "process viewer".to_string();
        local.updated_at = t0 + Duration::minutes(5);
        let mut remote = local.clone();
        remote.description = "interactive top".to_string();
        remote.command = "htop -d 5".to_string();
        remote.updated_at = t0;

        let merged = merge_items(&ItemValue::App(local), &ItemValue::App(remote)).unwrap();
        let ItemValue::App(merged) = merged else {
            panic!("expected an app");
        };
        assert!(merged.description.contains("process viewer"));
        assert!(merged.description.contains("interactive top"));
        // Local is newer
        assert_eq!(merged.command, "htop");
    }

    #[test]
    fn test_merge_mismatched_kinds_fails() {
        let n = note("x", "A", Utc::now());
        let a = AppDefinition::new("x", "x");
        assert!(merge_items(&ItemValue::Note(n), &ItemValue::App(a)).is_err());
    }

    fn snapshot_with(notes: Vec<Note>, timestamp: DateTime<Utc>) -> Snapshot {
        let mut snapshot = Snapshot::new("dev", Collections::default());
        snapshot.collections.notes = notes;
        snapshot.timestamp = timestamp;
        snapshot
    }

    #[test]
    fn test_snapshot_strategy_prefers_later_capture() {
        let t0 = Utc::now();
        let local = snapshot_with(vec![note("a", "local", t0)], t0);
        let remote = snapshot_with(vec![note("b", "remote", t0)], t0 + Duration::seconds(1));

        let merged = merge_snapshots(&local, &remote, MergeStrategy::Snapshot, &[]);
        assert_eq!(merged.collections.notes.len(), 1);
        assert_eq!(merged.collections.notes[0].id, "b");
        assert_eq!(merged.device_id, local.device_id);
        assert!(merged.checksum.is_empty());
    }

    #[test]
    fn test_snapshot_strategy_keeps_local_when_remote_older() {
        let t0 = Utc::now();
        let local = snapshot_with(vec![note("a", "local", t0)], t0);
        let remote = snapshot_with(vec![note("b", "remote", t0)], t0 - Duration::hours(1));

        let merged = merge_snapshots(&local, &remote, MergeStrategy::Snapshot, &[]);
        assert_eq!(merged.collections.notes.len(), 1);
        assert_eq!(merged.collections.notes[0].id, "a");
    }

    #[test]
    fn test_snapshot_strategy_ignores_resolutions() {
        let t0 = Utc::now();
        let local = snapshot_with(vec![note("a", "local", t0)], t0);
        let remote = snapshot_with(vec![], t0 - Duration::hours(1));
        let winner = ItemValue::Note(note("a", "winner", t0));

        let merged = merge_snapshots(&local, &remote, MergeStrategy::Snapshot, &[winner]);
        assert_eq!(merged.collections.notes[0].content, "local");
    }

    #[test]
    fn test_per_item_strategy_unions_and_applies_winners() {
        let t0 = Utc::now();
        let local = snapshot_with(vec![note("a", "local a", t0), note("c", "shared", t0)], t0);
        let remote = snapshot_with(
            vec![note("b", "remote b", t0), note("c", "remote c", t0)],
            t0 + Duration::hours(1),
        );
        let winner = ItemValue::Note(note("c", "remote c", t0));

        let merged = merge_snapshots(&local, &remote, MergeStrategy::PerItem, &[winner]);
        let mut ids: Vec<&str> = merged.collections.notes.iter().map(|n| n.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "b", "c"]);
        let c = merged.collections.notes.iter().find(|n| n.id == "c").unwrap();
        assert_eq!(c.content, "remote c");
    }

    #[test]
    fn test_diff_preview() {
        let preview = diff_preview("line 1\nline 2\n", "line 1\nline 2 modified\n");
        assert!(preview.starts_with("--- Local\n+++ Remote\n"));
        assert!(preview.contains("-line 2\n"));
        assert!(preview.contains("+line 2 modified\n"));
    }
}
