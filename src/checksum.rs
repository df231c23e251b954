//! Snapshot integrity checksums.
//!
//! The digest is SHA-256 over a canonical JSON encoding of the snapshot.
//! Collections are sorted by item ID before encoding and tag sets are
//! ordered, so the in-memory order of items never affects the result.
//! Items sharing an ID and update time are ordered by their encoded bytes.
//! The checksum field itself is excluded.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::SyncResult;
use crate::models::{AppDefinition, CheatSheet, Note, Snapshot, SyncItem};

#[derive(Serialize)]
struct CanonicalSnapshot<'a> {
    version: &'a str,
    timestamp: &'a DateTime<Utc>,
    device_id: &'a str,
    apps: Vec<&'a AppDefinition>,
    notes: Vec<&'a Note>,
    cheat_sheets: Vec<&'a CheatSheet>,
}

fn sorted<T: SyncItem + Serialize>(items: &[T]) -> SyncResult<Vec<&T>> {
    let mut keyed = Vec::with_capacity(items.len());
    for item in items {
        keyed.push((item, serde_json::to_vec(item)?));
    }
    keyed.sort_by(|(a, a_bytes), (b, b_bytes)| {
        a.item_id()
            .cmp(b.item_id())
            .then_with(|| a.updated_at().cmp(&b.updated_at()))
            .then_with(|| a_bytes.cmp(b_bytes))
    });
    Ok(keyed.into_iter().map(|(item, _)| item).collect())
}

/// Hex-encoded SHA-256 of arbitrary bytes
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Serialize a snapshot into its canonical byte form
pub fn canonical_bytes(snapshot: &Snapshot) -> SyncResult<Vec<u8>> {
    let canonical = CanonicalSnapshot {
        version: &snapshot.version,
        timestamp: &snapshot.timestamp,
        device_id: &snapshot.device_id,
        apps: sorted(&snapshot.collections.apps)?,
        notes: sorted(&snapshot.collections.notes)?,
        cheat_sheets: sorted(&snapshot.collections.cheat_sheets)?,
    };
    Ok(serde_json::to_vec(&canonical)?)
}

/// Compute the checksum of a snapshot (64 hex characters)
pub fn compute_checksum(snapshot: &Snapshot) -> SyncResult<String> {
    let bytes = canonical_bytes(snapshot)?;
    Ok(sha256_hex(&bytes))
}

/// Recompute and store the snapshot's checksum
pub fn seal(snapshot: &mut Snapshot) -> SyncResult<()> {
    snapshot.checksum = compute_checksum(snapshot)?;
    Ok(())
}

/// Check a snapshot's stored checksum against its contents
pub fn verify(snapshot: &Snapshot) -> SyncResult<bool> {
    Ok(compute_checksum(snapshot)? == snapshot.checksum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Collections;
    use chrono::TimeZone;

    fn fixed_note(id: &str, content: &str, tags: &[&str]) -> Note {
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        Note {
            id: id.to_string(),
            title: format!("title {}", id),
            content: content.to_string(),
            category: String::new(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            favorite: false,
            created_at: ts,
            updated_at: ts,
        }
    }

    fn fixed_snapshot(notes: Vec<Note>) -> Snapshot {
        Snapshot {
            version: "1.0".to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap(),
            device_id: "device".to_string(),
            collections: Collections {
                notes,
                ..Default::default()
            },
            checksum: String::new(),
        }
    }

    #[test]
    fn test_checksum_is_hex_sha256() {
        let checksum = compute_checksum(&fixed_snapshot(vec![])).unwrap();
        assert_eq!(checksum.len(), 64);
        assert!(checksum.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_checksum_ignores_collection_order() {
        let a = fixed_note("a", "first", &["x", "y"]);
        let b = fixed_note("b", "second", &[]);
        let one = fixed_snapshot(vec![a.clone(), b.clone()]);
        let two = fixed_snapshot(vec![b, a]);
        assert_eq!(compute_checksum(&one).unwrap(), compute_checksum(&two).unwrap());
    }

    #[test]
    fn test_checksum_ignores_order_of_duplicate_ids() {
        let x = fixed_note("dup", "x", &[]);
        let y = fixed_note("dup", "y", &[]);
        let one = fixed_snapshot(vec![x.clone(), y.clone()]);
        let two = fixed_snapshot(vec![y, x]);
        assert_eq!(compute_checksum(&one).unwrap(), compute_checksum(&two).unwrap());
    }

    #[test]
    fn test_checksum_ignores_tag_insertion_order() {
        let one = fixed_snapshot(vec![fixed_note("a", "c", &["x", "y", "z"])]);
        let two = fixed_snapshot(vec![fixed_note("a", "c", &["z", "x", "y"])]);
        assert_eq!(compute_checksum(&one).unwrap(), compute_checksum(&two).unwrap());
    }

    #[test]
    fn test_checksum_changes_with_content() {
        let one = fixed_snapshot(vec![fixed_note("a", "A", &[])]);
        let two = fixed_snapshot(vec![fixed_note("a", "B", &[])]);
        assert_ne!(compute_checksum(&one).unwrap(), compute_checksum(&two).unwrap());
    }

    #[test]
    fn test_checksum_changes_with_metadata() {
        let one = fixed_snapshot(vec![]);
        let mut two = one.clone();
        two.device_id = "other".to_string();
        let mut three = one.clone();
        three.timestamp = three.timestamp + chrono::Duration::seconds(1);
        let base = compute_checksum(&one).unwrap();
        assert_ne!(base, compute_checksum(&two).unwrap());
        assert_ne!(base, compute_checksum(&three).unwrap());
    }

    #[test]
    fn test_checksum_excludes_checksum_field() {
        let mut snapshot = fixed_snapshot(vec![fixed_note("a", "A", &[])]);
        let before = compute_checksum(&snapshot).unwrap();
        snapshot.checksum = "stale".to_string();
        assert_eq!(before, compute_checksum(&snapshot).unwrap());
    }

    #[test]
    fn test_seal_then_verify() {
        let mut snapshot = fixed_snapshot(vec![fixed_note("a", "A", &[])]);
        assert!(!verify(&snapshot).unwrap());
        seal(&mut snapshot).unwrap();
        assert!(verify(&snapshot).unwrap());

        snapshot.collections.notes[0].content = "tampered".to_string();
        assert!(!verify(&snapshot).unwrap());
    }
}
