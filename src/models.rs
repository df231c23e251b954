//! Data models for sync.
//!
//! This module defines the synced entities (Note, AppDefinition, CheatSheet),
//! the Snapshot bundle exchanged with the backend, and the bookkeeping types
//! used while reconciling two snapshots (ConflictItem, Resolution, SyncStatus).

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Format version written into every snapshot
pub const SNAPSHOT_VERSION: &str = "1.0";

fn new_item_id() -> String {
    Uuid::now_v7().simple().to_string()
}

/// A user note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Stable identifier shared by every replica
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub favorite: bool,
    pub created_at: DateTime<Utc>,
    /// Last modification time, drives conflict detection
    pub updated_at: DateTime<Utc>,
}

impl Note {
    /// Create a new note with a fresh ID
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_item_id(),
            title: title.into(),
            content: content.into(),
            category: String::new(),
            tags: BTreeSet::new(),
            favorite: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A user-defined application entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub favorite: bool,
    pub updated_at: DateTime<Utc>,
}

impl AppDefinition {
    /// Create a new app definition with a fresh ID
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: new_item_id(),
            name: name.into(),
            description: String::new(),
            command: command.into(),
            category: String::new(),
            tags: BTreeSet::new(),
            favorite: false,
            updated_at: Utc::now(),
        }
    }
}

/// A downloaded cheat sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheatSheet {
    pub id: String,
    pub name: String,
    /// Where the sheet was downloaded from
    #[serde(default)]
    pub source: String,
    pub content: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub updated_at: DateTime<Utc>,
}

/// Type tag of a synced item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Note,
    App,
    CheatSheet,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Note => "note",
            ItemKind::App => "app",
            ItemKind::CheatSheet => "cheat_sheet",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common view over the synced item types.
pub trait SyncItem: Clone {
    fn item_id(&self) -> &str;

    fn updated_at(&self) -> DateTime<Utc>;

    fn into_value(self) -> ItemValue;
}

impl SyncItem for Note {
    fn item_id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn into_value(self) -> ItemValue {
        ItemValue::Note(self)
    }
}

impl SyncItem for AppDefinition {
    fn item_id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn into_value(self) -> ItemValue {
        ItemValue::App(self)
    }
}

impl SyncItem for CheatSheet {
    fn item_id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn into_value(self) -> ItemValue {
        ItemValue::CheatSheet(self)
    }
}

/// One version of an item of any synced type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemValue {
    Note(Note),
    App(AppDefinition),
    CheatSheet(CheatSheet),
}

impl ItemValue {
    pub fn kind(&self) -> ItemKind {
        match self {
            ItemValue::Note(_) => ItemKind::Note,
            ItemValue::App(_) => ItemKind::App,
            ItemValue::CheatSheet(_) => ItemKind::CheatSheet,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ItemValue::Note(n) => &n.id,
            ItemValue::App(a) => &a.id,
            ItemValue::CheatSheet(c) => &c.id,
        }
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        match self {
            ItemValue::Note(n) => n.updated_at,
            ItemValue::App(a) => a.updated_at,
            ItemValue::CheatSheet(c) => c.updated_at,
        }
    }

    /// The free-text body of the item
    pub fn body(&self) -> &str {
        match self {
            ItemValue::Note(n) => &n.content,
            ItemValue::App(a) => &a.description,
            ItemValue::CheatSheet(c) => &c.content,
        }
    }
}

/// The full set of synced collections of one replica.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collections {
    #[serde(default)]
    pub apps: Vec<AppDefinition>,
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default)]
    pub cheat_sheets: Vec<CheatSheet>,
}

fn upsert_by_id<T: SyncItem>(items: &mut Vec<T>, item: T) {
    match items.iter_mut().find(|i| i.item_id() == item.item_id()) {
        Some(existing) => *existing = item,
        None => items.push(item),
    }
}

impl Collections {
    pub fn is_empty(&self) -> bool {
        self.apps.is_empty() && self.notes.is_empty() && self.cheat_sheets.is_empty()
    }

    /// Total number of items across all collections
    pub fn len(&self) -> usize {
        self.apps.len() + self.notes.len() + self.cheat_sheets.len()
    }

    /// Replace the item with the same ID and type, or append it.
    pub fn upsert(&mut self, value: ItemValue) {
        match value {
            ItemValue::Note(n) => upsert_by_id(&mut self.notes, n),
            ItemValue::App(a) => upsert_by_id(&mut self.apps, a),
            ItemValue::CheatSheet(c) => upsert_by_id(&mut self.cheat_sheets, c),
        }
    }
}

/// A versioned bundle of one replica's state.
///
/// The checksum covers every other field and must be refreshed with
/// [`crate::checksum::seal`] before the snapshot is pushed or persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub version: String,
    /// Capture time of the bundle
    #[serde(default)]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub device_id: String,
    #[serde(flatten)]
    pub collections: Collections,
    #[serde(default)]
    pub checksum: String,
}

impl Snapshot {
    /// Capture a new snapshot of the given collections, timestamped now
    pub fn new(device_id: impl Into<String>, collections: Collections) -> Self {
        Self {
            version: SNAPSHOT_VERSION.to_string(),
            timestamp: Utc::now(),
            device_id: device_id.into(),
            collections,
            checksum: String::new(),
        }
    }

    /// A snapshot with no items, captured at the Unix epoch.
    ///
    /// Stands in for the remote state when the backend has none yet.
    pub fn empty() -> Self {
        Self {
            version: SNAPSHOT_VERSION.to_string(),
            timestamp: DateTime::<Utc>::default(),
            device_id: String::new(),
            collections: Collections::default(),
            checksum: String::new(),
        }
    }
}

/// Two divergent versions of the same logical item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub local: ItemValue,
    pub remote: ItemValue,
    pub detected_at: DateTime<Utc>,
}

impl ConflictItem {
    /// Pair a local and remote version, stamped with the detection time
    pub fn new(local: ItemValue, remote: ItemValue) -> Self {
        Self {
            id: local.id().to_string(),
            kind: local.kind(),
            local,
            remote,
            detected_at: Utc::now(),
        }
    }
}

/// How to resolve a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    KeepLocal,
    KeepRemote,
    Merge,
    Skip,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::KeepLocal => "keep_local",
            Resolution::KeepRemote => "keep_remote",
            Resolution::Merge => "merge",
            Resolution::Skip => "skip",
        }
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "keep_local" | "local" => Ok(Resolution::KeepLocal),
            "keep_remote" | "remote" => Ok(Resolution::KeepRemote),
            "merge" => Ok(Resolution::Merge),
            "skip" => Ok(Resolution::Skip),
            other => Err(format!("Unknown resolution: {}", other)),
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable state of a sync manager
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Time of the last successful cycle
    pub last_sync: Option<DateTime<Utc>>,
    pub in_progress: bool,
    pub pending_conflicts: Vec<ConflictItem>,
    pub device_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_parse() {
        assert_eq!("keep_local".parse::<Resolution>(), Ok(Resolution::KeepLocal));
        assert_eq!("Remote".parse::<Resolution>(), Ok(Resolution::KeepRemote));
        assert_eq!("merge".parse::<Resolution>(), Ok(Resolution::Merge));
        assert_eq!("skip".parse::<Resolution>(), Ok(Resolution::Skip));
        assert!("both".parse::<Resolution>().is_err());
    }

    #[test]
    fn test_resolution_wire_format() {
        let json = serde_json::to_string(&Resolution::KeepRemote).unwrap();
        assert_eq!(json, "\"keep_remote\"");
    }

    #[test]
    fn test_item_value_tagged_by_type() {
        let note = Note::new("title", "body");
        let value = serde_json::to_value(ItemValue::Note(note.clone())).unwrap();
        assert_eq!(value["type"], "note");
        assert_eq!(value["id"], note.id.as_str());
    }

    #[test]
    fn test_conflict_item_wire_format() {
        let note = Note::new("t", "a");
        let conflict = ConflictItem::new(
            ItemValue::Note(note.clone()),
            ItemValue::Note(note.clone()),
        );
        let value = serde_json::to_value(&conflict).unwrap();
        assert_eq!(value["type"], "note");
        assert_eq!(value["id"], note.id.as_str());
        assert_eq!(value["local"]["content"], "a");
    }

    #[test]
    fn test_snapshot_collections_flattened() {
        let mut collections = Collections::default();
        collections.notes.push(Note::new("t", "c"));
        let snapshot = Snapshot::new("dev", collections);
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["notes"].as_array().unwrap().len(), 1);
        assert!(value["apps"].as_array().unwrap().is_empty());
        assert_eq!(value["version"], SNAPSHOT_VERSION);
    }

    #[test]
    fn test_snapshot_deserialize_sparse_body() {
        let snapshot: Snapshot = serde_json::from_str(r#"{"notes": []}"#).unwrap();
        assert!(snapshot.collections.is_empty());
        assert_eq!(snapshot.timestamp, DateTime::<Utc>::default());
    }

    #[test]
    fn test_empty_snapshot_is_epoch() {
        let snapshot = Snapshot::empty();
        assert!(snapshot.collections.is_empty());
        assert_eq!(snapshot.timestamp.timestamp(), 0);
    }

    #[test]
    fn test_collections_upsert_replaces_by_id() {
        let mut collections = Collections::default();
        let mut note = Note::new("t", "old");
        collections.upsert(ItemValue::Note(note.clone()));
        note.content = "new".to_string();
        collections.upsert(ItemValue::Note(note.clone()));
        collections.upsert(ItemValue::App(AppDefinition::new("htop", "htop")));

        assert_eq!(collections.notes.len(), 1);
        assert_eq!(collections.notes[0].content, "new");
        assert_eq!(collections.len(), 2);
    }
}
