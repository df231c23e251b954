//! Local data store boundary.
//!
//! The sync core only reads and writes whole collections. [`JsonFileStore`]
//! keeps one JSON array per collection type under the data directory and
//! rewrites each file wholesale on save.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::SyncResult;
use crate::models::Collections;

pub const NOTES_FILE: &str = "notes.json";
pub const APPS_FILE: &str = "apps.json";
pub const CHEAT_SHEETS_FILE: &str = "cheatsheets.json";

/// Source and sink of the local collections.
pub trait LocalStore: Send + Sync {
    /// Read the current state of every collection
    fn load(&self) -> SyncResult<Collections>;

    /// Replace every collection with the given state
    fn save(&self, collections: &Collections) -> SyncResult<()>;
}

/// File-per-collection JSON store
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    data_dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn read_collection<T: DeserializeOwned>(&self, file_name: &str) -> SyncResult<Vec<T>> {
        let path = self.data_dir.join(file_name);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn write_collection<T: Serialize>(&self, file_name: &str, items: &[T]) -> SyncResult<()> {
        let content = serde_json::to_string_pretty(items)?;
        fs::write(self.data_dir.join(file_name), content)?;
        Ok(())
    }
}

impl LocalStore for JsonFileStore {
    fn load(&self) -> SyncResult<Collections> {
        Ok(Collections {
            apps: self.read_collection(APPS_FILE)?,
            notes: self.read_collection(NOTES_FILE)?,
            cheat_sheets: self.read_collection(CHEAT_SHEETS_FILE)?,
        })
    }

    fn save(&self, collections: &Collections) -> SyncResult<()> {
        fs::create_dir_all(&self.data_dir)?;
        self.write_collection(NOTES_FILE, &collections.notes)?;
        self.write_collection(APPS_FILE, &collections.apps)?;
        self.write_collection(CHEAT_SHEETS_FILE, &collections.cheat_sheets)?;
        tracing::debug!(
            data_dir = %self.data_dir.display(),
            items = collections.len(),
            "Saved local collections"
        );
        Ok(())
    }
}
