//! SyncCore - cross-device synchronization for notes, app definitions and
//! cheat sheets.
//!
//! This library provides:
//! - Snapshot model with integrity checksums
//! - Stable per-installation device identity
//! - Conflict detection and resolution (last writer wins, or user chosen)
//! - Sync service contract with HTTP and in-memory backends
//! - Sync manager with exclusive cycles and a background scheduler
//!
//! # Feature Flags
//!
//! - `desktop` (default): host name detection for the device identity and
//!   platform config directory lookup.

pub mod checksum;
pub mod config;
pub mod conflicts;
pub mod device;
pub mod error;
pub mod manager;
pub mod merge;
pub mod models;
pub mod store;
pub mod sync_client;
pub mod sync_memory;

// Re-export commonly used types
pub use config::Config;
pub use error::{SyncError, SyncResult};
pub use manager::{SyncManager, SyncReport};
pub use merge::MergeStrategy;
pub use models::{
    AppDefinition, CheatSheet, Collections, ConflictItem, ItemKind, ItemValue, Note, Resolution,
    Snapshot, SyncStatus,
};
pub use store::{JsonFileStore, LocalStore};
pub use sync_client::{HttpSyncService, SyncService};
pub use sync_memory::MemorySyncService;
