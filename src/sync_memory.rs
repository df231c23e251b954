//! In-memory sync backend.
//!
//! Honors the same contract as the HTTP client, including the empty
//! snapshot on a first pull. Failures can be injected per operation, which
//! makes it the backend of choice for tests and offline runs.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::error::{SyncError, SyncResult};
use crate::models::{ConflictItem, Resolution, Snapshot};
use crate::sync_client::SyncService;

#[derive(Debug, Default)]
struct MemoryState {
    remote: Option<Snapshot>,
    last_sync: Option<DateTime<Utc>>,
    resolutions: Vec<(ConflictItem, Resolution)>,
    push_count: usize,
    pull_count: usize,
    fail_push: Option<(u16, String)>,
    fail_pull: Option<(u16, String)>,
    fail_resolve: Option<(u16, String)>,
}

/// Sync backend that keeps the remote snapshot in memory
#[derive(Debug, Default)]
pub struct MemorySyncService {
    state: Mutex<MemoryState>,
}

impl MemorySyncService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing remote snapshot
    pub fn with_remote(snapshot: Snapshot) -> Self {
        let service = Self::default();
        service.lock().remote = Some(snapshot);
        service
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The last snapshot pushed (or seeded)
    pub fn remote(&self) -> Option<Snapshot> {
        self.lock().remote.clone()
    }

    pub fn set_remote(&self, snapshot: Snapshot) {
        self.lock().remote = Some(snapshot);
    }

    /// Every resolution forwarded so far, in order
    pub fn resolutions(&self) -> Vec<(ConflictItem, Resolution)> {
        self.lock().resolutions.clone()
    }

    pub fn push_count(&self) -> usize {
        self.lock().push_count
    }

    pub fn pull_count(&self) -> usize {
        self.lock().pull_count
    }

    /// Make the next push fail with the given status and body
    pub fn fail_next_push(&self, status: u16, body: impl Into<String>) {
        self.lock().fail_push = Some((status, body.into()));
    }

    /// Make the next pull fail with the given status and body
    pub fn fail_next_pull(&self, status: u16, body: impl Into<String>) {
        self.lock().fail_pull = Some((status, body.into()));
    }

    /// Make the next conflict resolution fail with the given status and body
    pub fn fail_next_resolve(&self, status: u16, body: impl Into<String>) {
        self.lock().fail_resolve = Some((status, body.into()));
    }
}

impl SyncService for MemorySyncService {
    async fn push(&self, snapshot: &Snapshot) -> SyncResult<()> {
        let mut state = self.lock();
        state.push_count += 1;
        if let Some((status, body)) = state.fail_push.take() {
            return Err(SyncError::service(status, body));
        }
        state.remote = Some(snapshot.clone());
        state.last_sync = Some(Utc::now());
        Ok(())
    }

    async fn pull(&self) -> SyncResult<Snapshot> {
        let mut state = self.lock();
        state.pull_count += 1;
        if let Some((status, body)) = state.fail_pull.take() {
            return Err(SyncError::service(status, body));
        }
        Ok(state.remote.clone().unwrap_or_else(Snapshot::empty))
    }

    async fn last_sync_time(&self) -> SyncResult<Option<DateTime<Utc>>> {
        Ok(self.lock().last_sync)
    }

    async fn resolve_conflict(&self, item: &ConflictItem, resolution: Resolution) -> SyncResult<()> {
        let mut state = self.lock();
        if let Some((status, body)) = state.fail_resolve.take() {
            return Err(SyncError::service(status, body));
        }
        state.resolutions.push((item.clone(), resolution));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Collections;

    #[tokio::test]
    async fn test_first_pull_is_empty() {
        let service = MemorySyncService::new();
        let snapshot = service.pull().await.unwrap();
        assert!(snapshot.collections.is_empty());
        assert!(service.last_sync_time().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_push_then_pull() {
        let service = MemorySyncService::new();
        let snapshot = Snapshot::new("dev", Collections::default());
        service.push(&snapshot).await.unwrap();

        assert_eq!(service.pull().await.unwrap(), snapshot);
        assert!(service.last_sync_time().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_injected_push_failure_is_one_shot() {
        let service = MemorySyncService::new();
        service.fail_next_push(503, "maintenance");
        let snapshot = Snapshot::new("dev", Collections::default());

        let err = service.push(&snapshot).await.unwrap_err();
        assert!(err.to_string().contains("maintenance"));
        assert!(service.remote().is_none());

        service.push(&snapshot).await.unwrap();
        assert_eq!(service.push_count(), 2);
        assert!(service.remote().is_some());
    }

    #[tokio::test]
    async fn test_injected_resolve_failure_is_not_recorded() {
        let service = MemorySyncService::new();
        let note = crate::models::Note::new("t", "c");
        let conflict = ConflictItem::new(
            crate::models::ItemValue::Note(note.clone()),
            crate::models::ItemValue::Note(note),
        );
        service.fail_next_resolve(500, "boom");

        assert!(service.resolve_conflict(&conflict, Resolution::KeepLocal).await.is_err());
        assert!(service.resolutions().is_empty());

        service.resolve_conflict(&conflict, Resolution::KeepLocal).await.unwrap();
        assert_eq!(service.resolutions().len(), 1);
    }
}
