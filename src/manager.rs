//! Sync manager.
//!
//! Orchestrates one sync cycle end to end:
//! 1. Capture a local snapshot from the store and seal it
//! 2. Pull the remote snapshot
//! 3. Detect conflicts, record them, auto-resolve them (last writer wins)
//!    and forward each resolution to the backend
//! 4. Merge both snapshots, seal the result and push it
//! 5. Persist the merged collections locally and mark the cycle done
//!
//! Only one cycle runs at a time per manager. A second call while a cycle
//! is running fails with [`SyncError::InProgress`] instead of queueing.
//! Local state is written only after a successful push.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::checksum;
use crate::config::Config;
use crate::conflicts::{auto_resolve, detect_conflicts, resolve, ResolvedConflict};
use crate::device::get_or_create_device_id;
use crate::error::{SyncError, SyncResult};
use crate::merge::{merge_snapshots, MergeStrategy};
use crate::models::{ConflictItem, ItemValue, Resolution, Snapshot, SyncStatus};
use crate::store::{JsonFileStore, LocalStore};
use crate::sync_client::{HttpSyncService, SyncService};

/// Default interval between background cycles
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Summary of a successful cycle
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Conflicts detected and auto-resolved during the cycle
    pub resolved: Vec<ResolvedConflict>,
    /// Items in the pushed snapshot
    pub items: usize,
    /// Checksum of the pushed snapshot
    pub checksum: String,
    pub synced_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct SyncState {
    in_progress: bool,
    last_sync: Option<DateTime<Utc>>,
    pending: Vec<ConflictItem>,
}

/// Clears the in-progress flag when a cycle ends, however it ends.
struct CycleGuard<'a> {
    state: &'a Mutex<SyncState>,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .in_progress = false;
    }
}

struct AutoSyncHandle {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Sync manager over a backend `S` and a local store `L`
pub struct SyncManager<S, L> {
    service: S,
    store: L,
    device_id: String,
    merge_strategy: MergeStrategy,
    state: Mutex<SyncState>,
    auto_sync: Mutex<Option<AutoSyncHandle>>,
    dropped_ticks: AtomicU64,
}

impl SyncManager<HttpSyncService, JsonFileStore> {
    /// Build a manager talking to the configured HTTP backend and storing
    /// collections as JSON files in the configured data directory.
    pub fn from_config(config: &Config) -> SyncResult<Self> {
        let data_dir = config.data_dir();
        let device_id = get_or_create_device_id(&data_dir)?;
        let service =
            HttpSyncService::with_timeout(config.endpoint(), config.token(), config.request_timeout())?;

        Ok(Self::new(service, JsonFileStore::new(data_dir), device_id)
            .with_merge_strategy(config.merge_strategy()))
    }
}

impl<S: SyncService, L: LocalStore> SyncManager<S, L> {
    pub fn new(service: S, store: L, device_id: impl Into<String>) -> Self {
        Self {
            service,
            store,
            device_id: device_id.into(),
            merge_strategy: MergeStrategy::default(),
            state: Mutex::new(SyncState::default()),
            auto_sync: Mutex::new(None),
            dropped_ticks: AtomicU64::new(0),
        }
    }

    pub fn with_merge_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.merge_strategy = strategy;
        self
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn store(&self) -> &L {
        &self.store
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    fn lock_state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current status, copied out for observers
    pub fn status(&self) -> SyncStatus {
        let state = self.lock_state();
        SyncStatus {
            last_sync: state.last_sync,
            in_progress: state.in_progress,
            pending_conflicts: state.pending.clone(),
            device_id: self.device_id.clone(),
        }
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.lock_state().last_sync
    }

    pub fn pending_conflicts(&self) -> Vec<ConflictItem> {
        self.lock_state().pending.clone()
    }

    /// Number of scheduler ticks dropped because a cycle was already running
    pub fn dropped_ticks(&self) -> u64 {
        self.dropped_ticks.load(Ordering::Relaxed)
    }

    /// Last sync time as recorded by the backend
    pub async fn remote_last_sync(&self) -> SyncResult<Option<DateTime<Utc>>> {
        self.service.last_sync_time().await
    }

    fn begin_cycle(&self) -> SyncResult<CycleGuard<'_>> {
        let mut state = self.lock_state();
        if state.in_progress {
            return Err(SyncError::InProgress);
        }
        state.in_progress = true;
        Ok(CycleGuard { state: &self.state })
    }

    /// Run one sync cycle.
    pub async fn sync(&self) -> SyncResult<SyncReport> {
        let _guard = self.begin_cycle()?;

        tracing::info!(device_id = %self.device_id, "Starting sync cycle");
        match self.run_cycle().await {
            Ok(report) => {
                tracing::info!(
                    items = report.items,
                    conflicts = report.resolved.len(),
                    checksum = %report.checksum,
                    "Sync cycle completed"
                );
                Ok(report)
            }
            Err(e) => {
                tracing::warn!("Sync cycle failed: {}", e);
                Err(e)
            }
        }
    }

    async fn run_cycle(&self) -> SyncResult<SyncReport> {
        let mut local = Snapshot::new(self.device_id.clone(), self.store.load()?);
        checksum::seal(&mut local)?;

        let remote = self.service.pull().await?;
        if !remote.checksum.is_empty() && !checksum::verify(&remote)? {
            tracing::warn!(
                remote_device = %remote.device_id,
                checksum = %remote.checksum,
                "Remote snapshot checksum does not match its contents"
            );
        }

        let conflicts = detect_conflicts(&local, &remote);
        let mut resolved = Vec::new();
        if !conflicts.is_empty() {
            tracing::info!(count = conflicts.len(), "Detected sync conflicts");
            self.lock_state().pending = conflicts.clone();

            resolved = auto_resolve(&conflicts);
            for r in &resolved {
                tracing::debug!(
                    item_id = %r.conflict.id,
                    kind = %r.conflict.kind,
                    resolution = %r.resolution,
                    "Auto-resolved conflict"
                );
                self.service
                    .resolve_conflict(&r.conflict, r.resolution)
                    .await?;
            }
        }

        let winners: Vec<ItemValue> = resolved.iter().filter_map(|r| r.value.clone()).collect();
        let mut merged = merge_snapshots(&local, &remote, self.merge_strategy, &winners);
        checksum::seal(&mut merged)?;

        self.service.push(&merged).await?;
        self.store.save(&merged.collections)?;

        let synced_at = Utc::now();
        {
            let mut state = self.lock_state();
            state.last_sync = Some(synced_at);
            state.pending.clear();
        }

        Ok(SyncReport {
            resolved,
            items: merged.collections.len(),
            checksum: merged.checksum,
            synced_at,
        })
    }

    /// Resolve a pending conflict with a user-chosen policy.
    ///
    /// `Skip` leaves the conflict pending without contacting the backend.
    /// Otherwise the resolution is forwarded to the backend and, once
    /// accepted, the conflict is removed from the pending list. Keep-remote
    /// and merge also write the surviving version to the local store.
    ///
    /// The lookup and the exclusive-run check happen under one lock, so a
    /// conflict cleared by a concurrent cycle is never applied.
    pub async fn resolve_conflict(&self, item_id: &str, resolution: Resolution) -> SyncResult<()> {
        let (conflict, _guard) = {
            let mut state = self.lock_state();
            let conflict = state
                .pending
                .iter()
                .find(|c| c.id == item_id)
                .cloned()
                .ok_or_else(|| SyncError::ConflictNotFound(item_id.to_string()))?;

            if resolution == Resolution::Skip {
                tracing::debug!(item_id = %item_id, "Conflict deferred");
                return Ok(());
            }
            if state.in_progress {
                return Err(SyncError::InProgress);
            }
            state.in_progress = true;
            (conflict, CycleGuard { state: &self.state })
        };

        let value = resolve(&conflict, resolution)?;
        self.service.resolve_conflict(&conflict, resolution).await?;

        if resolution != Resolution::KeepLocal {
            if let Some(value) = value {
                let mut collections = self.store.load()?;
                collections.upsert(value);
                self.store.save(&collections)?;
            }
        }

        self.lock_state()
            .pending
            .retain(|c| !(c.id == conflict.id && c.kind == conflict.kind));

        tracing::info!(
            item_id = %item_id,
            resolution = %resolution,
            "Conflict resolved"
        );
        Ok(())
    }

    async fn run_scheduled_cycle(&self) {
        match self.sync().await {
            Ok(_) => {}
            Err(SyncError::InProgress) => {
                self.dropped_ticks.fetch_add(1, Ordering::Relaxed);
                tracing::info!("Sync already running, dropping scheduled tick");
            }
            Err(e) => {
                tracing::error!(retriable = e.is_retriable(), "Scheduled sync failed: {}", e);
            }
        }
    }

    pub fn is_auto_sync_running(&self) -> bool {
        self.auto_sync
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.task.is_finished())
    }
}

impl<S, L> SyncManager<S, L>
where
    S: SyncService + 'static,
    L: LocalStore + 'static,
{
    /// Start the background worker, running one cycle per `interval`.
    ///
    /// The first cycle runs one interval after start. Ticks missed while a
    /// cycle is running are skipped, and a tick that collides with a manual
    /// cycle is dropped rather than retried. Must be called from within a
    /// tokio runtime.
    pub fn start_auto_sync(self: &Arc<Self>, interval: Duration) -> SyncResult<()> {
        if interval.is_zero() {
            return Err(SyncError::config("auto sync interval must be non-zero"));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| SyncError::Other("auto sync requires a tokio runtime".to_string()))?;

        let mut slot = self.auto_sync.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|h| !h.task.is_finished()) {
            return Err(SyncError::AutoSyncRunning);
        }

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let weak = Arc::downgrade(self);

        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let Some(manager) = weak.upgrade() else {
                            break;
                        };
                        manager.run_scheduled_cycle().await;
                    }
                }
            }
            tracing::info!("Auto sync stopped");
        });

        *slot = Some(AutoSyncHandle { stop_tx, task });
        tracing::info!(interval_secs = interval.as_secs_f64(), "Auto sync started");
        Ok(())
    }

    /// Stop the background worker and wait for it to exit.
    ///
    /// A cycle already in flight is allowed to finish. Returns `false` if
    /// the worker was not running. The manager can be started again
    /// afterwards.
    pub async fn stop_auto_sync(&self) -> bool {
        let handle = self
            .auto_sync
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(handle) = handle else {
            return false;
        };

        let _ = handle.stop_tx.send(());
        if let Err(e) = handle.task.await {
            tracing::error!("Auto sync worker failed: {}", e);
        }
        true
    }
}
