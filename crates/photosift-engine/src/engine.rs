//! Scan lifecycle driver.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use photosift_core::{
    EngineConfig, GroupMembership, GroupSummary, MediaItem, PhotoGroup, ScanPhase, ScanSnapshot,
    ScanState, project,
};
use photosift_library::AssetLibrary;
use photosift_store::CheckpointStore;

use crate::EngineError;
use crate::rehydrate::resolve_buckets;

/// Mutable engine state. Guards never cross an `.await`.
struct Inner {
    phase: ScanPhase,
    state: ScanState,
    membership: GroupMembership,
    last_scan: Option<DateTime<Utc>>,
}

/// Classification engine over one asset library and one checkpoint
/// store.
///
/// All methods take `&self`; at most one scan runs at a time and
/// concurrent `start`/`resume` calls are no-ops that return the current
/// snapshot. Every observable mutation broadcasts one full
/// [`ScanSnapshot`] to subscribers.
pub struct ScanEngine<L> {
    library: Arc<L>,
    store: CheckpointStore,
    config: EngineConfig,
    inner: RwLock<Inner>,
    scanning: AtomicBool,
    snapshot_tx: broadcast::Sender<ScanSnapshot>,
}

impl<L: AssetLibrary + 'static> ScanEngine<L> {
    /// Create an engine with the default configuration.
    ///
    /// Seeds counters, phase, and the last scan date from the store; a
    /// usable checkpoint puts the engine straight into `Suspended`.
    pub fn new(library: L, store: CheckpointStore) -> Self {
        Self::with_config(library, store, EngineConfig::default())
    }

    /// Create an engine with an explicit configuration.
    pub fn with_config(library: L, store: CheckpointStore, config: EngineConfig) -> Self {
        let state = store.load_progress().unwrap_or_default();
        let last_scan = store.last_scan_date();
        let phase = if state.can_resume() {
            info!(
                processed = state.processed(),
                total = state.total(),
                "found resumable checkpoint"
            );
            ScanPhase::Suspended
        } else if state.total() > 0 && state.processed() == state.total() {
            ScanPhase::Completed
        } else {
            ScanPhase::Idle
        };
        let (snapshot_tx, _) = broadcast::channel(config.event_capacity);
        Self {
            library: Arc::new(library),
            store,
            config,
            inner: RwLock::new(Inner {
                phase,
                state,
                membership: GroupMembership::new(),
                last_scan,
            }),
            scanning: AtomicBool::new(false),
            snapshot_tx,
        }
    }

    /// The library this engine scans.
    pub fn library(&self) -> &L {
        &self.library
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Subscribe to state snapshots. Slow receivers observe `Lagged`
    /// and miss intermediate snapshots; the latest retained one always
    /// reflects a consistent state.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Current state snapshot.
    pub fn snapshot(&self) -> ScanSnapshot {
        Self::snapshot_of(&self.read())
    }

    /// Whether a scan call is in flight.
    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    /// Whether `resume` would continue an interrupted scan.
    pub fn can_resume(&self) -> bool {
        !self.is_scanning() && self.read().state.can_resume()
    }

    /// Completion fraction in `[0.0, 1.0]`.
    pub fn progress(&self) -> f64 {
        self.snapshot().progress
    }

    /// Date of the last completed scan, if any.
    pub fn last_scan_date(&self) -> Option<DateTime<Utc>> {
        self.read().last_scan
    }

    /// Non-empty buckets in display order.
    pub fn summary(&self) -> Vec<GroupSummary> {
        let inner = self.read();
        project(&inner.state, &inner.membership)
    }

    /// Items currently held in one bucket, in classification order.
    /// Empty until the scan populates it or `rehydrate` resolves it.
    pub fn group_items(&self, bucket: Option<PhotoGroup>) -> Vec<MediaItem> {
        let inner = self.read();
        match bucket {
            Some(group) => inner.membership.group(group).to_vec(),
            None => inner.membership.others().to_vec(),
        }
    }

    /// Start a scan.
    ///
    /// With a resumable checkpoint in place this continues the previous
    /// scan instead of rescanning from zero. Returns the final snapshot
    /// (`Completed`, or `Suspended` if `cancel` fired). A no-op
    /// returning the current snapshot when a scan is already running.
    pub async fn start(&self, cancel: &CancellationToken) -> Result<ScanSnapshot, EngineError> {
        let Some(guard) = ScanGuard::acquire(&self.scanning) else {
            warn!("scan already running, ignoring start");
            return Ok(self.snapshot());
        };
        if self.read().phase == ScanPhase::Completed {
            return Err(EngineError::AlreadyCompleted);
        }
        if self.read().state.can_resume() {
            debug!("resumable checkpoint present, continuing previous scan");
            return self.resume_locked(cancel, guard).await;
        }
        self.scan_locked(cancel, guard).await
    }

    /// Continue an interrupted scan from its checkpoint.
    ///
    /// A no-op returning the current snapshot when there is nothing to
    /// resume or a scan is already running.
    pub async fn resume(&self, cancel: &CancellationToken) -> Result<ScanSnapshot, EngineError> {
        let Some(guard) = ScanGuard::acquire(&self.scanning) else {
            debug!("scan already running, ignoring resume");
            return Ok(self.snapshot());
        };
        self.resume_locked(cancel, guard).await
    }

    /// Resolve persisted membership back into live items, one
    /// concurrent task per bucket.
    ///
    /// Identifiers that no longer resolve are dropped with a warning;
    /// counts are not altered. A no-op when no membership record exists
    /// or a scan is running.
    pub async fn rehydrate(&self) -> ScanSnapshot {
        if self.is_scanning() {
            warn!("cannot rehydrate while a scan is running");
            return self.snapshot();
        }
        self.rehydrate_inner().await
    }

    /// Clear all durable records and reset in-memory state to idle.
    ///
    /// Store failures propagate: a reset that did not happen must not
    /// look like one that did.
    pub fn reset(&self) -> Result<ScanSnapshot, EngineError> {
        let Some(_guard) = ScanGuard::acquire(&self.scanning) else {
            return Err(EngineError::ScanInProgress);
        };
        self.store.clear()?;
        let snapshot = {
            let mut inner = self.write();
            inner.state = ScanState::new();
            inner.membership.clear();
            inner.last_scan = None;
            inner.phase = ScanPhase::Idle;
            Self::snapshot_of(&inner)
        };
        info!("cleared all classification data");
        self.publish(&snapshot);
        Ok(snapshot)
    }

    async fn scan_locked(
        &self,
        cancel: &CancellationToken,
        guard: ScanGuard<'_>,
    ) -> Result<ScanSnapshot, EngineError> {
        let _guard = guard;
        self.transition(ScanPhase::RequestingAccess);
        let status = match self.library.request_access().await {
            Ok(status) => status,
            Err(err) => {
                self.transition(ScanPhase::Idle);
                return Err(err.into());
            }
        };
        if !status.is_granted() {
            info!(library = self.library.name(), "library access denied");
            self.transition(ScanPhase::Idle);
            return Err(EngineError::AccessDenied);
        }

        let items = match self.library.enumerate().await {
            Ok(items) => items,
            Err(err) => {
                self.transition(ScanPhase::Idle);
                return Err(err.into());
            }
        };
        info!(
            library = self.library.name(),
            total = items.len(),
            "starting scan"
        );

        let snapshot = {
            let mut inner = self.write();
            inner.state = ScanState::begin(items.len() as u64);
            inner.membership.clear();
            inner.phase = ScanPhase::Scanning;
            Self::snapshot_of(&inner)
        };
        self.publish(&snapshot);
        self.run(cancel, items, 0).await
    }

    async fn resume_locked(
        &self,
        cancel: &CancellationToken,
        guard: ScanGuard<'_>,
    ) -> Result<ScanSnapshot, EngineError> {
        let _guard = guard;
        {
            let inner = self.read();
            if !inner.state.can_resume() {
                debug!("nothing to resume");
                return Ok(Self::snapshot_of(&inner));
            }
        }

        // The original scan's membership may live only in the store.
        let needs_rehydration = {
            let inner = self.read();
            inner.membership.is_empty() && inner.state.processed() > 0
        };
        if needs_rehydration {
            self.rehydrate_inner().await;
        }

        self.transition(ScanPhase::RequestingAccess);
        let status = match self.library.request_access().await {
            Ok(status) => status,
            Err(err) => {
                self.transition(ScanPhase::Suspended);
                return Err(err.into());
            }
        };
        if !status.is_granted() {
            info!(library = self.library.name(), "library access denied");
            self.transition(ScanPhase::Suspended);
            return Err(EngineError::AccessDenied);
        }

        let items = match self.library.enumerate().await {
            Ok(items) => items,
            Err(err) => {
                self.transition(ScanPhase::Suspended);
                return Err(err.into());
            }
        };

        let (skip, shrank) = {
            let mut inner = self.write();
            let total = items.len() as u64;
            let processed = inner.state.processed();
            inner.state.set_total(total);
            let shrank = processed >= total;
            if shrank {
                inner.state.complete();
            } else {
                inner.phase = ScanPhase::Scanning;
            }
            (processed, shrank)
        };
        if shrank {
            info!("collection no longer extends past the checkpoint, completing");
            return self.finish().await;
        }

        info!(skip, total = items.len(), "resuming scan from checkpoint");
        self.publish(&self.snapshot());
        self.run(cancel, items, skip).await
    }

    /// Classification loop. Cancellation is honored between items only,
    /// so an item is never half-classified.
    async fn run(
        &self,
        cancel: &CancellationToken,
        items: Vec<MediaItem>,
        skip: u64,
    ) -> Result<ScanSnapshot, EngineError> {
        let batch = self.config.batch_size;
        for item in items.into_iter().skip(skip as usize) {
            if cancel.is_cancelled() {
                return Ok(self.suspend());
            }

            let bucket = match self.library.fingerprint(&item).await {
                Ok(fingerprint) => PhotoGroup::for_fingerprint(fingerprint),
                Err(err) => {
                    warn!(id = %item.id, error = %err, "fingerprint failed, routing to unclassified");
                    None
                }
            };

            let (snapshot, processed) = {
                let mut inner = self.write();
                inner.state.record(bucket);
                inner.membership.insert(bucket, item);
                (Self::snapshot_of(&inner), inner.state.processed())
            };
            self.publish(&snapshot);

            if processed % batch == 0 {
                self.checkpoint().await;
            }
        }
        self.finish().await
    }

    fn suspend(&self) -> ScanSnapshot {
        let snapshot = self.transition(ScanPhase::Suspended);
        info!(
            processed = snapshot.processed,
            total = snapshot.total,
            "scan suspended"
        );
        snapshot
    }

    /// Persist progress and membership off the async path. Failures are
    /// logged; the previous durable checkpoint stands.
    async fn checkpoint(&self) {
        let (state, membership) = {
            let inner = self.read();
            (inner.state.clone(), inner.membership.clone())
        };
        let processed = state.processed();
        let store = self.store.clone();
        let saved = tokio::task::spawn_blocking(move || {
            store.save_progress(&state)?;
            store.save_membership(&membership)
        })
        .await;
        match saved {
            Ok(Ok(())) => debug!(processed, "checkpoint persisted"),
            Ok(Err(err)) => warn!(error = %err, "checkpoint save failed, scan continues"),
            Err(err) => warn!(error = %err, "checkpoint task failed, scan continues"),
        }
    }

    async fn finish(&self) -> Result<ScanSnapshot, EngineError> {
        let completed_at = Utc::now();
        let (snapshot, state, membership) = {
            let mut inner = self.write();
            inner.state.complete();
            inner.phase = ScanPhase::Completed;
            inner.last_scan = Some(completed_at);
            (
                Self::snapshot_of(&inner),
                inner.state.clone(),
                inner.membership.clone(),
            )
        };

        let store = self.store.clone();
        let saved = tokio::task::spawn_blocking(move || {
            store.save_progress(&state)?;
            store.save_membership(&membership)?;
            store.mark_scan_date(completed_at)
        })
        .await;
        match saved {
            Ok(Ok(())) => debug!("final checkpoint persisted"),
            Ok(Err(err)) => warn!(error = %err, "final checkpoint save failed"),
            Err(err) => warn!(error = %err, "final checkpoint task failed"),
        }

        info!(
            total = snapshot.total,
            others = snapshot.other_count,
            "scan completed"
        );
        self.publish(&snapshot);
        Ok(snapshot)
    }

    async fn rehydrate_inner(&self) -> ScanSnapshot {
        let store = self.store.clone();
        let record = match tokio::task::spawn_blocking(move || store.load_membership()).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!("no membership checkpoint to rehydrate");
                return self.snapshot();
            }
            Err(err) => {
                warn!(error = %err, "membership load task failed");
                return self.snapshot();
            }
        };

        let persisted = record.len();
        let membership = resolve_buckets(self.library.clone(), record).await;
        info!(
            resolved = membership.len(),
            persisted, "rehydrated group membership"
        );

        let snapshot = {
            let mut inner = self.write();
            if inner.phase.is_scanning() {
                warn!("scan started during rehydration, discarding resolved buckets");
            } else {
                inner.membership = membership;
            }
            Self::snapshot_of(&inner)
        };
        self.publish(&snapshot);
        snapshot
    }

    fn transition(&self, phase: ScanPhase) -> ScanSnapshot {
        let snapshot = {
            let mut inner = self.write();
            inner.phase = phase;
            Self::snapshot_of(&inner)
        };
        self.publish(&snapshot);
        snapshot
    }

    fn publish(&self, snapshot: &ScanSnapshot) {
        // Nobody listening is fine.
        let _ = self.snapshot_tx.send(snapshot.clone());
    }

    fn snapshot_of(inner: &Inner) -> ScanSnapshot {
        ScanSnapshot::from_state(inner.phase, &inner.state, inner.last_scan)
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the scanning flag when the scan call returns by any path.
struct ScanGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ScanGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
