use std::collections::HashSet;
use std::sync::Arc;

use photosift_core::{EngineConfig, PhotoGroup, ScanPhase};
use photosift_engine::{EngineError, ScanEngine};
use photosift_library::MemoryLibrary;
use photosift_store::CheckpointStore;
use tempfile::TempDir;
use tokio::sync::broadcast::error::TryRecvError;
use tokio_util::sync::CancellationToken;

/// Fingerprint schedule for the 120-photo fixture: 40 in group A,
/// 40 in group B, 40 unclassifiable.
fn fingerprint_for(index: usize) -> f64 {
    match index {
        0..=39 => 0.05,
        40..=79 => 0.15,
        _ => f64::NAN,
    }
}

fn seeded_library(count: usize) -> MemoryLibrary {
    let library = MemoryLibrary::new();
    for index in 0..count {
        library.add(format!("photo_{index:04}.jpg"), fingerprint_for(index));
    }
    library
}

fn open_store(temp: &TempDir) -> CheckpointStore {
    CheckpointStore::open(temp.path().join("checkpoints")).unwrap()
}

/// Room for every snapshot of a 120-item scan without draining.
fn wide_config() -> EngineConfig {
    EngineConfig::builder()
        .event_capacity(1024usize)
        .build()
        .unwrap()
}

fn collected_ids(engine: &ScanEngine<MemoryLibrary>) -> Vec<String> {
    let mut ids = Vec::new();
    for bucket in [Some(PhotoGroup::A), Some(PhotoGroup::B), None] {
        for item in engine.group_items(bucket) {
            ids.push(item.id.as_str().to_string());
        }
    }
    ids
}

/// Run a scan that a hook suspends after 75 items, leaving a durable
/// checkpoint at 50 in the store under `temp`.
async fn suspend_at_75(temp: &TempDir) {
    let library = seeded_library(120);
    let token = CancellationToken::new();
    let trip = token.clone();
    library.set_fingerprint_hook(move |id| {
        if id.as_str() == "photo_0074.jpg" {
            trip.cancel();
        }
    });

    let engine = ScanEngine::new(library, open_store(temp));
    let snapshot = engine.start(&token).await.unwrap();
    assert_eq!(snapshot.phase, ScanPhase::Suspended);
    assert_eq!(snapshot.processed, 75);
}

#[tokio::test]
async fn test_fresh_scan_classifies_three_buckets() {
    let temp = TempDir::new().unwrap();
    let engine = ScanEngine::new(seeded_library(120), open_store(&temp));

    let snapshot = engine.start(&CancellationToken::new()).await.unwrap();

    assert_eq!(snapshot.phase, ScanPhase::Completed);
    assert_eq!(snapshot.processed, 120);
    assert_eq!(snapshot.total, 120);
    assert_eq!(snapshot.progress, 1.0);
    assert!(!snapshot.can_resume);
    assert_eq!(snapshot.group_counts[&PhotoGroup::A], 40);
    assert_eq!(snapshot.group_counts[&PhotoGroup::B], 40);
    assert_eq!(snapshot.other_count, 40);
    assert!(snapshot.last_scan.is_some());

    let summary = engine.summary();
    let rows: Vec<(Option<PhotoGroup>, u64)> =
        summary.iter().map(|row| (row.group, row.count)).collect();
    assert_eq!(
        rows,
        [
            (Some(PhotoGroup::A), 40),
            (Some(PhotoGroup::B), 40),
            (None, 40)
        ]
    );

    // The completed scan is durable.
    let reopened = open_store(&temp);
    let durable = reopened.load_progress().unwrap();
    assert_eq!(durable.processed(), 120);
    assert_eq!(reopened.load_membership().unwrap().len(), 120);
    assert!(reopened.last_scan_date().is_some());
}

#[tokio::test]
async fn test_snapshots_stay_consistent_and_monotonic() {
    let temp = TempDir::new().unwrap();
    let engine = ScanEngine::with_config(seeded_library(120), open_store(&temp), wide_config());

    let mut events = engine.subscribe();
    engine.start(&CancellationToken::new()).await.unwrap();

    let mut snapshots = Vec::new();
    loop {
        match events.try_recv() {
            Ok(snapshot) => snapshots.push(snapshot),
            Err(TryRecvError::Empty) => break,
            Err(err) => panic!("snapshot stream broke: {err}"),
        }
    }

    assert!(!snapshots.is_empty());
    let mut last_processed = 0;
    for snapshot in &snapshots {
        assert!(snapshot.is_consistent(), "inconsistent: {snapshot:?}");
        assert!(snapshot.processed >= last_processed);
        assert!((0.0..=1.0).contains(&snapshot.progress));
        last_processed = snapshot.processed;
    }
    assert!(
        snapshots
            .iter()
            .any(|s| s.phase == ScanPhase::RequestingAccess)
    );
    assert!(snapshots.iter().any(|s| s.phase == ScanPhase::Scanning));
    assert_eq!(snapshots.last().unwrap().phase, ScanPhase::Completed);
}

#[tokio::test]
async fn test_suspension_keeps_last_durable_checkpoint() {
    let temp = TempDir::new().unwrap();
    suspend_at_75(&temp).await;

    // In-memory progress reached 75; the durable checkpoint is the
    // last batch boundary.
    let store = open_store(&temp);
    let durable = store.load_progress().unwrap();
    assert_eq!(durable.processed(), 50);
    assert_eq!(durable.total(), 120);
    assert!(durable.can_resume());
    assert_eq!(store.load_membership().unwrap().len(), 50);
    assert!(store.last_scan_date().is_none());
}

#[tokio::test]
async fn test_resume_in_process_completes() {
    let temp = TempDir::new().unwrap();
    let library = seeded_library(120);
    let token = CancellationToken::new();
    let trip = token.clone();
    library.set_fingerprint_hook(move |id| {
        if id.as_str() == "photo_0074.jpg" {
            trip.cancel();
        }
    });

    let engine = ScanEngine::new(library, open_store(&temp));
    engine.start(&token).await.unwrap();
    assert!(engine.can_resume());
    engine.library().clear_fingerprint_hook();

    let snapshot = engine.resume(&CancellationToken::new()).await.unwrap();
    assert_eq!(snapshot.phase, ScanPhase::Completed);
    assert_eq!(snapshot.processed, 120);
    assert_eq!(snapshot.group_counts[&PhotoGroup::A], 40);
    assert_eq!(snapshot.group_counts[&PhotoGroup::B], 40);
    assert_eq!(snapshot.other_count, 40);

    let ids = collected_ids(&engine);
    assert_eq!(ids.len(), 120);
    assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 120);
}

#[tokio::test]
async fn test_resume_from_durable_checkpoint_matches_full_scan() {
    let temp = TempDir::new().unwrap();
    suspend_at_75(&temp).await;

    // A new engine over the same store: only the checkpointed 50 items
    // survive, and the rest re-scan without duplicating any of them.
    let engine = ScanEngine::new(seeded_library(120), open_store(&temp));
    let seeded = engine.snapshot();
    assert_eq!(seeded.phase, ScanPhase::Suspended);
    assert_eq!(seeded.processed, 50);
    assert!(engine.can_resume());

    let snapshot = engine.resume(&CancellationToken::new()).await.unwrap();
    assert_eq!(snapshot.phase, ScanPhase::Completed);
    assert_eq!(snapshot.processed, 120);
    assert_eq!(snapshot.progress, 1.0);
    assert_eq!(snapshot.group_counts[&PhotoGroup::A], 40);
    assert_eq!(snapshot.group_counts[&PhotoGroup::B], 40);
    assert_eq!(snapshot.other_count, 40);

    let ids = collected_ids(&engine);
    assert_eq!(ids.len(), 120);
    assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 120);
}

#[tokio::test]
async fn test_start_delegates_to_resume_when_checkpoint_exists() {
    let temp = TempDir::new().unwrap();
    suspend_at_75(&temp).await;

    let engine = ScanEngine::new(seeded_library(120), open_store(&temp));
    let snapshot = engine.start(&CancellationToken::new()).await.unwrap();

    assert_eq!(snapshot.phase, ScanPhase::Completed);
    assert_eq!(snapshot.processed, 120);
    assert_eq!(collected_ids(&engine).len(), 120);
}

#[tokio::test]
async fn test_access_denied_start_leaves_nothing() {
    let temp = TempDir::new().unwrap();
    let library = seeded_library(10);
    library.deny_access();

    let engine = ScanEngine::new(library, open_store(&temp));
    let err = engine.start(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, EngineError::AccessDenied));

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.phase, ScanPhase::Idle);
    assert_eq!(snapshot.processed, 0);
    assert!(!engine.can_resume());
    assert!(open_store(&temp).load_progress().is_none());
}

#[tokio::test]
async fn test_access_denied_resume_preserves_checkpoint() {
    let temp = TempDir::new().unwrap();
    suspend_at_75(&temp).await;

    let library = seeded_library(120);
    library.deny_access();
    let engine = ScanEngine::new(library, open_store(&temp));

    let err = engine.resume(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, EngineError::AccessDenied));

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.phase, ScanPhase::Suspended);
    assert_eq!(snapshot.processed, 50);
    assert!(engine.can_resume());
    // Membership reloads before the access prompt, and stays.
    assert_eq!(engine.group_items(Some(PhotoGroup::A)).len(), 40);
    assert_eq!(engine.group_items(Some(PhotoGroup::B)).len(), 10);

    let durable = open_store(&temp).load_progress().unwrap();
    assert_eq!(durable.processed(), 50);
}

#[tokio::test]
async fn test_completed_scan_requires_reset() {
    let temp = TempDir::new().unwrap();
    let engine = ScanEngine::new(seeded_library(3), open_store(&temp));
    let token = CancellationToken::new();

    engine.start(&token).await.unwrap();
    assert_eq!(engine.snapshot().phase, ScanPhase::Completed);

    let err = engine.start(&token).await.unwrap_err();
    assert!(matches!(err, EngineError::AlreadyCompleted));

    // Resume has nothing to continue; it reports the current state.
    let noop = engine.resume(&token).await.unwrap();
    assert_eq!(noop.phase, ScanPhase::Completed);

    let cleared = engine.reset().unwrap();
    assert_eq!(cleared.phase, ScanPhase::Idle);
    assert_eq!(cleared.processed, 0);
    assert!(cleared.last_scan.is_none());
    assert!(engine.summary().is_empty());
    assert!(open_store(&temp).load_progress().is_none());

    let rescan = engine.start(&token).await.unwrap();
    assert_eq!(rescan.phase, ScanPhase::Completed);
    assert_eq!(rescan.processed, 3);
}

#[tokio::test]
async fn test_empty_collection_completes_with_zero_progress() {
    let temp = TempDir::new().unwrap();
    let engine = ScanEngine::new(MemoryLibrary::new(), open_store(&temp));

    let snapshot = engine.start(&CancellationToken::new()).await.unwrap();
    assert_eq!(snapshot.phase, ScanPhase::Completed);
    assert_eq!(snapshot.total, 0);
    assert_eq!(snapshot.processed, 0);
    assert_eq!(snapshot.progress, 0.0);
    assert!(snapshot.last_scan.is_some());
    assert!(engine.summary().is_empty());

    // The completion stamp survives a restart even though there is
    // nothing to resume.
    let engine = ScanEngine::new(MemoryLibrary::new(), open_store(&temp));
    assert_eq!(engine.snapshot().phase, ScanPhase::Idle);
    assert!(engine.last_scan_date().is_some());
    assert!(!engine.can_resume());
}

#[tokio::test]
async fn test_rehydration_restores_membership_without_touching_counts() {
    let temp = TempDir::new().unwrap();
    {
        let library = MemoryLibrary::new();
        for (id, value) in [
            ("a1.jpg", 0.01),
            ("a2.jpg", 0.02),
            ("a3.jpg", 0.03),
            ("a4.jpg", 0.04),
            ("x1.jpg", f64::NAN),
            ("x2.jpg", f64::NAN),
        ] {
            library.add(id, value);
        }
        let engine = ScanEngine::new(library, open_store(&temp));
        engine.start(&CancellationToken::new()).await.unwrap();
    }

    let library = MemoryLibrary::new();
    for id in ["a1.jpg", "a2.jpg", "a3.jpg", "a4.jpg", "x1.jpg", "x2.jpg"] {
        library.add(id, 0.0);
    }
    let engine = ScanEngine::new(library, open_store(&temp));
    assert_eq!(engine.snapshot().phase, ScanPhase::Completed);
    assert!(engine.group_items(Some(PhotoGroup::A)).is_empty());

    let snapshot = engine.rehydrate().await;
    assert!(snapshot.is_consistent());
    assert_eq!(snapshot.processed, 6);
    assert_eq!(snapshot.group_counts[&PhotoGroup::A], 4);

    let restored: Vec<String> = engine
        .group_items(Some(PhotoGroup::A))
        .iter()
        .map(|item| item.id.as_str().to_string())
        .collect();
    assert_eq!(restored, ["a1.jpg", "a2.jpg", "a3.jpg", "a4.jpg"]);
    assert_eq!(engine.group_items(None).len(), 2);
}

#[tokio::test]
async fn test_rehydration_drops_unresolvable_ids() {
    let temp = TempDir::new().unwrap();
    {
        let library = MemoryLibrary::new();
        for (id, value) in [
            ("a1.jpg", 0.01),
            ("a2.jpg", 0.02),
            ("a3.jpg", 0.03),
            ("a4.jpg", 0.04),
            ("x1.jpg", f64::NAN),
            ("x2.jpg", f64::NAN),
        ] {
            library.add(id, value);
        }
        let engine = ScanEngine::new(library, open_store(&temp));
        engine.start(&CancellationToken::new()).await.unwrap();
    }

    let library = MemoryLibrary::new();
    for id in ["a1.jpg", "a2.jpg", "a3.jpg", "a4.jpg", "x1.jpg", "x2.jpg"] {
        library.add(id, 0.0);
    }
    let engine = ScanEngine::new(library, open_store(&temp));
    engine.library().remove(&"a2.jpg".into());
    engine.library().remove(&"x1.jpg".into());

    let snapshot = engine.rehydrate().await;

    // Buckets lose the unresolvable items; counters do not move.
    assert_eq!(engine.group_items(Some(PhotoGroup::A)).len(), 3);
    assert_eq!(engine.group_items(None).len(), 1);
    assert_eq!(snapshot.processed, 6);
    assert_eq!(snapshot.group_counts[&PhotoGroup::A], 4);
    assert!(snapshot.is_consistent());

    // Projection reports what is actually loaded.
    let summary = engine.summary();
    assert_eq!(summary[0].count, 3);
    assert_eq!(summary[1].count, 1);
}

#[tokio::test]
async fn test_cancelled_before_first_item_suspends_at_zero() {
    let temp = TempDir::new().unwrap();
    let engine = ScanEngine::new(seeded_library(5), open_store(&temp));

    let token = CancellationToken::new();
    token.cancel();
    let snapshot = engine.start(&token).await.unwrap();
    assert_eq!(snapshot.phase, ScanPhase::Suspended);
    assert_eq!(snapshot.processed, 0);
    assert_eq!(snapshot.total, 5);
    assert!(engine.can_resume());
    // Nothing reached a batch boundary, so nothing is durable yet.
    assert!(open_store(&temp).load_progress().is_none());

    let snapshot = engine.resume(&CancellationToken::new()).await.unwrap();
    assert_eq!(snapshot.phase, ScanPhase::Completed);
    assert_eq!(snapshot.processed, 5);
}

#[tokio::test]
async fn test_resume_completes_immediately_when_collection_shrinks_below_checkpoint() {
    let temp = TempDir::new().unwrap();
    suspend_at_75(&temp).await;

    // Only 30 photos remain, fewer than the 50 already classified.
    let engine = ScanEngine::new(seeded_library(30), open_store(&temp));
    let snapshot = engine.resume(&CancellationToken::new()).await.unwrap();

    assert_eq!(snapshot.phase, ScanPhase::Completed);
    assert_eq!(snapshot.processed, 50);
    assert_eq!(snapshot.total, 50);
    assert_eq!(snapshot.progress, 1.0);
    assert!(snapshot.is_consistent());
    assert!(snapshot.last_scan.is_some());
}

#[tokio::test]
async fn test_resume_refreshes_total_from_fresh_enumeration() {
    let temp = TempDir::new().unwrap();
    suspend_at_75(&temp).await;

    // The collection shrank from 120 to 60, still past the checkpoint.
    let engine = ScanEngine::new(seeded_library(60), open_store(&temp));
    let snapshot = engine.resume(&CancellationToken::new()).await.unwrap();

    assert_eq!(snapshot.phase, ScanPhase::Completed);
    assert_eq!(snapshot.total, 60);
    assert_eq!(snapshot.processed, 60);
    assert_eq!(snapshot.group_counts[&PhotoGroup::A], 40);
    assert_eq!(snapshot.group_counts[&PhotoGroup::B], 20);
    assert_eq!(snapshot.other_count, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_operations_reject_or_noop_while_scanning() {
    let temp = TempDir::new().unwrap();
    let library = seeded_library(5);

    // Park the scan inside the first fingerprint until released.
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
    let gate = std::sync::Mutex::new(Some(release_rx));
    library.set_fingerprint_hook(move |id| {
        if id.as_str() == "photo_0000.jpg" {
            if let Some(rx) = gate.lock().unwrap().take() {
                let _ = rx.recv();
            }
        }
    });

    let engine = Arc::new(ScanEngine::new(library, open_store(&temp)));
    let running = {
        let engine = engine.clone();
        let token = CancellationToken::new();
        tokio::spawn(async move { engine.start(&token).await })
    };
    // The parked fingerprint pins the scan in the Scanning phase.
    while engine.snapshot().phase != ScanPhase::Scanning {
        tokio::task::yield_now().await;
    }
    assert!(engine.is_scanning());

    let second = engine.start(&CancellationToken::new()).await.unwrap();
    assert!(second.is_scanning);

    let resumed = engine.resume(&CancellationToken::new()).await.unwrap();
    assert!(resumed.is_scanning);

    let reset = engine.reset();
    assert!(matches!(reset, Err(EngineError::ScanInProgress)));

    release_tx.send(()).unwrap();
    let snapshot = running.await.unwrap().unwrap();
    assert_eq!(snapshot.phase, ScanPhase::Completed);
    assert_eq!(snapshot.processed, 5);
    engine.library().clear_fingerprint_hook();
}

#[tokio::test]
async fn test_lagged_subscriber_recovers_with_latest_state() {
    let temp = TempDir::new().unwrap();
    // Default capacity (100) is smaller than the event count of a
    // 120-item scan, so a subscriber that never drains must lag.
    let engine = ScanEngine::new(seeded_library(120), open_store(&temp));

    let mut events = engine.subscribe();
    engine.start(&CancellationToken::new()).await.unwrap();

    let mut saw_lag = false;
    let mut latest = None;
    loop {
        match events.try_recv() {
            Ok(snapshot) => latest = Some(snapshot),
            Err(TryRecvError::Lagged(_)) => saw_lag = true,
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Closed) => break,
        }
    }

    assert!(saw_lag);
    let latest = latest.expect("retained snapshots");
    assert_eq!(latest.phase, ScanPhase::Completed);
    assert!(latest.is_consistent());
    assert_eq!(latest.processed, 120);
}
