//! Concurrent membership rehydration.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use photosift_core::{GroupMembership, ItemId, MediaItem, PhotoGroup};
use photosift_library::AssetLibrary;
use photosift_store::MembershipRecord;

type Buckets = DashMap<Option<PhotoGroup>, Vec<MediaItem>>;

/// Resolve a persisted membership record back into live items.
///
/// One task per bucket, joined as a set; each task writes only its own
/// bucket key, so buckets resolve independently and a failed task
/// leaves the others intact. Identifiers the library no longer resolves
/// are dropped.
pub(crate) async fn resolve_buckets<L: AssetLibrary + 'static>(
    library: Arc<L>,
    record: MembershipRecord,
) -> GroupMembership {
    let buckets: Arc<Buckets> = Arc::new(DashMap::new());
    let dropped = Arc::new(AtomicU64::new(0));

    let mut tasks = JoinSet::new();
    for (group, ids) in record.photo_ids_by_group {
        tasks.spawn(resolve_bucket(
            library.clone(),
            Some(group),
            ids,
            buckets.clone(),
            dropped.clone(),
        ));
    }
    tasks.spawn(resolve_bucket(
        library,
        None,
        record.other_photo_ids,
        buckets.clone(),
        dropped.clone(),
    ));

    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined {
            warn!(error = %err, "rehydration task failed, its bucket loads empty");
        }
    }

    let dropped = dropped.load(Ordering::Relaxed);
    if dropped > 0 {
        warn!(dropped, "dropped identifiers that no longer resolve");
    }

    let mut membership = GroupMembership::new();
    for (bucket, items) in Arc::into_inner(buckets).unwrap_or_default() {
        match bucket {
            Some(group) => membership.replace_group(group, items),
            None => membership.replace_others(items),
        }
    }
    membership
}

async fn resolve_bucket<L: AssetLibrary + 'static>(
    library: Arc<L>,
    bucket: Option<PhotoGroup>,
    ids: Vec<ItemId>,
    buckets: Arc<Buckets>,
    dropped: Arc<AtomicU64>,
) {
    let label = match bucket {
        Some(group) => group.to_string(),
        None => "others".to_string(),
    };

    let mut items = Vec::with_capacity(ids.len());
    for id in ids {
        match library.fetch(&id).await {
            Ok(Some(item)) => items.push(item),
            Ok(None) => {
                warn!(id = %id, bucket = %label, "identifier no longer resolves, dropping");
                dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                warn!(id = %id, bucket = %label, error = %err, "failed to resolve identifier, dropping");
                dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    debug!(bucket = %label, resolved = items.len(), "bucket resolved");
    if !items.is_empty() {
        buckets.insert(bucket, items);
    }
}
