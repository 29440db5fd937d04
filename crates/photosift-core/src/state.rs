//! Scan state, group membership, and observable snapshots.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::group::PhotoGroup;
use crate::item::{ItemId, MediaItem};

/// Lifecycle phase of the scan engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScanPhase {
    /// No scan has run and no checkpoint exists.
    Idle,
    /// Waiting on the library access prompt.
    RequestingAccess,
    /// Classification loop in flight.
    Scanning,
    /// Interrupted mid-scan; a resumable checkpoint exists.
    Suspended,
    /// Scan finished; terminal until an explicit reset.
    Completed,
}

impl ScanPhase {
    /// Whether the classification loop is running.
    pub fn is_scanning(&self) -> bool {
        matches!(self, Self::Scanning)
    }

    /// Whether the phase is a resting state (no scan in flight).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Idle | Self::Suspended | Self::Completed)
    }
}

/// Running counters for a scan.
///
/// Fields are private so the counting invariant
/// `processed == sum(group counts) + other_count <= total`
/// holds at every observable instant: [`record`](Self::record) bumps a
/// bucket count and `processed` together, and [`restore`](Self::restore)
/// rejects checkpoints that violate it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanState {
    processed: u64,
    total: u64,
    group_counts: BTreeMap<PhotoGroup, u64>,
    other_count: u64,
}

impl ScanState {
    /// Empty state (nothing scanned, nothing known).
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh state for a scan over a collection of known size.
    pub fn begin(total: u64) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Rebuild state from checkpoint fields.
    ///
    /// Returns `None` if the counters violate the counting invariant;
    /// such a checkpoint is corrupt and must be treated as absent.
    pub fn restore(
        processed: u64,
        total: u64,
        group_counts: BTreeMap<PhotoGroup, u64>,
        other_count: u64,
    ) -> Option<Self> {
        let state = Self {
            processed,
            total,
            group_counts,
            other_count,
        };
        state.is_consistent().then_some(state)
    }

    /// Record one classified item: bumps the bucket count and the
    /// processed count in a single step.
    pub fn record(&mut self, bucket: Option<PhotoGroup>) {
        match bucket {
            Some(group) => *self.group_counts.entry(group).or_insert(0) += 1,
            None => self.other_count += 1,
        }
        self.processed += 1;
    }

    /// Refresh the collection size (resume re-enumerates the library).
    pub fn set_total(&mut self, total: u64) {
        self.total = total;
    }

    /// Finalize counters at scan completion.
    ///
    /// A collection that shrank between checkpoint and resume can leave
    /// `processed` past the refreshed total; completion realigns the
    /// total so `processed == total` without touching bucket counts.
    pub fn complete(&mut self) {
        if self.processed > self.total {
            self.total = self.processed;
        }
    }

    /// Items classified so far.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Size of the enumerated collection.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Count for one group (0 if the group has no items).
    pub fn group_count(&self, group: PhotoGroup) -> u64 {
        self.group_counts.get(&group).copied().unwrap_or(0)
    }

    /// All non-zero group counts in canonical order.
    pub fn group_counts(&self) -> &BTreeMap<PhotoGroup, u64> {
        &self.group_counts
    }

    /// Items routed to the unclassified bucket.
    pub fn other_count(&self) -> u64 {
        self.other_count
    }

    /// Completion fraction, clamped to `[0.0, 1.0]`.
    ///
    /// 0.0 for an empty collection, never NaN.
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.processed as f64 / self.total as f64).clamp(0.0, 1.0)
    }

    /// Whether an interrupted scan can pick up where it left off.
    pub fn can_resume(&self) -> bool {
        self.processed < self.total && self.total > 0
    }

    /// Check the counting invariant.
    pub fn is_consistent(&self) -> bool {
        let classified: u64 = self.group_counts.values().sum::<u64>() + self.other_count;
        classified == self.processed && self.processed <= self.total
    }
}

/// Which photos landed in which bucket, in classification order.
///
/// During a scan items are appended as they classify; after rehydration
/// buckets hold resolved items in persisted order. Across all buckets an
/// identifier appears at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupMembership {
    groups: BTreeMap<PhotoGroup, Vec<MediaItem>>,
    others: Vec<MediaItem>,
}

impl GroupMembership {
    /// Empty membership.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item to its bucket.
    pub fn insert(&mut self, bucket: Option<PhotoGroup>, item: MediaItem) {
        match bucket {
            Some(group) => self.groups.entry(group).or_default().push(item),
            None => self.others.push(item),
        }
    }

    /// Items in one group, in order.
    pub fn group(&self, group: PhotoGroup) -> &[MediaItem] {
        self.groups.get(&group).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Items in the unclassified bucket, in order.
    pub fn others(&self) -> &[MediaItem] {
        &self.others
    }

    /// Replace a group's bucket wholesale (rehydration).
    pub fn replace_group(&mut self, group: PhotoGroup, items: Vec<MediaItem>) {
        if items.is_empty() {
            self.groups.remove(&group);
        } else {
            self.groups.insert(group, items);
        }
    }

    /// Replace the unclassified bucket wholesale (rehydration).
    pub fn replace_others(&mut self, items: Vec<MediaItem>) {
        self.others = items;
    }

    /// Total items held across all buckets.
    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum::<usize>() + self.others.len()
    }

    /// Whether no bucket holds any item.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all buckets.
    pub fn clear(&mut self) {
        self.groups.clear();
        self.others.clear();
    }

    /// Identifier lists per group, for persistence.
    pub fn ids_by_group(&self) -> BTreeMap<PhotoGroup, Vec<ItemId>> {
        self.groups
            .iter()
            .map(|(group, items)| (*group, items.iter().map(|item| item.id.clone()).collect()))
            .collect()
    }

    /// Identifiers in the unclassified bucket, for persistence.
    pub fn other_ids(&self) -> Vec<ItemId> {
        self.others.iter().map(|item| item.id.clone()).collect()
    }
}

/// Immutable copy of observable engine state, broadcast on every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSnapshot {
    /// Current lifecycle phase.
    pub phase: ScanPhase,
    /// Items classified so far.
    pub processed: u64,
    /// Size of the enumerated collection.
    pub total: u64,
    /// Per-group counts (groups with zero items omitted).
    pub group_counts: BTreeMap<PhotoGroup, u64>,
    /// Unclassified count.
    pub other_count: u64,
    /// Completion fraction in `[0.0, 1.0]`, 0.0 when the collection is
    /// empty.
    pub progress: f64,
    /// Whether an interrupted scan can resume.
    pub can_resume: bool,
    /// Whether the classification loop is running.
    pub is_scanning: bool,
    /// When the last scan completed, if any.
    pub last_scan: Option<DateTime<Utc>>,
}

impl ScanSnapshot {
    /// Build a snapshot from live state.
    pub fn from_state(
        phase: ScanPhase,
        state: &ScanState,
        last_scan: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            phase,
            processed: state.processed(),
            total: state.total(),
            group_counts: state.group_counts().clone(),
            other_count: state.other_count(),
            progress: if phase == ScanPhase::Completed && state.total() > 0 {
                1.0
            } else {
                state.progress()
            },
            can_resume: state.can_resume(),
            is_scanning: phase.is_scanning(),
            last_scan,
        }
    }

    /// Check the counting invariant on the snapshot's counters.
    pub fn is_consistent(&self) -> bool {
        let classified: u64 = self.group_counts.values().sum::<u64>() + self.other_count;
        classified == self.processed && self.processed <= self.total
    }
}
