//! Serialized checkpoint record shapes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use photosift_core::{GROUPING_RULE_VERSION, GroupMembership, ItemId, PhotoGroup, ScanState};

/// Durable scan counters, written every checkpoint batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Grouping rule version the counts were produced under.
    pub rule_version: u32,
    /// Items classified so far.
    pub processed_photos: u64,
    /// Collection size at checkpoint time.
    pub total_photos: u64,
    /// Per-group counts, keyed by group wire label.
    pub group_counts: BTreeMap<PhotoGroup, u64>,
    /// Count of items no group accepted.
    pub other_count: u64,
    /// When the checkpoint was taken.
    pub timestamp: DateTime<Utc>,
}

impl ProgressRecord {
    /// Snapshot the counters of a live scan state.
    pub fn from_state(state: &ScanState) -> Self {
        Self {
            rule_version: GROUPING_RULE_VERSION,
            processed_photos: state.processed(),
            total_photos: state.total(),
            group_counts: state.group_counts().clone(),
            other_count: state.other_count(),
            timestamp: Utc::now(),
        }
    }

    /// Rebuild scan state from this record.
    ///
    /// Returns `None` when the record was written under a different
    /// grouping rule or its counters violate the counting invariant.
    /// Either way the checkpoint is unusable and must read as absent.
    pub fn to_state(&self) -> Option<ScanState> {
        if self.rule_version != GROUPING_RULE_VERSION {
            return None;
        }
        ScanState::restore(
            self.processed_photos,
            self.total_photos,
            self.group_counts.clone(),
            self.other_count,
        )
    }
}

/// Durable group membership: identifier lists in classification order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipRecord {
    /// Grouping rule version the buckets were produced under.
    pub rule_version: u32,
    /// Identifiers per group, keyed by group wire label.
    pub photo_ids_by_group: BTreeMap<PhotoGroup, Vec<ItemId>>,
    /// Identifiers no group accepted.
    pub other_photo_ids: Vec<ItemId>,
    /// When the checkpoint was taken.
    pub timestamp: DateTime<Utc>,
}

impl MembershipRecord {
    /// Snapshot the identifier lists of live membership.
    pub fn from_membership(membership: &GroupMembership) -> Self {
        Self {
            rule_version: GROUPING_RULE_VERSION,
            photo_ids_by_group: membership.ids_by_group(),
            other_photo_ids: membership.other_ids(),
            timestamp: Utc::now(),
        }
    }

    /// Whether the record was written under the current grouping rule.
    pub fn is_current(&self) -> bool {
        self.rule_version == GROUPING_RULE_VERSION
    }

    /// Total identifiers across all buckets.
    pub fn len(&self) -> usize {
        let grouped: usize = self.photo_ids_by_group.values().map(Vec::len).sum();
        grouped + self.other_photo_ids.len()
    }

    /// Whether every bucket is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Completion stamp for the last finished scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastScanRecord {
    /// When the scan completed.
    pub timestamp: DateTime<Utc>,
}
