//! Display-ready group summaries.

use serde::Serialize;
use strum::IntoEnumIterator;

use crate::group::PhotoGroup;
use crate::state::{GroupMembership, ScanState};

/// One row of the group overview: a bucket and how many photos it holds.
///
/// `group` is `None` for the unclassified ("Others") bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupSummary {
    /// The bucket, or `None` for Others.
    pub group: Option<PhotoGroup>,
    /// Photos in the bucket.
    pub count: u64,
}

impl GroupSummary {
    /// Human-readable bucket name.
    pub fn display_name(&self) -> String {
        match self.group {
            Some(group) => group.display_name(),
            None => "Others".to_string(),
        }
    }
}

/// Derive the ordered group overview from engine state.
///
/// Groups appear in canonical order and only when non-empty; the
/// unclassified bucket comes last. Counts come from live membership when
/// it has been populated, falling back to the checkpoint counters so the
/// overview is available right after restart, before rehydration lands.
pub fn project(state: &ScanState, membership: &GroupMembership) -> Vec<GroupSummary> {
    let mut rows = Vec::new();

    for group in PhotoGroup::iter() {
        let held = membership.group(group).len() as u64;
        if held > 0 {
            rows.push(GroupSummary {
                group: Some(group),
                count: held,
            });
        } else if state.group_count(group) > 0 {
            rows.push(GroupSummary {
                group: Some(group),
                count: state.group_count(group),
            });
        }
    }

    let held_others = membership.others().len() as u64;
    if held_others > 0 {
        rows.push(GroupSummary {
            group: None,
            count: held_others,
        });
    } else if state.other_count() > 0 {
        rows.push(GroupSummary {
            group: None,
            count: state.other_count(),
        });
    }

    rows
}
