//! Photo groups and the fingerprint classification rule.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoEnumIterator};

use crate::fingerprint::Fingerprint;

/// Version of the fingerprint-to-group rule.
///
/// Stamped into every persisted record; a checkpoint written under a
/// different version is treated as absent on load, so results produced
/// by different rules never mix.
pub const GROUPING_RULE_VERSION: u32 = 1;

/// The fixed set of photo groups, in canonical order.
///
/// Serialized as its lowercase letter ("a" through "j"), which is also
/// the wire label used as a map key in persisted records.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PhotoGroup {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
}

impl PhotoGroup {
    /// Number of groups.
    pub const COUNT: usize = 10;

    /// Classify a fingerprint into a group.
    ///
    /// The unit interval `[0, 1)` is split into `COUNT` equal half-open
    /// intervals, `[k/10, (k+1)/10)`, assigned to the groups in canonical
    /// order. Non-finite fingerprints and values outside `[0, 1)` return
    /// `None`, the unclassified bucket. Deterministic: the same
    /// fingerprint always lands in the same bucket.
    pub fn for_fingerprint(fingerprint: Fingerprint) -> Option<Self> {
        if !fingerprint.is_classifiable() {
            return None;
        }
        let value = fingerprint.value();
        for (index, group) in Self::iter().enumerate() {
            let upper = (index + 1) as f64 / Self::COUNT as f64;
            if value < upper {
                return Some(group);
            }
        }
        // Unreachable for classifiable values; kept total regardless.
        None
    }

    /// Human-readable name, e.g. "Group A".
    pub fn display_name(&self) -> String {
        format!("Group {}", self.to_string().to_uppercase())
    }
}
