//! Core types for photosift.
//!
//! This crate provides the fundamental data structures shared by the
//! photosift pipeline: photo groups and the classification rule, item
//! identifiers, scan state with its counting invariant, and the
//! display-ready group summary.

mod config;
mod fingerprint;
mod group;
mod item;
mod state;
mod summary;

pub use config::{EngineConfig, EngineConfigBuilder};
pub use fingerprint::Fingerprint;
pub use group::{GROUPING_RULE_VERSION, PhotoGroup};
pub use item::{ItemId, MediaItem};
pub use state::{GroupMembership, ScanPhase, ScanSnapshot, ScanState};
pub use summary::{GroupSummary, project};
