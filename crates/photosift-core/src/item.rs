//! Item identifiers and resolved item references.

use std::fmt;
use std::time::SystemTime;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Opaque identifier for a photo, stable across process restarts.
///
/// For a folder-backed library this is the path of the file relative to
/// the scan root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(CompactString);

impl ItemId {
    /// Create a new identifier.
    pub fn new(id: impl Into<CompactString>) -> Self {
        Self(id.into())
    }

    /// View the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ItemId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// A resolved reference to a photo in the library.
///
/// Carries the identifier plus cheap metadata. The pipeline never mutates
/// the underlying asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    /// Stable identifier.
    pub id: ItemId,
    /// Size in bytes (0 if unknown).
    pub size: u64,
    /// Last modification time, if the library reports one.
    pub modified: Option<SystemTime>,
}

impl MediaItem {
    /// Create an item with no metadata.
    pub fn new(id: impl Into<ItemId>) -> Self {
        Self {
            id: id.into(),
            size: 0,
            modified: None,
        }
    }

    /// Create an item with size and modification time.
    pub fn with_metadata(id: impl Into<ItemId>, size: u64, modified: Option<SystemTime>) -> Self {
        Self {
            id: id.into(),
            size,
            modified,
        }
    }
}
