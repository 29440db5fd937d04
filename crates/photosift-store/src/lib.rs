//! Checkpoint persistence for resumable photo scans.
//!
//! # Overview
//!
//! A [`CheckpointStore`] is a directory of JSON documents, one per
//! record: scan progress (counters), group membership (identifier
//! lists), and the date of the last completed scan. Records are
//! replaced atomically so a crash mid-save never clobbers the previous
//! durable value.
//!
//! Loads are absorbing: a missing file, unreadable bytes, a stale
//! grouping rule version, or counters that fail the counting invariant
//! all come back as "no checkpoint" with a logged warning. Callers
//! never have to distinguish a never-scanned library from a corrupt
//! one.
//!
//! # Example
//!
//! ```no_run
//! use photosift_core::ScanState;
//! use photosift_store::CheckpointStore;
//!
//! # fn example() -> Result<(), photosift_store::StoreError> {
//! let store = CheckpointStore::open("/photos/.photosift")?;
//! let mut state = ScanState::begin(120);
//! state.record(None);
//! store.save_progress(&state)?;
//! assert!(store.load_progress().is_some());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

use thiserror::Error;

mod records;
mod store;

pub use records::{LastScanRecord, MembershipRecord, ProgressRecord};
pub use store::{CheckpointStore, MEMBERSHIP_FILE, PROGRESS_FILE, SCAN_DATE_FILE};

/// Errors surfaced by checkpoint writes.
///
/// Reads do not error; they absorb failures into "absent".
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record could not be serialized.
    #[error("failed to encode {file}: {source}")]
    Encode {
        file: String,
        #[source]
        source: serde_json::Error,
    },

    /// Filesystem failure underneath the store directory.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
