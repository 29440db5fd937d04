//! Resumable photo classification engine.
//!
//! # Overview
//!
//! A [`ScanEngine`] drives one scan over an asset library: enumerate,
//! fingerprint each item, bucket it into a photo group, and broadcast a
//! full state snapshot after every observable change. Progress and
//! membership checkpoint to a [`CheckpointStore`] every batch, so an
//! interrupted scan continues from its last durable point instead of
//! starting over.
//!
//! A new engine seeds itself from the store: counts and phase come from
//! the progress record, while membership rehydrates separately (and
//! concurrently, one task per bucket) because it has to resolve
//! persisted identifiers back through the library.
//!
//! # Example
//!
//! ```no_run
//! use photosift_engine::ScanEngine;
//! use photosift_library::FolderLibrary;
//! use photosift_store::CheckpointStore;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), photosift_engine::EngineError> {
//! let store = CheckpointStore::open("/photos/.photosift")?;
//! let engine = ScanEngine::new(FolderLibrary::new("/photos"), store);
//!
//! let mut events = engine.subscribe();
//! tokio::spawn(async move {
//!     while let Ok(snapshot) = events.recv().await {
//!         println!("{:.0}%", snapshot.progress * 100.0);
//!     }
//! });
//!
//! let snapshot = engine.start(&CancellationToken::new()).await?;
//! println!("classified {} photos", snapshot.processed);
//! # Ok(())
//! # }
//! ```

use thiserror::Error;

use photosift_library::LibraryError;
use photosift_store::StoreError;

mod engine;
mod rehydrate;

pub use engine::ScanEngine;

/// Errors surfaced by scan lifecycle operations.
///
/// Checkpoint save and load failures never appear here; they are logged
/// and absorbed so a flaky disk cannot kill a scan.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The library refused access. Nothing was scanned or persisted.
    #[error("photo library access denied")]
    AccessDenied,

    /// A completed scan stays completed until an explicit reset.
    #[error("scan already completed; reset before scanning again")]
    AlreadyCompleted,

    /// The operation cannot run while the classification loop is live.
    #[error("a scan is currently running")]
    ScanInProgress,

    /// Library boundary failure outside the per-item loop.
    #[error(transparent)]
    Library(#[from] LibraryError),

    /// Store failure on a path where it must not be absorbed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
