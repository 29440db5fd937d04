//! Photo library boundary for photosift.
//!
//! This crate defines the [`AssetLibrary`] trait the scan engine drives,
//! plus two implementations:
//!
//! - [`FolderLibrary`], a directory tree of image files
//! - [`MemoryLibrary`], a deterministic in-memory fixture for tests
//!
//! # Overview
//!
//! A library exposes four operations: an access check, stable-order
//! enumeration, identifier resolution, and fingerprint computation. The
//! engine owns everything else (classification, counting, persistence).
//!
//! # Example
//!
//! ```rust,no_run
//! use photosift_library::{AssetLibrary, FolderLibrary};
//!
//! # async fn example() -> Result<(), photosift_library::LibraryError> {
//! let library = FolderLibrary::new("/photos");
//! let items = library.enumerate().await?;
//! println!("{} photos found", items.len());
//! # Ok(())
//! # }
//! ```

mod folder;
mod memory;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use photosift_core::{Fingerprint, ItemId, MediaItem};

pub use folder::{FolderLibrary, IMAGE_EXTENSIONS};
pub use memory::MemoryLibrary;

/// Errors from a photo library backend.
#[derive(Debug, Error)]
pub enum LibraryError {
    /// The library root cannot be read.
    #[error("Access denied: {path}")]
    AccessDenied { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The library root is not a directory.
    #[error("Not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// Other error.
    #[error("{message}")]
    Other { message: String },
}

impl LibraryError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::AccessDenied { path },
            _ => Self::Io { path, source },
        }
    }

    /// Create an error from a message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

/// Outcome of a library access request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessStatus {
    Granted,
    Denied,
}

impl AccessStatus {
    /// Whether access was granted.
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// Boundary to the underlying photo collection.
///
/// Enumeration order must be stable: identical across runs as long as
/// the collection itself is unchanged, because resume positions are
/// indexes into it. Fingerprints must be deterministic and total; a
/// failed computation is routed to the unclassified bucket by the
/// caller.
#[async_trait]
pub trait AssetLibrary: Send + Sync {
    /// Backend name, used for logging only.
    fn name(&self) -> &str;

    /// Ask for permission to read the collection. Idempotent.
    async fn request_access(&self) -> Result<AccessStatus, LibraryError>;

    /// List the whole collection in stable order.
    async fn enumerate(&self) -> Result<Vec<MediaItem>, LibraryError>;

    /// Resolve a persisted identifier back to an item.
    ///
    /// Returns `Ok(None)` when the identifier no longer resolves (the
    /// photo was deleted or moved).
    async fn fetch(&self, id: &ItemId) -> Result<Option<MediaItem>, LibraryError>;

    /// Compute the item's numeric fingerprint.
    async fn fingerprint(&self, item: &MediaItem) -> Result<Fingerprint, LibraryError>;
}
