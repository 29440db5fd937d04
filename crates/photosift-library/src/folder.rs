//! Folder-backed photo library.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use jwalk::{Parallelism, WalkDir};
use tracing::{debug, warn};

use photosift_core::{Fingerprint, ItemId, MediaItem};

use crate::{AccessStatus, AssetLibrary, LibraryError};

/// File extensions treated as photos (lowercase).
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "avif", "bmp", "dng", "gif", "heic", "heif", "jpeg", "jpg", "png", "tif", "tiff", "webp",
];

/// Photo library backed by a directory tree of image files.
///
/// Identifiers are paths relative to the root. Enumeration walks the
/// tree, keeps files with a known image extension, and sorts by
/// identifier, so the order is stable across runs for an unchanged
/// tree. Hidden entries (dot-files) are skipped, which also keeps the
/// checkpoint directory out of its own scan.
pub struct FolderLibrary {
    root: PathBuf,
    extensions: Vec<String>,
}

impl FolderLibrary {
    /// Create a library over a directory, using the default image
    /// extensions.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: IMAGE_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// Create a library with a custom extension set.
    pub fn with_extensions(
        root: impl Into<PathBuf>,
        extensions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            root: root.into(),
            extensions: extensions
                .into_iter()
                .map(|e| e.into().to_ascii_lowercase())
                .collect(),
        }
    }

    /// The library root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_image(extensions: &[String], path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .is_some_and(|e| extensions.iter().any(|known| *known == e))
    }

    fn absolute(&self, id: &ItemId) -> PathBuf {
        self.root.join(id.as_str())
    }
}

#[async_trait]
impl AssetLibrary for FolderLibrary {
    fn name(&self) -> &str {
        "folder"
    }

    async fn request_access(&self) -> Result<AccessStatus, LibraryError> {
        let root = self.root.clone();
        let probe = tokio::task::spawn_blocking(move || match std::fs::read_dir(&root) {
            Ok(_) => Ok(AccessStatus::Granted),
            Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
                Ok(AccessStatus::Denied)
            }
            Err(err) => Err(LibraryError::io(root, err)),
        })
        .await
        .map_err(|err| LibraryError::other(format!("access probe task failed: {err}")))?;
        probe
    }

    async fn enumerate(&self) -> Result<Vec<MediaItem>, LibraryError> {
        let root = self.root.clone();
        let extensions = self.extensions.clone();

        let items = tokio::task::spawn_blocking(move || {
            let root = root
                .canonicalize()
                .map_err(|err| LibraryError::io(&root, err))?;
            if !root.is_dir() {
                return Err(LibraryError::NotADirectory { path: root });
            }

            let walker = WalkDir::new(&root)
                .parallelism(Parallelism::RayonDefaultPool {
                    busy_timeout: std::time::Duration::from_millis(100),
                })
                .skip_hidden(true)
                .follow_links(false);

            let mut items = Vec::new();
            for entry_result in walker {
                let entry = match entry_result {
                    Ok(entry) => entry,
                    Err(err) => {
                        warn!(error = %err, "skipping unreadable entry");
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                let path = entry.path();
                if !Self::is_image(&extensions, &path) {
                    continue;
                }
                let relative = match path.strip_prefix(&root) {
                    Ok(relative) => relative,
                    Err(_) => continue,
                };
                let metadata = match entry.metadata() {
                    Ok(metadata) => metadata,
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "skipping entry without metadata");
                        continue;
                    }
                };
                items.push(MediaItem::with_metadata(
                    relative.to_string_lossy().into_owned(),
                    metadata.len(),
                    metadata.modified().ok(),
                ));
            }

            // Stable order: jwalk yields in parallel discovery order.
            items.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(items)
        })
        .await
        .map_err(|err| LibraryError::other(format!("enumeration task failed: {err}")))??;

        debug!(count = items.len(), "enumerated folder library");
        Ok(items)
    }

    async fn fetch(&self, id: &ItemId) -> Result<Option<MediaItem>, LibraryError> {
        let path = self.absolute(id);
        let id = id.clone();
        tokio::task::spawn_blocking(move || match std::fs::symlink_metadata(&path) {
            Ok(metadata) if metadata.is_file() => Ok(Some(MediaItem::with_metadata(
                id,
                metadata.len(),
                metadata.modified().ok(),
            ))),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(LibraryError::io(path, err)),
        })
        .await
        .map_err(|err| LibraryError::other(format!("fetch task failed: {err}")))?
    }

    async fn fingerprint(&self, item: &MediaItem) -> Result<Fingerprint, LibraryError> {
        let path = self.absolute(&item.id);
        tokio::task::spawn_blocking(move || {
            let mut hasher = blake3::Hasher::new();
            hasher
                .update_mmap(&path)
                .map_err(|err| LibraryError::io(&path, err))?;
            let hash = hasher.finalize();
            let mut prefix = [0u8; 8];
            prefix.copy_from_slice(&hash.as_bytes()[..8]);
            Ok(Fingerprint::from_hash_prefix(prefix))
        })
        .await
        .map_err(|err| LibraryError::other(format!("fingerprint task failed: {err}")))?
    }
}
