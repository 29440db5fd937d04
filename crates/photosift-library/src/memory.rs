//! In-memory photo library for tests and demos.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use async_trait::async_trait;

use photosift_core::{Fingerprint, ItemId, MediaItem};

use crate::{AccessStatus, AssetLibrary, LibraryError};

type FingerprintHook = Box<dyn Fn(&ItemId) + Send + Sync>;

/// Deterministic in-memory library.
///
/// Items enumerate in insertion order with preset fingerprints. The
/// access switch, item removal, and the fingerprint hook exist to drive
/// denial, unresolvable-identifier, and mid-scan interruption scenarios
/// from tests.
#[derive(Default)]
pub struct MemoryLibrary {
    items: RwLock<Vec<MediaItem>>,
    fingerprints: RwLock<HashMap<ItemId, f64>>,
    access_denied: AtomicBool,
    fingerprint_hook: Mutex<Option<FingerprintHook>>,
}

impl MemoryLibrary {
    /// Empty library with access granted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an item with a preset fingerprint value.
    pub fn add(&self, id: impl Into<ItemId>, fingerprint: f64) {
        let item = MediaItem::new(id);
        self.fingerprints
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(item.id.clone(), fingerprint);
        self.items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(item);
    }

    /// Remove an item; it disappears from enumeration and no longer
    /// resolves.
    pub fn remove(&self, id: &ItemId) {
        self.items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|item| item.id != *id);
    }

    /// Make subsequent access requests fail.
    pub fn deny_access(&self) {
        self.access_denied.store(true, Ordering::SeqCst);
    }

    /// Make subsequent access requests succeed (the default).
    pub fn grant_access(&self) {
        self.access_denied.store(false, Ordering::SeqCst);
    }

    /// Install a hook invoked on every fingerprint computation, e.g. to
    /// cancel a scan at an exact item. Replaces any previous hook.
    pub fn set_fingerprint_hook(&self, hook: impl Fn(&ItemId) + Send + Sync + 'static) {
        *self
            .fingerprint_hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(hook));
    }

    /// Remove the fingerprint hook.
    pub fn clear_fingerprint_hook(&self) {
        *self
            .fingerprint_hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Number of items currently in the library.
    pub fn len(&self) -> usize {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the library holds no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AssetLibrary for MemoryLibrary {
    fn name(&self) -> &str {
        "memory"
    }

    async fn request_access(&self) -> Result<AccessStatus, LibraryError> {
        if self.access_denied.load(Ordering::SeqCst) {
            Ok(AccessStatus::Denied)
        } else {
            Ok(AccessStatus::Granted)
        }
    }

    async fn enumerate(&self) -> Result<Vec<MediaItem>, LibraryError> {
        Ok(self
            .items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn fetch(&self, id: &ItemId) -> Result<Option<MediaItem>, LibraryError> {
        Ok(self
            .items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|item| item.id == *id)
            .cloned())
    }

    async fn fingerprint(&self, item: &MediaItem) -> Result<Fingerprint, LibraryError> {
        if let Some(hook) = self
            .fingerprint_hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            hook(&item.id);
        }
        let value = self
            .fingerprints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&item.id)
            .copied()
            .unwrap_or(f64::NAN);
        Ok(Fingerprint::new(value))
    }
}
