//! Directory-backed checkpoint store.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use photosift_core::{GroupMembership, ScanState};

use crate::StoreError;
use crate::records::{LastScanRecord, MembershipRecord, ProgressRecord};

/// File holding the progress record.
pub const PROGRESS_FILE: &str = "progress.json";
/// File holding the membership record.
pub const MEMBERSHIP_FILE: &str = "membership.json";
/// File holding the last completed scan date.
pub const SCAN_DATE_FILE: &str = "last_scan.json";

/// Checkpoint records in a directory, one JSON file per record.
///
/// Every save replaces the whole record: serialize to a temp file in
/// the same directory, then rename over the target. The previous
/// durable value survives any failure before the rename.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Open a store rooted at a directory, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|err| StoreError::io(&dir, err))?;
        Ok(Self { dir })
    }

    /// The store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist scan counters.
    pub fn save_progress(&self, state: &ScanState) -> Result<(), StoreError> {
        self.write_json(PROGRESS_FILE, &ProgressRecord::from_state(state))
    }

    /// Load persisted scan counters.
    ///
    /// Absent, unreadable, stale-rule, or inconsistent records all read
    /// as `None`.
    pub fn load_progress(&self) -> Option<ScanState> {
        let record: ProgressRecord = self.read_json(PROGRESS_FILE)?;
        let state = record.to_state();
        if state.is_none() {
            warn!(
                file = PROGRESS_FILE,
                rule_version = record.rule_version,
                "discarding stale or inconsistent progress record"
            );
        }
        state
    }

    /// Persist group membership identifier lists.
    pub fn save_membership(&self, membership: &GroupMembership) -> Result<(), StoreError> {
        self.write_json(MEMBERSHIP_FILE, &MembershipRecord::from_membership(membership))
    }

    /// Load persisted membership identifier lists.
    ///
    /// Absent, unreadable, or stale-rule records read as `None`.
    pub fn load_membership(&self) -> Option<MembershipRecord> {
        let record: MembershipRecord = self.read_json(MEMBERSHIP_FILE)?;
        if !record.is_current() {
            warn!(
                file = MEMBERSHIP_FILE,
                rule_version = record.rule_version,
                "discarding membership record from a different grouping rule"
            );
            return None;
        }
        Some(record)
    }

    /// Stamp the completion date of a finished scan.
    pub fn mark_scan_date(&self, timestamp: DateTime<Utc>) -> Result<(), StoreError> {
        self.write_json(SCAN_DATE_FILE, &LastScanRecord { timestamp })
    }

    /// Date of the last completed scan, if any.
    pub fn last_scan_date(&self) -> Option<DateTime<Utc>> {
        self.read_json::<LastScanRecord>(SCAN_DATE_FILE)
            .map(|record| record.timestamp)
    }

    /// Remove every record.
    ///
    /// Unlike saves, failures here propagate: a reset that did not
    /// happen must not look like one that did.
    pub fn clear(&self) -> Result<(), StoreError> {
        for file in [PROGRESS_FILE, MEMBERSHIP_FILE, SCAN_DATE_FILE] {
            let path = self.dir.join(file);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(StoreError::io(path, err)),
            }
        }
        debug!(dir = %self.dir.display(), "cleared checkpoint store");
        Ok(())
    }

    fn write_json<T: Serialize>(&self, file: &str, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(value).map_err(|err| StoreError::Encode {
            file: file.to_string(),
            source: err,
        })?;
        let path = self.dir.join(file);
        let tmp = self.dir.join(format!("{file}.tmp"));
        fs::write(&tmp, &json).map_err(|err| StoreError::io(&tmp, err))?;
        fs::rename(&tmp, &path).map_err(|err| StoreError::io(&path, err))?;
        debug!(path = %path.display(), bytes = json.len(), "wrote checkpoint record");
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(&self, file: &str) -> Option<T> {
        let path = self.dir.join(file);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read checkpoint record");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to decode checkpoint record, treating as absent"
                );
                None
            }
        }
    }
}
