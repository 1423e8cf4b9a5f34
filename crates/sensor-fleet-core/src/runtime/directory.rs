// crates/sensor-fleet-core/src/runtime/directory.rs
// ============================================================================
// Module: Sensor Fleet Location Directory
// Description: Modification-time invalidated cache of the device directory file.
// Purpose: Resolve device identifiers to locations and staggered send delays.
// Dependencies: crate::core, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The directory file is a JSON object mapping device identifier to location
//! name. Operators edit it in place; the cache notices by comparing the
//! file's modification time on every lookup and reloads the whole mapping
//! when it changes. Each device is assigned a delay offset of `step * i`,
//! where `i` is its position in file order, so devices spread their
//! submissions instead of waking in lockstep.
//!
//! # Invariants
//! - Readers see either the previous snapshot or the new one, never a mix.
//! - Only one caller reloads at a time; cache hits take only the read lock.
//! - A failed reload keeps the last good snapshot and is reported as a
//!   warning on the lookup that attempted it. The snapshot keeps the
//!   modification time of its last successful load, so later lookups retry
//!   until the file parses; repeat failures at the same modification time
//!   are not reported again.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::RwLock;
use std::time::SystemTime;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::core::DeviceId;
use crate::core::Location;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default spacing between consecutive device delay offsets (100 ms).
pub const DEFAULT_DELAY_STEP_US: u64 = 100_000;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Directory reload errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    /// Directory file could not be read.
    #[error("directory io error: {0}")]
    Io(String),
    /// Directory file is not a JSON object of strings.
    #[error("directory parse error: {0}")]
    Parse(String),
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// One device row in directory file order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Device identifier as written in the file.
    pub device_id: String,
    /// Assigned location.
    pub location: Location,
    /// Assigned send delay offset in microseconds.
    pub delay_us: u64,
}

/// Result of resolving one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryLookup {
    /// Resolved location, or [`Location::unknown`].
    pub location: Location,
    /// Assigned delay offset in microseconds.
    pub delay_us: u64,
    /// Reload failure observed while serving this lookup.
    pub warning: Option<DirectoryError>,
}

/// Immutable directory state swapped in as a whole.
#[derive(Debug, Default)]
struct DirectorySnapshot {
    /// Modification time of the last successful load.
    observed: Option<SystemTime>,
    /// Modification time of the last failed reload already reported.
    failed: Option<SystemTime>,
    /// Entries in file order.
    entries: Vec<DirectoryEntry>,
    /// Device identifier to entry index.
    index: HashMap<String, usize>,
}

impl DirectorySnapshot {
    /// Builds a snapshot with an index over `entries`.
    fn new(observed: Option<SystemTime>, entries: Vec<DirectoryEntry>) -> Self {
        let index = entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (entry.device_id.clone(), position))
            .collect();
        Self {
            observed,
            failed: None,
            entries,
            index,
        }
    }

    /// Copies this snapshot, marking `failed` as an already reported failure.
    fn with_failure(&self, failed: SystemTime) -> Self {
        Self {
            observed: self.observed,
            failed: Some(failed),
            entries: self.entries.clone(),
            index: self.index.clone(),
        }
    }

    /// Looks up a device in this snapshot.
    fn lookup(&self, device_id: &DeviceId, warning: Option<DirectoryError>) -> DirectoryLookup {
        match self.index.get(device_id.as_str()).and_then(|position| self.entries.get(*position)) {
            Some(entry) => DirectoryLookup {
                location: entry.location.clone(),
                delay_us: entry.delay_us,
                warning,
            },
            None => DirectoryLookup {
                location: Location::unknown(),
                delay_us: 0,
                warning,
            },
        }
    }
}

// ============================================================================
// SECTION: Directory Cache
// ============================================================================

/// Location directory cache shared by every request handler.
#[derive(Debug)]
pub struct LocationDirectory {
    /// Directory file path.
    path: PathBuf,
    /// Delay spacing in microseconds.
    delay_step_us: u64,
    /// Current snapshot.
    snapshot: RwLock<Arc<DirectorySnapshot>>,
    /// Serializes reloads.
    reload: Mutex<()>,
}

impl LocationDirectory {
    /// Creates a cache over `path`. Nothing is read until the first lookup.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, delay_step_us: u64) -> Self {
        Self {
            path: path.into(),
            delay_step_us,
            snapshot: RwLock::new(Arc::new(DirectorySnapshot::default())),
            reload: Mutex::new(()),
        }
    }

    /// Returns the directory file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolves a device to its location and delay offset.
    #[must_use]
    pub fn resolve(&self, device_id: &DeviceId) -> DirectoryLookup {
        let (snapshot, warning) = self.refreshed();
        snapshot.lookup(device_id, warning)
    }

    /// Returns all entries in file order along with any reload warning.
    #[must_use]
    pub fn entries(&self) -> (Vec<DirectoryEntry>, Option<DirectoryError>) {
        let (snapshot, warning) = self.refreshed();
        (snapshot.entries.clone(), warning)
    }

    /// Returns a snapshot consistent with the file's current modification time.
    fn refreshed(&self) -> (Arc<DirectorySnapshot>, Option<DirectoryError>) {
        let current = self.current();
        let modified = match fs::metadata(&self.path).and_then(|meta| meta.modified()) {
            Ok(modified) => modified,
            Err(err) => {
                return (current, Some(DirectoryError::Io(format!("{}: {err}", self.path.display()))));
            }
        };
        if current.observed == Some(modified) {
            return (current, None);
        }
        self.reload(modified)
    }

    /// Reloads the file under the reload lock.
    fn reload(&self, modified: SystemTime) -> (Arc<DirectorySnapshot>, Option<DirectoryError>) {
        let _guard = self.reload.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let current = self.current();
        if current.observed == Some(modified) {
            return (current, None);
        }
        match load_entries(&self.path, self.delay_step_us) {
            Ok(entries) => {
                let next = Arc::new(DirectorySnapshot::new(Some(modified), entries));
                self.install(Arc::clone(&next));
                (next, None)
            }
            Err(_) if current.failed == Some(modified) => (current, None),
            Err(err) => {
                let retained = Arc::new(current.with_failure(modified));
                self.install(Arc::clone(&retained));
                (retained, Some(err))
            }
        }
    }

    /// Returns the current snapshot.
    fn current(&self) -> Arc<DirectorySnapshot> {
        match self.snapshot.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Publishes a new snapshot.
    fn install(&self, next: Arc<DirectorySnapshot>) {
        match self.snapshot.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads the directory file and assigns delay offsets in file order.
fn load_entries(path: &Path, delay_step_us: u64) -> Result<Vec<DirectoryEntry>, DirectoryError> {
    let text = fs::read_to_string(path)
        .map_err(|err| DirectoryError::Io(format!("{}: {err}", path.display())))?;
    let mapping: Map<String, Value> = serde_json::from_str(&text)
        .map_err(|err| DirectoryError::Parse(format!("{}: {err}", path.display())))?;
    let mut entries = Vec::with_capacity(mapping.len());
    let mut delay_us: u64 = 0;
    for (device_id, value) in mapping {
        let Value::String(location) = value else {
            return Err(DirectoryError::Parse(format!(
                "{}: location for {device_id} must be a string",
                path.display()
            )));
        };
        entries.push(DirectoryEntry {
            device_id,
            location: Location::new(location),
            delay_us,
        });
        delay_us = delay_us.saturating_add(delay_step_us);
    }
    Ok(entries)
}
