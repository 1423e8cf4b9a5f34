// crates/sensor-fleet-core/src/interfaces/mod.rs
// ============================================================================
// Module: Sensor Fleet Interfaces
// Description: Backend-agnostic telemetry persistence and query contracts.
// Purpose: Define the storage surfaces used by the ingestion runtime.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! Interfaces decouple the ingestion pipeline from the storage backend. The
//! write side accepts one submission with its calibrated samples as an atomic
//! unit; the read side serves the rendering collaborator and diagnostics.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::CalibratedSample;
use crate::core::Location;
use crate::core::MinuteBucket;
use crate::core::Submission;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Telemetry store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("telemetry store io error: {0}")]
    Io(String),
    /// Store rejected invalid data.
    #[error("telemetry store invalid data: {0}")]
    Invalid(String),
    /// Store write queue is saturated.
    #[error("telemetry store overloaded: {message}")]
    Overloaded {
        /// Overload detail.
        message: String,
        /// Suggested retry delay in milliseconds.
        retry_after_ms: Option<u64>,
    },
    /// Store reported an error.
    #[error("telemetry store error: {0}")]
    Store(String),
}

// ============================================================================
// SECTION: Store Contracts
// ============================================================================

/// Row totals for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoreCounts {
    /// Persisted submissions.
    pub submissions: u64,
    /// Persisted samples.
    pub samples: u64,
}

/// Append-only telemetry persistence.
pub trait TelemetryStore {
    /// Appends one submission and its samples as a single atomic unit.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails; no rows are persisted.
    fn insert(&self, submission: &Submission, samples: &[CalibratedSample]) -> Result<(), StoreError>;
}

/// Read access to persisted telemetry.
pub trait TelemetryQuery {
    /// Returns distinct locations with at least one sample received within
    /// `[start_epoch, end_epoch]`, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn query_locations(&self, start_epoch: i64, end_epoch: i64) -> Result<Vec<Location>, StoreError>;

    /// Returns every distinct (location, minute) pair with a positive sample epoch.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn minute_buckets(&self) -> Result<Vec<MinuteBucket>, StoreError>;

    /// Returns persisted row totals.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn counts(&self) -> Result<StoreCounts, StoreError>;
}

// ============================================================================
// SECTION: Shared Wrappers
// ============================================================================

/// Shared telemetry store backed by an `Arc` trait object.
#[derive(Clone)]
pub struct SharedTelemetryStore {
    /// Inner store implementation.
    inner: Arc<dyn TelemetryStore + Send + Sync>,
}

impl SharedTelemetryStore {
    /// Wraps a telemetry store in a shared, clonable wrapper.
    #[must_use]
    pub fn from_store(store: impl TelemetryStore + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    /// Wraps an existing shared store.
    #[must_use]
    pub const fn new(store: Arc<dyn TelemetryStore + Send + Sync>) -> Self {
        Self {
            inner: store,
        }
    }
}

impl TelemetryStore for SharedTelemetryStore {
    fn insert(&self, submission: &Submission, samples: &[CalibratedSample]) -> Result<(), StoreError> {
        self.inner.insert(submission, samples)
    }
}
