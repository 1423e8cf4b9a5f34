// crates/sensor-fleet-core/src/runtime/store.rs
// ============================================================================
// Module: Sensor Fleet In-Memory Store
// Description: Simple in-memory telemetry store for tests and local runs.
// Purpose: Provide a deterministic store implementation without external deps.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! This module provides a simple in-memory implementation of
//! [`TelemetryStore`] and [`TelemetryQuery`] for tests and local demos. It is
//! not intended for production use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;

use crate::core::CalibratedSample;
use crate::core::Location;
use crate::core::MinuteBucket;
use crate::core::Submission;
use crate::interfaces::StoreCounts;
use crate::interfaces::StoreError;
use crate::interfaces::TelemetryQuery;
use crate::interfaces::TelemetryStore;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Sample row with the submission columns it inherits.
#[derive(Debug, Clone, PartialEq)]
struct StoredSample {
    /// Location of the submitting device.
    location: Location,
    /// Receive epoch of the owning submission.
    receive_epoch: i64,
    /// Calibrated values.
    sample: CalibratedSample,
}

/// Rows held by the in-memory store.
#[derive(Debug, Default)]
struct Tables {
    /// Submission rows in insertion order.
    submissions: Vec<Submission>,
    /// Sample rows in insertion order.
    samples: Vec<StoredSample>,
}

/// In-memory telemetry store for tests and examples.
#[derive(Debug, Default, Clone)]
pub struct InMemoryTelemetryStore {
    /// Tables protected by a mutex.
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryTelemetryStore {
    /// Creates a new in-memory telemetry store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every stored submission.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Store`] when the mutex is poisoned.
    pub fn submissions(&self) -> Result<Vec<Submission>, StoreError> {
        let guard = self
            .tables
            .lock()
            .map_err(|_| StoreError::Store("telemetry store mutex poisoned".to_string()))?;
        Ok(guard.submissions.clone())
    }
}

impl TelemetryStore for InMemoryTelemetryStore {
    fn insert(&self, submission: &Submission, samples: &[CalibratedSample]) -> Result<(), StoreError> {
        if submission.sample_count != samples.len() {
            return Err(StoreError::Invalid(format!(
                "submission declares {} samples but {} were supplied",
                submission.sample_count,
                samples.len()
            )));
        }
        let mut guard = self
            .tables
            .lock()
            .map_err(|_| StoreError::Store("telemetry store mutex poisoned".to_string()))?;
        guard.submissions.push(submission.clone());
        guard.samples.extend(samples.iter().map(|sample| StoredSample {
            location: submission.location.clone(),
            receive_epoch: submission.receive_epoch,
            sample: *sample,
        }));
        Ok(())
    }
}

impl TelemetryQuery for InMemoryTelemetryStore {
    fn query_locations(&self, start_epoch: i64, end_epoch: i64) -> Result<Vec<Location>, StoreError> {
        let guard = self
            .tables
            .lock()
            .map_err(|_| StoreError::Store("telemetry store mutex poisoned".to_string()))?;
        let locations: BTreeSet<Location> = guard
            .samples
            .iter()
            .filter(|row| (start_epoch ..= end_epoch).contains(&row.receive_epoch))
            .map(|row| row.location.clone())
            .collect();
        Ok(locations.into_iter().collect())
    }

    fn minute_buckets(&self) -> Result<Vec<MinuteBucket>, StoreError> {
        let guard = self
            .tables
            .lock()
            .map_err(|_| StoreError::Store("telemetry store mutex poisoned".to_string()))?;
        let buckets: BTreeSet<(Location, i64)> = guard
            .samples
            .iter()
            .filter(|row| row.sample.sample_epoch > 0)
            .map(|row| (row.location.clone(), row.sample.sample_epoch / 60))
            .collect();
        Ok(buckets
            .into_iter()
            .map(|(location, minute)| MinuteBucket {
                location,
                minute,
            })
            .collect())
    }

    fn counts(&self) -> Result<StoreCounts, StoreError> {
        let guard = self
            .tables
            .lock()
            .map_err(|_| StoreError::Store("telemetry store mutex poisoned".to_string()))?;
        Ok(StoreCounts {
            submissions: guard.submissions.len() as u64,
            samples: guard.samples.len() as u64,
        })
    }
}
