// crates/sensor-fleet-core/src/core/coverage.rs
// ============================================================================
// Module: Sensor Fleet Coverage Report
// Description: Per-location gaps in minute-level sample coverage.
// Purpose: Show which production locations stopped reporting and for how long.
// Dependencies: crate::core::identifiers, serde
// ============================================================================

//! ## Overview
//! A minute is expected for a location when any device in the fleet produced
//! a sample in that minute. Each production location is compared against the
//! fleet-wide set and its missing minutes are grouped into contiguous ranges.
//! Beta/test locations are skipped because they do not queue samples.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::Location;

// ============================================================================
// SECTION: Types
// ============================================================================

/// One minute in which a location produced at least one sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinuteBucket {
    /// Location that produced samples.
    pub location: Location,
    /// Sample epoch divided by 60.
    pub minute: i64,
}

/// Contiguous run of missing minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingRange {
    /// Epoch second of the first missing minute.
    pub start_epoch: i64,
    /// Epoch second of the last missing minute.
    pub end_epoch: i64,
    /// Number of missing minutes in the run.
    pub minutes: u64,
}

/// Coverage gaps for one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationCoverage {
    /// Location being reported.
    pub location: Location,
    /// Total missing minutes.
    pub missing_minutes: u64,
    /// Missing minutes grouped into runs, oldest first.
    pub ranges: Vec<MissingRange>,
}

/// Fleet-wide coverage report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageReport {
    /// Epoch second of the earliest sampled minute, if any.
    pub earliest_epoch: Option<i64>,
    /// Per-location coverage, ordered by location name.
    pub locations: Vec<LocationCoverage>,
}

// ============================================================================
// SECTION: Report Construction
// ============================================================================

impl CoverageReport {
    /// Builds a report from the known locations and their sampled minutes.
    #[must_use]
    pub fn build(locations: &[Location], buckets: &[MinuteBucket]) -> Self {
        let fleet: BTreeSet<i64> = buckets.iter().map(|bucket| bucket.minute).collect();
        let mut seen: BTreeMap<&Location, BTreeSet<i64>> = BTreeMap::new();
        for bucket in buckets {
            seen.entry(&bucket.location).or_default().insert(bucket.minute);
        }
        let ordered: BTreeSet<&Location> = locations.iter().filter(|loc| !loc.is_beta()).collect();
        let empty = BTreeSet::new();
        let locations = ordered
            .into_iter()
            .map(|location| {
                let own = seen.get(location).unwrap_or(&empty);
                let missing: Vec<i64> = fleet.difference(own).copied().collect();
                LocationCoverage {
                    location: location.clone(),
                    missing_minutes: missing.len() as u64,
                    ranges: to_ranges(&missing),
                }
            })
            .collect();
        Self {
            earliest_epoch: fleet.first().map(|minute| minute * 60),
            locations,
        }
    }
}

/// Groups sorted minutes into contiguous runs.
fn to_ranges(sorted_minutes: &[i64]) -> Vec<MissingRange> {
    let mut ranges: Vec<MissingRange> = Vec::new();
    for minute in sorted_minutes {
        let epoch = minute * 60;
        match ranges.last_mut() {
            Some(last) if last.end_epoch + 60 == epoch => {
                last.end_epoch = epoch;
                last.minutes += 1;
            }
            _ => ranges.push(MissingRange {
                start_epoch: epoch,
                end_epoch: epoch,
                minutes: 1,
            }),
        }
    }
    ranges
}

// ============================================================================
// SECTION: Tests
// ============================================================================
