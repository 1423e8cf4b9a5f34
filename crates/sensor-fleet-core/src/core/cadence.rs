// crates/sensor-fleet-core/src/core/cadence.rs
// ============================================================================
// Module: Sensor Fleet Cadence Policy
// Description: Wake and batching instructions returned to devices.
// Purpose: Compute the cadence tuple for each accepted submission.
// Dependencies: crate::core::identifiers, serde
// ============================================================================

//! ## Overview
//! Every response tells the device when to wake next, how often to sample,
//! and how many samples to queue before phoning home again. Priority
//! locations (matched by a case-insensitive tag substring) sample faster and
//! send smaller batches; beta/test devices are told to queue nothing.
//!
//! Firmware clamps `queue_interval` to 300 seconds and `queue_count` to 60
//! samples, so policies beyond those bounds have no effect on devices.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::Location;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Seconds per minute boundary used for wake alignment.
const SECONDS_PER_MINUTE: i64 = 60;

/// Largest sampling interval devices honor.
pub const MAX_QUEUE_INTERVAL: u32 = 300;

/// Largest batch size devices honor.
pub const MAX_QUEUE_COUNT: u32 = 60;

/// Default tag selecting priority cadence.
pub const DEFAULT_PRIORITY_TAG: &str = "outdoor";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Cadence instructions for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cadence {
    /// Epoch second at which the device should next wake.
    pub next_epoch: i64,
    /// Seconds between queued samples.
    pub queue_interval: u32,
    /// Samples to queue before the next submission.
    pub queue_count: u32,
}

/// Policy producing [`Cadence`] values from receive time and location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CadencePolicy {
    /// Whole minutes between the next minute boundary and the next wake.
    pub lead_minutes: i64,
    /// Default sampling interval in seconds.
    pub queue_interval: u32,
    /// Default batch size.
    pub queue_count: u32,
    /// Sampling interval for priority locations.
    pub priority_queue_interval: u32,
    /// Batch size for priority locations.
    pub priority_queue_count: u32,
    /// Case-insensitive location substring selecting priority cadence.
    pub priority_tag: String,
}

impl Default for CadencePolicy {
    fn default() -> Self {
        Self {
            lead_minutes: 5,
            queue_interval: MAX_QUEUE_INTERVAL,
            queue_count: MAX_QUEUE_COUNT,
            priority_queue_interval: 60,
            priority_queue_count: 5,
            priority_tag: DEFAULT_PRIORITY_TAG.to_string(),
        }
    }
}

impl CadencePolicy {
    /// Computes the cadence for a submission received at `receive_epoch`.
    #[must_use]
    pub fn compute(&self, receive_epoch: i64, location: &Location, beta_device: bool) -> Cadence {
        let next_minute = receive_epoch.div_euclid(SECONDS_PER_MINUTE);
        let mut cadence = Cadence {
            next_epoch: (next_minute + self.lead_minutes) * SECONDS_PER_MINUTE,
            queue_interval: self.queue_interval,
            queue_count: self.queue_count,
        };
        if location.has_tag(&self.priority_tag) {
            cadence.queue_interval = self.priority_queue_interval;
            cadence.queue_count = self.priority_queue_count;
        }
        if beta_device {
            cadence.queue_count = 0;
        }
        cadence
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::CadencePolicy;
    use crate::core::identifiers::Location;

    #[test]
    fn default_cadence_aligns_to_minute_boundary() {
        let cadence = CadencePolicy::default().compute(1_700_000_059, &Location::new("kitchen"), false);
        assert_eq!(cadence.next_epoch, (1_700_000_059 / 60 + 5) * 60);
        assert_eq!(cadence.queue_interval, 300);
        assert_eq!(cadence.queue_count, 60);
    }

    #[test]
    fn priority_tag_matches_case_insensitively() {
        let cadence = CadencePolicy::default().compute(0, &Location::new("North OUTDOOR shed"), false);
        assert_eq!(cadence.queue_interval, 60);
        assert_eq!(cadence.queue_count, 5);
    }

    #[test]
    fn beta_devices_queue_nothing() {
        let cadence = CadencePolicy::default().compute(0, &Location::new("(outdoor test)"), true);
        assert_eq!(cadence.queue_interval, 60);
        assert_eq!(cadence.queue_count, 0);
    }
}
