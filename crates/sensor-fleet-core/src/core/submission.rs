// crates/sensor-fleet-core/src/core/submission.rs
// ============================================================================
// Module: Sensor Fleet Submissions
// Description: Samples, submissions, and calibrated sample rows.
// Purpose: Define the persisted telemetry shapes shared by store backends.
// Dependencies: crate::core::{calibration, identifiers}, serde
// ============================================================================

//! ## Overview
//! A submission is one device phone-home. It owns the samples the device
//! queued since its previous submission. Samples arrive as raw counts and are
//! calibrated before they reach a store so every backend persists identical
//! values.
//!
//! # Invariants
//! - [`Submission::sample_count`] equals the number of samples persisted with it.
//! - Submissions and samples are append-only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::calibration::Quantity;
use crate::core::calibration::decode;
use crate::core::identifiers::DeviceId;
use crate::core::identifiers::Location;

// ============================================================================
// SECTION: Samples
// ============================================================================

/// One queued reading as transmitted by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// Device clock epoch seconds when the reading was taken.
    pub epoch: i64,
    /// Raw temperature count.
    #[serde(rename = "temperature")]
    pub raw_temperature: u16,
    /// Raw humidity count.
    #[serde(rename = "humidity")]
    pub raw_humidity: u16,
}

/// Sample row after calibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibratedSample {
    /// Device clock epoch seconds when the reading was taken.
    pub sample_epoch: i64,
    /// Temperature count with unused low bits removed.
    pub raw_temp: u16,
    /// Temperature in degrees Celsius.
    pub temp: f64,
    /// Humidity count with unused low bits removed.
    pub raw_humidity: u16,
    /// Relative humidity in percent.
    pub humidity: f64,
}

impl CalibratedSample {
    /// Calibrates a transmitted sample.
    #[must_use]
    pub fn from_sample(sample: &Sample) -> Self {
        let temperature = decode(Quantity::Temperature, sample.raw_temperature);
        let humidity = decode(Quantity::Humidity, sample.raw_humidity);
        Self {
            sample_epoch: sample.epoch,
            raw_temp: temperature.stored_raw,
            temp: temperature.value,
            raw_humidity: humidity.stored_raw,
            humidity: humidity.value,
        }
    }
}

// ============================================================================
// SECTION: Submissions
// ============================================================================

/// Metadata for one device phone-home.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Firmware hash reported by the device.
    pub fw_hash: String,
    /// Submitting device.
    pub device_id: DeviceId,
    /// Server receive time in epoch seconds.
    pub receive_epoch: i64,
    /// Peer socket address of the request.
    pub src_addr: String,
    /// Access point signal strength reported by the device.
    pub ap_rssi: i64,
    /// Wake reason reported by the device.
    pub wake_reason: String,
    /// Location resolved at receive time.
    pub location: Location,
    /// Upload retries the device needed.
    pub retries: u32,
    /// Wi-Fi association retries the device needed.
    pub wifi_retries: u32,
    /// Number of samples carried by the submission.
    pub sample_count: usize,
}
