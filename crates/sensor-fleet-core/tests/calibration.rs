// crates/sensor-fleet-core/tests/calibration.rs
// ============================================================================
// Module: Calibration Codec Tests
// Description: Exhaustive and property checks for raw count decoding.
// Purpose: Pin the storage shift and rounding rule for every 16-bit input.
// ============================================================================

//! Calibration codec tests.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use proptest::prelude::*;
use sensor_fleet_core::CalibratedSample;
use sensor_fleet_core::Quantity;
use sensor_fleet_core::Sample;
use sensor_fleet_core::calibration::decode;

fn expected(quantity: Quantity, raw: u16) -> f64 {
    let fraction = f64::from(raw) / 65536.0;
    let value = match quantity {
        Quantity::Temperature => fraction * 165.0 - 40.0,
        Quantity::Humidity => fraction * 100.0,
    };
    (value * 100.0).round() / 100.0
}

#[test]
fn every_raw_count_shifts_and_rounds() {
    for raw in 0 ..= u16::MAX {
        for quantity in [Quantity::Temperature, Quantity::Humidity] {
            let decoded = decode(quantity, raw);
            assert_eq!(decoded.stored_raw, raw >> 2);
            assert_eq!(decoded.value.to_bits(), expected(quantity, raw).to_bits(), "raw {raw}");
        }
    }
}

#[test]
fn midscale_values_match_reference_points() {
    let temperature = decode(Quantity::Temperature, 0x8000);
    assert_eq!(temperature.stored_raw, 0x2000);
    assert!((temperature.value - 42.5).abs() < 1e-9);
    let humidity = decode(Quantity::Humidity, 0x8000);
    assert!((humidity.value - 50.0).abs() < 1e-9);
}

#[test]
fn samples_calibrate_both_channels() {
    let sample = Sample {
        epoch: 1_700_000_000,
        raw_temperature: 0x6000,
        raw_humidity: 0x4000,
    };
    let row = CalibratedSample::from_sample(&sample);
    assert_eq!(row.sample_epoch, 1_700_000_000);
    assert_eq!(row.raw_temp, 0x1800);
    assert_eq!(row.raw_humidity, 0x1000);
    assert!((row.temp - 21.88).abs() < 1e-9);
    assert!((row.humidity - 25.0).abs() < 1e-9);
}

proptest! {
    #[test]
    fn decoded_values_have_at_most_two_decimals(raw in any::<u16>()) {
        for quantity in [Quantity::Temperature, Quantity::Humidity] {
            let scaled = decode(quantity, raw).value * 100.0;
            prop_assert!((scaled - scaled.round()).abs() < 1e-6);
        }
    }

    #[test]
    fn decoding_is_monotonic(raw in 0u16 .. u16::MAX) {
        for quantity in [Quantity::Temperature, Quantity::Humidity] {
            prop_assert!(decode(quantity, raw).value <= decode(quantity, raw + 1).value);
        }
    }
}
