// crates/sensor-fleet-core/src/core/calibration.rs
// ============================================================================
// Module: Sensor Fleet Calibration Codec
// Description: Raw sensor count to engineering unit conversion.
// Purpose: Provide one rounding rule for every persisted reading.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Devices transmit 16-bit counts whose bottom two bits are always zero. The
//! codec keeps the meaningful 14 bits for storage and maps the full-scale
//! count linearly onto engineering units:
//!
//! - temperature: `raw / 65536 * 165 - 40` degrees Celsius
//! - humidity: `raw / 65536 * 100` percent relative humidity
//!
//! Values are rounded to two decimals by scaling by 100 and rounding half
//! away from zero. Raw values are never range-checked: the formula applies to
//! every `u16`, including counts a healthy sensor cannot produce.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Full-scale divisor for transmitted counts.
const FULL_SCALE: f64 = 65536.0;

/// Temperature span in degrees Celsius.
const TEMPERATURE_SPAN: f64 = 165.0;

/// Temperature offset in degrees Celsius.
const TEMPERATURE_OFFSET: f64 = 40.0;

/// Humidity span in percent.
const HUMIDITY_SPAN: f64 = 100.0;

/// Number of low bits the sensor never populates.
const UNUSED_LOW_BITS: u32 = 2;

// ============================================================================
// SECTION: Codec
// ============================================================================

/// Physical quantity carried by a raw count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantity {
    /// Ambient temperature in degrees Celsius.
    Temperature,
    /// Relative humidity in percent.
    Humidity,
}

/// Decoded reading ready for persistence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibrated {
    /// Raw count with the unused low bits shifted out (14 significant bits).
    pub stored_raw: u16,
    /// Engineering value rounded to two decimals.
    pub value: f64,
}

/// Decodes a transmitted count for the given quantity.
#[must_use]
pub fn decode(quantity: Quantity, raw: u16) -> Calibrated {
    let fraction = f64::from(raw) / FULL_SCALE;
    let value = match quantity {
        Quantity::Temperature => fraction * TEMPERATURE_SPAN - TEMPERATURE_OFFSET,
        Quantity::Humidity => fraction * HUMIDITY_SPAN,
    };
    Calibrated {
        stored_raw: raw >> UNUSED_LOW_BITS,
        value: round_hundredths(value),
    }
}

/// Rounds to two decimals, half away from zero.
#[must_use]
pub fn round_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::Quantity;
    use super::decode;
    use super::round_hundredths;

    #[test]
    fn endpoints_map_to_documented_range() {
        assert!((decode(Quantity::Temperature, 0).value - -40.0).abs() < f64::EPSILON);
        assert!((decode(Quantity::Humidity, 0).value).abs() < f64::EPSILON);
        let top = decode(Quantity::Temperature, u16::MAX);
        assert_eq!(top.stored_raw, 16383);
        assert!((top.value - 125.0).abs() < 0.01);
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert!((round_hundredths(0.125) - 0.13).abs() < 1e-9);
        assert!((round_hundredths(-0.125) - -0.13).abs() < 1e-9);
        assert!((round_hundredths(1.0) - 1.0).abs() < 1e-9);
    }
}
