// crates/sensor-fleet-config/src/lib.rs
// ============================================================================
// Module: Sensor Fleet Config Library
// Description: Canonical config model and validation.
// Purpose: Single source of truth for sensor-fleet.toml semantics.
// Dependencies: sensor-fleet-core, sensor-fleet-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `sensor-fleet-config` defines the configuration model for the sensor
//! fleet backend. Loading is strict and fail-closed: oversized, non-UTF-8, or
//! out-of-range configuration is rejected before any component starts.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
