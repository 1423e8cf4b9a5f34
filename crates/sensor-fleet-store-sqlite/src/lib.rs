// crates/sensor-fleet-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Telemetry Store
// Description: Durable TelemetryStore backend using SQLite WAL.
// Purpose: Provide production persistence for sensor fleet submissions.
// Dependencies: sensor-fleet-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed [`TelemetryStore`] and
//! [`TelemetryQuery`] implementation. Every write goes through one dedicated
//! writer thread so the single-writer database is never written
//! concurrently, while reads use a small pool of independent connections.
//!
//! [`TelemetryStore`]: sensor_fleet_core::TelemetryStore
//! [`TelemetryQuery`]: sensor_fleet_core::TelemetryQuery

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
pub use store::SqliteTelemetryStore;
