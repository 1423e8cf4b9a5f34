// crates/sensor-fleet-server/src/lib.rs
// ============================================================================
// Module: Sensor Fleet Server Library
// Description: HTTP transport for submissions and firmware delivery.
// Purpose: Bind listeners and route device traffic to the ingestion pipeline.
// Dependencies: sensor-fleet-core, sensor-fleet-config, axum, tokio
// ============================================================================

//! ## Overview
//! `sensor-fleet-server` wires configuration, the `SQLite` telemetry store,
//! the location directory, and the firmware registry into an axum router.
//! Devices post submissions to `/data/{device_id}` and fetch images from
//! `/fw/{hash}`; every other request is refused.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod firmware;
pub mod server;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::DirectoryAuditEvent;
pub use audit::FirmwareAuditEvent;
pub use audit::IngestAuditEvent;
pub use audit::IngestAuditEventParams;
pub use audit::IngestAuditSink;
pub use audit::IngestFileAuditSink;
pub use audit::IngestNoopAuditSink;
pub use audit::IngestStderrAuditSink;
pub use audit::LifecycleAuditEvent;
pub use firmware::load_firmware_registry;
pub use server::FleetServer;
pub use server::ServerError;
