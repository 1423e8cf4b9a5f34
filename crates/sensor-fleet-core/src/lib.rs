// crates/sensor-fleet-core/src/lib.rs
// ============================================================================
// Module: Sensor Fleet Core Library
// Description: Public API surface for the sensor fleet core.
// Purpose: Expose core types, interfaces, and runtime helpers.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Sensor fleet core ingests battery-powered temperature/humidity sensor
//! submissions and steers each device's wake cadence, batch size, and
//! firmware channel through the response. It is transport-agnostic: the HTTP
//! server and any test harness drive the same [`IngestionHandler`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::*;

pub use interfaces::SharedTelemetryStore;
pub use interfaces::StoreCounts;
pub use interfaces::StoreError;
pub use interfaces::TelemetryQuery;
pub use interfaces::TelemetryStore;
pub use runtime::Channel;
pub use runtime::DecisionResponse;
pub use runtime::DirectoryEntry;
pub use runtime::DirectoryError;
pub use runtime::DirectoryLookup;
pub use runtime::FirmwareDecision;
pub use runtime::FirmwareError;
pub use runtime::FirmwareImage;
pub use runtime::FirmwareRegistry;
pub use runtime::FleetContext;
pub use runtime::InMemoryTelemetryStore;
pub use runtime::IngestError;
pub use runtime::IngestPlan;
pub use runtime::IngestRequest;
pub use runtime::IngestionHandler;
pub use runtime::LocationDirectory;
pub use runtime::SubmissionBody;
