// crates/sensor-fleet-core/src/core/mod.rs
// ============================================================================
// Module: Sensor Fleet Core Types
// Description: Canonical telemetry, identity, and cadence structures.
// Purpose: Provide stable, serializable types shared by every fleet crate.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Core types define the device identity namespace, the calibration codec,
//! the persisted submission shapes, cadence policy, and coverage analysis.
//! They are pure: nothing in this module touches files, sockets, or stores.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod cadence;
pub mod calibration;
pub mod coverage;
pub mod identifiers;
pub mod submission;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use cadence::Cadence;
pub use cadence::CadencePolicy;
pub use calibration::Calibrated;
pub use calibration::Quantity;
pub use coverage::CoverageReport;
pub use coverage::LocationCoverage;
pub use coverage::MinuteBucket;
pub use coverage::MissingRange;
pub use identifiers::DeviceId;
pub use identifiers::FirmwareHash;
pub use identifiers::IdentityError;
pub use identifiers::Location;
pub use submission::CalibratedSample;
pub use submission::Sample;
pub use submission::Submission;
