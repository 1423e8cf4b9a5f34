// crates/sensor-fleet-core/src/runtime/mod.rs
// ============================================================================
// Module: Sensor Fleet Runtime
// Description: Directory cache, firmware channels, ingestion pipeline, and stores.
// Purpose: Run the per-request negotiation with devices.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Runtime modules hold the mutable-but-shared state consulted by every
//! submission and the pipeline that ties it together. All transports must
//! call into [`IngestionHandler`] so device behavior stays identical.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod directory;
pub mod firmware;
pub mod ingest;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use directory::DEFAULT_DELAY_STEP_US;
pub use directory::DirectoryEntry;
pub use directory::DirectoryError;
pub use directory::DirectoryLookup;
pub use directory::LocationDirectory;
pub use firmware::Channel;
pub use firmware::FirmwareDecision;
pub use firmware::FirmwareError;
pub use firmware::FirmwareImage;
pub use firmware::FirmwareRegistry;
pub use firmware::firmware_digest;
pub use ingest::DecisionResponse;
pub use ingest::FleetContext;
pub use ingest::IngestError;
pub use ingest::IngestPlan;
pub use ingest::IngestRequest;
pub use ingest::IngestionHandler;
pub use ingest::SubmissionBody;
pub use store::InMemoryTelemetryStore;
