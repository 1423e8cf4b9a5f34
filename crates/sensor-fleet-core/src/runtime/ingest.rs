// crates/sensor-fleet-core/src/runtime/ingest.rs
// ============================================================================
// Module: Sensor Fleet Ingestion Protocol
// Description: Per-request decision pipeline for device submissions.
// Purpose: Validate, decide, persist, and answer one device phone-home.
// Dependencies: crate::{core, interfaces, runtime}, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Every submission runs the same strictly ordered pipeline:
//!
//! 1. check the declared body length
//! 2. validate the device identifier
//! 3. parse the JSON body
//! 4. resolve location and assigned delay
//! 5. decide firmware
//! 6. compute cadence
//! 7. persist the submission with its calibrated samples
//! 8. build the decision response
//!
//! Steps 1 to 6 are pure given the request and the cached directory state;
//! [`IngestionHandler::plan`] runs them without touching the store. Any
//! validation failure returns before step 7, so rejected requests never
//! mutate stored telemetry.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::CadencePolicy;
use crate::core::CalibratedSample;
use crate::core::DeviceId;
use crate::core::Sample;
use crate::core::Submission;
use crate::core::identifiers::DEVICE_ID_LENGTH;
use crate::interfaces::StoreError;
use crate::interfaces::TelemetryStore;
use crate::runtime::directory::DirectoryError;
use crate::runtime::directory::LocationDirectory;
use crate::runtime::firmware::Channel;
use crate::runtime::firmware::FirmwareRegistry;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default maximum accepted request body size (256 KiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 256 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Ingestion failures, grouped by client, resource, and size errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    /// Request carried no length header.
    #[error("length required")]
    LengthRequired,
    /// Declared body length exceeds the configured limit.
    #[error("body of {actual} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge {
        /// Configured limit in bytes.
        limit: usize,
        /// Declared length in bytes.
        actual: u64,
    },
    /// Device identifier does not belong to the fleet namespace.
    #[error("malformed device identity: {0}")]
    MalformedIdentity(String),
    /// Body is not valid JSON or misses a required field.
    #[error("malformed body: {0}")]
    MalformedBody(String),
    /// Store rejected the write.
    #[error("{0}")]
    Store(StoreError),
}

impl IngestError {
    /// Returns a stable label for audit logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::LengthRequired => "length_required",
            Self::PayloadTooLarge {
                ..
            } => "payload_too_large",
            Self::MalformedIdentity(_) => "malformed_identity",
            Self::MalformedBody(_) => "malformed_body",
            Self::Store(StoreError::Overloaded {
                ..
            }) => "store_overloaded",
            Self::Store(_) => "store_unavailable",
        }
    }
}

// ============================================================================
// SECTION: Wire Types
// ============================================================================

/// Submission body sent by devices.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubmissionBody {
    /// Hash of the firmware the device runs.
    #[serde(alias = "fw_sha")]
    pub fw_hash: String,
    /// Access point signal strength.
    pub ap_rssi: i64,
    /// Reason the device woke.
    pub wake_reason: String,
    /// Delay the device currently applies before sending.
    pub send_delay_us: u64,
    /// Queued samples.
    #[serde(alias = "data")]
    pub samples: Vec<Sample>,
    /// Upload retries needed for this submission.
    #[serde(default)]
    pub retries: u32,
    /// Wi-Fi association retries needed for this submission.
    #[serde(default)]
    pub wifi_retries: u32,
}

/// Decision returned to the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionResponse {
    /// Epoch second at which the device should next wake.
    pub next_epoch: i64,
    /// Seconds between queued samples.
    pub queue_interval: u32,
    /// Samples to queue before the next submission.
    pub queue_count: u32,
    /// Corrected send delay when the device reported a different one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_send_delay_us: Option<u64>,
    /// Firmware URL to fetch when the device runs a different build.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_fw: Option<String>,
}

/// One submission as received by the transport.
#[derive(Debug, Clone, Copy)]
pub struct IngestRequest<'a> {
    /// Path segment naming the device.
    pub device_segment: &'a str,
    /// Declared body length, if the header was present.
    pub content_length: Option<u64>,
    /// Raw request body.
    pub body: &'a [u8],
    /// Peer socket address.
    pub source_address: &'a str,
    /// Server receive time in epoch seconds.
    pub receive_epoch: i64,
}

/// Validated submission with its decision, ready to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestPlan {
    /// Submission row to persist.
    pub submission: Submission,
    /// Calibrated sample rows to persist.
    pub samples: Vec<CalibratedSample>,
    /// Firmware channel the device tracks.
    pub channel: Channel,
    /// Response sent after persistence succeeds.
    pub response: DecisionResponse,
    /// Directory reload failure observed while resolving.
    pub directory_warning: Option<DirectoryError>,
}

// ============================================================================
// SECTION: Context
// ============================================================================

/// Shared state consulted by every submission.
#[derive(Debug)]
pub struct FleetContext {
    /// Location directory cache.
    pub directory: LocationDirectory,
    /// Firmware channels.
    pub firmware: FirmwareRegistry,
    /// Cadence policy.
    pub cadence: CadencePolicy,
    /// Required device identifier length.
    pub device_id_length: usize,
    /// Maximum accepted body size in bytes.
    pub max_body_bytes: usize,
}

impl FleetContext {
    /// Creates a context with default identity and size limits.
    #[must_use]
    pub const fn new(directory: LocationDirectory, firmware: FirmwareRegistry, cadence: CadencePolicy) -> Self {
        Self {
            directory,
            firmware,
            cadence,
            device_id_length: DEVICE_ID_LENGTH,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Overrides the maximum accepted body size.
    #[must_use]
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Overrides the required device identifier length.
    #[must_use]
    pub fn with_device_id_length(mut self, device_id_length: usize) -> Self {
        self.device_id_length = device_id_length;
        self
    }

    /// Validates the declared body length.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::LengthRequired`] when no length was declared and
    /// [`IngestError::PayloadTooLarge`] when it exceeds the limit.
    pub fn check_length(&self, content_length: Option<u64>) -> Result<u64, IngestError> {
        let declared = content_length.ok_or(IngestError::LengthRequired)?;
        let limit = u64::try_from(self.max_body_bytes).unwrap_or(u64::MAX);
        if declared > limit {
            return Err(IngestError::PayloadTooLarge {
                limit: self.max_body_bytes,
                actual: declared,
            });
        }
        Ok(declared)
    }

    /// Validates the device identifier path segment.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::MalformedIdentity`] for identifiers of the wrong length.
    pub fn check_identity(&self, device_segment: &str) -> Result<DeviceId, IngestError> {
        DeviceId::parse_with_length(device_segment, self.device_id_length)
            .map_err(|err| IngestError::MalformedIdentity(err.to_string()))
    }
}

// ============================================================================
// SECTION: Handler
// ============================================================================

/// Ingestion pipeline bound to a context and a store.
pub struct IngestionHandler<S> {
    /// Shared decision state.
    context: FleetContext,
    /// Telemetry persistence.
    store: S,
}

impl<S: TelemetryStore> IngestionHandler<S> {
    /// Creates a handler.
    #[must_use]
    pub const fn new(context: FleetContext, store: S) -> Self {
        Self {
            context,
            store,
        }
    }

    /// Returns the shared context.
    #[must_use]
    pub const fn context(&self) -> &FleetContext {
        &self.context
    }

    /// Runs the full pipeline and persists the submission.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] for validation failures (nothing persisted) and
    /// [`IngestError::Store`] when the atomic insert fails.
    pub fn handle(&self, request: &IngestRequest<'_>) -> Result<IngestPlan, IngestError> {
        let plan = self.plan(request)?;
        self.persist(&plan)?;
        Ok(plan)
    }

    /// Persists a planned submission with its samples.
    ///
    /// Report [`IngestPlan::directory_warning`] before calling this; the
    /// directory reports each failing file state once.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Store`] when the atomic insert fails.
    pub fn persist(&self, plan: &IngestPlan) -> Result<(), IngestError> {
        self.store.insert(&plan.submission, &plan.samples).map_err(IngestError::Store)
    }

    /// Runs every step before persistence.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] when the request fails validation.
    pub fn plan(&self, request: &IngestRequest<'_>) -> Result<IngestPlan, IngestError> {
        let context = &self.context;
        context.check_length(request.content_length)?;
        let device_id = context.check_identity(request.device_segment)?;
        let body = parse_body(request.body)?;

        let lookup = context.directory.resolve(&device_id);
        let firmware = context.firmware.decide(&body.fw_hash, &lookup.location);
        let cadence = context.cadence.compute(request.receive_epoch, &lookup.location, firmware.beta_device);
        let response = DecisionResponse {
            next_epoch: cadence.next_epoch,
            queue_interval: cadence.queue_interval,
            queue_count: cadence.queue_count,
            next_send_delay_us: (body.send_delay_us != lookup.delay_us).then_some(lookup.delay_us),
            new_fw: firmware.new_firmware_url,
        };

        let samples: Vec<CalibratedSample> = body.samples.iter().map(CalibratedSample::from_sample).collect();
        let submission = Submission {
            fw_hash: body.fw_hash,
            device_id,
            receive_epoch: request.receive_epoch,
            src_addr: request.source_address.to_string(),
            ap_rssi: body.ap_rssi,
            wake_reason: body.wake_reason,
            location: lookup.location,
            retries: body.retries,
            wifi_retries: body.wifi_retries,
            sample_count: samples.len(),
        };
        Ok(IngestPlan {
            submission,
            samples,
            channel: firmware.channel,
            response,
            directory_warning: lookup.warning,
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Parses and types the submission body.
fn parse_body(body: &[u8]) -> Result<SubmissionBody, IngestError> {
    serde_json::from_slice(body).map_err(|err| IngestError::MalformedBody(err.to_string()))
}
