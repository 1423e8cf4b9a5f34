// crates/sensor-fleet-server/src/audit.rs
// ============================================================================
// Module: Ingestion Audit Logging
// Description: Structured audit events for device request handling.
// Purpose: Emit one JSON line per request outcome without hard dependencies.
// Dependencies: sensor-fleet-core, serde, serde_json
// ============================================================================

//! ## Overview
//! Audit events are flat JSON objects tagged by `event` and stamped with
//! `timestamp_ms`. Sinks decide where the lines go: stderr, an append-only
//! file, or nowhere. Recording never fails the request being audited.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use sensor_fleet_core::Channel;
use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Outcome of one submission request.
#[derive(Debug, Clone, Serialize)]
pub struct IngestAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Peer socket address.
    pub peer: String,
    /// Request path.
    pub path: String,
    /// HTTP status returned.
    pub status: u16,
    /// `accepted` or the failure kind.
    pub outcome: &'static str,
    /// Device identifier when it passed validation.
    pub device_id: Option<String>,
    /// Resolved location for accepted submissions.
    pub location: Option<String>,
    /// Firmware channel the device tracks.
    pub channel: Option<Channel>,
    /// Number of samples persisted.
    pub sample_count: Option<usize>,
    /// Whether the response directed a firmware update.
    pub firmware_update: bool,
    /// Failure detail.
    pub detail: Option<String>,
}

/// Inputs for [`IngestAuditEvent`].
#[derive(Debug, Clone, Default)]
pub struct IngestAuditEventParams {
    /// Peer socket address.
    pub peer: String,
    /// Request path.
    pub path: String,
    /// HTTP status returned.
    pub status: u16,
    /// `accepted` or the failure kind.
    pub outcome: &'static str,
    /// Device identifier when it passed validation.
    pub device_id: Option<String>,
    /// Resolved location for accepted submissions.
    pub location: Option<String>,
    /// Firmware channel the device tracks.
    pub channel: Option<Channel>,
    /// Number of samples persisted.
    pub sample_count: Option<usize>,
    /// Whether the response directed a firmware update.
    pub firmware_update: bool,
    /// Failure detail.
    pub detail: Option<String>,
}

impl IngestAuditEvent {
    /// Builds an ingest audit event stamped with the current time.
    #[must_use]
    pub fn new(params: IngestAuditEventParams) -> Self {
        Self {
            event: "ingest_request",
            timestamp_ms: now_ms(),
            peer: params.peer,
            path: params.path,
            status: params.status,
            outcome: params.outcome,
            device_id: params.device_id,
            location: params.location,
            channel: params.channel,
            sample_count: params.sample_count,
            firmware_update: params.firmware_update,
            detail: params.detail,
        }
    }
}

/// Outcome of one firmware download or refused request.
#[derive(Debug, Clone, Serialize)]
pub struct FirmwareAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Peer socket address.
    pub peer: String,
    /// Request path.
    pub path: String,
    /// HTTP status returned.
    pub status: u16,
    /// Bytes served on success.
    pub bytes: Option<usize>,
}

impl FirmwareAuditEvent {
    /// Builds a firmware audit event stamped with the current time.
    #[must_use]
    pub fn new(peer: String, path: String, status: u16, bytes: Option<usize>) -> Self {
        Self {
            event: "firmware_request",
            timestamp_ms: now_ms(),
            peer,
            path,
            status,
            bytes,
        }
    }
}

/// Directory reload failure that was recovered from.
#[derive(Debug, Clone, Serialize)]
pub struct DirectoryAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Directory file path.
    pub path: String,
    /// Reload failure message.
    pub error: String,
}

impl DirectoryAuditEvent {
    /// Builds a directory audit event stamped with the current time.
    #[must_use]
    pub fn new(path: String, error: String) -> Self {
        Self {
            event: "directory_reload",
            timestamp_ms: now_ms(),
            path,
            error,
        }
    }
}

/// Listener startup record.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Bound address.
    pub bind: String,
    /// Listener workers sharing the address.
    pub workers: usize,
    /// Whether TLS terminates in process.
    pub tls: bool,
    /// Stable firmware hash being served.
    pub stable_hash: String,
    /// Beta firmware hash being served, if any.
    pub beta_hash: Option<String>,
}

impl LifecycleAuditEvent {
    /// Builds a startup audit event stamped with the current time.
    #[must_use]
    pub fn started(
        bind: String,
        workers: usize,
        tls: bool,
        stable_hash: String,
        beta_hash: Option<String>,
    ) -> Self {
        Self {
            event: "server_started",
            timestamp_ms: now_ms(),
            bind,
            workers,
            tls,
            stable_hash,
            beta_hash,
        }
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink for ingestion events.
pub trait IngestAuditSink: Send + Sync {
    /// Record a submission outcome.
    fn record(&self, event: &IngestAuditEvent);

    /// Record a firmware request outcome.
    fn record_firmware(&self, _event: &FirmwareAuditEvent) {}

    /// Record a recovered directory reload failure.
    fn record_directory(&self, _event: &DirectoryAuditEvent) {}

    /// Record a lifecycle event.
    fn record_lifecycle(&self, _event: &LifecycleAuditEvent) {}
}

/// Audit sink that logs JSON lines to stderr.
pub struct IngestStderrAuditSink;

impl IngestAuditSink for IngestStderrAuditSink {
    fn record(&self, event: &IngestAuditEvent) {
        write_stderr_line(event);
    }

    fn record_firmware(&self, event: &FirmwareAuditEvent) {
        write_stderr_line(event);
    }

    fn record_directory(&self, event: &DirectoryAuditEvent) {
        write_stderr_line(event);
    }

    fn record_lifecycle(&self, event: &LifecycleAuditEvent) {
        write_stderr_line(event);
    }
}

/// Audit sink that appends JSON lines to a file.
pub struct IngestFileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl IngestFileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Serializes `event` and appends it as one line.
    fn append<T: Serialize>(&self, event: &T) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

impl IngestAuditSink for IngestFileAuditSink {
    fn record(&self, event: &IngestAuditEvent) {
        self.append(event);
    }

    fn record_firmware(&self, event: &FirmwareAuditEvent) {
        self.append(event);
    }

    fn record_directory(&self, event: &DirectoryAuditEvent) {
        self.append(event);
    }

    fn record_lifecycle(&self, event: &LifecycleAuditEvent) {
        self.append(event);
    }
}

/// No-op audit sink.
pub struct IngestNoopAuditSink;

impl IngestAuditSink for IngestNoopAuditSink {
    fn record(&self, _event: &IngestAuditEvent) {}
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns milliseconds since the Unix epoch.
fn now_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

/// Writes one serialized event to stderr.
fn write_stderr_line<T: Serialize>(event: &T) {
    if let Ok(payload) = serde_json::to_string(event) {
        let _ = writeln!(std::io::stderr(), "{payload}");
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
