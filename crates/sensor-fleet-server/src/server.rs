// crates/sensor-fleet-server/src/server.rs
// ============================================================================
// Module: Sensor Fleet Server
// Description: HTTP(S) listeners for device submissions and firmware fetches.
// Purpose: Route device traffic through the ingestion pipeline.
// Dependencies: sensor-fleet-core, sensor-fleet-config, axum, axum-server, tokio
// ============================================================================

//! ## Overview
//! The server binds `server.workers` listeners to one address with port reuse
//! and serves the same router on each of them. Submissions run through
//! [`IngestionHandler`] on a blocking-capable thread because the telemetry
//! store answers only after its writer commits. Firmware images are served
//! from shared immutable buffers. Every request outcome is audited.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::body::to_bytes;
use axum::extract::ConnectInfo;
use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::HeaderValue;
use axum::http::Method;
use axum::http::StatusCode;
use axum::http::Uri;
use axum::http::header::CONTENT_LENGTH;
use axum::http::header::CONTENT_TYPE;
use axum::http::header::RETRY_AFTER;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use axum_server::tls_rustls::RustlsConfig;
use bytes::Bytes;
use sensor_fleet_config::FleetConfig;
use sensor_fleet_config::ServerAuditConfig;
use sensor_fleet_core::DirectoryError;
use sensor_fleet_core::FleetContext;
use sensor_fleet_core::IngestError;
use sensor_fleet_core::IngestPlan;
use sensor_fleet_core::IngestRequest;
use sensor_fleet_core::IngestionHandler;
use sensor_fleet_core::SharedTelemetryStore;
use sensor_fleet_core::StoreError;
use sensor_fleet_store_sqlite::SqliteTelemetryStore;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::net::TcpSocket;
use tokio::task::JoinSet;

use crate::audit::DirectoryAuditEvent;
use crate::audit::FirmwareAuditEvent;
use crate::audit::IngestAuditEvent;
use crate::audit::IngestAuditEventParams;
use crate::audit::IngestAuditSink;
use crate::audit::IngestFileAuditSink;
use crate::audit::IngestNoopAuditSink;
use crate::audit::IngestStderrAuditSink;
use crate::audit::LifecycleAuditEvent;
use crate::firmware::load_firmware_registry;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Content type of served firmware images.
const FIRMWARE_CONTENT_TYPE: &str = "application/octet-stream";

// ============================================================================
// SECTION: Fleet Server
// ============================================================================

/// Sensor fleet server instance.
pub struct FleetServer {
    /// Validated configuration.
    config: FleetConfig,
    /// Shared request state.
    state: Arc<ServerState>,
}

impl FleetServer {
    /// Builds a server from configuration using the configured audit sink.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when configuration or initialization fails.
    pub fn from_config(config: FleetConfig) -> Result<Self, ServerError> {
        let audit = build_audit_sink(&config.server.audit)?;
        Self::with_audit(config, audit)
    }

    /// Builds a server from configuration with an explicit audit sink.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when configuration or initialization fails.
    pub fn with_audit(
        config: FleetConfig,
        audit: Arc<dyn IngestAuditSink>,
    ) -> Result<Self, ServerError> {
        config.validate().map_err(|err| ServerError::Config(err.to_string()))?;
        let store = SqliteTelemetryStore::new(config.store.clone())
            .map_err(|err| ServerError::Init(err.to_string()))?;
        let firmware = load_firmware_registry(&config.firmware)?;
        let directory = config.directory.location_directory();
        let (_, warning) = directory.entries();
        if let Some(warning) = warning {
            audit.record_directory(&DirectoryAuditEvent::new(
                directory.path().display().to_string(),
                warning.to_string(),
            ));
        }
        let context = FleetContext::new(directory, firmware, config.cadence.policy())
            .with_max_body_bytes(config.server.max_body_bytes)
            .with_device_id_length(config.directory.device_id_length);
        let handler = IngestionHandler::new(context, SharedTelemetryStore::from_store(store));
        Ok(Self {
            config,
            state: Arc::new(ServerState {
                handler,
                audit,
            }),
        })
    }

    /// Returns the router serving device traffic.
    #[must_use]
    pub fn router(&self) -> Router {
        build_router(Arc::clone(&self.state))
    }

    /// Binds the configured listeners and serves until a worker fails.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when binding, TLS setup, or serving fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        let server = &self.config.server;
        let addr = server.bind_addr().map_err(|err| ServerError::Config(err.to_string()))?;
        let listeners = bind_listeners(addr, server.workers, server.listen_backlog)?;
        let tls = match &server.tls {
            Some(tls) => Some(
                RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
                    .await
                    .map_err(|err| ServerError::Init(format!("tls config: {err}")))?,
            ),
            None => None,
        };
        let bound = listeners
            .first()
            .and_then(|listener| listener.local_addr().ok())
            .unwrap_or(addr);
        let firmware = &self.state.handler.context().firmware;
        self.state.audit.record_lifecycle(&LifecycleAuditEvent::started(
            bound.to_string(),
            listeners.len(),
            tls.is_some(),
            firmware.stable().hash().to_string(),
            firmware.beta().map(|image| image.hash().to_string()),
        ));

        let app = build_router(Arc::clone(&self.state));
        let mut workers = JoinSet::new();
        for listener in listeners {
            let service = app.clone().into_make_service_with_connect_info::<SocketAddr>();
            if let Some(tls) = tls.clone() {
                let listener = listener
                    .into_std()
                    .map_err(|err| ServerError::Transport(format!("listener handoff: {err}")))?;
                let server = axum_server::tls_rustls::from_tcp_rustls(listener, tls)
                    .map_err(|err| ServerError::Transport(format!("https listener: {err}")))?;
                workers.spawn(async move {
                    server
                        .serve(service)
                        .await
                        .map_err(|err| ServerError::Transport(format!("https worker failed: {err}")))
                });
            } else {
                workers.spawn(async move {
                    axum::serve(listener, service)
                        .await
                        .map_err(|err| ServerError::Transport(format!("http worker failed: {err}")))
                });
            }
        }
        while let Some(joined) = workers.join_next().await {
            joined.map_err(|err| ServerError::Transport(format!("worker task failed: {err}")))??;
        }
        Ok(())
    }
}

/// Builds the audit sink selected by configuration.
fn build_audit_sink(config: &ServerAuditConfig) -> Result<Arc<dyn IngestAuditSink>, ServerError> {
    if !config.enabled {
        return Ok(Arc::new(IngestNoopAuditSink));
    }
    match &config.path {
        Some(path) => {
            let sink = IngestFileAuditSink::new(std::path::Path::new(path))
                .map_err(|err| ServerError::Init(format!("audit log {path}: {err}")))?;
            Ok(Arc::new(sink))
        }
        None => Ok(Arc::new(IngestStderrAuditSink)),
    }
}

// ============================================================================
// SECTION: Listeners
// ============================================================================

/// Binds one listener per worker on the same address.
fn bind_listeners(
    addr: SocketAddr,
    workers: usize,
    backlog: u32,
) -> Result<Vec<TcpListener>, ServerError> {
    if workers > 1 && addr.port() == 0 {
        return Err(ServerError::Config(
            "server.workers above 1 requires a fixed port".to_string(),
        ));
    }
    if workers > 1 && cfg!(not(unix)) {
        return Err(ServerError::Config(
            "server.workers above 1 requires SO_REUSEPORT".to_string(),
        ));
    }
    (0 .. workers)
        .map(|_| {
            bind_listener(addr, backlog)
                .map_err(|err| ServerError::Transport(format!("bind {addr} failed: {err}")))
        })
        .collect()
}

/// Binds a single reusable listener socket.
fn bind_listener(addr: SocketAddr, backlog: u32) -> io::Result<TcpListener> {
    let socket = if addr.is_ipv4() { TcpSocket::new_v4()? } else { TcpSocket::new_v6()? };
    socket.set_reuseaddr(true)?;
    enable_port_reuse(&socket)?;
    socket.bind(addr)?;
    socket.listen(backlog)
}

/// Lets several listeners share one port.
#[cfg(unix)]
fn enable_port_reuse(socket: &TcpSocket) -> io::Result<()> {
    socket.set_reuseport(true)
}

/// Port sharing is unavailable; a single worker binds the port alone.
#[cfg(not(unix))]
fn enable_port_reuse(_socket: &TcpSocket) -> io::Result<()> {
    Ok(())
}

// ============================================================================
// SECTION: Routing
// ============================================================================

/// Shared state for request handlers.
pub(crate) struct ServerState {
    /// Ingestion pipeline with its context and store.
    pub(crate) handler: IngestionHandler<SharedTelemetryStore>,
    /// Audit sink for request outcomes.
    pub(crate) audit: Arc<dyn IngestAuditSink>,
}

/// Builds the device-facing router.
pub(crate) fn build_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/data/{device_id}", post(handle_submission).fallback(handle_refused))
        .route("/fw/{hash}", get(handle_firmware).fallback(handle_refused))
        .fallback(handle_refused)
        .with_state(state)
}

/// Error payload returned to devices.
#[derive(Debug, Serialize)]
struct ErrorBody {
    /// Stable failure kind.
    error: &'static str,
    /// Human-readable failure detail.
    message: String,
}

/// Handles `POST /data/{device_id}`.
pub(crate) async fn handle_submission(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(device_segment): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let path = format!("/data/{device_segment}");
    let content_length = declared_length(&headers);
    let context = state.handler.context();
    if let Err(err) = context.check_length(content_length) {
        return state.reject(peer, path, None, &err);
    }
    let bytes = match to_bytes(body, context.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(err) => {
            let err = IngestError::MalformedBody(format!("request body could not be read: {err}"));
            return state.reject(peer, path, None, &err);
        }
    };

    let source_address = peer.to_string();
    let request = IngestRequest {
        device_segment: &device_segment,
        content_length,
        body: &bytes,
        source_address: &source_address,
        receive_epoch: now_epoch_seconds(),
    };
    let outcome: Result<IngestPlan, IngestError> = run_blocking(|| {
        let plan = state.handler.plan(&request)?;
        if let Some(warning) = &plan.directory_warning {
            state.record_directory_warning(warning);
        }
        state.handler.persist(&plan)?;
        Ok(plan)
    });
    match outcome {
        Ok(plan) => {
            state.audit.record(&IngestAuditEvent::new(IngestAuditEventParams {
                peer: source_address,
                path,
                status: StatusCode::OK.as_u16(),
                outcome: "accepted",
                device_id: Some(plan.submission.device_id.to_string()),
                location: Some(plan.submission.location.to_string()),
                channel: Some(plan.channel),
                sample_count: Some(plan.submission.sample_count),
                firmware_update: plan.response.new_fw.is_some(),
                detail: None,
            }));
            (StatusCode::OK, Json(plan.response)).into_response()
        }
        Err(err) => {
            let device_id = match err {
                IngestError::LengthRequired
                | IngestError::PayloadTooLarge {
                    ..
                }
                | IngestError::MalformedIdentity(_) => None,
                IngestError::MalformedBody(_) | IngestError::Store(_) => Some(device_segment.clone()),
            };
            state.reject(peer, path, device_id, &err)
        }
    }
}

/// Handles `GET /fw/{hash}`.
pub(crate) async fn handle_firmware(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(hash): Path<String>,
) -> Response {
    let path = format!("/fw/{hash}");
    let Some(image) = state.handler.context().firmware.lookup(&hash) else {
        state.audit.record_firmware(&FirmwareAuditEvent::new(
            peer.to_string(),
            path,
            StatusCode::NOT_FOUND.as_u16(),
            None,
        ));
        return StatusCode::NOT_FOUND.into_response();
    };
    let blob = image.blob();
    state.audit.record_firmware(&FirmwareAuditEvent::new(
        peer.to_string(),
        path,
        StatusCode::OK.as_u16(),
        Some(blob.len()),
    ));
    (
        StatusCode::OK,
        [(CONTENT_TYPE, HeaderValue::from_static(FIRMWARE_CONTENT_TYPE))],
        Bytes::from_owner(blob),
    )
        .into_response()
}

/// Handles every other method and path.
pub(crate) async fn handle_refused(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let path = uri.path().to_string();
    if method == Method::POST && declared_length(&headers).is_none() {
        return state.reject(peer, path, None, &IngestError::LengthRequired);
    }
    state.audit.record(&IngestAuditEvent::new(IngestAuditEventParams {
        peer: peer.to_string(),
        path,
        status: StatusCode::FORBIDDEN.as_u16(),
        outcome: "forbidden_path",
        detail: Some(format!("{method} not served")),
        ..IngestAuditEventParams::default()
    }));
    error_response(StatusCode::FORBIDDEN, "forbidden_path", "path not served".to_string())
}

impl ServerState {
    /// Audits a recovered directory reload failure.
    fn record_directory_warning(&self, warning: &DirectoryError) {
        self.audit.record_directory(&DirectoryAuditEvent::new(
            self.handler.context().directory.path().display().to_string(),
            warning.to_string(),
        ));
    }

    /// Audits a failed submission and builds its response.
    fn reject(
        &self,
        peer: SocketAddr,
        path: String,
        device_id: Option<String>,
        err: &IngestError,
    ) -> Response {
        let status = status_for(err);
        self.audit.record(&IngestAuditEvent::new(IngestAuditEventParams {
            peer: peer.to_string(),
            path,
            status: status.as_u16(),
            outcome: err.kind(),
            device_id,
            detail: Some(err.to_string()),
            ..IngestAuditEventParams::default()
        }));
        let message = match err {
            IngestError::Store(_) => "telemetry store unavailable".to_string(),
            _ => err.to_string(),
        };
        let mut response = error_response(status, err.kind(), message);
        if let IngestError::Store(StoreError::Overloaded {
            retry_after_ms: Some(retry_after_ms),
            ..
        }) = err
        {
            let seconds = retry_after_ms.div_ceil(1_000).max(1);
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        response
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps an ingestion failure to its HTTP status.
pub(crate) const fn status_for(err: &IngestError) -> StatusCode {
    match err {
        IngestError::LengthRequired => StatusCode::LENGTH_REQUIRED,
        IngestError::PayloadTooLarge {
            ..
        } => StatusCode::PAYLOAD_TOO_LARGE,
        IngestError::MalformedIdentity(_) => StatusCode::FORBIDDEN,
        IngestError::MalformedBody(_) => StatusCode::BAD_REQUEST,
        IngestError::Store(StoreError::Overloaded {
            ..
        }) => StatusCode::SERVICE_UNAVAILABLE,
        IngestError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Builds a JSON error response.
fn error_response(status: StatusCode, error: &'static str, message: String) -> Response {
    (
        status,
        Json(ErrorBody {
            error,
            message,
        }),
    )
        .into_response()
}

/// Parses the declared body length; an unparseable header counts as absent.
fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}

/// Returns the current time in epoch seconds.
fn now_epoch_seconds() -> i64 {
    let seconds = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    i64::try_from(seconds).unwrap_or(i64::MAX)
}

/// Runs a store-bound call, shifting to a blocking context when available.
fn run_blocking<T>(call: impl FnOnce() -> T) -> T {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == tokio::runtime::RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(call)
        }
        _ => call(),
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Tests
// ============================================================================
