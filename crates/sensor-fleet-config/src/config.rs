// crates/sensor-fleet-config/src/config.rs
// ============================================================================
// Module: Sensor Fleet Configuration
// Description: Configuration loading and validation for the fleet backend.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: sensor-fleet-core, sensor-fleet-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! The path comes from the caller, then `SENSOR_FLEET_CONFIG`, then
//! `sensor-fleet.toml` in the working directory. Every section is validated
//! before any listener, store, or directory is constructed.
//!
//! Cadence limits mirror what the device firmware can hold: a sampling
//! interval above 300 seconds or a batch above 60 samples overflows the
//! device-side queue.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::SystemTime;

use sensor_fleet_core::CadencePolicy;
use sensor_fleet_core::LocationDirectory;
use sensor_fleet_core::core::cadence::DEFAULT_PRIORITY_TAG;
use sensor_fleet_core::core::cadence::MAX_QUEUE_COUNT;
use sensor_fleet_core::core::cadence::MAX_QUEUE_INTERVAL;
use sensor_fleet_core::core::identifiers::DEVICE_ID_LENGTH;
use sensor_fleet_core::runtime::DEFAULT_DELAY_STEP_US;
use sensor_fleet_core::runtime::firmware::FIRMWARE_HASH_LEN;
use sensor_fleet_core::runtime::ingest::DEFAULT_MAX_BODY_BYTES;
use sensor_fleet_store_sqlite::SqliteStoreConfig;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "sensor-fleet.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "SENSOR_FLEET_CONFIG";
/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum number of listener workers.
pub const MAX_WORKERS: usize = 256;
/// Maximum accepted request body size in bytes.
pub const MAX_BODY_BYTES_LIMIT: usize = 16 * 1024 * 1024;
/// Maximum listen backlog.
pub(crate) const MAX_LISTEN_BACKLOG: u32 = 65_535;
/// Maximum device identifier length.
pub(crate) const MAX_DEVICE_ID_LENGTH: usize = 64;
/// Maximum per-device delay step in microseconds.
pub(crate) const MAX_DELAY_STEP_US: u64 = 10_000_000;
/// Maximum lead time between a submission and the next wake, in minutes.
pub(crate) const MAX_LEAD_MINUTES: i64 = 1_440;
/// Default bind address for the ingestion listener.
const DEFAULT_BIND: &str = "0.0.0.0:8443";
/// Default listen backlog.
const DEFAULT_LISTEN_BACKLOG: u32 = 1_024;

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Root configuration for the sensor fleet backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FleetConfig {
    /// Ingestion listener configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Telemetry store configuration.
    pub store: SqliteStoreConfig,
    /// Location directory configuration.
    pub directory: DirectoryConfig,
    /// Firmware channel configuration.
    pub firmware: FirmwareConfig,
    /// Sampling cadence configuration.
    #[serde(default)]
    pub cadence: CadenceConfig,
    /// Optional config source metadata (not serialized).
    #[serde(skip)]
    pub source_modified_at: Option<SystemTime>,
}

impl FleetConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config = Self::from_toml_str(content)?;
        config.source_modified_at = fs::metadata(&resolved).and_then(|meta| meta.modified()).ok();
        Ok(config)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.store
            .validate()
            .map_err(|err| ConfigError::Invalid(format!("store: {err}")))?;
        self.directory.validate()?;
        self.firmware.validate()?;
        self.cadence.validate()?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// Ingestion listener configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address the listener binds to.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Number of listener workers sharing the bind address.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Listen backlog per worker socket.
    #[serde(default = "default_listen_backlog")]
    pub listen_backlog: u32,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Optional TLS configuration.
    #[serde(default)]
    pub tls: Option<ServerTlsConfig>,
    /// Audit logging configuration.
    #[serde(default)]
    pub audit: ServerAuditConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            workers: default_workers(),
            listen_backlog: default_listen_backlog(),
            max_body_bytes: default_max_body_bytes(),
            tls: None,
            audit: ServerAuditConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Returns the parsed bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the bind address does not parse.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("invalid server.bind address: {}", self.bind)))
    }

    /// Validates listener configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(ConfigError::Invalid(format!(
                "server.workers must be between 1 and {MAX_WORKERS}"
            )));
        }
        if self.listen_backlog == 0 || self.listen_backlog > MAX_LISTEN_BACKLOG {
            return Err(ConfigError::Invalid(format!(
                "server.listen_backlog must be between 1 and {MAX_LISTEN_BACKLOG}"
            )));
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_body_bytes must be greater than zero".to_string(),
            ));
        }
        if self.max_body_bytes > MAX_BODY_BYTES_LIMIT {
            return Err(ConfigError::Invalid("max_body_bytes exceeds limit".to_string()));
        }
        if let Some(tls) = &self.tls {
            tls.validate()?;
        }
        self.audit.validate()
    }
}

/// TLS configuration for the ingestion listener.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerTlsConfig {
    /// Server certificate chain (PEM).
    pub cert_path: String,
    /// Server private key (PEM).
    pub key_path: String,
}

impl ServerTlsConfig {
    /// Validates TLS configuration paths.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path_string("tls.cert_path", &self.cert_path)?;
        validate_path_string("tls.key_path", &self.key_path)
    }
}

/// Audit logging configuration for ingestion requests.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerAuditConfig {
    /// Enable structured audit logging.
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    /// Optional audit log path (JSON lines). Stderr when unset.
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for ServerAuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            path: None,
        }
    }
}

impl ServerAuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path_string("audit.path", path)?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Directory
// ============================================================================

/// Location directory configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectoryConfig {
    /// Path to the JSON directory file.
    pub path: PathBuf,
    /// Delay step between consecutive devices in microseconds.
    #[serde(default = "default_delay_step_us")]
    pub delay_step_us: u64,
    /// Exact device identifier length accepted on the wire.
    #[serde(default = "default_device_id_length")]
    pub device_id_length: usize,
}

impl DirectoryConfig {
    /// Builds the location directory described by this section.
    #[must_use]
    pub fn location_directory(&self) -> LocationDirectory {
        LocationDirectory::new(self.path.clone(), self.delay_step_us)
    }

    /// Validates directory configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path_string("directory.path", &self.path.to_string_lossy())?;
        if self.delay_step_us > MAX_DELAY_STEP_US {
            return Err(ConfigError::Invalid(format!(
                "directory.delay_step_us must be at most {MAX_DELAY_STEP_US}"
            )));
        }
        if self.device_id_length == 0 || self.device_id_length > MAX_DEVICE_ID_LENGTH {
            return Err(ConfigError::Invalid(format!(
                "directory.device_id_length must be between 1 and {MAX_DEVICE_ID_LENGTH}"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Firmware
// ============================================================================

/// Firmware channel configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FirmwareConfig {
    /// Externally reachable base URL that devices fetch images from.
    pub base_url: String,
    /// Stable channel image.
    pub stable: FirmwareImageConfig,
    /// Optional beta channel image.
    #[serde(default)]
    pub beta: Option<FirmwareImageConfig>,
}

impl FirmwareConfig {
    /// Validates firmware configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let base = self.base_url.trim();
        if !(base.starts_with("https://") || base.starts_with("http://")) {
            return Err(ConfigError::Invalid(
                "firmware.base_url must include http:// or https://".to_string(),
            ));
        }
        if base.len() != self.base_url.len() || base.contains(char::is_whitespace) {
            return Err(ConfigError::Invalid(
                "firmware.base_url must not contain whitespace".to_string(),
            ));
        }
        self.stable.validate("firmware.stable")?;
        if let Some(beta) = &self.beta {
            beta.validate("firmware.beta")?;
        }
        Ok(())
    }
}

/// One firmware channel image.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FirmwareImageConfig {
    /// Image served to devices.
    pub blob_path: PathBuf,
    /// Optional file the content hash is computed from instead of the blob.
    #[serde(default)]
    pub hash_source_path: Option<PathBuf>,
    /// Optional pinned hash verified against the computed one at startup.
    #[serde(default)]
    pub hash: Option<String>,
}

impl FirmwareImageConfig {
    /// Validates a channel image entry.
    fn validate(&self, field: &str) -> Result<(), ConfigError> {
        validate_path_string(&format!("{field}.blob_path"), &self.blob_path.to_string_lossy())?;
        if let Some(source) = &self.hash_source_path {
            validate_path_string(&format!("{field}.hash_source_path"), &source.to_string_lossy())?;
        }
        if let Some(hash) = &self.hash
            && (hash.len() != FIRMWARE_HASH_LEN
                || !hash.bytes().all(|byte| byte.is_ascii_digit() || (b'a' ..= b'f').contains(&byte)))
        {
            return Err(ConfigError::Invalid(format!(
                "{field}.hash must be {FIRMWARE_HASH_LEN} lowercase hex characters"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Cadence
// ============================================================================

/// Sampling cadence configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CadenceConfig {
    /// Whole minutes between the next minute boundary and the next wake.
    #[serde(default = "default_lead_minutes")]
    pub lead_minutes: i64,
    /// Default sampling interval in seconds.
    #[serde(default = "default_queue_interval")]
    pub queue_interval: u32,
    /// Default batch size.
    #[serde(default = "default_queue_count")]
    pub queue_count: u32,
    /// Sampling interval for priority locations.
    #[serde(default = "default_priority_queue_interval")]
    pub priority_queue_interval: u32,
    /// Batch size for priority locations.
    #[serde(default = "default_priority_queue_count")]
    pub priority_queue_count: u32,
    /// Case-insensitive location substring selecting priority cadence.
    #[serde(default = "default_priority_tag")]
    pub priority_tag: String,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            lead_minutes: default_lead_minutes(),
            queue_interval: default_queue_interval(),
            queue_count: default_queue_count(),
            priority_queue_interval: default_priority_queue_interval(),
            priority_queue_count: default_priority_queue_count(),
            priority_tag: default_priority_tag(),
        }
    }
}

impl CadenceConfig {
    /// Returns the cadence policy described by this section.
    #[must_use]
    pub fn policy(&self) -> CadencePolicy {
        CadencePolicy {
            lead_minutes: self.lead_minutes,
            queue_interval: self.queue_interval,
            queue_count: self.queue_count,
            priority_queue_interval: self.priority_queue_interval,
            priority_queue_count: self.priority_queue_count,
            priority_tag: self.priority_tag.clone(),
        }
    }

    /// Validates cadence limits against device capacity.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(1 ..= MAX_LEAD_MINUTES).contains(&self.lead_minutes) {
            return Err(ConfigError::Invalid(format!(
                "cadence.lead_minutes must be between 1 and {MAX_LEAD_MINUTES}"
            )));
        }
        validate_interval("cadence.queue_interval", self.queue_interval)?;
        validate_interval("cadence.priority_queue_interval", self.priority_queue_interval)?;
        validate_count("cadence.queue_count", self.queue_count)?;
        validate_count("cadence.priority_queue_count", self.priority_queue_count)?;
        if self.priority_tag.trim().is_empty() {
            return Err(ConfigError::Invalid("cadence.priority_tag must be non-empty".to_string()));
        }
        Ok(())
    }
}

/// Validates a sampling interval.
fn validate_interval(field: &str, value: u32) -> Result<(), ConfigError> {
    if value == 0 || value > MAX_QUEUE_INTERVAL {
        return Err(ConfigError::Invalid(format!(
            "{field} must be between 1 and {MAX_QUEUE_INTERVAL}"
        )));
    }
    Ok(())
}

/// Validates a batch size.
fn validate_count(field: &str, value: u32) -> Result<(), ConfigError> {
    if value > MAX_QUEUE_COUNT {
        return Err(ConfigError::Invalid(format!("{field} must be at most {MAX_QUEUE_COUNT}")));
    }
    Ok(())
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Returns the default bind address.
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

/// Returns the default worker count.
const fn default_workers() -> usize {
    1
}

/// Returns the default listen backlog.
const fn default_listen_backlog() -> u32 {
    DEFAULT_LISTEN_BACKLOG
}

/// Returns the default maximum request body size.
const fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

/// Returns the default audit enablement.
const fn default_audit_enabled() -> bool {
    true
}

/// Returns the default per-device delay step.
const fn default_delay_step_us() -> u64 {
    DEFAULT_DELAY_STEP_US
}

/// Returns the default device identifier length.
const fn default_device_id_length() -> usize {
    DEVICE_ID_LENGTH
}

/// Returns the default lead time in minutes.
const fn default_lead_minutes() -> i64 {
    5
}

/// Returns the default sampling interval.
const fn default_queue_interval() -> u32 {
    MAX_QUEUE_INTERVAL
}

/// Returns the default batch size.
const fn default_queue_count() -> u32 {
    MAX_QUEUE_COUNT
}

/// Returns the default priority sampling interval.
const fn default_priority_queue_interval() -> u32 {
    60
}

/// Returns the default priority batch size.
const fn default_priority_queue_count() -> u32 {
    5
}

/// Returns the default priority tag.
fn default_priority_tag() -> String {
    DEFAULT_PRIORITY_TAG.to_string()
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        let component_value = component.as_os_str().to_string_lossy();
        if component_value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions are permitted."
    )]

    use super::CadenceConfig;
    use super::MAX_TOTAL_PATH_LENGTH;
    use super::validate_path_string;

    #[test]
    fn validate_path_string_rejects_whitespace_only() {
        let result = validate_path_string("test_path", "   ");
        assert!(result.unwrap_err().to_string().contains("non-empty"));
    }

    #[test]
    fn validate_path_string_rejects_exceeds_max_length() {
        let long_path = "a".repeat(MAX_TOTAL_PATH_LENGTH + 1);
        let result = validate_path_string("test_path", &long_path);
        assert!(result.unwrap_err().to_string().contains("max length"));
    }

    #[test]
    fn default_cadence_matches_device_defaults() {
        let policy = CadenceConfig::default().policy();
        assert_eq!(policy.lead_minutes, 5);
        assert_eq!(policy.queue_interval, 300);
        assert_eq!(policy.queue_count, 60);
        assert_eq!(policy.priority_queue_interval, 60);
        assert_eq!(policy.priority_queue_count, 5);
        assert_eq!(policy.priority_tag, "outdoor");
        assert!(CadenceConfig::default().validate().is_ok());
    }
}
