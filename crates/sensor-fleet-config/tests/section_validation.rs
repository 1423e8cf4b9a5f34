//! Section validation tests for sensor-fleet-config.
// crates/sensor-fleet-config/tests/section_validation.rs
// =============================================================================
// Module: Section Validation Tests
// Description: Validate server, store, directory, firmware, and cadence limits.
// Purpose: Ensure out-of-range settings are rejected before startup.
// =============================================================================

use sensor_fleet_config::FirmwareImageConfig;
use sensor_fleet_config::ServerTlsConfig;

mod common;

type TestResult = Result<(), String>;

#[test]
fn minimal_config_is_valid() -> TestResult {
    let config = common::minimal_config().map_err(|err| err.to_string())?;
    config.validate().map_err(|err| err.to_string())
}

#[test]
fn server_rejects_unparseable_bind() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.server.bind = "localhost".to_string();
    common::assert_invalid(config.validate(), "invalid server.bind address")
}

#[test]
fn server_rejects_worker_bounds() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.server.workers = 0;
    common::assert_invalid(config.validate(), "server.workers must be between 1 and 256")?;
    config.server.workers = 257;
    common::assert_invalid(config.validate(), "server.workers must be between 1 and 256")?;
    config.server.workers = 256;
    config.validate().map_err(|err| err.to_string())
}

#[test]
fn server_rejects_zero_body_limit() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.server.max_body_bytes = 0;
    common::assert_invalid(config.validate(), "max_body_bytes must be greater than zero")
}

#[test]
fn server_rejects_empty_tls_paths() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.server.tls = Some(ServerTlsConfig {
        cert_path: " ".to_string(),
        key_path: "key.pem".to_string(),
    });
    common::assert_invalid(config.validate(), "tls.cert_path must be non-empty")
}

#[test]
fn store_limits_are_validated() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.store.writer_queue_capacity = 0;
    common::assert_invalid(config.validate(), "store: ")
}

#[test]
fn directory_rejects_zero_id_length() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.directory.device_id_length = 0;
    common::assert_invalid(config.validate(), "directory.device_id_length")
}

#[test]
fn firmware_requires_http_scheme() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.firmware.base_url = "sensors.example.net".to_string();
    common::assert_invalid(config.validate(), "firmware.base_url must include")
}

#[test]
fn firmware_rejects_malformed_pinned_hash() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.firmware.beta = Some(FirmwareImageConfig {
        blob_path: "firmware/beta.bin".into(),
        hash_source_path: Some("firmware/beta.elf".into()),
        hash: Some("ABCDEF0123456789".to_string()),
    });
    common::assert_invalid(config.validate(), "firmware.beta.hash must be 16 lowercase hex")?;
    if let Some(beta) = config.firmware.beta.as_mut() {
        beta.hash = Some("abcdef0123456789".to_string());
    }
    config.validate().map_err(|err| err.to_string())
}

#[test]
fn cadence_intervals_are_bounded_by_device_limits() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.cadence.queue_interval = 301;
    common::assert_invalid(config.validate(), "cadence.queue_interval must be between 1 and 300")?;
    config.cadence.queue_interval = 0;
    common::assert_invalid(config.validate(), "cadence.queue_interval")?;
    config.cadence.queue_interval = 300;
    config.cadence.priority_queue_interval = 0;
    common::assert_invalid(config.validate(), "cadence.priority_queue_interval")
}

#[test]
fn cadence_counts_are_bounded_by_device_limits() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.cadence.queue_count = 61;
    common::assert_invalid(config.validate(), "cadence.queue_count must be at most 60")?;
    config.cadence.queue_count = 0;
    config.validate().map_err(|err| err.to_string())
}

#[test]
fn cadence_section_maps_to_policy() -> TestResult {
    let content = format!(
        "{}\n[cadence]\nqueue_interval = 120\npriority_tag = \"garden\"\n",
        common::MINIMAL_TOML
    );
    let config = sensor_fleet_config::FleetConfig::from_toml_str(&content)
        .map_err(|err| err.to_string())?;
    let policy = config.cadence.policy();
    if policy.queue_interval != 120 || policy.priority_tag != "garden" || policy.queue_count != 60 {
        return Err(format!("unexpected policy {policy:?}"));
    }
    Ok(())
}
