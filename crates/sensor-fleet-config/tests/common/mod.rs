// crates/sensor-fleet-config/tests/common/mod.rs
// =============================================================================
// Module: Config Test Helpers
// Description: Shared helpers for config validation tests.
// Purpose: Reduce duplication across integration tests for sensor-fleet-config.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use sensor_fleet_config::ConfigError;
use sensor_fleet_config::FleetConfig;

/// Smallest configuration accepted by validation.
pub const MINIMAL_TOML: &str = r#"
[store]
path = "data/telemetry.db"

[directory]
path = "locations.json"

[firmware]
base_url = "https://sensors.example.net:8443"

[firmware.stable]
blob_path = "firmware/stable.bin"
"#;

/// Parses a TOML string into a `FleetConfig` without validation.
pub fn config_from_toml(toml_str: &str) -> Result<FleetConfig, toml::de::Error> {
    toml::from_str(toml_str)
}

/// Returns a minimal config with all defaults applied.
pub fn minimal_config() -> Result<FleetConfig, toml::de::Error> {
    config_from_toml(MINIMAL_TOML)
}

/// Asserts that a validation result failed with a message containing `needle`.
pub fn assert_invalid<T>(result: Result<T, ConfigError>, needle: &str) -> Result<(), String> {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config".to_string()),
    }
}
