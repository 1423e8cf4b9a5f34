// crates/sensor-fleet-server/src/firmware.rs
// ============================================================================
// Module: Firmware Image Loading
// Description: Reads configured firmware images from disk at startup.
// Purpose: Build the immutable firmware registry served to devices.
// Dependencies: sensor-fleet-core, sensor-fleet-config
// ============================================================================

//! ## Overview
//! Images are read once at startup into shared byte buffers. The hash that
//! names an image comes from its optional hash source (the ELF the served
//! binary was derived from) or from the blob itself, and a pinned hash in
//! configuration must agree with it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;

use sensor_fleet_config::FirmwareConfig;
use sensor_fleet_config::FirmwareImageConfig;
use sensor_fleet_core::FirmwareImage;
use sensor_fleet_core::FirmwareRegistry;

use crate::server::ServerError;

// ============================================================================
// SECTION: Loading
// ============================================================================

/// Loads the stable and optional beta images described by `config`.
///
/// # Errors
///
/// Returns [`ServerError::Init`] when an image cannot be read or a pinned
/// hash disagrees with the computed one.
pub fn load_firmware_registry(config: &FirmwareConfig) -> Result<FirmwareRegistry, ServerError> {
    let stable = load_image("stable", &config.stable, &config.base_url)?;
    let beta = config
        .beta
        .as_ref()
        .map(|image| load_image("beta", image, &config.base_url))
        .transpose()?;
    Ok(FirmwareRegistry::new(stable, beta))
}

/// Loads one channel image.
fn load_image(
    channel: &str,
    config: &FirmwareImageConfig,
    base_url: &str,
) -> Result<FirmwareImage, ServerError> {
    let blob = read_image_file(channel, &config.blob_path)?;
    let hash_source = config
        .hash_source_path
        .as_deref()
        .map(|path| read_image_file(channel, path))
        .transpose()?;
    FirmwareImage::build(blob, hash_source.as_deref(), config.hash.as_deref(), base_url)
        .map_err(|err| ServerError::Init(format!("{channel} firmware: {err}")))
}

/// Reads an image file, naming the channel on failure.
fn read_image_file(channel: &str, path: &Path) -> Result<Vec<u8>, ServerError> {
    fs::read(path).map_err(|err| {
        ServerError::Init(format!("{channel} firmware {}: {err}", path.display()))
    })
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

    use std::fs;

    use sensor_fleet_config::FirmwareConfig;
    use sensor_fleet_config::FirmwareImageConfig;
    use sensor_fleet_core::runtime::firmware_digest;

    use super::load_firmware_registry;

    #[test]
    fn registry_names_images_by_hash_source() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("stable.bin"), b"stable binary").unwrap();
        fs::write(dir.path().join("stable.elf"), b"stable elf").unwrap();
        fs::write(dir.path().join("beta.bin"), b"beta binary").unwrap();
        let expected = firmware_digest(b"stable elf");
        let config = FirmwareConfig {
            base_url: "https://fleet.test:8443/".to_string(),
            stable: FirmwareImageConfig {
                blob_path: dir.path().join("stable.bin"),
                hash_source_path: Some(dir.path().join("stable.elf")),
                hash: Some(expected.as_str().to_string()),
            },
            beta: Some(FirmwareImageConfig {
                blob_path: dir.path().join("beta.bin"),
                hash_source_path: None,
                hash: None,
            }),
        };

        let registry = load_firmware_registry(&config).unwrap();
        assert_eq!(registry.stable().hash(), &expected);
        assert_eq!(&registry.stable().blob()[..], b"stable binary");
        assert_eq!(
            registry.stable().url(),
            format!("https://fleet.test:8443/fw/{}", expected.as_str())
        );
        let beta = registry.beta().unwrap();
        assert_eq!(beta.hash(), &firmware_digest(b"beta binary"));
    }

    #[test]
    fn missing_image_fails_startup() {
        let dir = tempfile::tempdir().unwrap();
        let config = FirmwareConfig {
            base_url: "https://fleet.test".to_string(),
            stable: FirmwareImageConfig {
                blob_path: dir.path().join("absent.bin"),
                hash_source_path: None,
                hash: None,
            },
            beta: None,
        };
        let err = load_firmware_registry(&config).unwrap_err();
        assert!(err.to_string().contains("stable firmware"));
    }
}
