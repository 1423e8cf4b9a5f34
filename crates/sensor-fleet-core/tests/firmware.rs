// crates/sensor-fleet-core/tests/firmware.rs
// ============================================================================
// Module: Firmware Channel Tests
// Description: Stable/beta rollout decisions and image lookup.
// Purpose: Ensure devices are steered to the image for their channel.
// ============================================================================

//! Firmware channel registry tests.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use sensor_fleet_core::Channel;
use sensor_fleet_core::FirmwareError;
use sensor_fleet_core::FirmwareImage;
use sensor_fleet_core::FirmwareRegistry;
use sensor_fleet_core::Location;
use sensor_fleet_core::runtime::firmware_digest;

const BASE_URL: &str = "https://sensors.example.net:4443";

fn image(bytes: &[u8]) -> FirmwareImage {
    FirmwareImage::build(bytes.to_vec(), None, None, BASE_URL).unwrap()
}

fn registry(with_beta: bool) -> FirmwareRegistry {
    FirmwareRegistry::new(image(b"stable build"), with_beta.then(|| image(b"beta build")))
}

#[test]
fn current_stable_hash_gets_no_update() {
    let registry = registry(true);
    let stable = registry.stable().hash().as_str().to_string();
    let decision = registry.decide(&stable, &Location::new("Kitchen"));
    assert_eq!(decision.channel, Channel::Stable);
    assert!(decision.new_firmware_url.is_none());
    assert!(!decision.beta_device);
}

#[test]
fn stable_mismatch_yields_stable_url() {
    let registry = registry(true);
    for reported in ["", "0000000000000000", "not-a-hash"] {
        let decision = registry.decide(reported, &Location::new("Garage"));
        assert_eq!(decision.new_firmware_url.as_deref(), Some(registry.stable().url()));
    }
    assert_eq!(
        registry.stable().url(),
        format!("{BASE_URL}/fw/{}", firmware_digest(b"stable build").as_str())
    );
}

#[test]
fn beta_location_tracks_beta_image() {
    let registry = registry(true);
    let beta = registry.beta().unwrap();
    let location = Location::new("(bench)");

    let outdated = registry.decide(registry.stable().hash().as_str(), &location);
    assert_eq!(outdated.channel, Channel::Beta);
    assert!(outdated.beta_device);
    assert_eq!(outdated.new_firmware_url.as_deref(), Some(beta.url()));

    let current = registry.decide(beta.hash().as_str(), &location);
    assert!(current.new_firmware_url.is_none());
    assert!(current.beta_device);
}

#[test]
fn without_beta_image_beta_locations_track_stable() {
    let registry = registry(false);
    let location = Location::new("(bench)");
    let decision = registry.decide("deadbeefdeadbeef", &location);
    assert_eq!(decision.channel, Channel::Stable);
    assert!(decision.beta_device);
    assert_eq!(decision.new_firmware_url.as_deref(), Some(registry.stable().url()));
    let current = registry.decide(registry.stable().hash().as_str(), &location);
    assert!(current.new_firmware_url.is_none());
}

#[test]
fn lookup_serves_either_channel_by_hash() {
    let registry = registry(true);
    let stable_hash = registry.stable().hash().as_str().to_string();
    let beta_hash = registry.beta().unwrap().hash().as_str().to_string();
    assert_eq!(&*registry.lookup(&stable_hash).unwrap().blob(), b"stable build");
    assert_eq!(&*registry.lookup(&beta_hash).unwrap().blob(), b"beta build");
    assert!(registry.lookup("0123456789abcdef").is_none());
}

#[test]
fn hash_source_names_the_image() {
    let built = FirmwareImage::build(b"binary".to_vec(), Some(&b"elf image"[..]), None, "https://host/").unwrap();
    assert_eq!(built.hash(), &firmware_digest(b"elf image"));
    assert_eq!(built.url(), format!("https://host/fw/{}", built.hash()));
    assert_eq!(built.hash().as_str().len(), 16);
}

#[test]
fn pinned_hash_must_match() {
    let computed = firmware_digest(b"binary");
    assert!(FirmwareImage::build(b"binary".to_vec(), None, Some(computed.as_str()), BASE_URL).is_ok());
    let err = FirmwareImage::build(b"binary".to_vec(), None, Some("ffffffffffffffff"), BASE_URL).unwrap_err();
    assert!(matches!(err, FirmwareError::HashMismatch { .. }));
}
