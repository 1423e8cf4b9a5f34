// crates/sensor-fleet-core/src/runtime/firmware.rs
// ============================================================================
// Module: Sensor Fleet Firmware Channels
// Description: Content-addressed stable/beta firmware images and rollout logic.
// Purpose: Decide which firmware image a device should fetch next.
// Dependencies: crate::core, sha2, thiserror
// ============================================================================

//! ## Overview
//! A server instance holds one stable image and optionally one beta image,
//! each named by the first 16 hex characters of the SHA-256 digest of its
//! compiled binary. Devices report the hash they run; a mismatch against the
//! image for their channel yields that image's download URL. Beta/test
//! devices (parenthesized locations) track the beta image when one is
//! configured and otherwise track stable like everyone else.
//!
//! Images are immutable for the registry's lifetime; blobs are shared by
//! reference and read concurrently without locking.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

use crate::core::FirmwareHash;
use crate::core::Location;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Hex characters kept from the SHA-256 digest.
pub const FIRMWARE_HASH_LEN: usize = 16;

/// Route prefix under which firmware blobs are served.
pub const FIRMWARE_ROUTE_PREFIX: &str = "/fw/";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Firmware image construction errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FirmwareError {
    /// A pinned hash disagrees with the digest of the hash source.
    #[error("firmware hash mismatch: pinned {pinned}, computed {computed}")]
    HashMismatch {
        /// Hash supplied by configuration.
        pinned: String,
        /// Hash computed from the image bytes.
        computed: String,
    },
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// Firmware release channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Production channel.
    Stable,
    /// Beta/test channel.
    Beta,
}

/// Immutable firmware image.
#[derive(Debug, Clone)]
pub struct FirmwareImage {
    /// Content hash naming the build.
    hash: FirmwareHash,
    /// Binary served to devices.
    blob: Arc<[u8]>,
    /// Absolute download URL.
    url: String,
}

impl FirmwareImage {
    /// Builds an image, hashing `hash_source` when given and the blob otherwise.
    ///
    /// The hash source is typically the ELF image the served binary was
    /// derived from, which is what devices report.
    ///
    /// # Errors
    ///
    /// Returns [`FirmwareError::HashMismatch`] when `pinned` is set and
    /// differs from the computed hash.
    pub fn build(
        blob: impl Into<Arc<[u8]>>,
        hash_source: Option<&[u8]>,
        pinned: Option<&str>,
        base_url: &str,
    ) -> Result<Self, FirmwareError> {
        let blob = blob.into();
        let computed = firmware_digest(hash_source.unwrap_or(&blob[..]));
        if let Some(pinned) = pinned
            && !computed.matches(pinned)
        {
            return Err(FirmwareError::HashMismatch {
                pinned: pinned.to_string(),
                computed: computed.as_str().to_string(),
            });
        }
        Ok(Self::with_hash(computed, blob, base_url))
    }

    /// Builds an image with an explicit hash.
    #[must_use]
    pub fn with_hash(hash: FirmwareHash, blob: impl Into<Arc<[u8]>>, base_url: &str) -> Self {
        let url = format!("{}{}{}", base_url.trim_end_matches('/'), FIRMWARE_ROUTE_PREFIX, hash.as_str());
        Self {
            hash,
            blob: blob.into(),
            url,
        }
    }

    /// Returns the image hash.
    #[must_use]
    pub const fn hash(&self) -> &FirmwareHash {
        &self.hash
    }

    /// Returns the shared image bytes.
    #[must_use]
    pub fn blob(&self) -> Arc<[u8]> {
        Arc::clone(&self.blob)
    }

    /// Returns the download URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Firmware outcome for one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareDecision {
    /// Channel the device tracks.
    pub channel: Channel,
    /// URL to fetch when the device runs a different build.
    pub new_firmware_url: Option<String>,
    /// True when the location marks a beta/test device.
    pub beta_device: bool,
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Stable and optional beta firmware images.
#[derive(Debug, Clone)]
pub struct FirmwareRegistry {
    /// Production image.
    stable: FirmwareImage,
    /// Optional beta image.
    beta: Option<FirmwareImage>,
}

impl FirmwareRegistry {
    /// Creates a registry.
    #[must_use]
    pub const fn new(stable: FirmwareImage, beta: Option<FirmwareImage>) -> Self {
        Self {
            stable,
            beta,
        }
    }

    /// Returns the stable image.
    #[must_use]
    pub const fn stable(&self) -> &FirmwareImage {
        &self.stable
    }

    /// Returns the beta image, if configured.
    #[must_use]
    pub const fn beta(&self) -> Option<&FirmwareImage> {
        self.beta.as_ref()
    }

    /// Decides whether a device reporting `reported_hash` should update.
    #[must_use]
    pub fn decide(&self, reported_hash: &str, location: &Location) -> FirmwareDecision {
        let beta_device = location.is_beta();
        let (channel, image) = match (&self.beta, beta_device) {
            (Some(beta), true) => (Channel::Beta, beta),
            _ => (Channel::Stable, &self.stable),
        };
        let new_firmware_url =
            (!image.hash.matches(reported_hash)).then(|| image.url.clone());
        FirmwareDecision {
            channel,
            new_firmware_url,
            beta_device,
        }
    }

    /// Returns the image named by `hash`, checking stable before beta.
    #[must_use]
    pub fn lookup(&self, hash: &str) -> Option<&FirmwareImage> {
        std::iter::once(&self.stable)
            .chain(self.beta.as_ref())
            .find(|image| image.hash.matches(hash))
    }
}

// ============================================================================
// SECTION: Hashing
// ============================================================================

/// Returns the truncated SHA-256 hex digest used to name firmware builds.
#[must_use]
pub fn firmware_digest(bytes: &[u8]) -> FirmwareHash {
    let digest = Sha256::digest(bytes);
    let mut hex = hex_encode(&digest);
    hex.truncate(FIRMWARE_HASH_LEN);
    FirmwareHash::new(hex)
}

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::firmware_digest;

    #[test]
    fn digest_is_truncated_sha256() {
        // sha256("abc") = ba7816bf8f01cfea414140de5dae2223...
        assert_eq!(firmware_digest(b"abc").as_str(), "ba7816bf8f01cfea");
    }
}
