// crates/sensor-fleet-core/src/core/identifiers.rs
// ============================================================================
// Module: Sensor Fleet Identifiers
// Description: Device, location, and firmware hash identifiers.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Identifiers used throughout the ingestion path. Device identifiers are the
//! only authentication surface the fleet has, so they are validated against a
//! fixed length at the protocol boundary. Locations are free-form names whose
//! spelling carries protocol meaning: a parenthesized name marks a beta/test
//! device and a configurable tag selects priority cadence.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Length of the device identifier emitted by fleet firmware (`%04x%04x%04x`).
pub const DEVICE_ID_LENGTH: usize = 12;

/// Location assigned to devices missing from the directory file.
pub const UNKNOWN_LOCATION: &str = "(unknown)";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Identifier validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// Identifier length does not match the fleet namespace.
    #[error("device id must be {expected} characters, got {actual}")]
    Length {
        /// Expected identifier length.
        expected: usize,
        /// Observed identifier length.
        actual: usize,
    },
}

// ============================================================================
// SECTION: Device Identifier
// ============================================================================

/// Fixed-length identifier naming a physical sensor unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Parses a device identifier using the fleet's default length.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Length`] when the identifier is not
    /// [`DEVICE_ID_LENGTH`] characters long.
    pub fn parse(raw: &str) -> Result<Self, IdentityError> {
        Self::parse_with_length(raw, DEVICE_ID_LENGTH)
    }

    /// Parses a device identifier against an explicit expected length.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Length`] when the character count differs.
    pub fn parse_with_length(raw: &str, expected: usize) -> Result<Self, IdentityError> {
        let actual = raw.chars().count();
        if actual != expected {
            return Err(IdentityError::Length {
                expected,
                actual,
            });
        }
        Ok(Self(raw.to_string()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Location
// ============================================================================

/// Human-assigned location name for a device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(String);

impl Location {
    /// Creates a new location name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the location used for devices absent from the directory.
    #[must_use]
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_LOCATION)
    }

    /// Returns the location as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true when the name is parenthesized, marking a beta/test device.
    #[must_use]
    pub fn is_beta(&self) -> bool {
        self.0.starts_with('(') && self.0.ends_with(')')
    }

    /// Returns true when the name contains `tag`, ignoring case.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.0.to_lowercase().contains(&tag.to_lowercase())
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for Location {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Location {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Firmware Hash
// ============================================================================

/// Truncated content digest naming a firmware build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FirmwareHash(String);

impl FirmwareHash {
    /// Creates a firmware hash from its hex string form.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the hash as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true when `reported` names this build.
    #[must_use]
    pub fn matches(&self, reported: &str) -> bool {
        self.0 == reported
    }
}

impl fmt::Display for FirmwareHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
