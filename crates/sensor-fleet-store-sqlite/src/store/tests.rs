// crates/sensor-fleet-store-sqlite/src/store/tests.rs
// ============================================================================
// Module: SQLite Store Helper Tests
// Description: Unit tests for enqueue failure mapping and row totals.
// Purpose: Keep writer loss and integer conversion errors classified.
// Dependencies: sensor-fleet-store-sqlite
// ============================================================================

//! ## Overview
//! Drives the bounded writer channel into its full and disconnected states
//! and checks how each surfaces to callers.

// ============================================================================
// SECTION: Lint Configuration
// ============================================================================

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
    reason = "Test-only assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::mpsc;

use sensor_fleet_core::StoreError;

use super::SqliteStoreError;
use super::enqueue_error;
use super::row_total;

// ============================================================================
// SECTION: Writer Queue
// ============================================================================

#[test]
fn full_queue_is_retryable_overload() {
    let (sender, _receiver) = mpsc::sync_channel::<u8>(1);
    sender.try_send(1).unwrap();
    let err = sender.try_send(2).unwrap_err();
    let mapped = enqueue_error(&err, 75);
    assert!(matches!(
        mapped,
        SqliteStoreError::Overloaded {
            retry_after_ms: Some(75),
            ..
        }
    ));
    assert!(matches!(StoreError::from(mapped), StoreError::Overloaded { .. }));
}

#[test]
fn exited_writer_is_an_io_failure() {
    let (sender, receiver) = mpsc::sync_channel::<u8>(1);
    drop(receiver);
    let err = sender.try_send(1).unwrap_err();
    let mapped = enqueue_error(&err, 75);
    assert!(matches!(mapped, SqliteStoreError::Io(_)));
    assert!(matches!(StoreError::from(mapped), StoreError::Io(_)));
}

// ============================================================================
// SECTION: Row Totals
// ============================================================================

#[test]
fn row_totals_convert_from_sqlite_integers() {
    assert_eq!(row_total(0).unwrap(), 0);
    assert_eq!(row_total(4_096).unwrap(), 4_096);
    assert!(matches!(row_total(-1), Err(SqliteStoreError::Invalid(_))));
}
