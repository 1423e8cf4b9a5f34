// crates/sensor-fleet-store-sqlite/tests/sqlite_store.rs
// ============================================================================
// Module: SQLite Telemetry Store Tests
// Description: Atomicity, concurrency, schema, and query tests for the store.
// Purpose: Validate single-writer persistence and collaborator queries.
// ============================================================================

//! ## Overview
//! Integration tests for the `SQLite` telemetry store:
//! - Submission and sample rows commit together with typed columns
//! - Concurrent inserts from many threads lose and duplicate nothing
//! - Schema creation is idempotent across concurrent openers
//! - Location and coverage queries honor their filters

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

use std::path::Path;
use std::sync::Arc;
use std::thread;

use rusqlite::Connection;
use rusqlite::params;
use sensor_fleet_core::CalibratedSample;
use sensor_fleet_core::CoverageReport;
use sensor_fleet_core::DeviceId;
use sensor_fleet_core::Location;
use sensor_fleet_core::Sample;
use sensor_fleet_core::StoreCounts;
use sensor_fleet_core::StoreError;
use sensor_fleet_core::Submission;
use sensor_fleet_core::TelemetryQuery;
use sensor_fleet_core::TelemetryStore;
use sensor_fleet_store_sqlite::SqliteStoreConfig;
use sensor_fleet_store_sqlite::SqliteStoreError;
use sensor_fleet_store_sqlite::SqliteStoreMode;
use sensor_fleet_store_sqlite::SqliteSyncMode;
use sensor_fleet_store_sqlite::SqliteTelemetryStore;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn config_for_path(path: &Path) -> SqliteStoreConfig {
    SqliteStoreConfig::for_path(path)
}

fn submission(device: &str, location: &str, receive_epoch: i64, sample_count: usize) -> Submission {
    Submission {
        fw_hash: "0123456789abcdef".to_string(),
        device_id: DeviceId::parse(device).unwrap(),
        receive_epoch,
        src_addr: "198.51.100.4:50000".to_string(),
        ap_rssi: -70,
        wake_reason: "timer".to_string(),
        location: Location::new(location),
        retries: 1,
        wifi_retries: 0,
        sample_count,
    }
}

fn samples(count: usize, first_epoch: i64) -> Vec<CalibratedSample> {
    (0 .. count)
        .map(|i| {
            CalibratedSample::from_sample(&Sample {
                epoch: first_epoch + 60 * i as i64,
                raw_temperature: 0x6000,
                raw_humidity: 0x4000,
            })
        })
        .collect()
}

// ============================================================================
// SECTION: Persistence
// ============================================================================

#[test]
fn insert_persists_typed_columns() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("telemetry.db");
    let store = SqliteTelemetryStore::new(config_for_path(&path)).unwrap();
    store.insert(&submission("aaaaaaaaaaaa", "Attic", 1_000, 2), &samples(2, 600)).unwrap();
    assert_eq!(
        store.counts().unwrap(),
        StoreCounts {
            submissions: 1,
            samples: 2
        }
    );

    let raw = Connection::open(&path).unwrap();
    let (device, count, src): (String, i64, String) = raw
        .query_row("SELECT device_id, sample_count, src_addr FROM submissions", [], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })
        .unwrap();
    assert_eq!(device, "aaaaaaaaaaaa");
    assert_eq!(count, 2);
    assert_eq!(src, "198.51.100.4:50000");
    let (raw_temp, temp, receive_epoch): (i64, f64, i64) = raw
        .query_row(
            "SELECT raw_temp, temp, receive_epoch FROM samples ORDER BY sample_epoch LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!(raw_temp, 0x1800);
    assert!((temp - 21.88).abs() < 1e-9);
    assert_eq!(receive_epoch, 1_000);
}

#[test]
fn mismatched_sample_count_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let store = SqliteTelemetryStore::new(config_for_path(&dir.path().join("t.db"))).unwrap();
    let err = store.insert(&submission("aaaaaaaaaaaa", "Attic", 1, 3), &samples(2, 1)).unwrap_err();
    assert!(matches!(err, StoreError::Invalid(_)));
    assert_eq!(store.counts().unwrap(), StoreCounts::default());
}

#[test]
fn empty_submission_is_recorded() {
    let dir = TempDir::new().unwrap();
    let store = SqliteTelemetryStore::new(config_for_path(&dir.path().join("t.db"))).unwrap();
    store.insert(&submission("aaaaaaaaaaaa", "(bench)", 5, 0), &[]).unwrap();
    assert_eq!(store.counts().unwrap().submissions, 1);
    assert_eq!(store.counts().unwrap().samples, 0);
}

#[test]
fn concurrent_inserts_are_exact() {
    const WRITERS: usize = 64;
    const SAMPLES: usize = 5;
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteTelemetryStore::new(config_for_path(&dir.path().join("t.db"))).unwrap());

    let handles: Vec<_> = (0 .. WRITERS)
        .map(|writer| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let device = format!("{writer:012x}");
                let location = format!("Room {writer}");
                store
                    .insert(&submission(&device, &location, 10_000, SAMPLES), &samples(SAMPLES, 600))
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(
        store.counts().unwrap(),
        StoreCounts {
            submissions: WRITERS as u64,
            samples: (WRITERS * SAMPLES) as u64
        }
    );
    assert_eq!(store.query_locations(10_000, 10_000).unwrap().len(), WRITERS);
}

// ============================================================================
// SECTION: Schema
// ============================================================================

#[test]
fn schema_creation_is_idempotent_across_openers() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shared.db");
    drop(SqliteTelemetryStore::new(config_for_path(&path)).unwrap());
    let openers: Vec<_> = (0 .. 4)
        .map(|_| {
            let path = path.clone();
            thread::spawn(move || SqliteTelemetryStore::new(config_for_path(&path)).unwrap())
        })
        .collect();
    let stores: Vec<SqliteTelemetryStore> = openers.into_iter().map(|h| h.join().unwrap()).collect();
    for (index, store) in stores.iter().enumerate() {
        let device = format!("{index:012x}");
        store.insert(&submission(&device, "Hall", 1, 1), &samples(1, 60)).unwrap();
    }
    drop(stores);

    let reopened = SqliteTelemetryStore::new(config_for_path(&path)).unwrap();
    assert_eq!(reopened.counts().unwrap().submissions, 4);
    let raw = Connection::open(&path).unwrap();
    let meta_rows: i64 = raw.query_row("SELECT COUNT(*) FROM store_meta", [], |row| row.get(0)).unwrap();
    assert_eq!(meta_rows, 1);
}

#[test]
fn unknown_schema_version_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("t.db");
    drop(SqliteTelemetryStore::new(config_for_path(&path)).unwrap());
    let raw = Connection::open(&path).unwrap();
    raw.execute("UPDATE store_meta SET version = ?1", params![99]).unwrap();
    drop(raw);

    let Err(err) = SqliteTelemetryStore::new(config_for_path(&path)) else {
        panic!("expected version mismatch");
    };
    assert!(matches!(err, SqliteStoreError::VersionMismatch(_)));
}

#[test]
fn invalid_configuration_is_rejected() {
    let dir = TempDir::new().unwrap();
    let Err(err) = SqliteTelemetryStore::new(config_for_path(dir.path())) else {
        panic!("directory path accepted");
    };
    assert!(matches!(err, SqliteStoreError::Invalid(_)));

    let mut config = config_for_path(&dir.path().join("t.db"));
    config.read_pool_size = 0;
    assert!(matches!(config.validate(), Err(SqliteStoreError::Invalid(_))));
    config.read_pool_size = 1;
    config.writer_queue_capacity = 0;
    assert!(matches!(config.validate(), Err(SqliteStoreError::Invalid(_))));
}

#[test]
fn delete_journal_mode_is_supported() {
    let dir = TempDir::new().unwrap();
    let mut config = config_for_path(&dir.path().join("t.db"));
    config.journal_mode = SqliteStoreMode::Delete;
    config.sync_mode = SqliteSyncMode::Normal;
    let store = SqliteTelemetryStore::new(config).unwrap();
    store.insert(&submission("aaaaaaaaaaaa", "Attic", 1, 1), &samples(1, 60)).unwrap();
    assert_eq!(store.counts().unwrap().samples, 1);
}

// ============================================================================
// SECTION: Queries
// ============================================================================

#[test]
fn query_locations_filters_on_receive_epoch() {
    let dir = TempDir::new().unwrap();
    let store = SqliteTelemetryStore::new(config_for_path(&dir.path().join("t.db"))).unwrap();
    store.insert(&submission("aaaaaaaaaaaa", "Porch", 100, 1), &samples(1, 1)).unwrap();
    store.insert(&submission("bbbbbbbbbbbb", "Attic", 200, 1), &samples(1, 1)).unwrap();
    store.insert(&submission("bbbbbbbbbbbb", "Attic", 250, 1), &samples(1, 1)).unwrap();
    store.insert(&submission("cccccccccccc", "Cellar", 300, 0), &[]).unwrap();

    let names = |start, end| -> Vec<String> {
        store.query_locations(start, end).unwrap().into_iter().map(|l| l.as_str().to_string()).collect()
    };
    assert_eq!(names(0, 1_000), vec!["Attic", "Porch"]);
    assert_eq!(names(150, 260), vec!["Attic"]);
    assert_eq!(names(100, 100), vec!["Porch"]);
    assert!(names(301, 400).is_empty());
}

#[test]
fn minute_buckets_feed_coverage_report() {
    let dir = TempDir::new().unwrap();
    let store = SqliteTelemetryStore::new(config_for_path(&dir.path().join("t.db"))).unwrap();
    store.insert(&submission("aaaaaaaaaaaa", "Attic", 1_000, 4), &samples(4, 600)).unwrap();
    store.insert(&submission("bbbbbbbbbbbb", "Cellar", 1_000, 1), &samples(1, 600)).unwrap();
    store.insert(&submission("cccccccccccc", "(bench)", 1_000, 1), &samples(1, 0)).unwrap();

    let buckets = store.minute_buckets().unwrap();
    assert_eq!(buckets.len(), 5);
    let locations = store.query_locations(i64::MIN, i64::MAX).unwrap();
    let report = CoverageReport::build(&locations, &buckets);
    assert_eq!(report.earliest_epoch, Some(600));
    assert_eq!(report.locations.len(), 2);
    let cellar = &report.locations[1];
    assert_eq!(cellar.location.as_str(), "Cellar");
    assert_eq!(cellar.missing_minutes, 3);
    assert_eq!(cellar.ranges.len(), 1);
    assert_eq!(cellar.ranges[0].start_epoch, 660);
    assert_eq!(cellar.ranges[0].end_epoch, 780);
}
