// crates/sensor-fleet-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Main Helpers Tests
// Description: Unit tests for argument parsing and report rendering.
// Purpose: Keep the command surface and text output stable.
// Dependencies: sensor-fleet-cli main helpers, tempfile
// ============================================================================

//! ## Overview
//! Exercises clap parsing for every command, the coverage and directory text
//! renderers, and config-driven store access against a temporary deployment.

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
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;

use clap::Parser;
use sensor_fleet_core::CoverageReport;
use sensor_fleet_core::DirectoryEntry;
use sensor_fleet_core::Location;
use sensor_fleet_core::MinuteBucket;
use sensor_fleet_core::StoreCounts;
use sensor_fleet_core::TelemetryQuery;

use super::Cli;
use super::Commands;
use super::ConfigArg;
use super::ConfigCommand;
use super::LocationsCommand;
use super::OutputFormat;
use super::command_locations;
use super::load_config;
use super::open_store;
use super::render_coverage_text;
use super::render_directory_text;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn bucket(location: &str, minute: i64) -> MinuteBucket {
    MinuteBucket {
        location: Location::new(location),
        minute,
    }
}

fn write_config(root: &Path) -> ConfigArg {
    let config_path = root.join("sensor-fleet.toml");
    let contents = format!(
        r#"
[store]
path = "{store}"

[directory]
path = "{directory}"

[firmware]
base_url = "https://sensors.example.net:8443"

[firmware.stable]
blob_path = "{blob}"
"#,
        store = root.join("telemetry.db").display(),
        directory = root.join("locations.json").display(),
        blob = root.join("stable.bin").display(),
    );
    fs::write(&config_path, contents).unwrap();
    ConfigArg {
        config: Some(config_path),
    }
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

#[test]
fn locations_parses_epoch_window() {
    let cli = Cli::try_parse_from([
        "sensor-fleet",
        "locations",
        "--config",
        "fleet.toml",
        "--start",
        "-60",
        "--end",
        "3600",
    ])
    .unwrap();
    let Some(Commands::Locations(command)) = cli.command else {
        panic!("expected locations command");
    };
    assert_eq!(command.start, -60);
    assert_eq!(command.end, 3600);
    assert_eq!(command.config.config.as_deref(), Some(Path::new("fleet.toml")));
}

#[test]
fn locations_requires_both_bounds() {
    assert!(Cli::try_parse_from(["sensor-fleet", "locations", "--start", "0"]).is_err());
}

#[test]
fn coverage_defaults_to_text_output() {
    let cli = Cli::try_parse_from(["sensor-fleet", "coverage"]).unwrap();
    let Some(Commands::Coverage(command)) = cli.command else {
        panic!("expected coverage command");
    };
    assert_eq!(command.format, OutputFormat::Text);
    assert!(command.config.config.is_none());

    let cli = Cli::try_parse_from(["sensor-fleet", "coverage", "--format", "json"]).unwrap();
    let Some(Commands::Coverage(command)) = cli.command else {
        panic!("expected coverage command");
    };
    assert_eq!(command.format, OutputFormat::Json);
}

#[test]
fn config_validate_and_version_parse() {
    let cli =
        Cli::try_parse_from(["sensor-fleet", "config", "validate", "--config", "a.toml"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Config {
            command: ConfigCommand::Validate(_)
        })
    ));

    let cli = Cli::try_parse_from(["sensor-fleet", "--version"]).unwrap();
    assert!(cli.show_version);
    assert!(cli.command.is_none());
}

// ============================================================================
// SECTION: Rendering
// ============================================================================

#[test]
fn coverage_text_lists_missing_runs_per_location() {
    let locations = vec![Location::new("Cellar"), Location::new("Attic"), Location::new("(bench)")];
    let buckets = vec![
        bucket("Attic", 10),
        bucket("Attic", 11),
        bucket("Attic", 12),
        bucket("Attic", 13),
        bucket("Cellar", 10),
        bucket("Cellar", 13),
        bucket("(bench)", 9),
    ];
    let report = CoverageReport::build(&locations, &buckets);
    let text = render_coverage_text(&report);
    assert_eq!(
        text,
        "Earliest entry: 540\n\nAttic missing 1 entries:\n\t540 --- 540\t1min\n\nCellar missing 3 \
         entries:\n\t540 --- 540\t1min\n\t660 --- 720\t2min\n"
    );
}

#[test]
fn coverage_text_handles_empty_store() {
    let report = CoverageReport::build(&[], &[]);
    assert_eq!(render_coverage_text(&report), "No samples recorded\n");
}

#[test]
fn directory_text_is_tab_separated() {
    let entries = vec![
        DirectoryEntry {
            device_id: "a0a0a0a0a0a0".to_string(),
            location: Location::new("Living room"),
            delay_us: 0,
        },
        DirectoryEntry {
            device_id: "b1b1b1b1b1b1".to_string(),
            location: Location::new("Outdoor north"),
            delay_us: 100_000,
        },
    ];
    assert_eq!(
        render_directory_text(&entries),
        "a0a0a0a0a0a0\tLiving room\t0\nb1b1b1b1b1b1\tOutdoor north\t100000\n"
    );
}

// ============================================================================
// SECTION: Store Access
// ============================================================================

#[test]
fn store_opens_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let arg = write_config(dir.path());
    let config = load_config(&arg).unwrap();
    assert_eq!(config.store.path, dir.path().join("telemetry.db"));

    let store = open_store(&arg).unwrap();
    assert_eq!(store.counts().unwrap(), StoreCounts::default());
    assert!(store.query_locations(i64::MIN, i64::MAX).unwrap().is_empty());
}

#[test]
fn missing_config_reports_load_failure() {
    let dir = tempfile::tempdir().unwrap();
    let arg = ConfigArg {
        config: Some(dir.path().join("absent.toml")),
    };
    let err = load_config(&arg).unwrap_err();
    assert!(err.to_string().starts_with("failed to load config:"));
}

#[test]
fn inverted_window_is_rejected_before_loading() {
    let command = LocationsCommand {
        config: ConfigArg {
            config: None,
        },
        start: 100,
        end: 10,
    };
    let err = command_locations(&command).unwrap_err();
    assert_eq!(err.to_string(), "--start must not be after --end");
}
