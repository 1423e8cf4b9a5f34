// crates/sensor-fleet-cli/src/main.rs
// ============================================================================
// Module: Sensor Fleet CLI Entry Point
// Description: Command dispatcher for the ingestion server and store diagnostics.
// Purpose: Run the fleet backend and inspect its configuration and telemetry.
// Dependencies: clap, sensor-fleet-config, sensor-fleet-core, sensor-fleet-server,
//               sensor-fleet-store-sqlite, serde, serde_json, thiserror, tokio.
// ============================================================================

//! ## Overview
//! The `sensor-fleet` binary starts the ingestion server and answers offline
//! questions about a deployment: whether a config file is valid, which
//! locations reported in a time window, which minutes each location missed,
//! and how much telemetry the store holds. Every command resolves its config
//! the same way the server does.

// ============================================================================
// SECTION: Modules
// ============================================================================

#[cfg(test)]
mod main_tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::ArgAction;
use clap::Args;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use sensor_fleet_config::FleetConfig;
use sensor_fleet_core::CoverageReport;
use sensor_fleet_core::DirectoryEntry;
use sensor_fleet_core::TelemetryQuery;
use sensor_fleet_server::FleetServer;
use sensor_fleet_store_sqlite::SqliteTelemetryStore;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Sensor fleet command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "sensor-fleet",
    about = "Sensor fleet ingestion backend",
    disable_help_subcommand = true,
    disable_version_flag = true
)]
struct Cli {
    /// Print the version and exit.
    #[arg(long = "version", action = ArgAction::SetTrue, global = true)]
    show_version: bool,
    /// Selected command.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the ingestion and firmware server.
    Serve(ServeCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// List locations that reported within a time window.
    Locations(LocationsCommand),
    /// Report minutes each location is missing.
    Coverage(CoverageCommand),
    /// Print stored submission and sample counts.
    Stats(StatsCommand),
    /// Print the location directory as the server resolves it.
    Directory(DirectoryCommand),
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate a sensor fleet configuration file.
    Validate(ConfigValidateCommand),
}

/// Shared config location argument.
#[derive(Args, Debug)]
struct ConfigArg {
    /// Config file path (defaults to `SENSOR_FLEET_CONFIG` or `sensor-fleet.toml`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Arguments for `serve`.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Config location.
    #[command(flatten)]
    config: ConfigArg,
}

/// Arguments for `config validate`.
#[derive(Args, Debug)]
struct ConfigValidateCommand {
    /// Config location.
    #[command(flatten)]
    config: ConfigArg,
}

/// Arguments for `locations`.
#[derive(Args, Debug)]
struct LocationsCommand {
    /// Config location.
    #[command(flatten)]
    config: ConfigArg,
    /// First receive epoch second (inclusive).
    #[arg(long, value_name = "EPOCH", allow_negative_numbers = true)]
    start: i64,
    /// Last receive epoch second (inclusive).
    #[arg(long, value_name = "EPOCH", allow_negative_numbers = true)]
    end: i64,
}

/// Arguments for `coverage`.
#[derive(Args, Debug)]
struct CoverageCommand {
    /// Config location.
    #[command(flatten)]
    config: ConfigArg,
    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

/// Arguments for `stats`.
#[derive(Args, Debug)]
struct StatsCommand {
    /// Config location.
    #[command(flatten)]
    config: ConfigArg,
}

/// Arguments for `directory`.
#[derive(Args, Debug)]
struct DirectoryCommand {
    /// Config location.
    #[command(flatten)]
    config: ConfigArg,
    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

/// Output formats for structured CLI commands.
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
enum OutputFormat {
    /// JSON output.
    Json,
    /// Human-readable text output.
    Text,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper carrying a user-facing message.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Message written to stderr.
    message: String,
}

impl CliError {
    /// Creates a CLI error.
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();

    if cli.show_version {
        let version = env!("CARGO_PKG_VERSION");
        write_stdout_line(&format!("sensor-fleet {version}"))
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    }

    let Some(command) = cli.command else {
        show_help()?;
        return Ok(ExitCode::SUCCESS);
    };

    match command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::Config {
            command,
        } => match command {
            ConfigCommand::Validate(command) => command_config_validate(&command),
        },
        Commands::Locations(command) => command_locations(&command),
        Commands::Coverage(command) => command_coverage(&command),
        Commands::Stats(command) => command_stats(&command),
        Commands::Directory(command) => command_directory(&command),
    }
}

/// Prints top-level help.
fn show_help() -> CliResult<()> {
    let mut command = Cli::command();
    command.print_help().map_err(|err| CliError::new(output_error("stdout", &err)))?;
    write_stdout_line("").map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(())
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    let config = load_config(&command.config)?;
    let server = tokio::task::spawn_blocking(move || FleetServer::from_config(config))
        .await
        .map_err(|err| CliError::new(format!("server init failed: init join failed: {err}")))?
        .map_err(|err| CliError::new(format!("server init failed: {err}")))?;
    server.serve().await.map_err(|err| CliError::new(format!("server failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Config Commands
// ============================================================================

/// Executes `config validate`.
fn command_config_validate(command: &ConfigValidateCommand) -> CliResult<ExitCode> {
    let _config = load_config(&command.config)?;
    write_stdout_line("config ok").map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Loads and validates the config named by `arg`.
fn load_config(arg: &ConfigArg) -> CliResult<FleetConfig> {
    FleetConfig::load(arg.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))
}

// ============================================================================
// SECTION: Store Commands
// ============================================================================

/// Executes `locations`.
fn command_locations(command: &LocationsCommand) -> CliResult<ExitCode> {
    if command.start > command.end {
        return Err(CliError::new("--start must not be after --end".to_string()));
    }
    let store = open_store(&command.config)?;
    let locations = store
        .query_locations(command.start, command.end)
        .map_err(|err| CliError::new(format!("location query failed: {err}")))?;
    for location in &locations {
        write_stdout_line(location.as_str())
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Executes `coverage`.
fn command_coverage(command: &CoverageCommand) -> CliResult<ExitCode> {
    let store = open_store(&command.config)?;
    let locations = store
        .query_locations(i64::MIN, i64::MAX)
        .map_err(|err| CliError::new(format!("location query failed: {err}")))?;
    let buckets =
        store.minute_buckets().map_err(|err| CliError::new(format!("coverage query failed: {err}")))?;
    let report = CoverageReport::build(&locations, &buckets);
    let output = match command.format {
        OutputFormat::Json => to_json(&report)?,
        OutputFormat::Text => render_coverage_text(&report),
    };
    write_stdout_line(output.trim_end()).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `stats`.
fn command_stats(command: &StatsCommand) -> CliResult<ExitCode> {
    let store = open_store(&command.config)?;
    let counts = store.counts().map_err(|err| CliError::new(format!("count query failed: {err}")))?;
    write_stdout_line(&to_json(&counts)?).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Opens the configured telemetry store.
fn open_store(arg: &ConfigArg) -> CliResult<SqliteTelemetryStore> {
    let config = load_config(arg)?;
    SqliteTelemetryStore::new(config.store)
        .map_err(|err| CliError::new(format!("failed to open store: {err}")))
}

// ============================================================================
// SECTION: Directory Command
// ============================================================================

/// Executes `directory`.
fn command_directory(command: &DirectoryCommand) -> CliResult<ExitCode> {
    let config = load_config(&command.config)?;
    let directory = config.directory.location_directory();
    let (entries, warning) = directory.entries();
    if let Some(warning) = warning {
        write_stderr_line(&format!("warning: {warning}"))
            .map_err(|err| CliError::new(output_error("stderr", &err)))?;
    }
    let output = match command.format {
        OutputFormat::Json => to_json(&entries)?,
        OutputFormat::Text => render_directory_text(&entries),
    };
    if !output.is_empty() {
        write_stdout_line(output.trim_end())
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    }
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Rendering
// ============================================================================

/// Renders a coverage report as indented text, one block per location.
fn render_coverage_text(report: &CoverageReport) -> String {
    let mut output = String::new();
    match report.earliest_epoch {
        Some(epoch) => {
            let _ = writeln!(output, "Earliest entry: {epoch}");
        }
        None => {
            let _ = writeln!(output, "No samples recorded");
            return output;
        }
    }
    for location in &report.locations {
        let _ = writeln!(output);
        let _ =
            writeln!(output, "{} missing {} entries:", location.location, location.missing_minutes);
        for range in &location.ranges {
            let _ = writeln!(
                output,
                "\t{} --- {}\t{}min",
                range.start_epoch, range.end_epoch, range.minutes
            );
        }
    }
    output
}

/// Renders directory entries as tab-separated rows.
fn render_directory_text(entries: &[DirectoryEntry]) -> String {
    let mut output = String::new();
    for entry in entries {
        let _ = writeln!(output, "{}\t{}\t{}", entry.device_id, entry.location, entry.delay_us);
    }
    output
}

/// Serializes a value as pretty JSON.
fn to_json<T: Serialize>(value: &T) -> CliResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|err| CliError::new(format!("failed to serialize output: {err}")))
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
