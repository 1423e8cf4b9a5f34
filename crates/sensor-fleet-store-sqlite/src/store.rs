// crates/sensor-fleet-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Telemetry Store
// Description: Durable TelemetryStore backed by SQLite WAL.
// Purpose: Persist submissions and samples atomically behind one writer.
// Dependencies: sensor-fleet-core, rusqlite, serde, thiserror
// ============================================================================

//! ## Overview
//! This module implements a durable [`TelemetryStore`] using `SQLite`. Callers
//! on any thread enqueue insert commands into a bounded channel; one writer
//! thread drains the channel into micro-batches, applies each submission
//! inside its own savepoint, and commits the batch as a single transaction.
//! Callers are answered only after the commit, so an acknowledged insert is
//! durable and a failed one left no rows behind.
//!
//! Reads go through a round-robin pool of connections and never wait on the
//! writer under WAL journaling.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::mpsc::SyncSender;
use std::sync::mpsc::TrySendError;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use sensor_fleet_core::CalibratedSample;
use sensor_fleet_core::Location;
use sensor_fleet_core::MinuteBucket;
use sensor_fleet_core::StoreCounts;
use sensor_fleet_core::StoreError;
use sensor_fleet_core::Submission;
use sensor_fleet_core::TelemetryQuery;
use sensor_fleet_core::TelemetryStore;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Seconds per coverage bucket.
const SECONDS_PER_MINUTE: i64 = 60;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` telemetry store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - Queue, batch, and pool sizes must be greater than zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Writer queue capacity.
    #[serde(default = "default_writer_queue_capacity")]
    pub writer_queue_capacity: usize,
    /// Maximum number of submissions in a single writer batch.
    #[serde(default = "default_batch_max_ops")]
    pub batch_max_ops: usize,
    /// Maximum wait window for writer batching (milliseconds).
    #[serde(default = "default_batch_max_wait_ms")]
    pub batch_max_wait_ms: u64,
    /// Number of read connections.
    #[serde(default = "default_read_pool_size")]
    pub read_pool_size: usize,
}

impl SqliteStoreConfig {
    /// Returns a configuration for `path` with default tuning.
    #[must_use]
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            writer_queue_capacity: default_writer_queue_capacity(),
            batch_max_ops: default_batch_max_ops(),
            batch_max_wait_ms: default_batch_max_wait_ms(),
            read_pool_size: default_read_pool_size(),
        }
    }

    /// Validates runtime limits in the store configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when a limit is zero or the path
    /// is unusable.
    pub fn validate(&self) -> Result<(), SqliteStoreError> {
        validate_store_path(&self.path)?;
        if self.writer_queue_capacity == 0 {
            return Err(SqliteStoreError::Invalid(
                "writer_queue_capacity must be greater than zero".to_string(),
            ));
        }
        if self.batch_max_ops == 0 {
            return Err(SqliteStoreError::Invalid(
                "batch_max_ops must be greater than zero".to_string(),
            ));
        }
        if self.batch_max_wait_ms == 0 {
            return Err(SqliteStoreError::Invalid(
                "batch_max_wait_ms must be greater than zero".to_string(),
            ));
        }
        if self.read_pool_size == 0 {
            return Err(SqliteStoreError::Invalid(
                "read_pool_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Returns the default writer queue capacity.
const fn default_writer_queue_capacity() -> usize {
    1_024
}

/// Returns the default batch max operation count.
const fn default_batch_max_ops() -> usize {
    64
}

/// Returns the default writer batch max wait window in milliseconds.
const fn default_batch_max_wait_ms() -> u64 {
    2
}

/// Returns the default read connection pool size.
const fn default_read_pool_size() -> usize {
    4
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Store is overloaded and the caller should retry.
    #[error("sqlite store overloaded: {message}")]
    Overloaded {
        /// Retryable overload message.
        message: String,
        /// Optional retry delay in milliseconds.
        retry_after_ms: Option<u64>,
    },
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) | SqliteStoreError::VersionMismatch(message) => {
                Self::Store(message)
            }
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::Overloaded {
                message,
                retry_after_ms,
            } => Self::Overloaded {
                message,
                retry_after_ms,
            },
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed telemetry store with a dedicated writer thread.
///
/// # Invariants
/// - Only the writer thread writes; it owns the write connection.
/// - A submission and its samples commit together or not at all.
#[derive(Clone)]
pub struct SqliteTelemetryStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Read connection pool.
    read_connections: Arc<Vec<Mutex<Connection>>>,
    /// Round-robin cursor for read connection selection.
    read_cursor: Arc<AtomicUsize>,
    /// Bounded queue into the writer thread.
    writer_gateway: Arc<SqliteWriteGateway>,
}

/// Gateway for bounded writer-queue submissions.
struct SqliteWriteGateway {
    /// Synchronous channel sender into the writer thread.
    sender: SyncSender<SqliteWriterCommand>,
    /// Monotonic sequence assigned to queued commands.
    sequence: AtomicU64,
    /// Suggested retry delay returned on overload responses.
    retry_after_ms: u64,
}

/// Command envelope queued to the writer thread.
struct SqliteWriterCommand {
    /// Monotonic sequence for deterministic batch ordering.
    sequence: u64,
    /// Submit timestamp bounding the batch window.
    enqueued_at: Instant,
    /// Submission to insert.
    submission: Submission,
    /// Calibrated samples to insert.
    samples: Vec<CalibratedSample>,
    /// Result channel for the insert.
    response: mpsc::Sender<Result<(), SqliteStoreError>>,
}

impl SqliteTelemetryStore {
    /// Opens an `SQLite`-backed telemetry store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        config.validate()?;
        ensure_parent_dir(&config.path)?;
        let mut write_connection = open_connection(&config)?;
        initialize_schema(&mut write_connection)?;
        let mut read_connections = Vec::with_capacity(config.read_pool_size);
        for _ in 0 .. config.read_pool_size {
            read_connections.push(Mutex::new(open_connection(&config)?));
        }
        let (sender, receiver) = mpsc::sync_channel(config.writer_queue_capacity);
        spawn_sqlite_writer(config.clone(), write_connection, receiver)?;
        Ok(Self {
            writer_gateway: Arc::new(SqliteWriteGateway {
                sender,
                sequence: AtomicU64::new(1),
                retry_after_ms: config.batch_max_wait_ms,
            }),
            config,
            read_connections: Arc::new(read_connections),
            read_cursor: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Returns the next read connection using round-robin selection.
    fn read_connection(&self) -> &Mutex<Connection> {
        let len = self.read_connections.len();
        let index = self.read_cursor.fetch_add(1, Ordering::Relaxed) % len;
        &self.read_connections[index]
    }

    /// Runs `query` on a pooled read connection.
    fn with_reader<T>(
        &self,
        query: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, SqliteStoreError> {
        let guard = self
            .read_connection()
            .lock()
            .map_err(|_| SqliteStoreError::Db("sqlite read mutex poisoned".to_string()))?;
        query(&*guard).map_err(|err| SqliteStoreError::Db(err.to_string()))
    }

    /// Returns distinct locations with samples received in `[start_epoch, end_epoch]`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn locations_between(
        &self,
        start_epoch: i64,
        end_epoch: i64,
    ) -> Result<Vec<Location>, SqliteStoreError> {
        self.with_reader(|connection| {
            let mut stmt = connection.prepare_cached(
                "SELECT DISTINCT location FROM samples WHERE receive_epoch BETWEEN ?1 AND ?2 ORDER \
                 BY location",
            )?;
            let rows = stmt.query_map(params![start_epoch, end_epoch], |row| {
                row.get::<_, String>(0).map(Location::new)
            })?;
            rows.collect()
        })
    }

    /// Returns distinct (location, minute) pairs with positive sample epochs.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn sampled_minutes(&self) -> Result<Vec<MinuteBucket>, SqliteStoreError> {
        self.with_reader(|connection| {
            let mut stmt = connection.prepare_cached(
                "SELECT DISTINCT location, sample_epoch / ?1 FROM samples WHERE sample_epoch > 0 \
                 ORDER BY location, 2",
            )?;
            let rows = stmt.query_map(params![SECONDS_PER_MINUTE], |row| {
                Ok(MinuteBucket {
                    location: Location::new(row.get::<_, String>(0)?),
                    minute: row.get(1)?,
                })
            })?;
            rows.collect()
        })
    }

    /// Returns persisted row totals.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn row_counts(&self) -> Result<StoreCounts, SqliteStoreError> {
        let (submissions, samples) = self.with_reader(|connection| {
            let submissions: i64 =
                connection.query_row("SELECT COUNT(*) FROM submissions", [], |row| row.get(0))?;
            let samples: i64 =
                connection.query_row("SELECT COUNT(*) FROM samples", [], |row| row.get(0))?;
            Ok((submissions, samples))
        })?;
        Ok(StoreCounts {
            submissions: row_total(submissions)?,
            samples: row_total(samples)?,
        })
    }
}

impl TelemetryStore for SqliteTelemetryStore {
    fn insert(&self, submission: &Submission, samples: &[CalibratedSample]) -> Result<(), StoreError> {
        if submission.sample_count != samples.len() {
            return Err(StoreError::Invalid(format!(
                "submission declares {} samples but {} were supplied",
                submission.sample_count,
                samples.len()
            )));
        }
        self.writer_gateway
            .submit_insert(submission.clone(), samples.to_vec())
            .map_err(StoreError::from)
    }
}

impl TelemetryQuery for SqliteTelemetryStore {
    fn query_locations(&self, start_epoch: i64, end_epoch: i64) -> Result<Vec<Location>, StoreError> {
        self.locations_between(start_epoch, end_epoch).map_err(StoreError::from)
    }

    fn minute_buckets(&self) -> Result<Vec<MinuteBucket>, StoreError> {
        self.sampled_minutes().map_err(StoreError::from)
    }

    fn counts(&self) -> Result<StoreCounts, StoreError> {
        self.row_counts().map_err(StoreError::from)
    }
}

// ============================================================================
// SECTION: Writer
// ============================================================================

impl SqliteWriteGateway {
    /// Submits an insert command and waits for the batch commit.
    fn submit_insert(
        &self,
        submission: Submission,
        samples: Vec<CalibratedSample>,
    ) -> Result<(), SqliteStoreError> {
        let (response_tx, response_rx) = mpsc::channel();
        let command = SqliteWriterCommand {
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            enqueued_at: Instant::now(),
            submission,
            samples,
            response: response_tx,
        };
        self.submit(command)?;
        response_rx.recv().map_err(|_| {
            SqliteStoreError::Io("sqlite writer response channel closed".to_string())
        })?
    }

    /// Attempts enqueue into the bounded writer queue.
    fn submit(&self, command: SqliteWriterCommand) -> Result<(), SqliteStoreError> {
        self.sender.try_send(command).map_err(|err| enqueue_error(&err, self.retry_after_ms))
    }
}

/// In-flight batch command with response channel and deferred result slot.
struct BatchCommand {
    /// Queued command.
    command: SqliteWriterCommand,
    /// Deferred result produced inside the transaction.
    result: Option<Result<(), SqliteStoreError>>,
}

/// Spawns the dedicated writer thread.
fn spawn_sqlite_writer(
    config: SqliteStoreConfig,
    mut write_connection: Connection,
    receiver: mpsc::Receiver<SqliteWriterCommand>,
) -> Result<(), SqliteStoreError> {
    thread::Builder::new()
        .name("sensor-fleet-sqlite-writer".to_string())
        .spawn(move || {
            sqlite_writer_loop(&config, &mut write_connection, &receiver);
        })
        .map_err(|err| {
            SqliteStoreError::Io(format!("failed to spawn sqlite writer thread: {err}"))
        })?;
    Ok(())
}

/// Drains queued commands into micro-batches and commits them.
///
/// Exits once every store handle (and therefore every sender) is dropped.
fn sqlite_writer_loop(
    config: &SqliteStoreConfig,
    write_connection: &mut Connection,
    receiver: &mpsc::Receiver<SqliteWriterCommand>,
) {
    while let Ok(first) = receiver.recv() {
        let batch_deadline = first.enqueued_at + Duration::from_millis(config.batch_max_wait_ms);
        let mut queued = vec![first];
        while queued.len() < config.batch_max_ops {
            let now = Instant::now();
            if now >= batch_deadline {
                break;
            }
            match receiver.recv_timeout(batch_deadline.saturating_duration_since(now)) {
                Ok(command) => queued.push(command),
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
            }
        }
        queued.sort_by_key(|command| command.sequence);
        // Per-command outcomes are delivered through response channels.
        let _ = execute_writer_batch(write_connection, queued);
    }
}

/// Executes one writer batch in a single transaction.
fn execute_writer_batch(
    write_connection: &mut Connection,
    commands: Vec<SqliteWriterCommand>,
) -> Result<(), SqliteStoreError> {
    let mut batch: Vec<BatchCommand> = commands
        .into_iter()
        .map(|command| BatchCommand {
            command,
            result: None,
        })
        .collect();

    let mut tx = match write_connection.transaction_with_behavior(TransactionBehavior::Immediate) {
        Ok(tx) => tx,
        Err(err) => {
            let error = SqliteStoreError::Db(err.to_string());
            send_batch_failure(batch, &error);
            return Err(error);
        }
    };

    let mut fatal_error: Option<SqliteStoreError> = None;
    for entry in &mut batch {
        let savepoint = match tx.savepoint() {
            Ok(savepoint) => savepoint,
            Err(err) => {
                fatal_error = Some(SqliteStoreError::Db(err.to_string()));
                break;
            }
        };
        let outcome = apply_insert_in_tx(&savepoint, &entry.command.submission, &entry.command.samples)
            .and_then(|()| savepoint.commit().map_err(|err| SqliteStoreError::Db(err.to_string())));
        entry.result = Some(outcome);
    }

    if let Some(error) = fatal_error {
        let _ = tx.rollback();
        send_batch_failure(batch, &error);
        return Err(error);
    }

    if let Err(err) = tx.commit() {
        let error = SqliteStoreError::Db(err.to_string());
        send_batch_failure(batch, &error);
        return Err(error);
    }
    send_batch_results(batch);
    Ok(())
}

/// Sends terminal failure to all batch command response channels.
fn send_batch_failure(batch: Vec<BatchCommand>, error: &SqliteStoreError) {
    for entry in batch {
        let _ = entry.command.response.send(Err(error.clone()));
    }
}

/// Sends per-command batch outcomes to response channels.
fn send_batch_results(batch: Vec<BatchCommand>) {
    for entry in batch {
        let outcome = entry.result.unwrap_or_else(|| {
            Err(SqliteStoreError::Db("sqlite writer missing insert outcome".to_string()))
        });
        let _ = entry.command.response.send(outcome);
    }
}

/// Inserts one submission and its samples on the given connection.
fn apply_insert_in_tx(
    connection: &Connection,
    submission: &Submission,
    samples: &[CalibratedSample],
) -> Result<(), SqliteStoreError> {
    let sample_count = i64::try_from(submission.sample_count).map_err(|_| {
        SqliteStoreError::Invalid(format!(
            "sample count {} exceeds sqlite integer range",
            submission.sample_count
        ))
    })?;
    connection
        .prepare_cached(
            "INSERT INTO submissions (fw_hash, device_id, receive_epoch, src_addr, ap_rssi, \
             wake_reason, location, retries, wifi_retries, sample_count) VALUES (?1, ?2, ?3, ?4, \
             ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .and_then(|mut stmt| {
            stmt.execute(params![
                submission.fw_hash,
                submission.device_id.as_str(),
                submission.receive_epoch,
                submission.src_addr,
                submission.ap_rssi,
                submission.wake_reason,
                submission.location.as_str(),
                submission.retries,
                submission.wifi_retries,
                sample_count,
            ])
        })
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let submission_id = connection.last_insert_rowid();
    let mut stmt = connection
        .prepare_cached(
            "INSERT INTO samples (submission_id, location, sample_epoch, receive_epoch, raw_temp, \
             temp, raw_humidity, humidity) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    for sample in samples {
        stmt.execute(params![
            submission_id,
            submission.location.as_str(),
            sample.sample_epoch,
            submission.receive_epoch,
            sample.raw_temp,
            sample.temp,
            sample.raw_humidity,
            sample.humidity,
        ])
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    }
    Ok(())
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps a failed writer enqueue to a store error.
///
/// A full queue is retryable; a disconnected queue means the writer thread
/// has exited and no retry will succeed.
fn enqueue_error<T>(err: &TrySendError<T>, retry_after_ms: u64) -> SqliteStoreError {
    match err {
        TrySendError::Full(_) => SqliteStoreError::Overloaded {
            message: "sqlite writer queue full; retryable".to_string(),
            retry_after_ms: Some(retry_after_ms),
        },
        TrySendError::Disconnected(_) => {
            SqliteStoreError::Io("sqlite writer thread unavailable".to_string())
        }
    }
}

/// Converts a `COUNT(*)` result into an unsigned total.
fn row_total(count: i64) -> Result<u64, SqliteStoreError> {
    u64::try_from(count)
        .map_err(|_| SqliteStoreError::Invalid(format!("negative row count {count}")))
}

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.exists() && path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing version.
///
/// Runs under an immediate transaction so concurrent openers serialize on
/// the database write lock and exactly one creates the tables.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        }
        Some(SCHEMA_VERSION) => {}
        Some(other) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "expected schema version {SCHEMA_VERSION}, found {other}"
            )));
        }
    }
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS submissions (
            id INTEGER PRIMARY KEY,
            fw_hash TEXT NOT NULL,
            device_id TEXT NOT NULL,
            receive_epoch INTEGER NOT NULL,
            src_addr TEXT NOT NULL,
            ap_rssi INTEGER NOT NULL,
            wake_reason TEXT NOT NULL,
            location TEXT NOT NULL,
            retries INTEGER NOT NULL,
            wifi_retries INTEGER NOT NULL,
            sample_count INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS samples (
            submission_id INTEGER NOT NULL REFERENCES submissions(id),
            location TEXT NOT NULL,
            sample_epoch INTEGER NOT NULL,
            receive_epoch INTEGER NOT NULL,
            raw_temp INTEGER NOT NULL,
            temp REAL NOT NULL,
            raw_humidity INTEGER NOT NULL,
            humidity REAL NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_samples_receive_epoch
            ON samples (receive_epoch, location);
        CREATE INDEX IF NOT EXISTS idx_samples_location_epoch
            ON samples (location, sample_epoch);
        CREATE INDEX IF NOT EXISTS idx_submissions_device
            ON submissions (device_id, receive_epoch);",
    )
    .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
