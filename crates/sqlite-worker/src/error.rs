// crates/sqlite-worker/src/error.rs
// ============================================================================
// Module: Worker Errors
// Description: Error taxonomy for the serialized SQLite worker.
// Purpose: Surface engine, lifecycle, and queue failures to the caller.
// Dependencies: rusqlite, thiserror
// ============================================================================

//! ## Overview
//! Every failure the worker can report is a [`WorkerError`]. Engine errors are
//! captured on the owner thread and carried back as strings so results can
//! cross the reply channel; lifecycle and queue errors are raised on the
//! calling thread before a request reaches the owner.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::config::ConfigError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors returned by worker handles, the registry, and the legacy facade.
///
/// # Invariants
/// - `Engine` never terminates the owner thread; later requests still run.
/// - `AlreadyClosed` and `QueueFull` are raised before the owner sees the
///   request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// `SQLite` rejected or failed the request (bad SQL, constraint, decode).
    #[error("sqlite engine error: {0}")]
    Engine(String),
    /// The handle was closed before this call.
    #[error("sqlite worker already closed")]
    AlreadyClosed,
    /// The request could not be enqueued within the configured bound.
    #[error("sqlite worker queue full after {timeout_ms} ms")]
    QueueFull {
        /// Enqueue wait that elapsed, in milliseconds.
        timeout_ms: u64,
    },
    /// The owner thread is gone or could not be started.
    #[error("sqlite worker unavailable: {0}")]
    Unavailable(String),
    /// The owner thread failed to reach the closed state cleanly.
    #[error("sqlite worker shutdown failed: {0}")]
    Shutdown(String),
    /// Registry bookkeeping disagrees with the owner being torn down.
    #[error("sqlite worker registry invariant violated: {0}")]
    RegistryInvariant(String),
    /// The database path is empty, overlong, or names a directory.
    #[error("invalid database path: {0}")]
    InvalidPath(String),
    /// Filesystem failure while resolving the database path.
    #[error("sqlite worker io error: {0}")]
    Io(String),
    /// Worker configuration failed to load or validate.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<rusqlite::Error> for WorkerError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Engine(error.to_string())
    }
}
