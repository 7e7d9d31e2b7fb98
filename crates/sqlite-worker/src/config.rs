// crates/sqlite-worker/src/config.rs
// ============================================================================
// Module: Worker Configuration
// Description: Queue, timeout, and path settings for owner threads.
// Purpose: Load and validate worker settings from TOML or defaults.
// Dependencies: serde, thiserror, toml
// ============================================================================

//! ## Overview
//! [`WorkerConfig`] bounds the request queue and the enqueue wait, sets the
//! `SQLite` busy timeout, toggles implicit transactions, and chooses how
//! database paths are folded into registry keys. Settings are applied when an
//! owner thread is created; a handle attaching to an owner that already runs
//! keeps only its own enqueue timeout.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default request queue capacity per owner thread.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 100;
/// Default enqueue wait (ms) before a submission fails as queue-full.
pub const DEFAULT_ENQUEUE_TIMEOUT_MS: u64 = 5_000;
/// Default `SQLite` busy timeout (ms).
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: usize = 64 * 1024;

// ============================================================================
// SECTION: Config
// ============================================================================

/// How database paths are compared when building registry keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PathCase {
    /// Fold case on platforms whose default filesystems ignore it.
    #[default]
    Auto,
    /// Keep keys exactly as resolved.
    Sensitive,
    /// Always fold keys to lower case.
    Insensitive,
}

impl PathCase {
    /// Returns true when registry keys should be case-folded.
    #[must_use]
    pub const fn folds(self) -> bool {
        match self {
            Self::Auto => cfg!(any(windows, target_os = "macos")),
            Self::Sensitive => false,
            Self::Insensitive => true,
        }
    }
}

/// Configuration for a worker handle and the owner thread it may create.
///
/// # Invariants
/// - `max_queue_size` and `enqueue_timeout_ms` are greater than zero.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    /// Capacity of the bounded request queue.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
    /// Enqueue wait in milliseconds before failing with queue-full.
    #[serde(default = "default_enqueue_timeout_ms")]
    pub enqueue_timeout_ms: u64,
    /// `SQLite` busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Open a transaction before data-modifying statements.
    #[serde(default = "default_implicit_transactions")]
    pub implicit_transactions: bool,
    /// Registry key case folding.
    #[serde(default)]
    pub path_case: PathCase,
}

/// Returns the default queue capacity.
const fn default_max_queue_size() -> usize {
    DEFAULT_MAX_QUEUE_SIZE
}

/// Returns the default enqueue timeout.
const fn default_enqueue_timeout_ms() -> u64 {
    DEFAULT_ENQUEUE_TIMEOUT_MS
}

/// Returns the default busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Returns the default implicit transaction setting.
const fn default_implicit_transactions() -> bool {
    true
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_queue_size: default_max_queue_size(),
            enqueue_timeout_ms: default_enqueue_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            implicit_transactions: default_implicit_transactions(),
            path_case: PathCase::default(),
        }
    }
}

impl WorkerConfig {
    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys and
    /// [`ConfigError::Invalid`] when a limit is out of range.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, is too large, is
    /// not UTF-8, or fails parsing/validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = fs::read(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml_str(content)
    }

    /// Validates limits.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a limit is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_queue_size == 0 {
            return Err(ConfigError::Invalid(
                "max_queue_size must be greater than zero".to_string(),
            ));
        }
        if self.enqueue_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "enqueue_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the enqueue wait as a [`Duration`].
    #[must_use]
    pub const fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }

    /// Returns the busy timeout as a [`Duration`].
    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Tests
// ============================================================================
