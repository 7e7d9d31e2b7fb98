// crates/sqlite-worker/src/path.rs
// ============================================================================
// Module: Database Path Normalization
// Description: Canonical registry keys for database files.
// Purpose: Make differently spelled paths to one file resolve to one owner.
// Dependencies: std
// ============================================================================

//! ## Overview
//! A [`DatabasePath`] is either the in-memory sentinel or a file path made
//! absolute, with `.`/`..` folded and the parent directory canonicalized.
//! The registry key is the resolved path, lower-cased when the configured
//! [`PathCase`] folds; the open path keeps its original case so case-sensitive
//! volumes still open the right file.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::fs;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use crate::config::PathCase;
use crate::error::WorkerError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Path sentinel selecting a private in-memory database.
pub const MEMORY_SENTINEL: &str = ":memory:";
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Normalized database location.
///
/// # Invariants
/// - `File::open_path` is absolute and free of `.`/`..` components.
/// - `File::key` equals `open_path`, lower-cased when case folding applies
///   and the path is valid UTF-8.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DatabasePath {
    /// Private in-memory database; never shared, never registered.
    Memory,
    /// On-disk database file.
    File {
        /// Path handed to `SQLite`.
        open_path: PathBuf,
        /// Registry key.
        key: PathBuf,
    },
}

impl DatabasePath {
    /// Normalizes a user-supplied path.
    ///
    /// `:memory:` matches case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::InvalidPath`] for empty, overlong, or directory
    /// paths and [`WorkerError::Io`] when the working directory is unreadable.
    pub fn normalize(path: impl AsRef<Path>, case: PathCase) -> Result<Self, WorkerError> {
        let raw = path.as_ref();
        if raw.to_str().is_some_and(|text| text.eq_ignore_ascii_case(MEMORY_SENTINEL)) {
            return Ok(Self::Memory);
        }
        validate_path(raw)?;
        let absolute = std::path::absolute(raw).map_err(|err| WorkerError::Io(err.to_string()))?;
        let open_path = resolve_parent(&fold_dot_components(&absolute));
        if open_path.is_dir() {
            return Err(WorkerError::InvalidPath(
                "database path must be a file, not a directory".to_string(),
            ));
        }
        // Paths that are not UTF-8 keep their exact bytes as the key.
        let key = match open_path.to_str() {
            Some(text) if case.folds() => PathBuf::from(text.to_lowercase()),
            _ => open_path.clone(),
        };
        Ok(Self::File {
            open_path,
            key,
        })
    }

    /// Returns true for the in-memory sentinel.
    #[must_use]
    pub const fn is_memory(&self) -> bool {
        matches!(self, Self::Memory)
    }

    /// Returns the registry key, or `None` for in-memory databases.
    #[must_use]
    pub fn registry_key(&self) -> Option<&Path> {
        match self {
            Self::Memory => None,
            Self::File {
                key, ..
            } => Some(key),
        }
    }

    /// Returns the path handed to `SQLite`.
    #[must_use]
    pub fn open_path(&self) -> &Path {
        match self {
            Self::Memory => Path::new(MEMORY_SENTINEL),
            Self::File {
                open_path, ..
            } => open_path,
        }
    }
}

impl fmt::Display for DatabasePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.open_path().display())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Rejects empty and overlong paths.
fn validate_path(path: &Path) -> Result<(), WorkerError> {
    if path.as_os_str().is_empty() {
        return Err(WorkerError::InvalidPath("database path must not be empty".to_string()));
    }
    if path.as_os_str().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(WorkerError::InvalidPath("database path exceeds length limit".to_string()));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(WorkerError::InvalidPath(
                "database path contains an overlong component".to_string(),
            ));
        }
    }
    Ok(())
}

/// Folds `.` and `..` lexically; `..` at the root stays at the root.
fn fold_dot_components(path: &Path) -> PathBuf {
    let mut folded = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(folded.components().next_back(), Some(Component::Normal(_))) {
                    folded.pop();
                }
            }
            Component::Prefix(_) | Component::RootDir | Component::Normal(_) => {
                folded.push(component.as_os_str());
            }
        }
    }
    folded
}

/// Canonicalizes the file when it exists, else its parent directory.
///
/// Falls back to the lexical path when neither resolves, so opening still
/// reports the engine's own error for a missing directory.
fn resolve_parent(path: &Path) -> PathBuf {
    if let Ok(resolved) = fs::canonicalize(path) {
        return resolved;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => {
            fs::canonicalize(parent).map_or_else(|_| path.to_path_buf(), |dir| dir.join(name))
        }
        _ => path.to_path_buf(),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
