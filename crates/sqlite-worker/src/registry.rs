// crates/sqlite-worker/src/registry.rs
// ============================================================================
// Module: Owner Registry
// Description: Map from normalized database path to its owner thread.
// Purpose: Guarantee one owner per file and tear it down atomically.
// Dependencies: tracing
// ============================================================================

//! ## Overview
//! A [`Registry`] maps registry keys to running owner threads behind one
//! lock. Owner creation and teardown both happen while holding it, so a
//! handle opening a path can never attach to an owner that is mid-shutdown.
//! In-memory databases get a fresh owner per handle and are never inserted.
//!
//! [`Registry::global`] is the process-wide instance; [`Registry::new`]
//! builds an isolated one for injection into
//! [`WorkerHandle::open_in`](crate::WorkerHandle::open_in).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use tracing::debug;

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::owner::OwnerThread;
use crate::path::DatabasePath;

// ============================================================================
// SECTION: Global Instance
// ============================================================================

/// Process-wide registry.
static GLOBAL_REGISTRY: LazyLock<Arc<Registry>> = LazyLock::new(|| Arc::new(Registry::new()));

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Registry of running owner threads keyed by normalized path.
///
/// # Invariants
/// - At most one owner per key.
/// - An entry is removed only by the handle that stopped its owner.
pub struct Registry {
    /// Registry key to owner.
    owners: Mutex<HashMap<PathBuf, Arc<OwnerThread>>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            owners: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the process-wide registry.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    /// Returns the number of file-backed owners currently running.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true when no file-backed owner is running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns true when an owner for `path` is registered.
    ///
    /// Always false for in-memory databases.
    #[must_use]
    pub fn contains(&self, path: &DatabasePath) -> bool {
        path.registry_key().is_some_and(|key| self.lock().contains_key(key))
    }

    /// Attaches a handle to the owner for `path`, starting one if needed.
    ///
    /// # Errors
    ///
    /// Returns the open or spawn failure of a new owner.
    pub(crate) fn attach(
        &self,
        path: DatabasePath,
        config: &WorkerConfig,
        handle_id: u64,
    ) -> Result<Arc<OwnerThread>, WorkerError> {
        let mut owners = self.lock();
        let key = path.registry_key().map(Path::to_path_buf);
        let owner = match key {
            None => OwnerThread::spawn(path, config)?,
            Some(key) => {
                if let Some(existing) = owners.get(&key) {
                    debug!(
                        owner_id = %existing.id(),
                        path = %path,
                        "reusing running owner; its queue and transaction settings apply"
                    );
                    Arc::clone(existing)
                } else {
                    let owner = OwnerThread::spawn(path, config)?;
                    owners.insert(key, Arc::clone(&owner));
                    debug!(owner_id = %owner.id(), path = %owner.path(), "owner registered");
                    owner
                }
            }
        };
        owner.register(handle_id);
        Ok(owner)
    }

    /// Detaches a handle; the last one out stops the owner and removes it.
    ///
    /// Deregistration, shutdown, join, and removal all happen under the
    /// registry lock. The entry is removed even when the owner failed to
    /// drain cleanly.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Shutdown`] when the owner did not close
    /// cleanly and [`WorkerError::RegistryInvariant`] when the handle or the
    /// registry entry is not where it should be.
    pub(crate) fn detach(
        &self,
        owner: &Arc<OwnerThread>,
        handle_id: u64,
    ) -> Result<(), WorkerError> {
        let mut owners = self.lock();
        let remaining = owner.deregister(handle_id)?;
        if remaining > 0 {
            debug!(owner_id = %owner.id(), remaining, "handle detached; owner still shared");
            return Ok(());
        }
        let stopped = owner.stop();
        let removed = match owner.path().registry_key() {
            None => Ok(()),
            Some(key) => remove_entry(&mut owners, key, owner),
        };
        debug!(owner_id = %owner.id(), path = %owner.path(), "owner torn down");
        stopped?;
        removed
    }

    /// Locks the owner map, recovering from poisoning.
    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, Arc<OwnerThread>>> {
        self.owners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("owners", &self.len()).finish()
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Removes the entry for `key`, which must belong to `owner`.
fn remove_entry(
    owners: &mut HashMap<PathBuf, Arc<OwnerThread>>,
    key: &Path,
    owner: &Arc<OwnerThread>,
) -> Result<(), WorkerError> {
    match owners.remove(key) {
        Some(entry) if Arc::ptr_eq(&entry, owner) => Ok(()),
        Some(entry) => {
            let holder = entry.id();
            owners.insert(key.to_path_buf(), entry);
            Err(WorkerError::RegistryInvariant(format!(
                "registry entry for {} belongs to owner {holder}, not {}",
                owner.path(),
                owner.id()
            )))
        }
        None => Err(WorkerError::RegistryInvariant(format!(
            "registry entry for {} vanished before owner {} stopped",
            owner.path(),
            owner.id()
        ))),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
