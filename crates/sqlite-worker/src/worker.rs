// crates/sqlite-worker/src/worker.rs
// ============================================================================
// Module: Worker Handle
// Description: Caller-facing handle onto a shared owner thread.
// Purpose: Submit requests, wait for results, and close exactly once.
// Dependencies: tracing
// ============================================================================

//! ## Overview
//! A [`WorkerHandle`] is what callers hold. Opening one normalizes the path
//! and attaches to the registry's owner for it, starting the owner when none
//! runs. Every operation enqueues a request on that owner and, unless it is
//! fire-and-forget, blocks until the owner replies.
//!
//! Invariants:
//! - After [`WorkerHandle::close`] starts, no submission from this handle can
//!   reach the queue.
//! - The last handle to close stops and joins the owner.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tracing::debug;
use tracing::warn;

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::owner::OwnerId;
use crate::owner::OwnerThread;
use crate::path::DatabasePath;
use crate::registry::Registry;
use crate::request::Request;
use crate::request::reply_slot;
use crate::rows::ExecuteOutput;
use crate::rows::Row;
use crate::rows::RowFactory;
use crate::rows::TextFactory;
use crate::rows::Value;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Source of process-unique handle ids.
static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// SECTION: Handle
// ============================================================================

/// Thread-safe handle for serialized access to one database.
///
/// Handles are `Send + Sync`; share one behind an [`Arc`] or open several for
/// the same path. Dropping an open handle closes it and logs any failure.
pub struct WorkerHandle {
    /// Handle identity within its owner's handle set.
    id: u64,
    /// Registry the owner lives in.
    registry: Arc<Registry>,
    /// Owner thread serving this handle.
    owner: Arc<OwnerThread>,
    /// Bound on waiting for queue space.
    enqueue_timeout: Duration,
    /// Set once by `close`; read-held across every enqueue.
    closed: RwLock<bool>,
}

impl WorkerHandle {
    /// Opens a handle with default configuration in the global registry.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError`] when the path is invalid or the database
    /// cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WorkerError> {
        Self::open_with_config(path, &WorkerConfig::default())
    }

    /// Opens a handle with explicit configuration in the global registry.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError`] when the configuration or path is invalid or
    /// the database cannot be opened.
    pub fn open_with_config(
        path: impl AsRef<Path>,
        config: &WorkerConfig,
    ) -> Result<Self, WorkerError> {
        Self::open_in(Registry::global(), path, config)
    }

    /// Opens a handle in the given registry.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError`] when the configuration or path is invalid or
    /// the database cannot be opened.
    pub fn open_in(
        registry: Arc<Registry>,
        path: impl AsRef<Path>,
        config: &WorkerConfig,
    ) -> Result<Self, WorkerError> {
        config.validate()?;
        let path = DatabasePath::normalize(path, config.path_case)?;
        let id = NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed);
        let owner = registry.attach(path, config, id)?;
        debug!(handle_id = id, owner_id = %owner.id(), "handle opened");
        Ok(Self {
            id,
            registry,
            owner,
            enqueue_timeout: config.enqueue_timeout(),
            closed: RwLock::new(false),
        })
    }

    /// Runs one statement and returns its rows.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Engine`] when `SQLite` rejects the statement,
    /// plus the submission errors of every operation: `AlreadyClosed`,
    /// `QueueFull`, `Unavailable`.
    pub fn execute(&self, query: &str, values: Vec<Value>) -> Result<Vec<Row>, WorkerError> {
        self.execute_full(query, values).map(|output| output.rows)
    }

    /// Runs one statement and returns rows, columns, and the last rowid.
    ///
    /// # Errors
    ///
    /// Same as [`WorkerHandle::execute`].
    pub fn execute_full(
        &self,
        query: &str,
        values: Vec<Value>,
    ) -> Result<ExecuteOutput, WorkerError> {
        let (reply, receiver) = reply_slot();
        self.submit(Request::Execute {
            query: query.to_string(),
            values,
            reply,
        })?;
        receiver.wait()
    }

    /// Runs a multi-statement script after committing pending work.
    ///
    /// # Errors
    ///
    /// Same as [`WorkerHandle::execute`].
    pub fn execute_script(&self, script: &str) -> Result<Vec<Row>, WorkerError> {
        self.execute_script_full(script).map(|output| output.rows)
    }

    /// Runs a script and returns the full (row-less) output.
    ///
    /// # Errors
    ///
    /// Same as [`WorkerHandle::execute`].
    pub fn execute_script_full(&self, script: &str) -> Result<ExecuteOutput, WorkerError> {
        let (reply, receiver) = reply_slot();
        self.submit(Request::ExecuteScript {
            script: script.to_string(),
            reply,
        })?;
        receiver.wait()
    }

    /// Queues a commit and returns without waiting for it.
    ///
    /// Commit failures are logged by the owner. Follow with a read when a
    /// sync point is needed.
    ///
    /// # Errors
    ///
    /// Returns the submission errors only.
    pub fn commit(&self) -> Result<(), WorkerError> {
        self.submit(Request::Commit)
    }

    /// Changes the row shape of results produced after this call.
    ///
    /// Applies to every handle sharing the owner.
    ///
    /// # Errors
    ///
    /// Returns the submission errors only.
    pub fn set_row_factory(&self, factory: RowFactory) -> Result<(), WorkerError> {
        self.submit(Request::SetRowFactory {
            factory,
        })
    }

    /// Changes text decoding of results produced after this call.
    ///
    /// Applies to every handle sharing the owner.
    ///
    /// # Errors
    ///
    /// Returns the submission errors only.
    pub fn set_text_factory(&self, factory: TextFactory) -> Result<(), WorkerError> {
        self.submit(Request::SetTextFactory {
            factory,
        })
    }

    /// Returns the owner connection's cumulative change count.
    ///
    /// # Errors
    ///
    /// Same as [`WorkerHandle::execute`].
    pub fn total_changes(&self) -> Result<u64, WorkerError> {
        let (reply, receiver) = reply_slot();
        self.submit(Request::TotalChanges {
            reply,
        })?;
        receiver.wait()
    }

    /// Closes the handle; the last handle for an owner stops it.
    ///
    /// Requests already queued by any handle run before the owner stops.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::AlreadyClosed`] on a second call,
    /// [`WorkerError::Shutdown`] when the owner did not drain cleanly, and
    /// [`WorkerError::RegistryInvariant`] on inconsistent registry state.
    pub fn close(&self) -> Result<(), WorkerError> {
        {
            let mut closed = self.closed.write().unwrap_or_else(PoisonError::into_inner);
            if *closed {
                return Err(WorkerError::AlreadyClosed);
            }
            *closed = true;
        }
        debug!(handle_id = self.id, owner_id = %self.owner.id(), "closing handle");
        self.registry.detach(&self.owner, self.id)
    }

    /// Returns true once [`WorkerHandle::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.closed.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the number of requests waiting in the owner's queue.
    ///
    /// Diagnostic only; the value is stale as soon as it is read.
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.owner.queue_depth()
    }

    /// Returns the normalized database path.
    #[must_use]
    pub fn path(&self) -> &DatabasePath {
        self.owner.path()
    }

    /// Returns the id of the owner thread serving this handle.
    #[must_use]
    pub fn owner_id(&self) -> OwnerId {
        self.owner.id()
    }

    /// Enqueues a request unless the handle is closed.
    fn submit(&self, request: Request) -> Result<(), WorkerError> {
        let closed = self.closed.read().unwrap_or_else(PoisonError::into_inner);
        if *closed {
            return Err(WorkerError::AlreadyClosed);
        }
        self.owner.submit(request, self.enqueue_timeout)
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        match self.close() {
            Ok(()) | Err(WorkerError::AlreadyClosed) => {}
            Err(err) => {
                warn!(
                    handle_id = self.id,
                    owner_id = %self.owner.id(),
                    error = %err,
                    "close on drop failed"
                );
            }
        }
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("id", &self.id)
            .field("owner_id", &self.owner.id())
            .field("path", &self.owner.path())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
