// crates/sqlite-worker/src/owner.rs
// ============================================================================
// Module: Owner Thread
// Description: The single thread that owns a database connection.
// Purpose: Serve queued requests in FIFO order and drain on shutdown.
// Dependencies: crossbeam-channel, rusqlite, tracing
// ============================================================================

//! ## Overview
//! An [`OwnerThread`] opens one `SQLite` connection, moves it onto a named
//! thread, and serves [`Request`]s from a bounded queue one at a time. The
//! connection never leaves that thread. A `Shutdown` request that arrives
//! while other requests are still queued is deferred until the queue is
//! observed empty; the thread then commits any pending transaction, closes
//! the connection, and exits.
//!
//! Handles sharing an owner are tracked by id so the last one to leave can
//! stop the thread.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Receiver;
use crossbeam_channel::SendTimeoutError;
use crossbeam_channel::Sender;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::params_from_iter;
use tracing::debug;
use tracing::warn;

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::path::DatabasePath;
use crate::request::Request;
use crate::rows::Column;
use crate::rows::ExecuteOutput;
use crate::rows::Row;
use crate::rows::RowFactory;
use crate::rows::TextFactory;
use crate::rows::Value;
use crate::rows::decode_cell;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Statement keywords that open an implicit transaction.
const DATA_MODIFYING_KEYWORDS: [&str; 4] = ["INSERT", "UPDATE", "DELETE", "REPLACE"];

/// Source of process-unique owner ids.
static NEXT_OWNER_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// SECTION: Identity
// ============================================================================

/// Process-unique identity of an owner thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OwnerId(u64);

impl OwnerId {
    /// Allocates the next id.
    fn next() -> Self {
        Self(NEXT_OWNER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// SECTION: Owner Thread
// ============================================================================

/// Shared front of a running owner thread.
///
/// # Invariants
/// - Only the spawned thread touches the connection.
/// - `join` holds the thread handle until the owner is stopped exactly once.
pub(crate) struct OwnerThread {
    /// Owner identity.
    id: OwnerId,
    /// Database this owner serves.
    path: DatabasePath,
    /// Producer side of the bounded request queue.
    sender: Sender<Request>,
    /// Ids of handles currently attached to this owner.
    handles: Mutex<HashSet<u64>>,
    /// Thread handle, taken when the owner is joined.
    join: Mutex<Option<JoinHandle<Result<(), WorkerError>>>>,
}

impl OwnerThread {
    /// Opens the connection and starts the owner thread.
    ///
    /// The connection is opened on the calling thread so open failures are
    /// reported synchronously.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Engine`] when the database cannot be opened and
    /// [`WorkerError::Unavailable`] when the thread cannot be spawned.
    pub(crate) fn spawn(
        path: DatabasePath,
        config: &WorkerConfig,
    ) -> Result<Arc<Self>, WorkerError> {
        let connection = open_connection(&path, config)?;
        let id = OwnerId::next();
        let (sender, receiver) = crossbeam_channel::bounded(config.max_queue_size);
        let runtime = OwnerRuntime {
            id,
            connection,
            receiver,
            row_factory: RowFactory::default(),
            text_factory: TextFactory::default(),
            implicit_transactions: config.implicit_transactions,
        };
        let join = thread::Builder::new()
            .name(format!("sqlite-worker-{id}"))
            .spawn(move || runtime.run())
            .map_err(|err| {
                WorkerError::Unavailable(format!("failed to spawn owner thread: {err}"))
            })?;
        debug!(owner_id = %id, path = %path, queue = config.max_queue_size, "owner thread started");
        Ok(Arc::new(Self {
            id,
            path,
            sender,
            handles: Mutex::new(HashSet::new()),
            join: Mutex::new(Some(join)),
        }))
    }

    /// Returns the owner id.
    #[must_use]
    pub(crate) const fn id(&self) -> OwnerId {
        self.id
    }

    /// Returns the database path.
    #[must_use]
    pub(crate) const fn path(&self) -> &DatabasePath {
        &self.path
    }

    /// Returns the number of queued requests.
    #[must_use]
    pub(crate) fn queue_depth(&self) -> usize {
        self.sender.len()
    }

    /// Enqueues a request, waiting at most `timeout` for queue space.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::QueueFull`] when the wait elapses and
    /// [`WorkerError::Unavailable`] when the owner thread is gone.
    pub(crate) fn submit(&self, request: Request, timeout: Duration) -> Result<(), WorkerError> {
        let kind = request.kind();
        match self.sender.send_timeout(request, timeout) {
            Ok(()) => {
                debug!(owner_id = %self.id, request = kind, "request enqueued");
                Ok(())
            }
            Err(SendTimeoutError::Timeout(_)) => Err(WorkerError::QueueFull {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            Err(SendTimeoutError::Disconnected(_)) => {
                Err(WorkerError::Unavailable("owner thread is no longer running".to_string()))
            }
        }
    }

    /// Records a handle attached to this owner.
    pub(crate) fn register(&self, handle_id: u64) {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner).insert(handle_id);
    }

    /// Removes a handle and returns how many remain.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::RegistryInvariant`] when the handle was not
    /// attached.
    pub(crate) fn deregister(&self, handle_id: u64) -> Result<usize, WorkerError> {
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        if !handles.remove(&handle_id) {
            return Err(WorkerError::RegistryInvariant(format!(
                "handle {handle_id} is not attached to owner {}",
                self.id
            )));
        }
        Ok(handles.len())
    }

    /// Enqueues `Shutdown` and waits for the thread to exit.
    ///
    /// The enqueue blocks without a timeout; accepted requests always run,
    /// so queue space always frees up.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Shutdown`] when draining fails, the thread
    /// panicked, or it was already joined.
    pub(crate) fn stop(&self) -> Result<(), WorkerError> {
        // A disconnected queue means the thread already exited; join reports why.
        let _ = self.sender.send(Request::Shutdown);
        let join = self.join.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(join) = join else {
            return Err(WorkerError::Shutdown(format!("owner {} was already stopped", self.id)));
        };
        join.join()
            .map_err(|_| WorkerError::Shutdown(format!("owner {} thread panicked", self.id)))?
    }
}

// ============================================================================
// SECTION: Runtime
// ============================================================================

/// State moved onto the owner thread.
struct OwnerRuntime {
    /// Owner identity, for logging.
    id: OwnerId,
    /// The connection; never shared.
    connection: Connection,
    /// Consumer side of the request queue.
    receiver: Receiver<Request>,
    /// Row shape for later results.
    row_factory: RowFactory,
    /// Text decoding for later results.
    text_factory: TextFactory,
    /// Whether data-modifying statements open a transaction.
    implicit_transactions: bool,
}

impl OwnerRuntime {
    /// Serves requests until a shutdown has drained the queue.
    fn run(mut self) -> Result<(), WorkerError> {
        let mut shutdown_pending = false;
        loop {
            if shutdown_pending && self.receiver.is_empty() {
                break;
            }
            let Ok(request) = self.receiver.recv() else {
                break;
            };
            if matches!(request, Request::Shutdown) {
                shutdown_pending = true;
                let queued = self.receiver.len();
                if queued > 0 {
                    debug!(owner_id = %self.id, queued, "shutdown deferred behind queued requests");
                }
                continue;
            }
            self.serve(request);
        }
        self.finish()
    }

    /// Executes one request and replies when a reply slot is present.
    fn serve(&mut self, request: Request) {
        match request {
            Request::Execute {
                query,
                values,
                reply,
            } => {
                debug!(
                    owner_id = %self.id,
                    query = %query,
                    params = values.len(),
                    "executing statement"
                );
                reply.send(self.run_statement(&query, &values));
            }
            Request::ExecuteScript {
                script,
                reply,
            } => {
                debug!(owner_id = %self.id, query = %script, "executing script");
                reply.send(self.run_script(&script));
            }
            Request::SetRowFactory {
                factory,
            } => self.row_factory = factory,
            Request::SetTextFactory {
                factory,
            } => self.text_factory = factory,
            Request::Commit => {
                if let Err(err) = self.commit() {
                    warn!(owner_id = %self.id, error = %err, "commit failed");
                }
            }
            Request::TotalChanges {
                reply,
            } => reply.send(self.total_changes()),
            Request::Shutdown => {}
        }
    }

    /// Runs one statement and materializes its rows.
    fn run_statement(&self, query: &str, values: &[Value]) -> Result<ExecuteOutput, WorkerError> {
        if skip_trivia(query).is_empty() {
            return Ok(ExecuteOutput {
                rows: Vec::new(),
                columns: Vec::new(),
                last_insert_id: self.connection.last_insert_rowid(),
            });
        }
        if self.implicit_transactions
            && self.connection.is_autocommit()
            && is_data_modifying(query)
        {
            self.connection.execute_batch("BEGIN")?;
        }
        let (columns, rows) = {
            let mut statement = self.connection.prepare(query)?;
            let names: Vec<String> =
                statement.column_names().into_iter().map(str::to_owned).collect();
            let shared: Option<Arc<[String]>> = match self.row_factory {
                RowFactory::Tuple => None,
                RowFactory::Named => Some(Arc::from(names.clone())),
            };
            let mut cursor = statement.query(params_from_iter(values.iter()))?;
            let mut rows = Vec::new();
            while let Some(row) = cursor.next()? {
                let mut cells = Vec::with_capacity(names.len());
                for index in 0 .. names.len() {
                    cells.push(decode_cell(row.get_ref(index)?, self.text_factory)?);
                }
                rows.push(Row::new(cells, shared.clone()));
            }
            (names.into_iter().map(Column::new).collect(), rows)
        };
        Ok(ExecuteOutput {
            rows,
            columns,
            last_insert_id: self.connection.last_insert_rowid(),
        })
    }

    /// Commits pending work, then runs a multi-statement script.
    fn run_script(&self, script: &str) -> Result<ExecuteOutput, WorkerError> {
        self.commit()?;
        self.connection.execute_batch(script)?;
        Ok(ExecuteOutput {
            rows: Vec::new(),
            columns: Vec::new(),
            last_insert_id: self.connection.last_insert_rowid(),
        })
    }

    /// Commits the open transaction, if any.
    fn commit(&self) -> Result<(), WorkerError> {
        if !self.connection.is_autocommit() {
            self.connection.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    /// Reads the connection's cumulative change counter.
    fn total_changes(&self) -> Result<u64, WorkerError> {
        let changes: i64 =
            self.connection.query_row("SELECT total_changes()", [], |row| row.get(0))?;
        Ok(u64::try_from(changes).unwrap_or(0))
    }

    /// Commits pending work and closes the connection.
    fn finish(self) -> Result<(), WorkerError> {
        let committed = self.commit();
        if let Err(err) = &committed {
            warn!(owner_id = %self.id, error = %err, "commit during drain failed");
        }
        let id = self.id;
        self.connection
            .close()
            .map_err(|(_, err)| WorkerError::Shutdown(format!("close failed: {err}")))?;
        committed
            .map_err(|err| WorkerError::Shutdown(format!("commit during drain failed: {err}")))?;
        debug!(owner_id = %id, "owner thread stopped");
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Opens a connection with the worker's flags and busy timeout.
fn open_connection(path: &DatabasePath, config: &WorkerConfig) -> Result<Connection, WorkerError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let connection = match path {
        DatabasePath::Memory => Connection::open_in_memory_with_flags(flags)?,
        DatabasePath::File {
            open_path, ..
        } => Connection::open_with_flags(open_path, flags)?,
    };
    connection.busy_timeout(config.busy_timeout())?;
    Ok(connection)
}

/// Returns true when `sql` starts with a data-modifying keyword.
///
/// Leading whitespace and SQL comments are skipped.
fn is_data_modifying(sql: &str) -> bool {
    let keyword = leading_keyword(sql);
    DATA_MODIFYING_KEYWORDS.iter().any(|candidate| candidate.eq_ignore_ascii_case(keyword))
}

/// Returns the first word of `sql` after whitespace and comments.
fn leading_keyword(sql: &str) -> &str {
    let rest = skip_trivia(sql);
    let end = rest.find(|ch: char| !ch.is_ascii_alphabetic()).unwrap_or(rest.len());
    &rest[.. end]
}

/// Skips leading whitespace, empty statements, and SQL comments.
fn skip_trivia(sql: &str) -> &str {
    let mut rest = sql;
    loop {
        rest = rest.trim_start_matches(|ch: char| ch.is_whitespace() || ch == ';');
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.find('\n').map_or("", |end| &after[end + 1 ..]);
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.find("*/").map_or("", |end| &after[end + 2 ..]);
        } else {
            return rest;
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
