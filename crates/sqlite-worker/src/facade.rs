// crates/sqlite-worker/src/facade.rs
// ============================================================================
// Module: Connection Facade
// Description: Connection/cursor surface over a worker handle.
// Purpose: Offer the familiar connect → cursor → fetch flow.
// Dependencies: none
// ============================================================================

//! ## Overview
//! [`connect`] returns a [`Connection`] wrapping a [`WorkerHandle`]. A
//! [`Cursor`] keeps the rows of its last statement and hands them out one at
//! a time; it borrows the connection, so it cannot outlive it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::VecDeque;
use std::path::Path;

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::rows::Column;
use crate::rows::ExecuteOutput;
use crate::rows::Row;
use crate::rows::RowFactory;
use crate::rows::TextFactory;
use crate::rows::Value;
use crate::worker::WorkerHandle;

// ============================================================================
// SECTION: Connection
// ============================================================================

/// Opens a connection through the global registry with default settings.
///
/// # Errors
///
/// Returns [`WorkerError`] when the path is invalid or the database cannot
/// be opened.
pub fn connect(path: impl AsRef<Path>) -> Result<Connection, WorkerError> {
    WorkerHandle::open(path).map(Connection::from)
}

/// Connection-style wrapper over a [`WorkerHandle`].
#[derive(Debug)]
pub struct Connection {
    /// Underlying handle.
    worker: WorkerHandle,
}

impl Connection {
    /// Opens a connection with explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError`] when the configuration or path is invalid or
    /// the database cannot be opened.
    pub fn open_with_config(
        path: impl AsRef<Path>,
        config: &WorkerConfig,
    ) -> Result<Self, WorkerError> {
        WorkerHandle::open_with_config(path, config).map(Self::from)
    }

    /// Returns an empty cursor.
    #[must_use]
    pub fn cursor(&self) -> Cursor<'_> {
        Cursor::new(&self.worker)
    }

    /// Runs one statement on a new cursor.
    ///
    /// # Errors
    ///
    /// Returns the statement's [`WorkerError`].
    pub fn execute(&self, sql: &str, values: Vec<Value>) -> Result<Cursor<'_>, WorkerError> {
        let mut cursor = self.cursor();
        cursor.execute(sql, values)?;
        Ok(cursor)
    }

    /// Runs a script on a new cursor.
    ///
    /// # Errors
    ///
    /// Returns the script's [`WorkerError`].
    pub fn execute_script(&self, script: &str) -> Result<Cursor<'_>, WorkerError> {
        let mut cursor = self.cursor();
        cursor.execute_script(script)?;
        Ok(cursor)
    }

    /// Queues a commit.
    ///
    /// # Errors
    ///
    /// Returns submission errors.
    pub fn commit(&self) -> Result<(), WorkerError> {
        self.worker.commit()
    }

    /// Changes the row shape of later results.
    ///
    /// # Errors
    ///
    /// Returns submission errors.
    pub fn set_row_factory(&self, factory: RowFactory) -> Result<(), WorkerError> {
        self.worker.set_row_factory(factory)
    }

    /// Changes text decoding of later results.
    ///
    /// # Errors
    ///
    /// Returns submission errors.
    pub fn set_text_factory(&self, factory: TextFactory) -> Result<(), WorkerError> {
        self.worker.set_text_factory(factory)
    }

    /// Returns the cumulative change count.
    ///
    /// # Errors
    ///
    /// Returns submission or engine errors.
    pub fn total_changes(&self) -> Result<u64, WorkerError> {
        self.worker.total_changes()
    }

    /// Closes the connection.
    ///
    /// # Errors
    ///
    /// See [`WorkerHandle::close`].
    pub fn close(self) -> Result<(), WorkerError> {
        self.worker.close()
    }

    /// Returns the underlying handle.
    #[must_use]
    pub const fn worker(&self) -> &WorkerHandle {
        &self.worker
    }
}

impl From<WorkerHandle> for Connection {
    fn from(worker: WorkerHandle) -> Self {
        Self {
            worker,
        }
    }
}

// ============================================================================
// SECTION: Cursor
// ============================================================================

/// Result cursor holding the rows of its last statement.
#[derive(Debug)]
pub struct Cursor<'conn> {
    /// Handle statements run on.
    worker: &'conn WorkerHandle,
    /// Rows not yet fetched.
    rows: VecDeque<Row>,
    /// Columns of the last statement.
    columns: Vec<Column>,
    /// Last inserted rowid after the last statement.
    last_insert_id: i64,
}

impl<'conn> Cursor<'conn> {
    /// Creates an empty cursor.
    const fn new(worker: &'conn WorkerHandle) -> Self {
        Self {
            worker,
            rows: VecDeque::new(),
            columns: Vec::new(),
            last_insert_id: 0,
        }
    }

    /// Runs one statement, replacing any unfetched rows.
    ///
    /// # Errors
    ///
    /// Returns the statement's [`WorkerError`]; the cursor keeps its
    /// previous state.
    pub fn execute(&mut self, sql: &str, values: Vec<Value>) -> Result<&mut Self, WorkerError> {
        let output = self.worker.execute_full(sql, values)?;
        self.load(output);
        Ok(self)
    }

    /// Runs a script, clearing any unfetched rows.
    ///
    /// # Errors
    ///
    /// Returns the script's [`WorkerError`].
    pub fn execute_script(&mut self, script: &str) -> Result<&mut Self, WorkerError> {
        let output = self.worker.execute_script_full(script)?;
        self.load(output);
        Ok(self)
    }

    /// Returns the next row, or `None` once exhausted.
    pub fn fetch_one(&mut self) -> Option<Row> {
        self.rows.pop_front()
    }

    /// Returns every remaining row.
    pub fn fetch_all(&mut self) -> Vec<Row> {
        self.rows.drain(..).collect()
    }

    /// Returns the columns of the last statement.
    #[must_use]
    pub fn description(&self) -> &[Column] {
        &self.columns
    }

    /// Returns the last inserted rowid seen by the last statement.
    #[must_use]
    pub const fn last_insert_id(&self) -> i64 {
        self.last_insert_id
    }

    /// Releases the cursor. The connection stays open.
    pub fn close(self) {}

    /// Replaces cursor state with a fresh result.
    fn load(&mut self, output: ExecuteOutput) {
        self.rows = output.rows.into();
        self.columns = output.columns;
        self.last_insert_id = output.last_insert_id;
    }
}

impl Iterator for Cursor<'_> {
    type Item = Row;

    fn next(&mut self) -> Option<Self::Item> {
        self.fetch_one()
    }
}
