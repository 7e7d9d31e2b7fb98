// crates/sqlite-worker/src/rows.rs
// ============================================================================
// Module: Result Rows
// Description: Materialized rows, column descriptions, and decode factories.
// Purpose: Carry query results from the owner thread back to submitters.
// Dependencies: rusqlite
// ============================================================================

//! ## Overview
//! Results are fully materialized on the owner thread so nothing borrowed from
//! the live connection crosses threads. [`RowFactory`] decides whether rows
//! carry column names; [`TextFactory`] decides how `TEXT` cells are decoded.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

pub use rusqlite::types::Value;
use rusqlite::types::ValueRef;

use crate::error::WorkerError;

// ============================================================================
// SECTION: Factories
// ============================================================================

/// Row shape produced for later results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowFactory {
    /// Cells addressable by position only.
    #[default]
    Tuple,
    /// Cells also addressable by column name (case-insensitive).
    Named,
}

/// Decoding applied to `TEXT` cells in later results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextFactory {
    /// Strict UTF-8 into [`Value::Text`]; invalid bytes fail the request.
    #[default]
    Text,
    /// Raw bytes into [`Value::Blob`].
    Bytes,
    /// UTF-8 with invalid sequences replaced by U+FFFD.
    Lossy,
}

impl TextFactory {
    /// Decodes one `TEXT` cell.
    fn decode(self, bytes: &[u8]) -> Result<Value, WorkerError> {
        match self {
            Self::Text => std::str::from_utf8(bytes)
                .map(|text| Value::Text(text.to_owned()))
                .map_err(|err| WorkerError::Engine(format!("could not decode text column: {err}"))),
            Self::Bytes => Ok(Value::Blob(bytes.to_vec())),
            Self::Lossy => Ok(Value::Text(String::from_utf8_lossy(bytes).into_owned())),
        }
    }
}

/// Copies a borrowed cell into an owned value.
pub(crate) fn decode_cell(cell: ValueRef<'_>, text: TextFactory) -> Result<Value, WorkerError> {
    match cell {
        ValueRef::Null => Ok(Value::Null),
        ValueRef::Integer(value) => Ok(Value::Integer(value)),
        ValueRef::Real(value) => Ok(Value::Real(value)),
        ValueRef::Text(bytes) => text.decode(bytes),
        ValueRef::Blob(bytes) => Ok(Value::Blob(bytes.to_vec())),
    }
}

// ============================================================================
// SECTION: Rows
// ============================================================================

/// Result column description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name as reported by `SQLite`.
    name: String,
}

impl Column {
    /// Creates a column description.
    #[must_use]
    pub const fn new(name: String) -> Self {
        Self {
            name,
        }
    }

    /// Returns the column name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// One materialized result row.
///
/// # Invariants
/// - When present, `names` has one entry per cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Cell values in column order.
    values: Vec<Value>,
    /// Column names shared across a result set (named factory only).
    names: Option<Arc<[String]>>,
}

impl Row {
    /// Creates a row.
    pub(crate) const fn new(values: Vec<Value>, names: Option<Arc<[String]>>) -> Self {
        Self {
            values,
            names,
        }
    }

    /// Returns all cells.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consumes the row, returning its cells.
    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Returns the cell at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Returns the cell for column `name`, ignoring ASCII case.
    ///
    /// Always `None` for rows produced under [`RowFactory::Tuple`].
    #[must_use]
    pub fn get_named(&self, name: &str) -> Option<&Value> {
        let names = self.names.as_ref()?;
        let index = names.iter().position(|column| column.eq_ignore_ascii_case(name))?;
        self.values.get(index)
    }

    /// Returns column names when the row was produced by the named factory.
    #[must_use]
    pub fn column_names(&self) -> Option<&[String]> {
        self.names.as_deref()
    }

    /// Returns the number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true when the row has no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Full result of an execute or script request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecuteOutput {
    /// Every row the statement produced, in order.
    pub rows: Vec<Row>,
    /// Result column descriptions; empty for statements without results.
    pub columns: Vec<Column>,
    /// Connection's last inserted rowid after the request ran.
    pub last_insert_id: i64,
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test assertions use unwrap for clarity.")]

    use std::sync::Arc;

    use rusqlite::types::ValueRef;

    use super::Row;
    use super::TextFactory;
    use super::Value;
    use super::decode_cell;
    use crate::error::WorkerError;

    #[test]
    fn named_lookup_ignores_case() {
        let names: Arc<[String]> = Arc::from(vec!["K".to_string(), "v".to_string()]);
        let row = Row::new(vec![Value::Integer(1), Value::Null], Some(names));
        assert_eq!(row.get_named("k"), Some(&Value::Integer(1)));
        assert_eq!(row.get_named("V"), Some(&Value::Null));
        assert_eq!(row.get_named("missing"), None);
    }

    #[test]
    fn tuple_rows_have_no_names() {
        let row = Row::new(vec![Value::Integer(1)], None);
        assert_eq!(row.get_named("k"), None);
        assert_eq!(row.get(0), Some(&Value::Integer(1)));
    }

    #[test]
    fn text_factories_decode_invalid_utf8_differently() {
        let bytes: &[u8] = &[0x66, 0xff];
        let err = decode_cell(ValueRef::Text(bytes), TextFactory::Text).unwrap_err();
        assert!(matches!(err, WorkerError::Engine(_)));
        assert_eq!(
            decode_cell(ValueRef::Text(bytes), TextFactory::Bytes).unwrap(),
            Value::Blob(vec![0x66, 0xff])
        );
        assert_eq!(
            decode_cell(ValueRef::Text(bytes), TextFactory::Lossy).unwrap(),
            Value::Text("f\u{fffd}".to_string())
        );
    }
}
