//! # Installer Engine Seam
//!
//! The removal pass never owns tables. It reaches the installer engine only
//! through the traits in this module:
//!
//! - [`InstallerEngine`]: table existence, views, condition evaluation,
//!   staging tables
//! - [`RecordView`]: a forward-only cursor
//! - [`StagingTable`]: an append-only handle to one staging table
//!
//! Views and staging handles are owned values. Whatever the engine needs to
//! release when a handle closes belongs in that handle's `Drop`, so every
//! exit path of the pass releases it.

use crate::{ConditionOutcome, FieldValue, KeysweepError};
use std::fmt;

// =============================================================================
// ENGINE TRAITS
// =============================================================================

/// The installer engine as seen by the removal pass.
///
/// All calls are synchronous and either return a result or fail outright.
pub trait InstallerEngine {
    /// Cursor type returned by [`InstallerEngine::open_view`].
    type View: RecordView;
    /// Handle type returned by [`InstallerEngine::open_staging`].
    type Staging: StagingTable;

    /// Check whether a table exists in the installer database.
    fn table_exists(&self, table: &str) -> Result<bool, KeysweepError>;

    /// Open and execute a view. Rows come back in storage order.
    fn open_view(&self, query: &ViewQuery) -> Result<Self::View, KeysweepError>;

    /// Evaluate a condition expression against the installation properties.
    fn evaluate_condition(&self, expression: &str) -> ConditionOutcome;

    /// Open a staging table for appending rows of `column_count` cells.
    fn open_staging(&self, table: &str, column_count: usize)
    -> Result<Self::Staging, KeysweepError>;
}

/// Forward-only cursor over the rows of an executed view.
pub trait RecordView {
    /// Fetch the next record, or `None` at end of data.
    fn fetch(&mut self) -> Result<Option<Record>, KeysweepError>;
}

/// Append-only handle to a staging table.
pub trait StagingTable {
    /// Name of the table this handle appends to.
    fn table(&self) -> &str;

    /// Append one row. `None` cells are nulls.
    fn append(&mut self, values: &[Option<FieldValue>]) -> Result<(), KeysweepError>;
}

// =============================================================================
// VIEW QUERY
// =============================================================================

/// A projection of named columns from one table.
///
/// This is the only query shape the pass issues, so engines receive it in
/// structured form instead of SQL text. [`fmt::Display`] renders the
/// equivalent SQL for logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewQuery {
    pub table: String,
    pub columns: Vec<String>,
}

impl ViewQuery {
    /// Select `columns` from `table`.
    #[must_use]
    pub fn select(table: &str, columns: &[&str]) -> Self {
        Self {
            table: table.to_string(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
        }
    }
}

impl fmt::Display for ViewQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let columns: Vec<String> = self.columns.iter().map(|c| format!("`{}`", c)).collect();
        write!(f, "SELECT {} FROM `{}`", columns.join(", "), self.table)
    }
}

// =============================================================================
// RECORD
// =============================================================================

/// One fetched row, with typed accessors by 1-based column index.
///
/// Empty strings are nulls, matching the installer's storage convention.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<Option<FieldValue>>,
}

impl Record {
    /// Build a record from ordered cells.
    #[must_use]
    pub fn new(fields: Vec<Option<FieldValue>>) -> Self {
        Self { fields }
    }

    fn cell(&self, column: usize) -> Result<Option<&FieldValue>, KeysweepError> {
        if column == 0 || column > self.fields.len() {
            return Err(KeysweepError::ColumnOutOfRange {
                column,
                count: self.fields.len(),
            });
        }
        Ok(self.fields[column - 1].as_ref())
    }

    /// Read a column as a string.
    ///
    /// Integers come back as their decimal text. Null and empty cells come
    /// back as `None`.
    pub fn string(&self, column: usize) -> Result<Option<String>, KeysweepError> {
        Ok(match self.cell(column)? {
            None => None,
            Some(FieldValue::String(s)) if s.is_empty() => None,
            Some(FieldValue::String(s)) => Some(s.clone()),
            Some(FieldValue::Integer(i)) => Some(i.to_string()),
        })
    }

    /// Read a column as an integer.
    ///
    /// Strings must parse as a decimal `i32`. Null and empty cells come back
    /// as `None`.
    pub fn integer(&self, column: usize) -> Result<Option<i32>, KeysweepError> {
        match self.cell(column)? {
            None => Ok(None),
            Some(FieldValue::Integer(i)) => Ok(Some(*i)),
            Some(FieldValue::String(s)) if s.is_empty() => Ok(None),
            Some(FieldValue::String(s)) => {
                s.trim()
                    .parse::<i32>()
                    .map(Some)
                    .map_err(|_| KeysweepError::ColumnType {
                        column,
                        expected: "integer",
                    })
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> Record {
        Record::new(vec![
            Some(FieldValue::string("R1")),
            Some(FieldValue::Integer(2)),
            Some(FieldValue::string("")),
            None,
            Some(FieldValue::string(" 7 ")),
            Some(FieldValue::string("abc")),
        ])
    }

    #[test]
    fn string_accessor_reads_text_and_integers() {
        let rec = record();
        assert_eq!(rec.string(1).expect("col 1"), Some("R1".to_string()));
        assert_eq!(rec.string(2).expect("col 2"), Some("2".to_string()));
    }

    #[test]
    fn empty_and_null_read_as_none() {
        let rec = record();
        assert_eq!(rec.string(3).expect("col 3"), None);
        assert_eq!(rec.string(4).expect("col 4"), None);
        assert_eq!(rec.integer(3).expect("col 3"), None);
        assert_eq!(rec.integer(4).expect("col 4"), None);
    }

    #[test]
    fn integer_accessor_parses_numeric_text() {
        let rec = record();
        assert_eq!(rec.integer(2).expect("col 2"), Some(2));
        assert_eq!(rec.integer(5).expect("col 5"), Some(7));
    }

    #[test]
    fn integer_accessor_rejects_non_numeric_text() {
        let rec = record();
        assert!(matches!(
            rec.integer(6),
            Err(KeysweepError::ColumnType { column: 6, .. })
        ));
    }

    #[test]
    fn column_indices_are_one_based() {
        let rec = record();
        assert!(matches!(
            rec.string(0),
            Err(KeysweepError::ColumnOutOfRange { column: 0, count: 6 })
        ));
        assert!(matches!(
            rec.integer(7),
            Err(KeysweepError::ColumnOutOfRange { column: 7, count: 6 })
        ));
    }

    #[test]
    fn view_query_renders_sql() {
        let query = ViewQuery::select("T", &["A", "B"]);
        assert_eq!(query.to_string(), "SELECT `A`, `B` FROM `T`");
    }
}
