//! # redb-backed Installer Database
//!
//! A disk-backed installer database using the redb embedded database.
//!
//! Layout:
//! - `catalog`: table name -> next row sequence (presence means the table exists)
//! - `rows`: (table, seq) -> postcard-encoded column map
//! - `conditions`: expression -> outcome code
//! - `staged`: (staging table, seq) -> postcard-encoded positional cells
//!
//! Every staging append is its own committed write transaction, so rows
//! staged before a failed pass stay on disk.

use crate::engine::{InstallerEngine, Record, RecordView, StagingTable, ViewQuery};
use crate::formats::{DatabaseSnapshot, StagedCells, TableRow, project_row, rule_row};
use crate::primitives::RULE_TABLE;
use crate::{ConditionOutcome, FieldValue, KeysweepError, RegistryKeyRemovalRule};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

/// Table catalogue: table name -> next row sequence.
const CATALOG: TableDefinition<&str, u64> = TableDefinition::new("catalog");

/// Stored rows: (table, seq) -> serialized column map.
const ROWS: TableDefinition<(&str, u64), &[u8]> = TableDefinition::new("rows");

/// Scripted condition outcomes: expression -> outcome code.
const CONDITIONS: TableDefinition<&str, u8> = TableDefinition::new("conditions");

/// Staged rows: (staging table, seq) -> serialized cells.
const STAGED: TableDefinition<(&str, u64), &[u8]> = TableDefinition::new("staged");

fn io_err(e: impl std::fmt::Display) -> KeysweepError {
    KeysweepError::IoError(e.to_string())
}

// =============================================================================
// STORED ENCODING
// =============================================================================

/// Cell encoding on disk. postcard needs an externally tagged enum, so the
/// untagged `FieldValue` is converted on the way in and out.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum StoredField {
    Integer(i32),
    String(String),
}

impl From<&FieldValue> for StoredField {
    fn from(value: &FieldValue) -> Self {
        match value {
            FieldValue::Integer(i) => Self::Integer(*i),
            FieldValue::String(s) => Self::String(s.clone()),
        }
    }
}

impl From<StoredField> for FieldValue {
    fn from(value: StoredField) -> Self {
        match value {
            StoredField::Integer(i) => Self::Integer(i),
            StoredField::String(s) => Self::String(s),
        }
    }
}

type StoredRow = BTreeMap<String, Option<StoredField>>;
type StoredCells = Vec<Option<StoredField>>;

fn encode_row(row: &TableRow) -> Result<Vec<u8>, KeysweepError> {
    let stored: StoredRow = row
        .iter()
        .map(|(k, v)| (k.clone(), v.as_ref().map(StoredField::from)))
        .collect();
    postcard::to_allocvec(&stored).map_err(|e| KeysweepError::SerializationError(e.to_string()))
}

fn decode_row(bytes: &[u8]) -> Result<TableRow, KeysweepError> {
    let stored: StoredRow = postcard::from_bytes(bytes)
        .map_err(|e| KeysweepError::DeserializationError(e.to_string()))?;
    Ok(stored
        .into_iter()
        .map(|(k, v)| (k, v.map(FieldValue::from)))
        .collect())
}

fn encode_cells(cells: &[Option<FieldValue>]) -> Result<Vec<u8>, KeysweepError> {
    let stored: StoredCells = cells
        .iter()
        .map(|c| c.as_ref().map(StoredField::from))
        .collect();
    postcard::to_allocvec(&stored).map_err(|e| KeysweepError::SerializationError(e.to_string()))
}

fn decode_cells(bytes: &[u8]) -> Result<StagedCells, KeysweepError> {
    let stored: StoredCells = postcard::from_bytes(bytes)
        .map_err(|e| KeysweepError::DeserializationError(e.to_string()))?;
    Ok(stored
        .into_iter()
        .map(|c| c.map(FieldValue::from))
        .collect())
}

const fn outcome_code(outcome: ConditionOutcome) -> u8 {
    match outcome {
        ConditionOutcome::False => 0,
        ConditionOutcome::True => 1,
        ConditionOutcome::Invalid => 2,
    }
}

const fn outcome_from_code(code: u8) -> ConditionOutcome {
    match code {
        0 => ConditionOutcome::False,
        1 => ConditionOutcome::True,
        _ => ConditionOutcome::Invalid,
    }
}

// =============================================================================
// DATABASE
// =============================================================================

/// A disk-backed installer database.
///
/// Cheap to share with handles: views and staging tables keep an `Arc` to
/// the same redb database.
pub struct RedbDatabase {
    db: Arc<Database>,
}

impl std::fmt::Debug for RedbDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbDatabase").finish_non_exhaustive()
    }
}

impl RedbDatabase {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KeysweepError> {
        let db = Database::create(path.as_ref()).map_err(io_err)?;

        // Initialize tables if they don't exist
        let write_txn = db.begin_write().map_err(io_err)?;
        {
            let _ = write_txn.open_table(CATALOG).map_err(io_err)?;
            let _ = write_txn.open_table(ROWS).map_err(io_err)?;
            let _ = write_txn.open_table(CONDITIONS).map_err(io_err)?;
            let _ = write_txn.open_table(STAGED).map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Create a table with no rows. No-op if it exists.
    pub fn create_table(&self, table: &str) -> Result<(), KeysweepError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut catalog = write_txn.open_table(CATALOG).map_err(io_err)?;
            let exists = catalog.get(table).map_err(io_err)?.is_some();
            if !exists {
                catalog.insert(table, 0).map_err(io_err)?;
            }
        }
        write_txn.commit().map_err(io_err)
    }

    /// Append a row, creating the table if needed.
    pub fn insert_row(&self, table: &str, row: &TableRow) -> Result<(), KeysweepError> {
        let bytes = encode_row(row)?;
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut catalog = write_txn.open_table(CATALOG).map_err(io_err)?;
            let mut rows = write_txn.open_table(ROWS).map_err(io_err)?;
            let seq = catalog
                .get(table)
                .map_err(io_err)?
                .map(|v| v.value())
                .unwrap_or(0);
            rows.insert((table, seq), bytes.as_slice())
                .map_err(io_err)?;
            catalog
                .insert(table, seq.saturating_add(1))
                .map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)
    }

    /// Append a rule to the rule table.
    pub fn insert_rule(&self, rule: &RegistryKeyRemovalRule) -> Result<(), KeysweepError> {
        self.insert_row(RULE_TABLE, &rule_row(rule))
    }

    /// Script the outcome of a condition expression.
    pub fn set_condition(
        &self,
        expression: &str,
        outcome: ConditionOutcome,
    ) -> Result<(), KeysweepError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut conditions = write_txn.open_table(CONDITIONS).map_err(io_err)?;
            conditions
                .insert(expression, outcome_code(outcome))
                .map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)
    }

    /// Load a snapshot in a single transaction.
    ///
    /// Tables in the snapshot replace tables of the same name; staged rows
    /// in the snapshot are appended.
    pub fn import_snapshot(&self, snapshot: &DatabaseSnapshot) -> Result<(), KeysweepError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut catalog = write_txn.open_table(CATALOG).map_err(io_err)?;
            let mut rows = write_txn.open_table(ROWS).map_err(io_err)?;
            let mut conditions = write_txn.open_table(CONDITIONS).map_err(io_err)?;
            let mut staged = write_txn.open_table(STAGED).map_err(io_err)?;

            for (table, table_rows) in &snapshot.tables {
                let name = table.as_str();
                rows.retain_in((name, 0u64)..=(name, u64::MAX), |_, _| false)
                    .map_err(io_err)?;
                for (seq, row) in table_rows.iter().enumerate() {
                    let bytes = encode_row(row)?;
                    rows.insert((name, seq as u64), bytes.as_slice())
                        .map_err(io_err)?;
                }
                catalog
                    .insert(name, table_rows.len() as u64)
                    .map_err(io_err)?;
            }

            for (expression, outcome) in &snapshot.conditions {
                conditions
                    .insert(expression.as_str(), outcome_code(*outcome))
                    .map_err(io_err)?;
            }

            for (table, cells) in &snapshot.staged {
                let name = table.as_str();
                let mut seq = next_staged_seq(&staged, name)?;
                for row in cells {
                    let bytes = encode_cells(row)?;
                    staged.insert((name, seq), bytes.as_slice()).map_err(io_err)?;
                    seq = seq.saturating_add(1);
                }
            }
        }
        write_txn.commit().map_err(io_err)
    }

    /// Copy out the whole database as a snapshot.
    pub fn export_snapshot(&self) -> Result<DatabaseSnapshot, KeysweepError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let catalog = read_txn.open_table(CATALOG).map_err(io_err)?;
        let rows = read_txn.open_table(ROWS).map_err(io_err)?;
        let conditions = read_txn.open_table(CONDITIONS).map_err(io_err)?;

        let mut snapshot = DatabaseSnapshot::new();

        for entry in catalog.iter().map_err(io_err)? {
            let (key, _) = entry.map_err(io_err)?;
            let name = key.value().to_string();
            let mut table_rows = Vec::new();
            for row in rows
                .range((name.as_str(), 0u64)..=(name.as_str(), u64::MAX))
                .map_err(io_err)?
            {
                let (_, data) = row.map_err(io_err)?;
                table_rows.push(decode_row(data.value())?);
            }
            snapshot.tables.insert(name, table_rows);
        }

        for entry in conditions.iter().map_err(io_err)? {
            let (key, value) = entry.map_err(io_err)?;
            snapshot
                .conditions
                .insert(key.value().to_string(), outcome_from_code(value.value()));
        }

        snapshot.staged = self.all_staged()?;
        Ok(snapshot)
    }

    /// Number of rows in a table, or `None` if the table does not exist.
    pub fn row_count(&self, table: &str) -> Result<Option<usize>, KeysweepError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let catalog = read_txn.open_table(CATALOG).map_err(io_err)?;
        if catalog.get(table).map_err(io_err)?.is_none() {
            return Ok(None);
        }
        let rows = read_txn.open_table(ROWS).map_err(io_err)?;
        let mut count = 0;
        for entry in rows
            .range((table, 0u64)..=(table, u64::MAX))
            .map_err(io_err)?
        {
            entry.map_err(io_err)?;
            count += 1;
        }
        Ok(Some(count))
    }

    /// Rows staged in one table, in append order.
    pub fn staged_rows(&self, table: &str) -> Result<Vec<StagedCells>, KeysweepError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let staged = read_txn.open_table(STAGED).map_err(io_err)?;

        let mut result = Vec::new();
        for entry in staged
            .range((table, 0u64)..=(table, u64::MAX))
            .map_err(io_err)?
        {
            let (_, data) = entry.map_err(io_err)?;
            result.push(decode_cells(data.value())?);
        }
        Ok(result)
    }

    /// All staged rows, grouped by staging table.
    pub fn all_staged(&self) -> Result<BTreeMap<String, Vec<StagedCells>>, KeysweepError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let staged = read_txn.open_table(STAGED).map_err(io_err)?;

        let mut result: BTreeMap<String, Vec<StagedCells>> = BTreeMap::new();
        for entry in staged.iter().map_err(io_err)? {
            let (key, data) = entry.map_err(io_err)?;
            let (table, _) = key.value();
            result
                .entry(table.to_string())
                .or_default()
                .push(decode_cells(data.value())?);
        }
        Ok(result)
    }

    /// Drop every staged row.
    pub fn clear_staged(&self) -> Result<(), KeysweepError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut staged = write_txn.open_table(STAGED).map_err(io_err)?;
            staged.retain(|_, _| false).map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<(), KeysweepError> {
        let db = Arc::get_mut(&mut self.db)
            .ok_or_else(|| KeysweepError::IoError("database handles still open".to_string()))?;
        db.compact().map_err(io_err)?;
        Ok(())
    }
}

/// Sequence number for the next staged row of `table`.
fn next_staged_seq<T>(staged: &T, table: &str) -> Result<u64, KeysweepError>
where
    T: ReadableTable<(&'static str, u64), &'static [u8]>,
{
    let last = staged
        .range((table, 0u64)..=(table, u64::MAX))
        .map_err(io_err)?
        .next_back()
        .transpose()
        .map_err(io_err)?;
    Ok(last.map(|(key, _)| key.value().1.saturating_add(1)).unwrap_or(0))
}

// =============================================================================
// INSTALLER ENGINE IMPLEMENTATION
// =============================================================================

impl InstallerEngine for RedbDatabase {
    type View = RedbView;
    type Staging = RedbStaging;

    fn table_exists(&self, table: &str) -> Result<bool, KeysweepError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let catalog = read_txn.open_table(CATALOG).map_err(io_err)?;
        Ok(catalog.get(table).map_err(io_err)?.is_some())
    }

    fn open_view(&self, query: &ViewQuery) -> Result<RedbView, KeysweepError> {
        let view_err = |e: KeysweepError| KeysweepError::ViewOpen {
            table: query.table.clone(),
            reason: e.to_string(),
        };

        if !self.table_exists(&query.table).map_err(view_err)? {
            return Err(KeysweepError::ViewOpen {
                table: query.table.clone(),
                reason: "no such table".to_string(),
            });
        }

        let read_txn = self.db.begin_read().map_err(io_err).map_err(view_err)?;
        let rows = read_txn
            .open_table(ROWS)
            .map_err(io_err)
            .map_err(view_err)?;

        let table = query.table.as_str();
        let mut records = VecDeque::new();
        for entry in rows
            .range((table, 0u64)..=(table, u64::MAX))
            .map_err(io_err)
            .map_err(view_err)?
        {
            let (_, data) = entry.map_err(io_err).map_err(view_err)?;
            let row = decode_row(data.value()).map_err(view_err)?;
            records.push_back(Record::new(project_row(&row, &query.columns)));
        }

        Ok(RedbView { records })
    }

    fn evaluate_condition(&self, expression: &str) -> ConditionOutcome {
        let lookup = || -> Result<Option<u8>, KeysweepError> {
            let read_txn = self.db.begin_read().map_err(io_err)?;
            let conditions = read_txn.open_table(CONDITIONS).map_err(io_err)?;
            Ok(conditions
                .get(expression)
                .map_err(io_err)?
                .map(|v| v.value()))
        };

        match lookup() {
            Ok(code) => code.map_or(ConditionOutcome::Invalid, outcome_from_code),
            Err(e) => {
                tracing::warn!(error = %e, %expression, "condition lookup failed");
                ConditionOutcome::Invalid
            }
        }
    }

    fn open_staging(&self, table: &str, column_count: usize) -> Result<RedbStaging, KeysweepError> {
        let staging_err = |e: KeysweepError| KeysweepError::StagingOpen {
            table: table.to_string(),
            reason: e.to_string(),
        };

        let read_txn = self.db.begin_read().map_err(io_err).map_err(staging_err)?;
        let staged = read_txn
            .open_table(STAGED)
            .map_err(io_err)
            .map_err(staging_err)?;
        let next_seq = next_staged_seq(&staged, table).map_err(staging_err)?;

        Ok(RedbStaging {
            db: Arc::clone(&self.db),
            table: table.to_string(),
            column_count,
            next_seq,
        })
    }
}

/// Cursor over rows read in one read transaction when the view opened.
#[derive(Debug)]
pub struct RedbView {
    records: VecDeque<Record>,
}

impl RecordView for RedbView {
    fn fetch(&mut self) -> Result<Option<Record>, KeysweepError> {
        Ok(self.records.pop_front())
    }
}

/// Append handle to one staging table on disk.
pub struct RedbStaging {
    db: Arc<Database>,
    table: String,
    column_count: usize,
    next_seq: u64,
}

impl std::fmt::Debug for RedbStaging {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStaging")
            .field("table", &self.table)
            .field("next_seq", &self.next_seq)
            .finish_non_exhaustive()
    }
}

impl StagingTable for RedbStaging {
    fn table(&self) -> &str {
        &self.table
    }

    fn append(&mut self, values: &[Option<FieldValue>]) -> Result<(), KeysweepError> {
        if values.len() != self.column_count {
            return Err(KeysweepError::ColumnCount {
                table: self.table.clone(),
                expected: self.column_count,
                actual: values.len(),
            });
        }

        let bytes = encode_cells(values)?;
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut staged = write_txn.open_table(STAGED).map_err(io_err)?;

            // Column 1 is the staging table's primary key.
            if let Some(key) = values.first().and_then(Option::as_ref) {
                let table = self.table.as_str();
                for entry in staged
                    .range((table, 0u64)..=(table, u64::MAX))
                    .map_err(io_err)?
                {
                    let (_, data) = entry.map_err(io_err)?;
                    let cells = decode_cells(data.value())?;
                    if cells.first().and_then(Option::as_ref) == Some(key) {
                        return Err(KeysweepError::DuplicateKey {
                            table: self.table.clone(),
                            key: key.to_string(),
                        });
                    }
                }
            }

            staged
                .insert((self.table.as_str(), self.next_seq), bytes.as_slice())
                .map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;

        self.next_seq = self.next_seq.saturating_add(1);
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
