//! # In-Memory Installer Engine
//!
//! A [`DatabaseSnapshot`] held in memory behind the [`InstallerEngine`]
//! traits. Used by the CLI's snapshot backend and throughout the tests.
//!
//! Besides storage it keeps the bookkeeping tests need:
//! - live handle count (views and staging tables), to prove release on
//!   every exit path
//! - counters for views opened, staging tables opened and conditions
//!   evaluated
//! - a [`FaultPlan`] that makes chosen engine calls fail

use crate::engine::{InstallerEngine, Record, RecordView, StagingTable, ViewQuery};
use crate::formats::{DatabaseSnapshot, StagedCells, TableRow, project_row};
use crate::primitives::RULE_TABLE;
use crate::{ConditionOutcome, FieldValue, KeysweepError, RegistryKeyRemovalRule};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

// =============================================================================
// FAULT INJECTION
// =============================================================================

/// Engine calls to fail on purpose.
///
/// Counters are 1-based and span the whole database, not one handle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultPlan {
    /// Fail the table-existence check.
    pub fail_table_check: bool,
    /// Fail opening any view.
    pub fail_open_view: bool,
    /// Fail the Nth record fetch.
    pub fail_fetch_at: Option<usize>,
    /// Fail opening the staging table with this name.
    pub fail_open_staging: Option<String>,
    /// Fail the Nth staging append.
    pub fail_append_at: Option<usize>,
}

#[derive(Debug, Default)]
struct Counters {
    open_handles: usize,
    views_opened: usize,
    staging_opens: usize,
    condition_evaluations: usize,
    fetches: usize,
    appends: usize,
}

#[derive(Debug, Default)]
struct State {
    snapshot: DatabaseSnapshot,
    faults: FaultPlan,
    counters: Counters,
}

type Shared = Rc<RefCell<State>>;

// =============================================================================
// DATABASE
// =============================================================================

/// An installer database held entirely in memory.
///
/// Single-threaded; handles share the database through `Rc`.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    state: Shared,
}

impl MemoryDatabase {
    /// Create an empty database (no tables).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a database from a snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: DatabaseSnapshot) -> Self {
        Self {
            state: Rc::new(RefCell::new(State {
                snapshot,
                ..State::default()
            })),
        }
    }

    /// Copy out the current contents, staged rows included.
    #[must_use]
    pub fn snapshot(&self) -> DatabaseSnapshot {
        self.state.borrow().snapshot.clone()
    }

    /// Create a table with no rows. No-op if it exists.
    pub fn create_table(&self, table: &str) {
        self.state
            .borrow_mut()
            .snapshot
            .tables
            .entry(table.to_string())
            .or_default();
    }

    /// Create an empty rule table.
    pub fn create_rule_table(&self) {
        self.create_table(RULE_TABLE);
    }

    /// Append a row, creating the table if needed.
    pub fn insert_row(&self, table: &str, row: TableRow) {
        self.state
            .borrow_mut()
            .snapshot
            .tables
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    /// Append a rule to the rule table.
    pub fn insert_rule(&self, rule: &RegistryKeyRemovalRule) {
        self.state.borrow_mut().snapshot.insert_rule(rule);
    }

    /// Script the outcome of a condition expression.
    pub fn set_condition(&self, expression: &str, outcome: ConditionOutcome) {
        self.state
            .borrow_mut()
            .snapshot
            .conditions
            .insert(expression.to_string(), outcome);
    }

    /// Adjust the fault plan.
    pub fn faults(&self, configure: impl FnOnce(&mut FaultPlan)) {
        configure(&mut self.state.borrow_mut().faults);
    }

    /// Rows staged in one table, in append order.
    #[must_use]
    pub fn staged_rows(&self, table: &str) -> Vec<StagedCells> {
        self.state
            .borrow()
            .snapshot
            .staged
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Rows staged across all tables.
    #[must_use]
    pub fn staged_count(&self) -> usize {
        self.state.borrow().snapshot.staged_count()
    }

    /// Views and staging tables currently open.
    #[must_use]
    pub fn open_handles(&self) -> usize {
        self.state.borrow().counters.open_handles
    }

    /// Views opened so far.
    #[must_use]
    pub fn views_opened(&self) -> usize {
        self.state.borrow().counters.views_opened
    }

    /// Staging tables opened so far.
    #[must_use]
    pub fn staging_opens(&self) -> usize {
        self.state.borrow().counters.staging_opens
    }

    /// Condition expressions sent to the engine so far.
    #[must_use]
    pub fn condition_evaluations(&self) -> usize {
        self.state.borrow().counters.condition_evaluations
    }
}

impl InstallerEngine for MemoryDatabase {
    type View = MemoryView;
    type Staging = MemoryStaging;

    fn table_exists(&self, table: &str) -> Result<bool, KeysweepError> {
        let state = self.state.borrow();
        if state.faults.fail_table_check {
            return Err(KeysweepError::IoError(format!(
                "Failed to check for table {}",
                table
            )));
        }
        Ok(state.snapshot.tables.contains_key(table))
    }

    fn open_view(&self, query: &ViewQuery) -> Result<MemoryView, KeysweepError> {
        let mut state = self.state.borrow_mut();
        if state.faults.fail_open_view {
            return Err(KeysweepError::ViewOpen {
                table: query.table.clone(),
                reason: "injected fault".to_string(),
            });
        }

        let rows = state
            .snapshot
            .tables
            .get(&query.table)
            .ok_or_else(|| KeysweepError::ViewOpen {
                table: query.table.clone(),
                reason: "no such table".to_string(),
            })?
            .iter()
            .map(|row| Record::new(project_row(row, &query.columns)))
            .collect();

        state.counters.views_opened += 1;
        state.counters.open_handles += 1;
        drop(state);

        Ok(MemoryView {
            rows,
            state: Rc::clone(&self.state),
        })
    }

    fn evaluate_condition(&self, expression: &str) -> ConditionOutcome {
        let mut state = self.state.borrow_mut();
        state.counters.condition_evaluations += 1;
        state
            .snapshot
            .conditions
            .get(expression)
            .copied()
            .unwrap_or(ConditionOutcome::Invalid)
    }

    fn open_staging(
        &self,
        table: &str,
        column_count: usize,
    ) -> Result<MemoryStaging, KeysweepError> {
        let mut state = self.state.borrow_mut();
        if state.faults.fail_open_staging.as_deref() == Some(table) {
            return Err(KeysweepError::StagingOpen {
                table: table.to_string(),
                reason: "injected fault".to_string(),
            });
        }

        state.counters.staging_opens += 1;
        state.counters.open_handles += 1;
        drop(state);

        Ok(MemoryStaging {
            table: table.to_string(),
            column_count,
            state: Rc::clone(&self.state),
        })
    }
}

// =============================================================================
// HANDLES
// =============================================================================

/// Cursor over a projected copy of a table.
#[derive(Debug)]
pub struct MemoryView {
    rows: VecDeque<Record>,
    state: Shared,
}

impl RecordView for MemoryView {
    fn fetch(&mut self) -> Result<Option<Record>, KeysweepError> {
        let mut state = self.state.borrow_mut();
        state.counters.fetches += 1;
        if state.faults.fail_fetch_at == Some(state.counters.fetches) {
            return Err(KeysweepError::Fetch(format!(
                "injected fault at fetch {}",
                state.counters.fetches
            )));
        }
        Ok(self.rows.pop_front())
    }
}

impl Drop for MemoryView {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.counters.open_handles = state.counters.open_handles.saturating_sub(1);
    }
}

/// Append handle to one in-memory staging table.
#[derive(Debug)]
pub struct MemoryStaging {
    table: String,
    column_count: usize,
    state: Shared,
}

impl StagingTable for MemoryStaging {
    fn table(&self) -> &str {
        &self.table
    }

    fn append(&mut self, values: &[Option<FieldValue>]) -> Result<(), KeysweepError> {
        let mut state = self.state.borrow_mut();
        state.counters.appends += 1;
        if state.faults.fail_append_at == Some(state.counters.appends) {
            return Err(KeysweepError::IoError("injected append fault".to_string()));
        }
        if values.len() != self.column_count {
            return Err(KeysweepError::ColumnCount {
                table: self.table.clone(),
                expected: self.column_count,
                actual: values.len(),
            });
        }

        // Column 1 is the staging table's primary key.
        if let Some(key) = values.first().and_then(Option::as_ref) {
            let taken = state.snapshot.staged.get(&self.table).is_some_and(|rows| {
                rows.iter()
                    .any(|row| row.first().and_then(Option::as_ref) == Some(key))
            });
            if taken {
                return Err(KeysweepError::DuplicateKey {
                    table: self.table.clone(),
                    key: key.to_string(),
                });
            }
        }

        state
            .snapshot
            .staged
            .entry(self.table.clone())
            .or_default()
            .push(values.to_vec());
        Ok(())
    }
}

impl Drop for MemoryStaging {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.counters.open_handles = state.counters.open_handles.saturating_sub(1);
    }
}

// =============================================================================
// TESTS
// =============================================================================
