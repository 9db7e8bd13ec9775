//! # Removal Pass
//!
//! One sequential scan: load a rule, gate it on its condition, translate it,
//! stage the row, then move to the next rule.
//!
//! ```text
//! Idle ──► TableMissing                    (success, nothing touched)
//!   │
//!   └──► Scanning ──► Done                 (success)
//!            │
//!            └──────► Aborted              (first fatal error)
//! ```
//!
//! Rows staged before an abort stay staged. Whether they are discarded is
//! up to the engine's transaction handling.

use crate::condition::ConditionGate;
use crate::engine::InstallerEngine;
use crate::loader::RuleLoader;
use crate::translator::{Stager, Translation, translate};
use crate::{ConditionOutcome, KeysweepError, StagedRow};
use serde::Serialize;

// =============================================================================
// STATE & REPORT
// =============================================================================

/// Lifecycle of a removal pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PassState {
    #[default]
    Idle,
    /// The rule table does not exist.
    TableMissing,
    Scanning,
    Done,
    Aborted,
}

impl PassState {
    /// True for the two successful terminal states.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::TableMissing | Self::Done)
    }
}

/// Why a rule produced no row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    /// The condition evaluated to `False` or `Invalid`.
    Condition(ConditionOutcome),
    /// The mode was neither install nor uninstall.
    UnrecognizedMode(i32),
}

/// A rule that was read but not staged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRule {
    pub id: String,
    pub reason: SkipReason,
}

/// What a pass did. Filled in as the scan progresses, so it is meaningful
/// after an abort as well.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub state: PassState,
    /// Rules decoded successfully.
    pub rules_read: usize,
    /// Rows appended, in staging order.
    pub staged: Vec<StagedRow>,
    pub skipped: Vec<SkippedRule>,
}

impl PassReport {
    /// Staged rows bound for one table.
    pub fn staged_in<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a StagedRow> + 'a {
        self.staged.iter().filter(move |row| row.table() == table)
    }
}

// =============================================================================
// PASS
// =============================================================================

/// A single run of the removal rules against one engine.
pub struct RemovalPass<'e, E: InstallerEngine> {
    engine: &'e E,
    report: PassReport,
}

impl<'e, E: InstallerEngine> RemovalPass<'e, E> {
    /// Create an idle pass.
    #[must_use]
    pub fn new(engine: &'e E) -> Self {
        Self {
            engine,
            report: PassReport::default(),
        }
    }

    /// Run the pass to completion or to the first fatal error.
    ///
    /// A pass runs at most once; a second call fails with
    /// `KeysweepError::PassAlreadyRun` and leaves the report untouched.
    pub fn run(&mut self) -> Result<(), KeysweepError> {
        if self.report.state != PassState::Idle {
            return Err(KeysweepError::PassAlreadyRun);
        }

        self.scan().inspect_err(|e| {
            self.report.state = PassState::Aborted;
            tracing::error!(
                error = %e,
                rules_read = self.report.rules_read,
                staged = self.report.staged.len(),
                "Failure occurred while processing removal rules"
            );
        })
    }

    fn scan(&mut self) -> Result<(), KeysweepError> {
        let Some(mut loader) = RuleLoader::open(self.engine)? else {
            self.report.state = PassState::TableMissing;
            return Ok(());
        };
        self.report.state = PassState::Scanning;

        // Declared after the loader so staging handles close first.
        let mut stager = Stager::new(self.engine);

        while let Some(rule) = loader.next_rule()? {
            self.report.rules_read += 1;

            let outcome = ConditionGate::evaluate(self.engine, &rule);
            if !outcome.applies() {
                self.report.skipped.push(SkippedRule {
                    id: rule.id,
                    reason: SkipReason::Condition(outcome),
                });
                continue;
            }

            match translate(&rule) {
                Translation::Stage(row) => {
                    stager.stage(&row)?;
                    self.report.staged.push(row);
                }
                Translation::UnrecognizedMode(raw) => {
                    tracing::warn!(
                        rule = %rule.id,
                        mode = raw,
                        "Unrecognized install mode {} for row {}; skipping.",
                        raw,
                        rule.id
                    );
                    self.report.skipped.push(SkippedRule {
                        id: rule.id,
                        reason: SkipReason::UnrecognizedMode(raw),
                    });
                }
            }
        }

        tracing::debug!(
            rows = loader.rows_read(),
            staged = stager.appended(),
            "reached end of rule table"
        );
        self.report.state = PassState::Done;
        Ok(())
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> PassState {
        self.report.state
    }

    /// Report so far.
    #[must_use]
    pub fn report(&self) -> &PassReport {
        &self.report
    }

    /// Consume the pass, keeping its report.
    #[must_use]
    pub fn into_report(self) -> PassReport {
        self.report
    }
}

/// Run one removal pass and return its report.
pub fn run_removal_pass<E: InstallerEngine>(engine: &E) -> Result<PassReport, KeysweepError> {
    let mut pass = RemovalPass::new(engine);
    pass.run()?;
    Ok(pass.into_report())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDatabase;
    use crate::{RegistryKeyRemovalRule, RegistryRoot, RemovalMode};

    fn rule(id: &str, mode: i32, condition: &str) -> RegistryKeyRemovalRule {
        RegistryKeyRemovalRule {
            id: id.into(),
            component: format!("C_{}", id),
            root: RegistryRoot::LOCAL_MACHINE,
            key: format!("SOFTWARE\\{}", id),
            mode: RemovalMode::from_raw(mode),
            condition: condition.into(),
        }
    }

    #[test]
    fn missing_table_is_success_without_handles() {
        let db = MemoryDatabase::new();
        let mut pass = RemovalPass::new(&db);
        pass.run().expect("run");
        assert_eq!(pass.state(), PassState::TableMissing);
        assert!(pass.state().is_success());
        assert!(pass.report().staged.is_empty());
        assert_eq!(db.staging_opens(), 0);
        assert_eq!(db.views_opened(), 0);
    }

    #[test]
    fn empty_table_is_done() {
        let db = MemoryDatabase::new();
        db.create_rule_table();
        let report = run_removal_pass(&db).expect("run");
        assert_eq!(report.state, PassState::Done);
        assert_eq!(report.rules_read, 0);
        assert_eq!(db.open_handles(), 0);
    }

    #[test]
    fn mixed_rules_are_filtered_and_translated() {
        let db = MemoryDatabase::new();
        db.insert_rule(&rule("A", 1, ""));
        db.insert_rule(&rule("B", 2, "Installed"));
        db.insert_rule(&rule("C", 1, "NOT Installed"));
        db.insert_rule(&rule("D", 9, ""));
        db.set_condition("Installed", ConditionOutcome::True);
        db.set_condition("NOT Installed", ConditionOutcome::False);

        let report = run_removal_pass(&db).expect("run");

        assert_eq!(report.rules_read, 4);
        let ids: Vec<_> = report.staged.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["A", "B"]);
        assert_eq!(report.staged_in("RemoveRegistry").count(), 1);
        assert_eq!(report.staged_in("Registry").count(), 1);
        assert_eq!(
            report.skipped,
            vec![
                SkippedRule {
                    id: "C".into(),
                    reason: SkipReason::Condition(ConditionOutcome::False),
                },
                SkippedRule {
                    id: "D".into(),
                    reason: SkipReason::UnrecognizedMode(9),
                },
            ]
        );
    }

    #[test]
    fn second_run_is_rejected() {
        let db = MemoryDatabase::new();
        db.insert_rule(&rule("A", 1, ""));
        let mut pass = RemovalPass::new(&db);
        pass.run().expect("first run");
        assert!(matches!(pass.run(), Err(KeysweepError::PassAlreadyRun)));
        assert_eq!(pass.state(), PassState::Done);
        assert_eq!(db.staged_rows("RemoveRegistry").len(), 1);
    }

    #[test]
    fn abort_keeps_partial_report_and_releases_handles() {
        let db = MemoryDatabase::new();
        db.insert_rule(&rule("A", 1, ""));
        db.insert_rule(&rule("B", 1, ""));
        db.insert_rule(&rule("C", 1, ""));
        db.faults(|f| f.fail_append_at = Some(2));

        let mut pass = RemovalPass::new(&db);
        assert!(pass.run().is_err());
        assert_eq!(pass.state(), PassState::Aborted);
        assert_eq!(pass.report().staged.len(), 1);
        assert_eq!(pass.report().rules_read, 2);
        assert_eq!(db.open_handles(), 0);
        assert_eq!(db.staged_rows("RemoveRegistry").len(), 1);
    }

    #[test]
    fn table_check_failure_aborts_from_idle() {
        let db = MemoryDatabase::new();
        db.insert_rule(&rule("A", 1, ""));
        db.faults(|f| f.fail_table_check = true);
        let mut pass = RemovalPass::new(&db);
        assert!(pass.run().is_err());
        assert_eq!(pass.state(), PassState::Aborted);
        assert_eq!(pass.report().rules_read, 0);
    }
}
