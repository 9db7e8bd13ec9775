//! # Removal Pass Tier Tests (T0-T3)
//!
//! If ANY tier fails, the translation is INVALID.
//!
//! ## Tiers
//! - T0: Rule Loading
//! - T1: Condition Gating
//! - T2: Translation
//! - T3: Pass Lifecycle & Aborts

use keysweep_core::primitives::RULE_TABLE;
use keysweep_core::{
    ActionStatus, ConditionOutcome, FieldValue, KeysweepError, MemoryDatabase, PassState,
    RedbDatabase, RegistryKeyRemovalRule, RegistryRoot, RemovalMode, RemovalPass, TableRow,
    run_custom_action, run_removal_pass,
};

// =============================================================================
// HELPERS
// =============================================================================

fn rule(
    id: &str,
    component: &str,
    root: i32,
    key: &str,
    mode: i32,
    condition: &str,
) -> RegistryKeyRemovalRule {
    RegistryKeyRemovalRule {
        id: id.into(),
        component: component.into(),
        root: RegistryRoot(root),
        key: key.into(),
        mode: RemovalMode::from_raw(mode),
        condition: condition.into(),
    }
}

fn s(v: &str) -> Option<FieldValue> {
    Some(FieldValue::string(v))
}

fn i(v: i32) -> Option<FieldValue> {
    Some(FieldValue::Integer(v))
}

/// A raw rule row with chosen columns left out.
fn raw_row(cells: &[(&str, Option<FieldValue>)]) -> TableRow {
    cells
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

// =============================================================================
// TIER T0: RULE LOADING
// =============================================================================

mod t0_rule_loading {
    use super::*;

    /// T0.1: No rule table means nothing happens at all.
    #[test]
    fn absent_table_touches_nothing() {
        let db = MemoryDatabase::new();
        let report = run_removal_pass(&db).expect("run");

        assert_eq!(report.state, PassState::TableMissing);
        assert!(report.staged.is_empty());
        assert_eq!(db.views_opened(), 0);
        assert_eq!(db.staging_opens(), 0);
        assert_eq!(db.condition_evaluations(), 0);
        assert_eq!(db.staged_count(), 0);
    }

    /// T0.2: Rows are processed in storage order, not sorted.
    #[test]
    fn storage_order_is_preserved() {
        let db = MemoryDatabase::new();
        for id in ["Zeta", "Alpha", "Mid"] {
            db.insert_rule(&rule(id, "C", 2, "K", 1, ""));
        }
        let report = run_removal_pass(&db).expect("run");
        let ids: Vec<_> = report.staged.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["Zeta", "Alpha", "Mid"]);
    }

    /// T0.3: Integer columns stored as numeric text still load.
    #[test]
    fn numeric_text_columns_load() {
        let db = MemoryDatabase::new();
        db.insert_row(
            RULE_TABLE,
            raw_row(&[
                (RULE_TABLE, s("R1")),
                ("Component_", s("C1")),
                ("Root", s("2")),
                ("Key", s("SOFTWARE\\X")),
                ("InstallMode", s("1")),
            ]),
        );
        let report = run_removal_pass(&db).expect("run");
        assert_eq!(report.staged.len(), 1);
        assert_eq!(db.staged_rows("RemoveRegistry")[0][1], i(2));
    }

    /// T0.4: A missing required column aborts the whole pass.
    #[test]
    fn missing_required_column_aborts() {
        for missing in ["Component_", "Root", "Key", "InstallMode"] {
            let db = MemoryDatabase::new();
            let mut cells = vec![
                (RULE_TABLE, s("R1")),
                ("Component_", s("C1")),
                ("Root", i(2)),
                ("Key", s("K")),
                ("InstallMode", i(1)),
            ];
            cells.retain(|(k, _)| *k != missing);
            db.insert_row(RULE_TABLE, raw_row(&cells));

            let result = run_removal_pass(&db);
            assert!(
                matches!(result, Err(KeysweepError::MissingField { .. })),
                "missing {} should abort",
                missing
            );
            assert_eq!(db.open_handles(), 0);
        }
    }
}

// =============================================================================
// TIER T1: CONDITION GATING
// =============================================================================

mod t1_condition_gating {
    use super::*;

    /// T1.1: Scenario R2, true condition, schedules removal on uninstall.
    #[test]
    fn true_condition_stages_registry_row() {
        let db = MemoryDatabase::new();
        db.insert_rule(&rule("R2", "C2", 0, "SOFTWARE\\Y", 2, "VersionNT >= 600"));
        db.set_condition("VersionNT >= 600", ConditionOutcome::True);

        let report = run_removal_pass(&db).expect("run");

        assert_eq!(report.state, PassState::Done);
        assert_eq!(
            db.staged_rows("Registry"),
            vec![vec![s("R2"), i(0), s("SOFTWARE\\Y"), s("-"), None, s("C2")]]
        );
        assert!(db.staged_rows("RemoveRegistry").is_empty());
    }

    /// T1.2: Scenario R2, false condition, stages nothing but succeeds.
    #[test]
    fn false_condition_stages_nothing() {
        let db = MemoryDatabase::new();
        db.insert_rule(&rule("R2", "C2", 0, "SOFTWARE\\Y", 2, "VersionNT >= 600"));
        db.set_condition("VersionNT >= 600", ConditionOutcome::False);

        let report = run_removal_pass(&db).expect("run");

        assert_eq!(report.state, PassState::Done);
        assert_eq!(db.staged_count(), 0);
        assert_eq!(report.skipped.len(), 1);
    }

    /// T1.3: Invalid conditions skip exactly like false ones, in both modes.
    #[test]
    fn invalid_condition_skips_both_modes() {
        let db = MemoryDatabase::new();
        db.insert_rule(&rule("A", "C", 2, "K1", 1, "(((broken"));
        db.insert_rule(&rule("B", "C", 2, "K2", 2, "(((broken"));

        let report = run_removal_pass(&db).expect("run");

        assert_eq!(report.rules_read, 2);
        assert_eq!(db.staged_count(), 0);
        assert_eq!(db.staging_opens(), 0);
    }

    /// T1.4: Empty conditions are never sent to the engine.
    #[test]
    fn empty_condition_not_evaluated() {
        let db = MemoryDatabase::new();
        db.insert_rule(&rule("A", "C", 2, "K", 1, ""));
        run_removal_pass(&db).expect("run");
        assert_eq!(db.condition_evaluations(), 0);
        assert_eq!(db.staged_count(), 1);
    }
}

// =============================================================================
// TIER T2: TRANSLATION
// =============================================================================

mod t2_translation {
    use super::*;

    /// T2.1: Scenario R1 removes the key during install.
    #[test]
    fn remove_on_install_row() {
        let db = MemoryDatabase::new();
        db.insert_rule(&rule("R1", "C1", 2, "SOFTWARE\\X", 1, ""));

        run_removal_pass(&db).expect("run");

        assert_eq!(
            db.staged_rows("RemoveRegistry"),
            vec![vec![s("R1"), i(2), s("SOFTWARE\\X"), s("-"), s("C1")]]
        );
        assert!(db.staged_rows("Registry").is_empty());
    }

    /// T2.2: Unknown modes stage nothing and raise nothing.
    #[test]
    fn unknown_modes_are_skipped() {
        let db = MemoryDatabase::new();
        for (n, mode) in [0, 3, -1, 255].into_iter().enumerate() {
            db.insert_rule(&rule(&format!("R{}", n), "C", 2, "K", mode, ""));
        }

        let report = run_removal_pass(&db).expect("run");

        assert_eq!(report.state, PassState::Done);
        assert_eq!(report.rules_read, 4);
        assert_eq!(report.skipped.len(), 4);
        assert_eq!(db.staging_opens(), 0);
    }

    /// T2.3: Fields are copied verbatim, including odd roots and paths.
    #[test]
    fn fields_copied_verbatim() {
        let db = MemoryDatabase::new();
        db.insert_rule(&rule(
            "Odd.Id_1",
            "Comp.With.Dots",
            -1,
            "Software\\Vendor\\Product Name\\",
            2,
            "",
        ));

        run_removal_pass(&db).expect("run");

        let rows = db.staged_rows("Registry");
        assert_eq!(rows[0][0], s("Odd.Id_1"));
        assert_eq!(rows[0][1], i(-1));
        assert_eq!(rows[0][2], s("Software\\Vendor\\Product Name\\"));
        assert_eq!(rows[0][5], s("Comp.With.Dots"));
    }
}

// =============================================================================
// TIER T3: PASS LIFECYCLE & ABORTS
// =============================================================================

mod t3_lifecycle {
    use super::*;

    /// T3.1: A row missing `Key` stops the scan; later valid rows are not staged.
    #[test]
    fn missing_key_stops_later_rows() {
        let db = MemoryDatabase::new();
        db.insert_rule(&rule("First", "C", 2, "K1", 1, ""));
        db.insert_row(
            RULE_TABLE,
            raw_row(&[
                (RULE_TABLE, s("Broken")),
                ("Component_", s("C")),
                ("Root", i(2)),
                ("InstallMode", i(1)),
            ]),
        );
        db.insert_rule(&rule("Later", "C", 2, "K3", 1, ""));
        db.insert_rule(&rule("Later2", "C", 2, "K4", 2, ""));

        let mut pass = RemovalPass::new(&db);
        let err = pass.run().expect_err("abort");

        assert!(err.to_string().contains("key"));
        assert_eq!(pass.state(), PassState::Aborted);
        let staged = db.staged_rows("RemoveRegistry");
        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0][0], s("First"));
        assert!(db.staged_rows("Registry").is_empty());
        drop(pass);
        assert_eq!(db.open_handles(), 0);
    }

    /// T3.2: Fetch failures abort and release handles.
    #[test]
    fn fetch_failure_aborts() {
        let db = MemoryDatabase::new();
        db.insert_rule(&rule("A", "C", 2, "K", 1, ""));
        db.insert_rule(&rule("B", "C", 2, "K", 1, ""));
        db.faults(|f| f.fail_fetch_at = Some(2));

        let outcome = run_custom_action(&db);

        assert_eq!(outcome.status, ActionStatus::InstallFailure);
        assert_eq!(outcome.status.exit_code(), 1603);
        assert_eq!(outcome.report.staged.len(), 1);
        assert_eq!(db.open_handles(), 0);
    }

    /// T3.3: View open failures abort before any row.
    #[test]
    fn view_open_failure_aborts() {
        let db = MemoryDatabase::new();
        db.insert_rule(&rule("A", "C", 2, "K", 1, ""));
        db.faults(|f| f.fail_open_view = true);

        let outcome = run_custom_action(&db);

        assert_eq!(outcome.status, ActionStatus::InstallFailure);
        assert_eq!(outcome.report.rules_read, 0);
        assert_eq!(db.staged_count(), 0);
    }

    /// T3.4: Staging open failure on the second table keeps the first table's rows.
    #[test]
    fn staging_open_failure_keeps_earlier_rows() {
        let db = MemoryDatabase::new();
        db.insert_rule(&rule("A", "C", 2, "K", 1, ""));
        db.insert_rule(&rule("B", "C", 2, "K", 2, ""));
        db.faults(|f| f.fail_open_staging = Some("Registry".into()));

        let outcome = run_custom_action(&db);

        assert_eq!(outcome.status, ActionStatus::InstallFailure);
        assert_eq!(db.staged_rows("RemoveRegistry").len(), 1);
        assert_eq!(db.open_handles(), 0);
    }

    /// T3.5: The persistent engine runs the same scenarios.
    #[test]
    fn redb_engine_end_to_end() {
        let temp = tempfile::tempdir().expect("temp dir");
        let db = RedbDatabase::open(temp.path().join("install.redb")).expect("open");
        db.insert_rule(&rule("R1", "C1", 2, "SOFTWARE\\X", 1, ""))
            .expect("insert");
        db.insert_rule(&rule("R2", "C2", 0, "SOFTWARE\\Y", 2, "VersionNT >= 600"))
            .expect("insert");
        db.insert_rule(&rule("R3", "C3", 0, "SOFTWARE\\Z", 2, "Installed"))
            .expect("insert");
        db.set_condition("VersionNT >= 600", ConditionOutcome::True)
            .expect("condition");
        db.set_condition("Installed", ConditionOutcome::False)
            .expect("condition");

        let outcome = run_custom_action(&db);

        assert_eq!(outcome.status, ActionStatus::Success);
        assert_eq!(
            db.staged_rows("RemoveRegistry").expect("rows"),
            vec![vec![s("R1"), i(2), s("SOFTWARE\\X"), s("-"), s("C1")]]
        );
        assert_eq!(
            db.staged_rows("Registry").expect("rows"),
            vec![vec![s("R2"), i(0), s("SOFTWARE\\Y"), s("-"), None, s("C2")]]
        );
    }

    /// T3.6: The persistent engine with no rule table is a clean no-op.
    #[test]
    fn redb_engine_without_rule_table() {
        let temp = tempfile::tempdir().expect("temp dir");
        let db = RedbDatabase::open(temp.path().join("install.redb")).expect("open");

        let report = run_removal_pass(&db).expect("run");

        assert_eq!(report.state, PassState::TableMissing);
        assert!(db.all_staged().expect("staged").is_empty());
    }

    /// T3.7: A repeated rule id is a duplicate staging key; the pass aborts
    /// on the second row and keeps the first.
    #[test]
    fn duplicate_id_aborts_on_second_row() {
        let db = MemoryDatabase::new();
        db.insert_rule(&rule("R1", "C", 2, "K1", 1, ""));
        db.insert_rule(&rule("R1", "C", 2, "K2", 1, ""));
        db.insert_rule(&rule("R3", "C", 2, "K3", 1, ""));

        let outcome = run_custom_action(&db);

        assert_eq!(outcome.status, ActionStatus::InstallFailure);
        assert_eq!(outcome.report.state, PassState::Aborted);
        assert_eq!(
            db.staged_rows("RemoveRegistry"),
            vec![vec![s("R1"), i(2), s("K1"), s("-"), s("C")]]
        );
        assert!(outcome.error.expect("error").contains("Duplicate primary key R1"));
        assert_eq!(db.open_handles(), 0);
    }

    /// T3.8: The persistent engine rejects a duplicate id the same way.
    #[test]
    fn redb_duplicate_id_aborts_on_second_row() {
        let temp = tempfile::tempdir().expect("temp dir");
        let db = RedbDatabase::open(temp.path().join("install.redb")).expect("open");
        db.insert_rule(&rule("R1", "C", 2, "K1", 2, ""))
            .expect("insert");
        db.insert_rule(&rule("R1", "C", 2, "K2", 2, ""))
            .expect("insert");

        let result = run_removal_pass(&db);

        assert!(matches!(result, Err(KeysweepError::StagingAppend { .. })));
        let staged = db.staged_rows("Registry").expect("rows");
        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0][2], s("K1"));
    }

    /// T3.9: On abort the persistent engine keeps earlier committed rows and
    /// stages nothing after the failing rule.
    #[test]
    fn redb_missing_key_keeps_committed_rows() {
        let temp = tempfile::tempdir().expect("temp dir");
        let db = RedbDatabase::open(temp.path().join("install.redb")).expect("open");
        db.insert_rule(&rule("First", "C", 2, "K1", 1, ""))
            .expect("insert");
        db.insert_row(
            RULE_TABLE,
            &raw_row(&[
                (RULE_TABLE, s("Broken")),
                ("Component_", s("C")),
                ("Root", i(2)),
                ("InstallMode", i(1)),
            ]),
        )
        .expect("insert raw");
        db.insert_rule(&rule("Later", "C", 2, "K3", 1, ""))
            .expect("insert");

        let result = run_removal_pass(&db);

        assert!(matches!(
            result,
            Err(KeysweepError::MissingField { field: "key", .. })
        ));
        let staged = db.staged_rows("RemoveRegistry").expect("rows");
        assert_eq!(staged, vec![vec![s("First"), i(2), s("K1"), s("-"), s("C")]]);
        assert!(db.staged_rows("Registry").expect("rows").is_empty());
    }
}
