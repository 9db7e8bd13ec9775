//! # Rule Loader
//!
//! Reads registry key removal rules from the rule table, one at a time.
//!
//! - A missing rule table is not an error: there is simply nothing to do
//! - Rows come back in storage order, no sorting
//! - A row without id, component, root, key or mode stops the pass
//! - A row without a condition always applies

use crate::engine::{InstallerEngine, Record, RecordView, ViewQuery};
use crate::primitives::{
    COL_COMPONENT, COL_CONDITION, COL_ID, COL_KEY, COL_MODE, COL_ROOT, RULE_COLUMNS, RULE_TABLE,
};
use crate::{KeysweepError, RegistryKeyRemovalRule, RegistryRoot, RemovalMode};

/// The view the loader opens over the rule table.
#[must_use]
pub fn rule_query() -> ViewQuery {
    ViewQuery::select(RULE_TABLE, &RULE_COLUMNS)
}

/// Forward-only reader of rule rows.
///
/// Owns the engine's view; dropping the loader closes the cursor.
pub struct RuleLoader<V> {
    view: V,
    rows_read: usize,
}

impl<V: RecordView> RuleLoader<V> {
    /// Open the rule table.
    ///
    /// Returns `Ok(None)` when the table does not exist.
    pub fn open<E>(engine: &E) -> Result<Option<Self>, KeysweepError>
    where
        E: InstallerEngine<View = V>,
    {
        if !engine.table_exists(RULE_TABLE)? {
            tracing::info!(
                "{} table doesn't exist, so there are no registry keys to remove.",
                RULE_TABLE
            );
            return Ok(None);
        }

        let query = rule_query();
        tracing::debug!(%query, "opening rule view");
        let view = engine.open_view(&query)?;

        Ok(Some(Self { view, rows_read: 0 }))
    }

    /// Fetch the next rule, or `None` at end of data.
    pub fn next_rule(&mut self) -> Result<Option<RegistryKeyRemovalRule>, KeysweepError> {
        let Some(record) = self.view.fetch()? else {
            return Ok(None);
        };
        self.rows_read += 1;
        rule_from_record(&record, self.rows_read).map(Some)
    }

    /// Number of rows fetched so far.
    #[must_use]
    pub fn rows_read(&self) -> usize {
        self.rows_read
    }
}

/// Decode one rule row.
///
/// `ordinal` is the 1-based position of the row in the cursor. It names the
/// row in errors when the id itself is missing.
pub fn rule_from_record(
    record: &Record,
    ordinal: usize,
) -> Result<RegistryKeyRemovalRule, KeysweepError> {
    let id = record
        .string(COL_ID)?
        .ok_or_else(|| KeysweepError::MissingField {
            field: "identity",
            row: format!("#{}", ordinal),
        })?;

    let missing = |field: &'static str| KeysweepError::MissingField {
        field,
        row: id.clone(),
    };

    let condition = record.string(COL_CONDITION)?.unwrap_or_default();
    let component = record
        .string(COL_COMPONENT)?
        .ok_or_else(|| missing("component"))?;
    let root = record.integer(COL_ROOT)?.ok_or_else(|| missing("root"))?;
    let key = record.string(COL_KEY)?.ok_or_else(|| missing("key"))?;
    let mode = record.integer(COL_MODE)?.ok_or_else(|| missing("mode"))?;

    Ok(RegistryKeyRemovalRule {
        id,
        component,
        root: RegistryRoot(root),
        key,
        mode: RemovalMode::from_raw(mode),
        condition,
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FieldValue;

    fn full_record() -> Record {
        Record::new(vec![
            Some(FieldValue::string("R1")),
            Some(FieldValue::string("C1")),
            Some(FieldValue::Integer(2)),
            Some(FieldValue::string("SOFTWARE\\X")),
            Some(FieldValue::Integer(1)),
            None,
        ])
    }

    #[test]
    fn decodes_complete_row() {
        let rule = rule_from_record(&full_record(), 1).expect("decode");
        assert_eq!(rule.id, "R1");
        assert_eq!(rule.component, "C1");
        assert_eq!(rule.root, RegistryRoot::LOCAL_MACHINE);
        assert_eq!(rule.key, "SOFTWARE\\X");
        assert_eq!(rule.mode, RemovalMode::RemoveOnInstall);
        assert_eq!(rule.condition, "");
        assert!(!rule.is_conditional());
    }

    #[test]
    fn missing_key_is_fatal() {
        let mut fields = vec![
            Some(FieldValue::string("R9")),
            Some(FieldValue::string("C9")),
            Some(FieldValue::Integer(2)),
            None,
            Some(FieldValue::Integer(1)),
            None,
        ];
        let err = rule_from_record(&Record::new(fields.clone()), 3).expect_err("fatal");
        assert!(matches!(
            err,
            KeysweepError::MissingField { field: "key", ref row } if row == "R9"
        ));

        fields[3] = Some(FieldValue::string(""));
        assert!(rule_from_record(&Record::new(fields), 3).is_err());
    }

    #[test]
    fn missing_id_names_row_by_position() {
        let mut fields = vec![None; 6];
        fields[1] = Some(FieldValue::string("C1"));
        let err = rule_from_record(&Record::new(fields), 4).expect_err("fatal");
        assert!(matches!(
            err,
            KeysweepError::MissingField { field: "identity", ref row } if row == "#4"
        ));
    }

    #[test]
    fn missing_mode_and_root_are_fatal() {
        let no_mode = Record::new(vec![
            Some(FieldValue::string("R1")),
            Some(FieldValue::string("C1")),
            Some(FieldValue::Integer(2)),
            Some(FieldValue::string("K")),
            None,
            None,
        ]);
        assert!(matches!(
            rule_from_record(&no_mode, 1),
            Err(KeysweepError::MissingField { field: "mode", .. })
        ));

        let no_root = Record::new(vec![
            Some(FieldValue::string("R1")),
            Some(FieldValue::string("C1")),
            None,
            Some(FieldValue::string("K")),
            Some(FieldValue::Integer(2)),
            None,
        ]);
        assert!(matches!(
            rule_from_record(&no_root, 1),
            Err(KeysweepError::MissingField { field: "root", .. })
        ));
    }

    #[test]
    fn unrecognized_mode_is_not_a_load_error() {
        let rec = Record::new(vec![
            Some(FieldValue::string("R3")),
            Some(FieldValue::string("C3")),
            Some(FieldValue::Integer(1)),
            Some(FieldValue::string("K")),
            Some(FieldValue::Integer(5)),
            Some(FieldValue::string("Installed")),
        ]);
        let rule = rule_from_record(&rec, 1).expect("decode");
        assert_eq!(rule.mode, RemovalMode::Unrecognized(5));
        assert!(rule.is_conditional());
    }

    #[test]
    fn short_record_is_fatal() {
        let rec = Record::new(vec![Some(FieldValue::string("R1"))]);
        assert!(matches!(
            rule_from_record(&rec, 1),
            Err(KeysweepError::ColumnOutOfRange { .. })
        ));
    }
}
