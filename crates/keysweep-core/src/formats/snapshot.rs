//! # Database Snapshot Format
//!
//! A JSON image of the parts of an installer database the removal pass
//! touches: named tables, scripted condition outcomes, and staged rows.
//!
//! ```json
//! {
//!   "version": 1,
//!   "tables": {
//!     "WixRemoveRegistryKeyEx": [
//!       { "WixRemoveRegistryKeyEx": "R1", "Component_": "C1", "Root": 2,
//!         "Key": "SOFTWARE\\X", "InstallMode": 1, "Condition": null }
//!     ]
//!   },
//!   "conditions": { "VersionNT >= 600": "true" },
//!   "staged": {}
//! }
//! ```
//!
//! Rows are column-name maps; a missing column and `null` are both nulls.
//! Row order in the array is storage order.
//!
//! Size and version are validated before the payload is trusted.

use crate::primitives::{MAX_SNAPSHOT_SIZE, RULE_COLUMNS, RULE_TABLE, SNAPSHOT_FORMAT_VERSION};
use crate::{ConditionOutcome, FieldValue, KeysweepError, RegistryKeyRemovalRule};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One stored row, keyed by column name.
pub type TableRow = BTreeMap<String, Option<FieldValue>>;

/// One staged row, positional.
pub type StagedCells = Vec<Option<FieldValue>>;

/// Serializable image of an installer database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    pub version: u32,
    #[serde(default)]
    pub tables: BTreeMap<String, Vec<TableRow>>,
    /// Outcome per condition expression. Unlisted expressions are `Invalid`.
    #[serde(default)]
    pub conditions: BTreeMap<String, ConditionOutcome>,
    #[serde(default)]
    pub staged: BTreeMap<String, Vec<StagedCells>>,
}

impl Default for DatabaseSnapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_FORMAT_VERSION,
            tables: BTreeMap::new(),
            conditions: BTreeMap::new(),
            staged: BTreeMap::new(),
        }
    }
}

impl DatabaseSnapshot {
    /// Create an empty snapshot at the current format version.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule to the rule table, creating the table if needed.
    pub fn insert_rule(&mut self, rule: &RegistryKeyRemovalRule) {
        self.tables
            .entry(RULE_TABLE.to_string())
            .or_default()
            .push(rule_row(rule));
    }

    /// Number of staged rows across all staging tables.
    #[must_use]
    pub fn staged_count(&self) -> usize {
        self.staged.values().map(Vec::len).sum()
    }

    /// Parse a snapshot from JSON text.
    ///
    /// Rejects oversized input before parsing and unknown versions after.
    pub fn from_json(text: &str) -> Result<Self, KeysweepError> {
        if text.len() > MAX_SNAPSHOT_SIZE {
            return Err(KeysweepError::DeserializationError(format!(
                "Snapshot size {} bytes exceeds maximum allowed {} bytes",
                text.len(),
                MAX_SNAPSHOT_SIZE
            )));
        }

        let snapshot: Self = serde_json::from_str(text)
            .map_err(|e| KeysweepError::DeserializationError(e.to_string()))?;

        if snapshot.version != SNAPSHOT_FORMAT_VERSION {
            return Err(KeysweepError::DeserializationError(format!(
                "Unsupported snapshot version: {} (expected {})",
                snapshot.version, SNAPSHOT_FORMAT_VERSION
            )));
        }
        Ok(snapshot)
    }

    /// Render the snapshot as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, KeysweepError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| KeysweepError::SerializationError(e.to_string()))
    }
}

/// Encode a rule as a rule-table row.
#[must_use]
pub fn rule_row(rule: &RegistryKeyRemovalRule) -> TableRow {
    let condition = (!rule.condition.is_empty()).then(|| FieldValue::string(&rule.condition));
    let cells = [
        Some(FieldValue::string(&rule.id)),
        Some(FieldValue::string(&rule.component)),
        Some(FieldValue::Integer(rule.root.value())),
        Some(FieldValue::string(&rule.key)),
        Some(FieldValue::Integer(rule.mode.raw())),
        condition,
    ];
    RULE_COLUMNS
        .iter()
        .map(|c| (*c).to_string())
        .zip(cells)
        .collect()
}

/// Project a stored row onto an ordered column list.
#[must_use]
pub fn project_row(row: &TableRow, columns: &[String]) -> StagedCells {
    columns
        .iter()
        .map(|c| row.get(c).cloned().flatten())
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================
