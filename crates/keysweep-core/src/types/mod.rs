//! # Core Type Definitions
//!
//! This module contains all core types for the registry key removal pass:
//! - Rule identity and hive selection (`RegistryRoot`, `RemovalMode`)
//! - The rule record itself (`RegistryKeyRemovalRule`)
//! - Engine-facing values (`FieldValue`, `ConditionOutcome`)
//! - Output structures (`StagedRow`, `RemoveRegistryRow`, `RegistryRow`)
//! - Error types (`KeysweepError`)

use crate::primitives::{
    REGISTRY_COLUMN_COUNT, REGISTRY_TABLE, REMOVE_REGISTRY_COLUMN_COUNT, REMOVE_REGISTRY_TABLE,
    WHOLE_KEY_SENTINEL,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// REGISTRY ROOT
// =============================================================================

/// Registry hive selector, stored as the installer's small-integer encoding.
///
/// The value is carried verbatim from the rule table into staged rows.
/// Nothing here validates that it names a real hive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegistryRoot(pub i32);

impl RegistryRoot {
    /// HKCU for per-user installs, HKLM for per-machine installs.
    pub const USER_OR_MACHINE: Self = Self(-1);
    /// HKEY_CLASSES_ROOT.
    pub const CLASSES_ROOT: Self = Self(0);
    /// HKEY_CURRENT_USER.
    pub const CURRENT_USER: Self = Self(1);
    /// HKEY_LOCAL_MACHINE.
    pub const LOCAL_MACHINE: Self = Self(2);
    /// HKEY_USERS.
    pub const USERS: Self = Self(3);

    /// Get the raw integer encoding.
    #[must_use]
    pub const fn value(self) -> i32 {
        self.0
    }

    /// Conventional hive name, if the encoding is one the installer knows.
    #[must_use]
    pub const fn hive_name(self) -> Option<&'static str> {
        match self {
            Self::USER_OR_MACHINE => Some("HKCU/HKLM"),
            Self::CLASSES_ROOT => Some("HKCR"),
            Self::CURRENT_USER => Some("HKCU"),
            Self::LOCAL_MACHINE => Some("HKLM"),
            Self::USERS => Some("HKU"),
            _ => None,
        }
    }
}

impl fmt::Display for RegistryRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// REMOVAL MODE
// =============================================================================

/// When the key is removed.
///
/// The rule table stores this as an integer. Anything other than `1` or `2`
/// is preserved as `Unrecognized` so the pass can report it instead of
/// dropping it on the floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemovalMode {
    /// Remove the key while the product installs.
    RemoveOnInstall,
    /// Register the key so a later uninstall removes it.
    RemoveOnUninstall,
    /// Any other stored value.
    Unrecognized(i32),
}

impl RemovalMode {
    /// Decode the stored integer.
    #[must_use]
    pub const fn from_raw(raw: i32) -> Self {
        match raw {
            1 => Self::RemoveOnInstall,
            2 => Self::RemoveOnUninstall,
            other => Self::Unrecognized(other),
        }
    }

    /// Encode back to the stored integer.
    #[must_use]
    pub const fn raw(self) -> i32 {
        match self {
            Self::RemoveOnInstall => 1,
            Self::RemoveOnUninstall => 2,
            Self::Unrecognized(other) => other,
        }
    }
}

// =============================================================================
// RULE
// =============================================================================

/// One authored "remove this registry key" intent, as read from the rule table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryKeyRemovalRule {
    /// Primary key of the rule row.
    pub id: String,
    /// Component whose install state scopes the rule.
    pub component: String,
    /// Hive selector.
    pub root: RegistryRoot,
    /// Key path; the whole key is removed.
    pub key: String,
    /// Removal timing.
    pub mode: RemovalMode,
    /// Condition expression; empty means the rule always applies.
    pub condition: String,
}

impl RegistryKeyRemovalRule {
    /// True when the rule carries a condition that must be evaluated.
    #[must_use]
    pub fn is_conditional(&self) -> bool {
        !self.condition.is_empty()
    }
}

// =============================================================================
// ENGINE VALUES
// =============================================================================

/// A single non-null cell value exchanged with the installer engine.
///
/// Null cells are represented as `Option::None` around this type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i32),
    String(String),
}

impl FieldValue {
    /// Build a string cell.
    #[must_use]
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{}", i),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// Result of asking the engine to evaluate a condition expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionOutcome {
    True,
    False,
    /// The expression could not be evaluated (syntax error, bad operand).
    Invalid,
}

impl ConditionOutcome {
    /// Only `True` lets a rule through.
    #[must_use]
    pub const fn applies(self) -> bool {
        matches!(self, Self::True)
    }
}

// =============================================================================
// STAGED ROWS
// =============================================================================

/// Immediate removal: a `RemoveRegistry` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveRegistryRow {
    pub id: String,
    pub root: RegistryRoot,
    pub key: String,
    pub component: String,
}

/// Removal on uninstall: a `Registry` row with a null value slot.
///
/// Writing a `Registry` row whose name is `-` ties the whole key to the
/// component, so the engine deletes it when the component is uninstalled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryRow {
    pub id: String,
    pub root: RegistryRoot,
    pub key: String,
    pub component: String,
}

/// A row appended to one of the engine's staging tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StagedRow {
    RemoveRegistry(RemoveRegistryRow),
    Registry(RegistryRow),
}

impl StagedRow {
    /// The staging table this row belongs in.
    #[must_use]
    pub const fn table(&self) -> &'static str {
        match self {
            Self::RemoveRegistry(_) => REMOVE_REGISTRY_TABLE,
            Self::Registry(_) => REGISTRY_TABLE,
        }
    }

    /// Column count of the destination table.
    #[must_use]
    pub const fn column_count(&self) -> usize {
        match self {
            Self::RemoveRegistry(_) => REMOVE_REGISTRY_COLUMN_COUNT,
            Self::Registry(_) => REGISTRY_COLUMN_COUNT,
        }
    }

    /// Root the row removes from.
    #[must_use]
    pub const fn root(&self) -> RegistryRoot {
        match self {
            Self::RemoveRegistry(row) => row.root,
            Self::Registry(row) => row.root,
        }
    }

    /// Id of the rule that produced this row.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::RemoveRegistry(row) => &row.id,
            Self::Registry(row) => &row.id,
        }
    }

    /// Ordered cell values, exactly as appended to the staging table.
    #[must_use]
    pub fn to_fields(&self) -> Vec<Option<FieldValue>> {
        match self {
            Self::RemoveRegistry(row) => vec![
                Some(FieldValue::string(&row.id)),
                Some(FieldValue::Integer(row.root.value())),
                Some(FieldValue::string(&row.key)),
                Some(FieldValue::string(WHOLE_KEY_SENTINEL)),
                Some(FieldValue::string(&row.component)),
            ],
            Self::Registry(row) => vec![
                Some(FieldValue::string(&row.id)),
                Some(FieldValue::Integer(row.root.value())),
                Some(FieldValue::string(&row.key)),
                Some(FieldValue::string(WHOLE_KEY_SENTINEL)),
                None,
                Some(FieldValue::string(&row.component)),
            ],
        }
    }
}

impl fmt::Display for StagedRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RemoveRegistry(row) => write!(
                f,
                "{}/{}/{}/{}/{}",
                row.id, row.root, row.key, WHOLE_KEY_SENTINEL, row.component
            ),
            Self::Registry(row) => write!(
                f,
                "{}/{}/{}/{}/null/{}",
                row.id, row.root, row.key, WHOLE_KEY_SENTINEL, row.component
            ),
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur during a removal pass or in the bundled engines.
///
/// Every variant is fatal to the pass that raised it. Row-level skips are not
/// errors and never appear here.
#[derive(Debug, Error)]
pub enum KeysweepError {
    /// The engine could not open a view over a table.
    #[error("Failed to open view on {table}: {reason}")]
    ViewOpen { table: String, reason: String },

    /// Fetching the next record from an open view failed.
    #[error("Failed to fetch record: {0}")]
    Fetch(String),

    /// A column index outside the record was requested.
    #[error("Column {column} out of range (record has {count} columns)")]
    ColumnOutOfRange { column: usize, count: usize },

    /// A column held a value that cannot be read as the requested type.
    #[error("Column {column} is not a valid {expected}")]
    ColumnType {
        column: usize,
        expected: &'static str,
    },

    /// A required column of a rule row was null or empty.
    #[error("Failed to get {field} for rule row {row}")]
    MissingField { field: &'static str, row: String },

    /// The engine could not open a staging table.
    #[error("Failed to open staging table {table}: {reason}")]
    StagingOpen { table: String, reason: String },

    /// Appending a row to a staging table failed.
    #[error("Failed to add {table} row for rule {rule}: {reason}")]
    StagingAppend {
        table: String,
        rule: String,
        reason: String,
    },

    /// A row with the wrong number of cells was offered to a staging table.
    #[error("Staging table {table} expects {expected} columns, got {actual}")]
    ColumnCount {
        table: String,
        expected: usize,
        actual: usize,
    },

    /// A staged row reused a primary key already present in its table.
    #[error("Duplicate primary key {key} in {table}")]
    DuplicateKey { table: String, key: String },

    /// A pass object was run more than once.
    #[error("Removal pass already ran")]
    PassAlreadyRun,

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================
