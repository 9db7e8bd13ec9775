//! # Fixed Names and Layouts
//!
//! Table names, column positions and sentinels shared by the loader, the
//! translator and the bundled engines. These are part of the installer's
//! database schema and never change at runtime.

/// Name of the custom action that runs the removal pass.
pub const ACTION_NAME: &str = "WixRemoveRegistryKeyEx";

/// The author-supplied rule table.
pub const RULE_TABLE: &str = "WixRemoveRegistryKeyEx";

/// Columns selected from the rule table, in cursor order.
///
/// The first column shares its name with the table, as the installer schema
/// uses the table name for its primary key column.
pub const RULE_COLUMNS: [&str; 6] = [
    "WixRemoveRegistryKeyEx",
    "Component_",
    "Root",
    "Key",
    "InstallMode",
    "Condition",
];

// =============================================================================
// RULE COLUMN POSITIONS (1-based, as the engine's record accessors expect)
// =============================================================================

pub const COL_ID: usize = 1;
pub const COL_COMPONENT: usize = 2;
pub const COL_ROOT: usize = 3;
pub const COL_KEY: usize = 4;
pub const COL_MODE: usize = 5;
pub const COL_CONDITION: usize = 6;

// =============================================================================
// STAGING TABLES
// =============================================================================

/// Rows here are removed while the product installs.
pub const REMOVE_REGISTRY_TABLE: &str = "RemoveRegistry";

/// `RemoveRegistry`, Root, Key, Name, Component_.
pub const REMOVE_REGISTRY_COLUMN_COUNT: usize = 5;

/// Rows here are written on install and removed on uninstall.
pub const REGISTRY_TABLE: &str = "Registry";

/// `Registry`, Root, Key, Name, Value, Component_.
pub const REGISTRY_COLUMN_COUNT: usize = 6;

/// Name-slot value that addresses the whole key rather than a named value.
pub const WHOLE_KEY_SENTINEL: &str = "-";

// =============================================================================
// PROCESS RESULT CODES
// =============================================================================

/// `ERROR_SUCCESS`.
pub const EXIT_SUCCESS: u32 = 0;

/// `ERROR_INSTALL_FAILURE`.
pub const EXIT_INSTALL_FAILURE: u32 = 1603;

// =============================================================================
// SNAPSHOT FORMAT
// =============================================================================

/// Current version of the JSON database snapshot format.
///
/// Increment this when making breaking changes to the snapshot layout.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Maximum accepted snapshot size (64 MB), checked before parsing.
pub const MAX_SNAPSHOT_SIZE: usize = 64 * 1024 * 1024;
