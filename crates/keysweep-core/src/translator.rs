//! # Action Translator
//!
//! Turns an applicable rule into a staging row and appends it.
//!
//! | mode                | staging table    | row                                     |
//! |---------------------|------------------|-----------------------------------------|
//! | `RemoveOnInstall`   | `RemoveRegistry` | `(id, root, key, "-", component)`       |
//! | `RemoveOnUninstall` | `Registry`       | `(id, root, key, "-", null, component)` |
//! | anything else       | none             | none                                    |

use crate::engine::{InstallerEngine, StagingTable};
use crate::{
    KeysweepError, RegistryKeyRemovalRule, RegistryRow, RemovalMode, RemoveRegistryRow, StagedRow,
};

/// What a rule turns into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation {
    /// Append this row.
    Stage(StagedRow),
    /// The mode is neither install nor uninstall; nothing to append.
    UnrecognizedMode(i32),
}

/// Map a rule to its staging row. Pure; dispatches on mode only.
#[must_use]
pub fn translate(rule: &RegistryKeyRemovalRule) -> Translation {
    match rule.mode {
        RemovalMode::RemoveOnInstall => Translation::Stage(StagedRow::RemoveRegistry(
            RemoveRegistryRow {
                id: rule.id.clone(),
                root: rule.root,
                key: rule.key.clone(),
                component: rule.component.clone(),
            },
        )),
        RemovalMode::RemoveOnUninstall => Translation::Stage(StagedRow::Registry(RegistryRow {
            id: rule.id.clone(),
            root: rule.root,
            key: rule.key.clone(),
            component: rule.component.clone(),
        })),
        RemovalMode::Unrecognized(raw) => Translation::UnrecognizedMode(raw),
    }
}

// =============================================================================
// STAGER
// =============================================================================

/// Appends staged rows, opening each staging table on first use.
///
/// Holds at most one handle per table. Dropping the stager releases them.
pub struct Stager<'e, E: InstallerEngine> {
    engine: &'e E,
    remove_registry: Option<E::Staging>,
    registry: Option<E::Staging>,
    appended: usize,
}

impl<'e, E: InstallerEngine> Stager<'e, E> {
    /// Create a stager with no tables open.
    #[must_use]
    pub fn new(engine: &'e E) -> Self {
        Self {
            engine,
            remove_registry: None,
            registry: None,
            appended: 0,
        }
    }

    /// Append one row to its staging table.
    pub fn stage(&mut self, row: &StagedRow) -> Result<(), KeysweepError> {
        let slot = match row {
            StagedRow::RemoveRegistry(_) => &mut self.remove_registry,
            StagedRow::Registry(_) => &mut self.registry,
        };

        let handle = match slot {
            Some(handle) => handle,
            None => slot.insert(self.engine.open_staging(row.table(), row.column_count())?),
        };

        tracing::info!(table = row.table(), "Adding {} row: {}", row.table(), row);

        handle
            .append(&row.to_fields())
            .map_err(|e| KeysweepError::StagingAppend {
                table: handle.table().to_string(),
                rule: row.id().to_string(),
                reason: e.to_string(),
            })?;

        self.appended += 1;
        Ok(())
    }

    /// Rows appended through this stager.
    #[must_use]
    pub fn appended(&self) -> usize {
        self.appended
    }
}

// =============================================================================
// TESTS
// =============================================================================
