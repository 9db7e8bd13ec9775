//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.
//!
//! Each command has a data half (`run_pass`, `status_of`, `staged_of`) that
//! returns values, and a `cmd_*` half that prints them as text or JSON.

use crate::config::{Backend, DatabaseTarget};
use keysweep_core::{
    ActionOutcome, ActionStatus, DatabaseSnapshot, FieldValue, KeysweepError, MemoryDatabase,
    RedbDatabase, RegistryRoot, SkipReason, StagedCells, primitives::MAX_SNAPSHOT_SIZE,
    primitives::RULE_TABLE, run_custom_action,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// =============================================================================
// PATH VALIDATION
// =============================================================================

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), KeysweepError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| KeysweepError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(KeysweepError::DeserializationError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve an input path to an existing regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, KeysweepError> {
    // Canonicalize resolves "..", symlinks, and validates existence
    let canonical = path.canonicalize().map_err(|e| {
        KeysweepError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(KeysweepError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Resolve an output path whose parent directory must already exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, KeysweepError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        KeysweepError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(KeysweepError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| KeysweepError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

/// Fail unless the database file is already there.
fn require_existing(target: &DatabaseTarget) -> Result<(), KeysweepError> {
    if !target.path.exists() {
        return Err(KeysweepError::IoError(format!(
            "Database {:?} does not exist. Use `keysweep init` or `keysweep import` first.",
            target.path
        )));
    }
    Ok(())
}

fn redb_only(target: &DatabaseTarget, command: &str) -> Result<(), KeysweepError> {
    if target.backend != Backend::Redb {
        return Err(KeysweepError::IoError(format!(
            "`{}` requires the redb backend",
            command
        )));
    }
    Ok(())
}

// =============================================================================
// SNAPSHOT FILES
// =============================================================================

/// Read and validate a JSON snapshot file.
pub fn load_snapshot(path: &Path) -> Result<DatabaseSnapshot, KeysweepError> {
    let validated = validate_file_path(path)?;
    validate_file_size(&validated, MAX_SNAPSHOT_SIZE as u64)?;

    let text = std::fs::read_to_string(&validated)
        .map_err(|e| KeysweepError::IoError(format!("Read snapshot: {}", e)))?;
    DatabaseSnapshot::from_json(&text)
}

/// Write a snapshot as pretty JSON.
pub fn save_snapshot(snapshot: &DatabaseSnapshot, path: &Path) -> Result<(), KeysweepError> {
    let validated = validate_output_path(path)?;
    let json = snapshot.to_json()?;
    std::fs::write(&validated, json)
        .map_err(|e| KeysweepError::IoError(format!("Write snapshot: {}", e)))
}

/// Render staged cells the way the installer log shows them.
#[must_use]
pub fn format_cells(cells: &[Option<FieldValue>]) -> String {
    cells
        .iter()
        .map(|cell| match cell {
            Some(value) => value.to_string(),
            None => "null".to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn print_json<T: Serialize>(value: &T) -> Result<(), KeysweepError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| KeysweepError::SerializationError(e.to_string()))?;
    println!("{}", json);
    Ok(())
}

/// Hive label for a root cell, e.g. `HKLM`.
fn hive_label(root: RegistryRoot) -> String {
    root.hive_name()
        .map_or_else(|| format!("root {}", root), str::to_string)
}

// =============================================================================
// RUN COMMAND
// =============================================================================

/// Run the removal custom action against the target database.
///
/// For the snapshot backend the pass runs in memory; `output`, if given,
/// receives the snapshot with the newly staged rows.
pub fn run_pass(
    target: &DatabaseTarget,
    output: Option<&Path>,
) -> Result<ActionOutcome, KeysweepError> {
    require_existing(target)?;

    match target.backend {
        Backend::Snapshot => {
            let db = MemoryDatabase::from_snapshot(load_snapshot(&target.path)?);
            let outcome = run_custom_action(&db);
            if let Some(path) = output {
                save_snapshot(&db.snapshot(), path)?;
                tracing::info!(path = %path.display(), "wrote snapshot");
            }
            Ok(outcome)
        }
        Backend::Redb => {
            if output.is_some() {
                return Err(KeysweepError::IoError(
                    "--output is only supported with the snapshot backend".to_string(),
                ));
            }
            let db = RedbDatabase::open(&target.path)?;
            Ok(run_custom_action(&db))
        }
    }
}

/// Execute the removal pass and print what it staged.
pub fn cmd_run(
    target: &DatabaseTarget,
    json_mode: bool,
    output: Option<&Path>,
) -> Result<ActionStatus, KeysweepError> {
    let outcome = run_pass(target, output)?;

    if json_mode {
        print_json(&outcome)?;
        return Ok(outcome.status);
    }

    let report = &outcome.report;
    println!("Keysweep Removal Pass");
    println!("=====================");
    println!("Database: {:?}", target.path);
    println!("Backend:  {}", target.backend.name());
    println!("State:    {:?}", report.state);
    println!();
    println!("Rules read: {}", report.rules_read);
    println!("Staged:     {}", report.staged.len());
    println!("Skipped:    {}", report.skipped.len());

    if !report.staged.is_empty() {
        println!();
        for row in &report.staged {
            println!("  {:<15} {:<9} {}", row.table(), hive_label(row.root()), row);
        }
    }

    if !report.skipped.is_empty() {
        println!();
        for skipped in &report.skipped {
            let reason = match skipped.reason {
                SkipReason::Condition(outcome) => format!("condition {:?}", outcome),
                SkipReason::UnrecognizedMode(raw) => format!("unrecognized mode {}", raw),
            };
            println!("  skipped {} ({})", skipped.id, reason);
        }
    }

    if let Some(error) = &outcome.error {
        println!();
        println!("Error: {}", error);
    }
    println!();
    let code = outcome.status.exit_code();
    println!("Result:      {:?} ({})", outcome.status, code);
    println!("Exit status: {}", super::exit_status(code));

    Ok(outcome.status)
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// What `status` reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub database: String,
    pub backend: &'static str,
    /// Rows in the rule table, `None` if the table is absent.
    pub rule_count: Option<usize>,
    pub staged: BTreeMap<String, usize>,
}

/// Inspect the target database.
pub fn status_of(target: &DatabaseTarget) -> Result<StatusSummary, KeysweepError> {
    require_existing(target)?;

    let (rule_count, staged) = match target.backend {
        Backend::Snapshot => {
            let snapshot = load_snapshot(&target.path)?;
            (
                snapshot.tables.get(RULE_TABLE).map(Vec::len),
                snapshot.staged,
            )
        }
        Backend::Redb => {
            let db = RedbDatabase::open(&target.path)?;
            (db.row_count(RULE_TABLE)?, db.all_staged()?)
        }
    };

    Ok(StatusSummary {
        database: target.path.to_string_lossy().into_owned(),
        backend: target.backend.name(),
        rule_count,
        staged: staged
            .into_iter()
            .map(|(table, rows)| (table, rows.len()))
            .collect(),
    })
}

/// Show rule table and staging status.
pub fn cmd_status(target: &DatabaseTarget, json_mode: bool) -> Result<(), KeysweepError> {
    let summary = status_of(target)?;

    if json_mode {
        print_json(&summary)?;
        return Ok(());
    }

    println!("Keysweep Status");
    println!("===============");
    println!("Database: {}", summary.database);
    println!("Backend:  {}", summary.backend);
    println!();
    match summary.rule_count {
        Some(count) => println!("Rule table:  {} ({} rows)", RULE_TABLE, count),
        None => println!("Rule table:  {} (absent)", RULE_TABLE),
    }
    if summary.staged.is_empty() {
        println!("Staged rows: none");
    } else {
        for (table, count) in &summary.staged {
            println!("Staged rows: {:<15} {}", table, count);
        }
    }

    Ok(())
}

// =============================================================================
// STAGED COMMAND
// =============================================================================

/// Staged rows of the target database, grouped by staging table.
pub fn staged_of(
    target: &DatabaseTarget,
) -> Result<BTreeMap<String, Vec<StagedCells>>, KeysweepError> {
    require_existing(target)?;

    match target.backend {
        Backend::Snapshot => Ok(load_snapshot(&target.path)?.staged),
        Backend::Redb => RedbDatabase::open(&target.path)?.all_staged(),
    }
}

/// List staged rows.
pub fn cmd_staged(target: &DatabaseTarget, json_mode: bool) -> Result<(), KeysweepError> {
    let staged = staged_of(target)?;

    if json_mode {
        print_json(&staged)?;
        return Ok(());
    }

    if staged.is_empty() {
        println!("No staged rows.");
        return Ok(());
    }
    for (table, rows) in &staged {
        println!("{} ({} rows)", table, rows.len());
        for cells in rows {
            let hive = match cells.get(1) {
                Some(Some(FieldValue::Integer(root))) => hive_label(RegistryRoot(*root)),
                _ => "?".to_string(),
            };
            println!("  {:<9} {}", hive, format_cells(cells));
        }
    }
    Ok(())
}

/// Drop every staged row.
pub fn cmd_clear_staged(target: &DatabaseTarget) -> Result<(), KeysweepError> {
    require_existing(target)?;

    match target.backend {
        Backend::Snapshot => {
            let mut snapshot = load_snapshot(&target.path)?;
            let cleared = snapshot.staged_count();
            snapshot.staged.clear();
            save_snapshot(&snapshot, &target.path)?;
            println!("Cleared {} staged rows", cleared);
        }
        Backend::Redb => {
            RedbDatabase::open(&target.path)?.clear_staged()?;
            println!("Cleared staged rows in {:?}", target.path);
        }
    }
    Ok(())
}

// =============================================================================
// IMPORT COMMAND
// =============================================================================

/// Import a snapshot file into the target database.
///
/// The redb backend replaces the tables named in the snapshot. The snapshot
/// backend validates the input and writes it to the database path.
pub fn cmd_import(target: &DatabaseTarget, input: &Path) -> Result<(), KeysweepError> {
    let snapshot = load_snapshot(input)?;

    match target.backend {
        Backend::Redb => {
            let db = RedbDatabase::open(&target.path)?;
            db.import_snapshot(&snapshot)?;
        }
        Backend::Snapshot => save_snapshot(&snapshot, &target.path)?,
    }

    println!(
        "Imported snapshot: {} tables, {} conditions, {} staged rows",
        snapshot.tables.len(),
        snapshot.conditions.len(),
        snapshot.staged_count()
    );
    Ok(())
}

// =============================================================================
// EXPORT COMMAND
// =============================================================================

/// Write the whole target database out as a snapshot file.
pub fn cmd_export(target: &DatabaseTarget, output: &Path) -> Result<(), KeysweepError> {
    require_existing(target)?;

    let snapshot = match target.backend {
        Backend::Snapshot => load_snapshot(&target.path)?,
        Backend::Redb => RedbDatabase::open(&target.path)?.export_snapshot()?,
    };
    save_snapshot(&snapshot, output)?;

    println!(
        "Exported {} tables and {} staged rows to {:?}",
        snapshot.tables.len(),
        snapshot.staged_count(),
        output
    );
    Ok(())
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize new database.
pub fn cmd_init(target: &DatabaseTarget, force: bool) -> Result<(), KeysweepError> {
    if target.path.exists() {
        if !force {
            return Err(KeysweepError::IoError(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(&target.path)
            .map_err(|e| KeysweepError::IoError(format!("Remove database: {}", e)))?;
    }

    match target.backend {
        Backend::Redb => {
            let _db = RedbDatabase::open(&target.path)?;
            println!("Initialized new redb database at {:?}", target.path);
        }
        Backend::Snapshot => {
            save_snapshot(&DatabaseSnapshot::new(), &target.path)?;
            println!("Initialized new snapshot database at {:?}", target.path);
        }
    }
    Ok(())
}

// =============================================================================
// COMPACT COMMAND
// =============================================================================

/// Compact a redb database file.
pub fn cmd_compact(target: &DatabaseTarget) -> Result<(), KeysweepError> {
    redb_only(target, "compact")?;
    require_existing(target)?;

    let mut db = RedbDatabase::open(&target.path)?;
    db.compact()?;
    println!("Compacted {:?}", target.path);
    Ok(())
}
