//! # Keysweep CLI Module
//!
//! This module implements the CLI interface for Keysweep.
//!
//! ## Available Commands
//!
//! - `run` - Execute the removal pass
//! - `status` - Show rule table and staging status
//! - `staged` - List (or clear) staged rows
//! - `import` - Load a JSON snapshot into a redb database
//! - `export` - Write the database out as a JSON snapshot
//! - `init` - Initialize new database
//! - `compact` - Compact a redb database file

mod commands;

use crate::config::{Backend, FlagOverrides, Settings};
use clap::{Parser, Subcommand};
use keysweep_core::KeysweepError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Keysweep - registry key removal pass
///
/// Reads registry key removal rules from an installer database and stages
/// the matching RemoveRegistry and Registry rows.
#[derive(Parser, Debug)]
#[command(name = "keysweep")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a keysweep.toml config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the installer database
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Storage backend: "snapshot" (JSON file) or "redb" (ACID database)
    #[arg(short = 'B', long, global = true, value_enum)]
    pub backend: Option<Backend>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Flags that take part in settings resolution.
    #[must_use]
    pub fn overrides(&self) -> FlagOverrides {
        FlagOverrides {
            database: self.database.clone(),
            backend: self.backend,
            verbose: self.verbose,
        }
    }
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the registry key removal pass
    Run {
        /// Write the resulting snapshot here (snapshot backend only)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show rule table and staging status
    Status,

    /// List staged rows
    Staged {
        /// Drop all staged rows instead of listing them
        #[arg(long)]
        clear: bool,
    },

    /// Import a JSON snapshot (redb backend)
    Import {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Export the database as a JSON snapshot
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Initialize a new empty database
    Init {
        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,
    },

    /// Compact the database file (redb backend)
    Compact,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Process exit status for a failed pass where statuses are 8-bit.
pub const INSTALL_FAILURE_STATUS: i32 = 3;

/// Map an installer result code to a process exit status.
///
/// Windows passes the code through, so a failed pass exits with 1603. Other
/// platforms truncate statuses to 8 bits, so codes above 255 become
/// `INSTALL_FAILURE_STATUS`.
#[must_use]
pub fn exit_status(code: u32) -> i32 {
    if cfg!(windows) {
        return code as i32;
    }
    match i32::try_from(code) {
        Ok(status) if status <= 255 => status,
        _ => INSTALL_FAILURE_STATUS,
    }
}

/// Execute the CLI with parsed arguments.
///
/// Returns the process exit code: 0, or 1603 when a removal pass fails.
pub fn execute(cli: Cli, settings: &Settings) -> Result<u32, KeysweepError> {
    let target = &settings.database;
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Run { output }) => {
            let status = cmd_run(target, json_mode, output.as_deref())?;
            Ok(status.exit_code())
        }
        Some(Commands::Status) | None => cmd_status(target, json_mode).map(|()| 0),
        Some(Commands::Staged { clear }) => {
            if clear {
                cmd_clear_staged(target)
            } else {
                cmd_staged(target, json_mode)
            }
            .map(|()| 0)
        }
        Some(Commands::Import { input }) => cmd_import(target, &input).map(|()| 0),
        Some(Commands::Export { output }) => cmd_export(target, &output).map(|()| 0),
        Some(Commands::Init { force }) => cmd_init(target, force).map(|()| 0),
        Some(Commands::Compact) => cmd_compact(target).map(|()| 0),
    }
}
