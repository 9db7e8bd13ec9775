//! # keysweep-core
//!
//! Translates registry key removal rules into installer staging rows.
//!
//! The installer database carries a table of rules, each saying "remove this
//! registry key, now or on uninstall, if this condition holds". A removal
//! pass reads the rules in storage order, asks the engine to evaluate each
//! rule's condition, and appends one row per applicable rule to the engine's
//! `RemoveRegistry` or `Registry` staging table. The engine's own registry
//! actions do the actual work later.
//!
//! ## Pipeline
//!
//! ```text
//! ┌─────────────┐    ┌────────────────┐    ┌──────────────────┐
//! │ RuleLoader  │───►│ ConditionGate  │───►│ translate/Stager │
//! │ (cursor)    │    │ (tri-state)    │    │ (staging rows)   │
//! └─────────────┘    └────────────────┘    └──────────────────┘
//!        ▲                   ▲                      │
//!        └──────────── InstallerEngine ◄────────────┘
//! ```
//!
//! ## Architectural Constraints
//!
//! - No registry I/O; only declarative rows are emitted
//! - Single-threaded, one rule at a time, no state carried across rules
//! - Handles are RAII values, released on every exit path
//! - The engine is passed in explicitly; there is no global session

// =============================================================================
// MODULES
// =============================================================================

pub mod action;
pub mod condition;
pub mod engine;
pub mod formats;
pub mod loader;
pub mod memory;
pub mod pass;
pub mod primitives;
pub mod storage;
pub mod translator;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    ConditionOutcome, FieldValue, KeysweepError, RegistryKeyRemovalRule, RegistryRoot,
    RegistryRow, RemovalMode, RemoveRegistryRow, StagedRow,
};

// =============================================================================
// RE-EXPORTS: Pipeline
// =============================================================================

pub use action::{ActionContext, ActionOutcome, ActionStatus, run_custom_action};
pub use condition::ConditionGate;
pub use engine::{InstallerEngine, Record, RecordView, StagingTable, ViewQuery};
pub use loader::RuleLoader;
pub use pass::{PassReport, PassState, RemovalPass, SkipReason, SkippedRule, run_removal_pass};
pub use translator::{Stager, Translation, translate};

// =============================================================================
// RE-EXPORTS: Engines & Formats
// =============================================================================

pub use formats::{DatabaseSnapshot, StagedCells, TableRow};
pub use memory::{FaultPlan, MemoryDatabase};
pub use storage::RedbDatabase;
