//! # Custom Action Context
//!
//! The process-level wrapper around a removal pass: initialize against an
//! engine session, run the pass inside a tracing span, and finalize the
//! result into the status code the installer expects.
//!
//! The engine session is passed in explicitly; nothing here is global.

use crate::engine::InstallerEngine;
use crate::pass::{PassReport, RemovalPass};
use crate::primitives::{ACTION_NAME, EXIT_INSTALL_FAILURE, EXIT_SUCCESS};
use serde::Serialize;

/// Result code reported back to the installer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActionStatus {
    Success,
    InstallFailure,
}

impl ActionStatus {
    /// The numeric code (`ERROR_SUCCESS` or `ERROR_INSTALL_FAILURE`).
    #[must_use]
    pub const fn exit_code(self) -> u32 {
        match self {
            Self::Success => EXIT_SUCCESS,
            Self::InstallFailure => EXIT_INSTALL_FAILURE,
        }
    }
}

/// Everything the caller learns from one action invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ActionOutcome {
    pub status: ActionStatus,
    pub report: PassReport,
    /// Message of the fatal error, if the pass aborted.
    pub error: Option<String>,
}

/// One invocation of the removal custom action.
pub struct ActionContext<'e, E: InstallerEngine> {
    engine: &'e E,
    name: String,
}

impl<'e, E: InstallerEngine> ActionContext<'e, E> {
    /// Bind the action to an engine session.
    #[must_use]
    pub fn initialize(engine: &'e E, name: impl Into<String>) -> Self {
        let name = name.into();
        tracing::debug!(action = %name, "initialized custom action");
        Self { engine, name }
    }

    /// Action name used for the span and log lines.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the pass and finalize.
    pub fn run(self) -> ActionOutcome {
        let span = tracing::info_span!("custom_action", action = %self.name);
        let _entered = span.enter();

        let mut pass = RemovalPass::new(self.engine);
        let result = pass.run();
        let report = pass.into_report();

        let (status, error) = match result {
            Ok(()) => (ActionStatus::Success, None),
            Err(e) => (ActionStatus::InstallFailure, Some(e.to_string())),
        };

        tracing::info!(
            status = ?status,
            exit_code = status.exit_code(),
            staged = report.staged.len(),
            "finalizing custom action"
        );

        ActionOutcome {
            status,
            report,
            error,
        }
    }
}

/// Run the removal custom action under its standard name.
pub fn run_custom_action<E: InstallerEngine>(engine: &E) -> ActionOutcome {
    ActionContext::initialize(engine, ACTION_NAME).run()
}
