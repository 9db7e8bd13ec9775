//! # Condition Gate
//!
//! Decides whether a rule applies to the current installation.
//!
//! The expression language belongs to the installer engine. This module only
//! short-circuits empty conditions and interprets the engine's tri-state
//! answer: `True` applies, `False` and `Invalid` both skip the rule.

use crate::engine::InstallerEngine;
use crate::{ConditionOutcome, RegistryKeyRemovalRule};

/// Filters rules by their condition column.
pub struct ConditionGate;

impl ConditionGate {
    /// Evaluate a rule's condition.
    ///
    /// An empty condition is `True` and never reaches the engine.
    pub fn evaluate<E: InstallerEngine>(
        engine: &E,
        rule: &RegistryKeyRemovalRule,
    ) -> ConditionOutcome {
        if !rule.is_conditional() {
            return ConditionOutcome::True;
        }

        let outcome = engine.evaluate_condition(&rule.condition);
        match outcome {
            ConditionOutcome::True => tracing::info!(
                rule = %rule.id,
                condition = %rule.condition,
                "True condition for row {}: {}; processing.",
                rule.id,
                rule.condition
            ),
            ConditionOutcome::False | ConditionOutcome::Invalid => tracing::info!(
                rule = %rule.id,
                condition = %rule.condition,
                ?outcome,
                "False or invalid condition for row {}: {}; skipping.",
                rule.id,
                rule.condition
            ),
        }
        outcome
    }
}
