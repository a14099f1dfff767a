//! Non-fatal conditions reported alongside evaluation results.
//!
//! Nothing here aborts a pass. Warnings attach to the rule that caused
//! them, skip reasons attach to provenance entries, and top-level
//! diagnostics describe the table graph as a whole.

use std::collections::BTreeMap;
use std::fmt;

use tabula_foundation::{RuleId, TableId, Type};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::resolver::Unresolved;
use crate::rule::ColumnRef;

/// A per-rule warning.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Warning {
    /// A column reference could not be resolved; the rule did not bind
    /// where it needed that reference.
    UnresolvedReference {
        /// The rule.
        rule: RuleId,
        /// The table the rule was being bound to, if any.
        table: Option<TableId>,
        /// The reference as written.
        reference: ColumnRef,
        /// What went wrong.
        reason: Unresolved,
    },
}

impl Warning {
    /// The rule the warning belongs to.
    #[must_use]
    pub const fn rule(&self) -> RuleId {
        match self {
            Self::UnresolvedReference { rule, .. } => *rule,
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnresolvedReference {
                rule,
                reference,
                reason,
                ..
            } => write!(f, "{rule}: unresolved reference {reference}: {reason}"),
        }
    }
}

/// Why a rule did not apply to a cell it matched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SkipReason {
    /// The cell, or the rule's result, has the wrong type.
    TypeMismatch {
        /// Type required.
        expected: Type,
        /// Type found.
        actual: Type,
    },
    /// The rule reads another table but the cell's table is on a link
    /// cycle, so cross-table rules are off for it.
    CrossTableDisabled,
}

impl SkipReason {
    /// Stable code used in skip summaries.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::CrossTableDisabled => "cross_table_disabled",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeMismatch { expected, actual } => {
                write!(f, "type mismatch: expected {expected}, got {actual}")
            }
            Self::CrossTableDisabled => write!(f, "cross-table rules disabled on cycle"),
        }
    }
}

/// A diagnostic about the evaluation as a whole.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Diagnostic {
    /// Tables whose rules read each other in a cycle.
    CyclicLinkDependency {
        /// Tables on the cycle, ascending.
        tables: Vec<TableId>,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CyclicLinkDependency { tables } => {
                write!(f, "cyclic link dependency between")?;
                for table in tables {
                    write!(f, " {table}")?;
                }
                Ok(())
            }
        }
    }
}

/// Everything reported for the current state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Diagnostics {
    /// Warnings grouped by rule.
    pub warnings: BTreeMap<RuleId, Vec<Warning>>,
    /// Graph-level diagnostics.
    pub top_level: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Returns true if nothing was reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty() && self.top_level.is_empty()
    }

    /// Warnings for one rule.
    #[must_use]
    pub fn for_rule(&self, rule: RuleId) -> &[Warning] {
        self.warnings.get(&rule).map_or(&[], Vec::as_slice)
    }

    /// Iterates over all warnings in rule order.
    pub fn all_warnings(&self) -> impl Iterator<Item = &Warning> {
        self.warnings.values().flatten()
    }
}
