//! Rule model.
//!
//! A [`Rule`] pairs a set of column references with a matcher and an action.
//! Rules are produced from [`RuleDecl`](compiler::RuleDecl)s by the
//! [`RuleCompiler`](compiler::RuleCompiler); once compiled they are immutable
//! and shared behind `Arc`.

pub mod compiler;

use std::fmt;
use std::sync::Arc;

use tabula_foundation::{RuleId, TableId};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::pattern::Matcher;
use crate::transform::Transform;

// =============================================================================
// Scope
// =============================================================================

/// Where a rule applies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Scope {
    /// Applies to every table containing a referenced column.
    #[default]
    Global,
    /// Applies only to the named table.
    Local(TableId),
}

impl Scope {
    /// Returns true if the rule may bind columns of `table`.
    #[must_use]
    pub fn admits(self, table: TableId) -> bool {
        match self {
            Self::Global => true,
            Self::Local(owner) => owner == table,
        }
    }
}

// =============================================================================
// Column Reference
// =============================================================================

/// A by-name reference to a column, optionally qualified by table name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ColumnRef {
    /// Table display name, for `Table.Column` references.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub table: Option<Arc<str>>,
    /// Column display name.
    pub column: Arc<str>,
}

impl ColumnRef {
    /// A reference resolved against whichever table the rule is applied to.
    #[must_use]
    pub fn local(column: impl AsRef<str>) -> Self {
        Self {
            table: None,
            column: Arc::from(column.as_ref()),
        }
    }

    /// A reference to a column of a specific table.
    #[must_use]
    pub fn qualified(table: impl AsRef<str>, column: impl AsRef<str>) -> Self {
        Self {
            table: Some(Arc::from(table.as_ref())),
            column: Arc::from(column.as_ref()),
        }
    }

    /// Parses `Column` or `Table.Column`, splitting at the first dot.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        match text.split_once('.') {
            Some((table, column)) if !table.is_empty() && !column.is_empty() => {
                Self::qualified(table, column)
            }
            _ => Self::local(text),
        }
    }

    /// Returns true if the reference names a table.
    #[must_use]
    pub fn is_qualified(&self) -> bool {
        self.table.is_some()
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{table}.{}", self.column),
            None => write!(f, "{}", self.column),
        }
    }
}

// =============================================================================
// Action
// =============================================================================

/// What a rule does to a matching cell.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// Attach a semantic label.
    Tag(Arc<str>),
    /// Rewrite the cell's base value.
    Replace(Transform),
    /// Record a link to rows whose `target` column holds an equal value.
    Link {
        /// The column searched for matching keys.
        target: ColumnRef,
    },
}

impl Action {
    /// Short name used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Tag(_) => "tag",
            Self::Replace(_) => "replace",
            Self::Link { .. } => "link",
        }
    }
}

// =============================================================================
// Rule
// =============================================================================

/// The key that orders rules bound to the same column.
///
/// Lower priority runs first; ties fall back to creation order, then id, so
/// the order is total and independent of load order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderKey {
    /// Declared priority.
    pub priority: i32,
    /// Creation sequence number.
    pub created: u64,
    /// Rule id.
    pub id: RuleId,
}

/// A compiled, validated rule.
#[derive(Clone, Debug, PartialEq)]
pub struct Rule {
    /// Stable identity.
    pub id: RuleId,
    /// Human-readable name.
    pub name: Arc<str>,
    /// Where the rule applies.
    pub scope: Scope,
    /// Columns the rule acts on.
    pub columns: Vec<ColumnRef>,
    /// Cell predicate.
    pub matcher: Matcher,
    /// Effect on matching cells.
    pub action: Action,
    /// Priority (lower runs first).
    pub priority: i32,
    /// Creation sequence number.
    pub created: u64,
    /// Whether the rule participates in evaluation.
    pub enabled: bool,
}

impl Rule {
    /// Creates an enabled global rule with priority 0.
    #[must_use]
    pub fn new(id: RuleId, columns: Vec<ColumnRef>, matcher: Matcher, action: Action) -> Self {
        Self {
            id,
            name: Arc::from(format!("rule-{}", id.raw())),
            scope: Scope::Global,
            columns,
            matcher,
            action,
            priority: 0,
            created: id.raw(),
            enabled: true,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl AsRef<str>) -> Self {
        self.name = Arc::from(name.as_ref());
        self
    }

    /// Sets the scope.
    #[must_use]
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the creation sequence number.
    #[must_use]
    pub fn with_created(mut self, created: u64) -> Self {
        self.created = created;
        self
    }

    /// Enables or disables the rule.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Returns the ordering key.
    #[must_use]
    pub fn order_key(&self) -> OrderKey {
        OrderKey {
            priority: self.priority,
            created: self.created,
            id: self.id,
        }
    }

    /// The column reference read by an `InColumn` matcher, if any.
    #[must_use]
    pub fn match_source(&self) -> Option<&ColumnRef> {
        match &self.matcher {
            Matcher::InColumn(reference) => Some(reference),
            _ => None,
        }
    }

    /// The column reference searched by a link action, if any.
    #[must_use]
    pub fn link_target(&self) -> Option<&ColumnRef> {
        match &self.action {
            Action::Link { target } => Some(target),
            _ => None,
        }
    }
}
