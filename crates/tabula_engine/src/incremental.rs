//! Incremental re-evaluation.
//!
//! After a change is applied, the [`Reevaluator`] works out which columns
//! must be evaluated again so that the result matches a full re-evaluation:
//!
//! - the edited column, for cell edits;
//! - every column whose bindings changed, for rule and structural changes;
//! - every column whose schema changed, so outputs pick up new, renamed, or
//!   removed columns;
//! - every bound column of a table that joined or left a cycle;
//! - transitively, every column whose bindings read a column above.

use std::collections::BTreeSet;
use std::collections::btree_set::IntoIter;
use std::fmt;

use tabula_foundation::{ColumnId, RuleId, TableId, Type, Value};
use tabula_storage::{Catalog, Table};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::index::RuleIndex;
use crate::resolver::ColumnAddr;
use crate::rule::compiler::RuleDecl;
use crate::schedule::DependencyGraph;

// =============================================================================
// Changes
// =============================================================================

/// A change to the rules or tables.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Change {
    /// A new rule.
    RuleAdded(RuleDecl),
    /// A replacement for an existing rule with the same id.
    RuleEdited(RuleDecl),
    /// A rule deleted.
    RuleRemoved(RuleId),
    /// A new table.
    TableAdded(Table),
    /// A table deleted.
    TableRemoved(TableId),
    /// One source cell rewritten.
    CellEdited {
        /// Table.
        table: TableId,
        /// Row index.
        row: usize,
        /// Column.
        column: ColumnId,
        /// New source value.
        value: Value,
    },
    /// A column appended to a table.
    ColumnAdded {
        /// Table.
        table: TableId,
        /// Display name.
        name: String,
        /// Declared type.
        #[cfg_attr(feature = "serde", serde(default))]
        ty: Type,
    },
    /// A column's display name changed.
    ColumnRenamed {
        /// Table.
        table: TableId,
        /// Column.
        column: ColumnId,
        /// New display name.
        name: String,
    },
    /// A column deleted.
    ColumnRemoved {
        /// Table.
        table: TableId,
        /// Column.
        column: ColumnId,
    },
}

impl Change {
    /// Short name used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RuleAdded(_) => "rule_added",
            Self::RuleEdited(_) => "rule_edited",
            Self::RuleRemoved(_) => "rule_removed",
            Self::TableAdded(_) => "table_added",
            Self::TableRemoved(_) => "table_removed",
            Self::CellEdited { .. } => "cell_edited",
            Self::ColumnAdded { .. } => "column_added",
            Self::ColumnRenamed { .. } => "column_renamed",
            Self::ColumnRemoved { .. } => "column_removed",
        }
    }
}

/// A change stamped with the producer's version. Versions must strictly
/// increase; anything else is stale.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VersionedChange {
    /// Producer version.
    pub version: u64,
    /// The change.
    pub change: Change,
}

impl VersionedChange {
    /// Stamps a change.
    #[must_use]
    pub const fn new(version: u64, change: Change) -> Self {
        Self { version, change }
    }
}

// =============================================================================
// Scope Set
// =============================================================================

/// A set of columns to evaluate.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ScopeSet {
    columns: BTreeSet<ColumnAddr>,
}

impl ScopeSet {
    /// Creates an empty scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every column of every table in a catalog.
    #[must_use]
    pub fn all(catalog: &Catalog) -> Self {
        catalog
            .iter()
            .flat_map(|t| t.column_ids().map(move |c| ColumnAddr::new(t.id(), c)))
            .collect()
    }

    /// Adds a column.
    pub fn insert(&mut self, column: ColumnAddr) -> bool {
        self.columns.insert(column)
    }

    /// Returns true if the column is in scope.
    #[must_use]
    pub fn contains(&self, column: ColumnAddr) -> bool {
        self.columns.contains(&column)
    }

    /// Columns in scope for one table.
    #[must_use]
    pub fn columns_of(&self, table: TableId) -> BTreeSet<ColumnId> {
        self.columns
            .range(ColumnAddr::new(table, ColumnId::new(0))..=ColumnAddr::new(table, ColumnId::new(u64::MAX)))
            .map(|a| a.column)
            .collect()
    }

    /// Tables with at least one column in scope.
    #[must_use]
    pub fn tables(&self) -> BTreeSet<TableId> {
        self.columns.iter().map(|a| a.table).collect()
    }

    /// Removes every column of a table.
    pub fn remove_table(&mut self, table: TableId) {
        self.columns.retain(|a| a.table != table);
    }

    /// Removes the given columns.
    pub fn remove_all(&mut self, columns: &BTreeSet<ColumnAddr>) {
        self.columns.retain(|a| !columns.contains(a));
    }

    /// The columns as a set.
    #[must_use]
    pub fn as_set(&self) -> &BTreeSet<ColumnAddr> {
        &self.columns
    }

    /// Iterates in order.
    pub fn iter(&self) -> impl Iterator<Item = ColumnAddr> + '_ {
        self.columns.iter().copied()
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if nothing is in scope.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl FromIterator<ColumnAddr> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = ColumnAddr>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

impl Extend<ColumnAddr> for ScopeSet {
    fn extend<I: IntoIterator<Item = ColumnAddr>>(&mut self, iter: I) {
        self.columns.extend(iter);
    }
}

impl IntoIterator for ScopeSet {
    type Item = ColumnAddr;
    type IntoIter = IntoIter<ColumnAddr>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

impl From<BTreeSet<ColumnAddr>> for ScopeSet {
    fn from(columns: BTreeSet<ColumnAddr>) -> Self {
        Self { columns }
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, addr) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{addr}")?;
        }
        write!(f, "}}")
    }
}

// =============================================================================
// Re-evaluator
// =============================================================================

/// Computes the columns a change affects.
///
/// `before` is the index from before the change; `after`, `inputs`, and
/// `outputs` describe the state once the change is applied but before any
/// re-evaluation, so `outputs` still reflects the old evaluation.
#[derive(Clone, Copy)]
pub struct Reevaluator<'a> {
    before: &'a RuleIndex,
    after: &'a RuleIndex,
    inputs: &'a Catalog,
    outputs: &'a Catalog,
}

impl<'a> Reevaluator<'a> {
    /// Creates a re-evaluator.
    #[must_use]
    pub const fn new(
        before: &'a RuleIndex,
        after: &'a RuleIndex,
        inputs: &'a Catalog,
        outputs: &'a Catalog,
    ) -> Self {
        Self {
            before,
            after,
            inputs,
            outputs,
        }
    }

    /// The columns to re-evaluate for `change`.
    #[must_use]
    pub fn affected_scopes(&self, change: &Change) -> ScopeSet {
        let mut seed = match change {
            Change::CellEdited { table, column, .. } => BTreeSet::from([ColumnAddr::new(*table, *column)]),
            _ => self.before.diff(self.after),
        };
        seed.extend(self.schema_changes());
        seed.extend(self.cycle_changes());
        self.after.dependents(seed).into()
    }

    /// Columns whose output no longer matches the input schema: every
    /// column of a table without output, plus added, renamed, retyped, and
    /// removed columns.
    fn schema_changes(&self) -> BTreeSet<ColumnAddr> {
        let mut changed = BTreeSet::new();
        for input in self.inputs.iter() {
            let table = input.id();
            match self.outputs.get(table) {
                Some(output) if output.row_count() == input.row_count() => {
                    for column in input.columns() {
                        if output.column(column.id) != Some(column) {
                            changed.insert(ColumnAddr::new(table, column.id));
                        }
                    }
                    for column in output.columns() {
                        if !input.has_column(column.id) {
                            changed.insert(ColumnAddr::new(table, column.id));
                        }
                    }
                }
                _ => changed.extend(input.column_ids().map(|c| ColumnAddr::new(table, c))),
            }
        }
        changed
    }

    /// Bound columns of tables whose cycle membership changed.
    fn cycle_changes(&self) -> BTreeSet<ColumnAddr> {
        let before = DependencyGraph::from_index(self.before, self.inputs.ids()).schedule();
        let after = DependencyGraph::from_index(self.after, self.inputs.ids()).schedule();
        let mut changed = BTreeSet::new();
        for table in self.inputs.ids() {
            if before.is_cyclic(table) != after.is_cyclic(table) {
                for index in [self.before, self.after] {
                    changed.extend(index.columns_of(table).map(|(c, _)| ColumnAddr::new(table, c)));
                }
            }
        }
        changed
    }
}
