//! Link records.
//!
//! A link action relates a cell to every row of a target column holding the
//! same key. Links are stored separately from cell values: they never change
//! what a cell contains.

use std::collections::BTreeSet;
use std::fmt;

use tabula_foundation::{ColumnId, RuleId, TableId, Value};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::resolver::ColumnAddr;

/// Address of one cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CellAddr {
    /// Table.
    pub table: TableId,
    /// Row index.
    pub row: usize,
    /// Column.
    pub column: ColumnId,
}

impl CellAddr {
    /// Creates an address.
    #[must_use]
    pub const fn new(table: TableId, row: usize, column: ColumnId) -> Self {
        Self { table, row, column }
    }

    /// The column holding this cell.
    #[must_use]
    pub const fn column_addr(&self) -> ColumnAddr {
        ColumnAddr::new(self.table, self.column)
    }
}

impl fmt::Display for CellAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}].{}", self.table, self.row, self.column)
    }
}

/// One link between a source cell and a target cell with an equal key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LinkRecord {
    /// Source cell (where the rule is bound).
    pub source: CellAddr,
    /// Target cell.
    pub target: CellAddr,
    /// Rule that produced the link.
    pub rule: RuleId,
    /// The shared key (base value).
    pub key: Value,
}

impl LinkRecord {
    /// Sort key. The key value is implied by the two cells.
    #[must_use]
    pub const fn order(&self) -> (CellAddr, CellAddr, RuleId) {
        (self.source, self.target, self.rule)
    }
}

/// All current links, sorted by [`LinkRecord::order`] without duplicates.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkStore {
    links: Vec<LinkRecord>,
}

impl LinkStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the links whose source lies in `columns` with `links`.
    pub fn replace_columns(
        &mut self,
        columns: &BTreeSet<ColumnAddr>,
        links: impl IntoIterator<Item = LinkRecord>,
    ) {
        self.links
            .retain(|l| !columns.contains(&l.source.column_addr()));
        self.extend(links);
    }

    /// Adds links.
    pub fn extend(&mut self, links: impl IntoIterator<Item = LinkRecord>) {
        self.links.extend(links);
        self.links.sort_by_key(LinkRecord::order);
        self.links.dedup_by_key(|l| l.order());
    }

    /// Drops links touching a table at either end.
    pub fn discard_table(&mut self, table: TableId) {
        self.links
            .retain(|l| l.source.table != table && l.target.table != table);
    }

    /// Drops links touching a column at either end.
    pub fn discard_column(&mut self, column: ColumnAddr) {
        self.links.retain(|l| {
            l.source.column_addr() != column && l.target.column_addr() != column
        });
    }

    /// Removes every link.
    pub fn clear(&mut self) {
        self.links.clear();
    }

    /// All links in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &LinkRecord> {
        self.links.iter()
    }

    /// Links with either end in `table`.
    pub fn for_table(&self, table: TableId) -> impl Iterator<Item = &LinkRecord> {
        self.links
            .iter()
            .filter(move |l| l.source.table == table || l.target.table == table)
    }

    /// Links leaving a cell.
    pub fn from_cell(&self, cell: CellAddr) -> impl Iterator<Item = &LinkRecord> {
        self.links.iter().filter(move |l| l.source == cell)
    }

    /// Links produced by a rule.
    pub fn by_rule(&self, rule: RuleId) -> impl Iterator<Item = &LinkRecord> {
        self.links.iter().filter(move |l| l.rule == rule)
    }

    /// Number of links.
    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Returns true if there are no links.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
