//! Change notifications for grid refresh.
//!
//! After each pass the session compares the old and new state of every
//! evaluated column and reports the row range that needs repainting.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use tabula_engine::{Effect, EffectKind};
use tabula_foundation::{ColumnId, RuleId, TableId, Value};
use tabula_storage::Table;

/// A column whose output or provenance changed over a row range.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotification {
    /// Table.
    pub table: TableId,
    /// Column.
    pub column: ColumnId,
    /// Smallest row range covering every changed row.
    pub rows: Range<usize>,
}

impl ChangeNotification {
    /// Builds a notification covering `rows`, or `None` if nothing changed.
    #[must_use]
    pub fn covering(table: TableId, column: ColumnId, rows: &BTreeSet<usize>) -> Option<Self> {
        let first = *rows.first()?;
        let last = *rows.last()?;
        Some(Self {
            table,
            column,
            rows: first..last + 1,
        })
    }

    /// Number of rows in the range.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the range is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl fmt::Display for ChangeNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} rows {}..{}",
            self.table, self.column, self.rows.start, self.rows.end
        )
    }
}

/// Rows of `column` whose output value differs between two evaluations.
///
/// A missing previous table, or a change in row count, marks every row.
#[must_use]
pub fn changed_values(previous: Option<&Table>, current: &Table, column: ColumnId) -> BTreeSet<usize> {
    let rows = 0..current.row_count();
    let Some(previous) = previous.filter(|p| p.row_count() == current.row_count()) else {
        return rows.collect();
    };
    if !previous.has_column(column) {
        return rows.collect();
    }
    previous
        .column_values(column)
        .zip(current.column_values(column))
        .enumerate()
        .filter(|(_, (old, new))| old != new)
        .map(|(row, _)| row)
        .collect()
}

type EffectSignature<'a> = (RuleId, &'a Value, &'a Value, &'a EffectKind);

/// Rows whose recorded effects differ, ignoring ticks.
#[must_use]
pub fn changed_effects<'a>(
    old: impl IntoIterator<Item = &'a Effect>,
    new: impl IntoIterator<Item = &'a Effect>,
) -> BTreeSet<usize> {
    fn by_row<'a>(effects: impl IntoIterator<Item = &'a Effect>) -> BTreeMap<usize, Vec<EffectSignature<'a>>> {
        let mut rows: BTreeMap<usize, Vec<EffectSignature<'a>>> = BTreeMap::new();
        for e in effects {
            rows.entry(e.row)
                .or_default()
                .push((e.rule, &e.prior, &e.new, &e.kind));
        }
        rows
    }

    let old = by_row(old);
    let new = by_row(new);
    old.keys()
        .chain(new.keys())
        .copied()
        .filter(|row| old.get(row) != new.get(row))
        .collect()
}
