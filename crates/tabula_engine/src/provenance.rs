//! Provenance tracking for Tabula.
//!
//! Every cell modification made by a rule, and every rule that matched but
//! could not apply, is recorded as an [`Effect`]. The [`ChangeLog`] stores
//! effects as [`ProvenanceEntry`]s with ids that are never reused, so a
//! caller holding an id from an earlier pass either finds the same entry or
//! nothing.
//!
//! Re-evaluating a column replaces that column's entries wholesale; entries
//! for untouched columns keep their ids and pass numbers.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tabula_foundation::{ColumnId, EntryId, RuleId, TableId, Value};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::diagnostic::SkipReason;
use crate::link::CellAddr;
use crate::resolver::ColumnAddr;

// =============================================================================
// Logical Clock
// =============================================================================

/// Monotonic logical timestamps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LogicalClock {
    now: u64,
}

impl LogicalClock {
    /// Creates a clock starting at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self { now: 0 }
    }

    /// Returns the current timestamp and advances the clock.
    pub fn tick(&mut self) -> u64 {
        let now = self.now;
        self.now += 1;
        now
    }

    /// The next timestamp to be handed out.
    #[must_use]
    pub const fn now(&self) -> u64 {
        self.now
    }
}

// =============================================================================
// Effect
// =============================================================================

/// What a rule did to a cell.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum EffectKind {
    /// The base value was rewritten.
    Replace,
    /// A label was attached.
    Tag(Arc<str>),
    /// The rule matched but did not apply.
    Skipped(SkipReason),
}

/// One recorded rule effect on one cell.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Effect {
    /// Logical timestamp within the pass.
    pub tick: u64,
    /// Table.
    pub table: TableId,
    /// Row index.
    pub row: usize,
    /// Column.
    pub column: ColumnId,
    /// Rule responsible.
    pub rule: RuleId,
    /// Cell value before the effect.
    pub prior: Value,
    /// Cell value after the effect. Equal to `prior` for skips.
    pub new: Value,
    /// What happened.
    pub kind: EffectKind,
}

impl Effect {
    /// The affected cell.
    #[must_use]
    pub const fn cell(&self) -> CellAddr {
        CellAddr::new(self.table, self.row, self.column)
    }

    /// The affected column.
    #[must_use]
    pub const fn column_addr(&self) -> ColumnAddr {
        ColumnAddr::new(self.table, self.column)
    }

    /// Returns true for skip records.
    #[must_use]
    pub const fn is_skip(&self) -> bool {
        matches!(self.kind, EffectKind::Skipped(_))
    }
}

/// A stored effect.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProvenanceEntry {
    /// Stable id.
    pub id: EntryId,
    /// Pass that produced the entry.
    pub pass: u64,
    /// The effect.
    pub effect: Effect,
}

// =============================================================================
// Change Log
// =============================================================================

/// Append-only store of provenance entries, ordered by id.
#[derive(Clone, Debug, Default)]
pub struct ChangeLog {
    entries: Vec<ProvenanceEntry>,
    next_id: u64,
    pass: u64,
}

impl ChangeLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current pass number. Zero before any pass.
    #[must_use]
    pub const fn pass(&self) -> u64 {
        self.pass
    }

    /// Starts a new pass and returns its number.
    pub fn begin_pass(&mut self) -> u64 {
        self.pass += 1;
        self.pass
    }

    /// Stores effects under the current pass, returning their new ids.
    pub fn record(&mut self, effects: impl IntoIterator<Item = Effect>) -> Vec<EntryId> {
        let pass = self.pass;
        let start = self.entries.len();
        for effect in effects {
            let id = EntryId::new(self.next_id);
            self.next_id += 1;
            self.entries.push(ProvenanceEntry { id, pass, effect });
        }
        self.entries[start..].iter().map(|e| e.id).collect()
    }

    /// Looks up an entry.
    #[must_use]
    pub fn get(&self, id: EntryId) -> Option<&ProvenanceEntry> {
        self.entries
            .binary_search_by_key(&id, |e| e.id)
            .ok()
            .map(|i| &self.entries[i])
    }

    /// All entries in id order.
    #[must_use]
    pub fn entries(&self) -> &[ProvenanceEntry] {
        &self.entries
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no entries are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries for a table, optionally narrowed to a row and/or column.
    pub fn query(
        &self,
        table: TableId,
        row: Option<usize>,
        column: Option<ColumnId>,
    ) -> impl Iterator<Item = &ProvenanceEntry> {
        self.entries.iter().filter(move |e| {
            e.effect.table == table
                && row.is_none_or(|r| e.effect.row == r)
                && column.is_none_or(|c| e.effect.column == c)
        })
    }

    /// Entries for one cell, in the order they were applied.
    pub fn for_cell(&self, cell: CellAddr) -> impl Iterator<Item = &ProvenanceEntry> {
        self.query(cell.table, Some(cell.row), Some(cell.column))
    }

    /// Entries produced by one rule.
    pub fn by_rule(&self, rule: RuleId) -> impl Iterator<Item = &ProvenanceEntry> {
        self.entries.iter().filter(move |e| e.effect.rule == rule)
    }

    /// Entries from the most recent pass.
    pub fn latest_pass(&self) -> impl Iterator<Item = &ProvenanceEntry> {
        let pass = self.pass;
        self.entries.iter().filter(move |e| e.pass == pass)
    }

    /// Drops every entry for the given columns.
    pub fn discard_columns(&mut self, columns: &BTreeSet<ColumnAddr>) {
        self.entries
            .retain(|e| !columns.contains(&e.effect.column_addr()));
    }

    /// Drops every entry for a table.
    pub fn discard_table(&mut self, table: TableId) {
        self.entries.retain(|e| e.effect.table != table);
    }

    /// Keeps only entries for which `keep` returns true.
    pub fn retain(&mut self, keep: impl FnMut(&ProvenanceEntry) -> bool) {
        self.entries.retain(keep);
    }

    /// Count of skip entries per reason code.
    #[must_use]
    pub fn skip_summary(&self) -> BTreeMap<&'static str, usize> {
        let mut summary = BTreeMap::new();
        for entry in &self.entries {
            if let EffectKind::Skipped(reason) = &entry.effect.kind {
                *summary.entry(reason.code()).or_insert(0) += 1;
            }
        }
        summary
    }

    /// The stored effects in a form that is independent of ids, passes,
    /// and timestamps: sorted by cell, then application order, with ticks
    /// zeroed. Two logs describe the same state iff their canonical forms
    /// are equal.
    #[must_use]
    pub fn canonical(&self) -> Vec<Effect> {
        let mut entries: Vec<&ProvenanceEntry> = self.entries.iter().collect();
        entries.sort_by_key(|e| {
            (
                e.effect.table,
                e.effect.column,
                e.effect.row,
                e.pass,
                e.effect.tick,
            )
        });
        entries
            .into_iter()
            .map(|e| Effect {
                tick: 0,
                ..e.effect.clone()
            })
            .collect()
    }

    /// Removes every entry. Ids are not reused afterwards.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
