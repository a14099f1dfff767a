//! Single-table evaluation.
//!
//! [`evaluate`] turns one source table into its transformed output. It runs
//! in two passes:
//!
//! 1. For each bound column, row by row, the column's bindings are applied
//!    in order to a working value that starts at the source cell. Tags and
//!    replacements update the working value. Links only note the key, read
//!    once every binding of equal or lower priority has run.
//! 2. Noted links are resolved against the link target column. A target in
//!    the same table is read from this table's pass-1 output; a target in
//!    another table from that table's already-evaluated output.
//!
//! `InColumn` matchers read the source values of their own table and the
//! evaluated output of any other table.
//!
//! Evaluation never touches its inputs and never fails: conditions that
//! stop a rule from applying become skip effects.

use std::collections::{BTreeSet, HashMap, HashSet};

use tabula_foundation::{ColumnId, RuleId, TableId, Type, Value};
use tabula_storage::{Catalog, Table};
use tracing::{debug, error};

use crate::diagnostic::SkipReason;
use crate::index::{Binding, RuleIndex};
use crate::link::{CellAddr, LinkRecord};
use crate::pattern::MatchOutcome;
use crate::provenance::{Effect, EffectKind, LogicalClock};
use crate::resolver::ColumnAddr;
use crate::rule::Action;

// =============================================================================
// Suppressions
// =============================================================================

/// (cell, rule) pairs that must not apply, left behind by reverts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Suppressions {
    pairs: BTreeSet<(CellAddr, RuleId)>,
}

impl Suppressions {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppresses `rule` on `cell`. Returns false if it already was.
    pub fn insert(&mut self, cell: CellAddr, rule: RuleId) -> bool {
        self.pairs.insert((cell, rule))
    }

    /// Returns true if `rule` is suppressed on `cell`.
    #[must_use]
    pub fn contains(&self, cell: CellAddr, rule: RuleId) -> bool {
        self.pairs.contains(&(cell, rule))
    }

    /// Lifts every suppression on a cell.
    pub fn clear_cell(&mut self, cell: CellAddr) {
        self.pairs.retain(|(c, _)| *c != cell);
    }

    /// Lifts every suppression in a table.
    pub fn discard_table(&mut self, table: TableId) {
        self.pairs.retain(|(c, _)| c.table != table);
    }

    /// Lifts every suppression in a column.
    pub fn discard_column(&mut self, column: ColumnAddr) {
        self.pairs.retain(|(c, _)| c.column_addr() != column);
    }

    /// Lifts every suppression of a rule.
    pub fn discard_rule(&mut self, rule: RuleId) {
        self.pairs.retain(|(_, r)| *r != rule);
    }

    /// All suppressed pairs.
    pub fn iter(&self) -> impl Iterator<Item = &(CellAddr, RuleId)> {
        self.pairs.iter()
    }

    /// Number of suppressed pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns true if nothing is suppressed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl FromIterator<(CellAddr, RuleId)> for Suppressions {
    fn from_iter<I: IntoIterator<Item = (CellAddr, RuleId)>>(iter: I) -> Self {
        Self {
            pairs: iter.into_iter().collect(),
        }
    }
}

// =============================================================================
// Context
// =============================================================================

/// Everything a table evaluation reads besides the table itself.
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    /// Bindings.
    pub index: &'a RuleIndex,
    /// Evaluated outputs of other tables.
    pub outputs: &'a Catalog,
    /// Reverted (cell, rule) pairs.
    pub suppressed: &'a Suppressions,
    /// Skip every binding that reads another table.
    pub cross_table_disabled: bool,
    /// Record skip effects.
    pub record_skips: bool,
}

impl<'a> EvalContext<'a> {
    /// Creates a context with cross-table bindings on and skips recorded.
    #[must_use]
    pub const fn new(index: &'a RuleIndex, outputs: &'a Catalog, suppressed: &'a Suppressions) -> Self {
        Self {
            index,
            outputs,
            suppressed,
            cross_table_disabled: false,
            record_skips: true,
        }
    }

    /// Sets whether cross-table bindings are disabled.
    #[must_use]
    pub const fn with_cross_table_disabled(mut self, disabled: bool) -> Self {
        self.cross_table_disabled = disabled;
        self
    }

    /// Sets whether skip effects are recorded.
    #[must_use]
    pub const fn with_record_skips(mut self, record: bool) -> Self {
        self.record_skips = record;
        self
    }
}

// =============================================================================
// Evaluation
// =============================================================================

/// Result of evaluating one table.
#[derive(Clone, Debug)]
pub struct TableEvaluation {
    /// Transformed table.
    pub table: Table,
    /// Effects in application order; ticks start at zero.
    pub effects: Vec<Effect>,
    /// Links whose source lies in an evaluated column.
    pub links: Vec<LinkRecord>,
    /// Columns that were evaluated; the rest were carried over.
    pub columns: BTreeSet<ColumnId>,
}

impl TableEvaluation {
    /// The evaluated columns as addresses.
    #[must_use]
    pub fn column_addrs(&self) -> BTreeSet<ColumnAddr> {
        self.columns
            .iter()
            .map(|c| ColumnAddr::new(self.table.id(), *c))
            .collect()
    }
}

struct PendingLink<'b> {
    binding: &'b Binding,
    source: CellAddr,
    target: ColumnAddr,
    key: Value,
}

struct Recorder {
    clock: LogicalClock,
    effects: Vec<Effect>,
    record_skips: bool,
}

impl Recorder {
    fn applied(&mut self, cell: CellAddr, rule: RuleId, prior: &Value, new: &Value, kind: EffectKind) {
        self.effects.push(Effect {
            tick: self.clock.tick(),
            table: cell.table,
            row: cell.row,
            column: cell.column,
            rule,
            prior: prior.clone(),
            new: new.clone(),
            kind,
        });
    }

    fn skipped(&mut self, cell: CellAddr, rule: RuleId, value: &Value, reason: SkipReason) {
        if self.record_skips {
            self.applied(cell, rule, value, value, EffectKind::Skipped(reason));
        }
    }
}

/// Evaluates one table.
///
/// With `scope`, only those columns are evaluated and every other column is
/// copied from `previous`. If `previous` is missing or no longer lines up
/// with `input`, the whole table is evaluated.
#[must_use]
pub fn evaluate(
    input: &Table,
    previous: Option<&Table>,
    scope: Option<&BTreeSet<ColumnId>>,
    ctx: &EvalContext<'_>,
) -> TableEvaluation {
    let table_id = input.id();
    let all: BTreeSet<ColumnId> = input.column_ids().collect();
    let (mut output, columns) = match (scope, previous) {
        (Some(scope), Some(previous)) => match carry_over(input, previous, scope) {
            Some(output) => (output, all.intersection(scope).copied().collect()),
            None => (input.clone(), all),
        },
        _ => (input.clone(), all),
    };

    let mut recorder = Recorder {
        clock: LogicalClock::new(),
        effects: Vec::new(),
        record_skips: ctx.record_skips,
    };
    let mut pending = Vec::new();
    let mut lookups: HashMap<ColumnAddr, HashSet<Value>> = HashMap::new();

    for (column, bindings) in ctx.index.columns_of(table_id) {
        if !columns.contains(&column) {
            continue;
        }
        let Some(declared) = input.column(column).map(|c| c.ty) else {
            continue;
        };
        for binding in bindings {
            if let Some(source) = binding.source {
                lookups
                    .entry(source)
                    .or_insert_with(|| lookup_set(source, input, ctx.outputs));
            }
        }

        for (row, original) in input.column_values(column).enumerate() {
            let cell = CellAddr::new(table_id, row, column);
            let mut working = original.clone();

            // Links wait for the end of their priority band, so every replace
            // at equal or lower priority has already run when the key is read.
            let mut held: Vec<&Binding> = Vec::new();
            for binding in bindings {
                if held.first().is_some_and(|h| h.rule.priority < binding.rule.priority) {
                    for link in held.drain(..) {
                        note_link(link, cell, &working, ctx, &lookups, &mut recorder, &mut pending);
                    }
                }
                if matches!(binding.rule.action, Action::Link { .. }) {
                    held.push(binding);
                    continue;
                }
                if !admits(binding, cell, &working, ctx, &lookups, &mut recorder) {
                    continue;
                }

                match &binding.rule.action {
                    Action::Tag(label) => {
                        if !working.has_tag(label) {
                            let new = working.with_tag(label);
                            recorder.applied(cell, binding.rule.id, &working, &new, EffectKind::Tag(label.clone()));
                            working = new;
                        }
                    }
                    Action::Replace(transform) => match transform.apply(working.base()) {
                        Err(actual) => {
                            let reason = SkipReason::TypeMismatch {
                                expected: Type::String,
                                actual,
                            };
                            recorder.skipped(cell, binding.rule.id, &working, reason);
                        }
                        Ok(base) if base == *working.base() => {}
                        Ok(base) => {
                            let new = working.with_base(base);
                            let produced = new.value_type();
                            if declared.accepts(produced) {
                                recorder.applied(cell, binding.rule.id, &working, &new, EffectKind::Replace);
                                working = new;
                            } else {
                                let reason = SkipReason::TypeMismatch {
                                    expected: declared,
                                    actual: produced,
                                };
                                recorder.skipped(cell, binding.rule.id, &working, reason);
                            }
                        }
                    },
                    Action::Link { .. } => {}
                }
            }
            for link in held {
                note_link(link, cell, &working, ctx, &lookups, &mut recorder, &mut pending);
            }

            if working != *original {
                if let Err(e) = output.set(row, column, working) {
                    error!(%cell, error = %e, "failed to write evaluated cell");
                }
            }
        }
    }

    let links = resolve_links(&pending, &output, ctx.outputs);
    debug!(
        table = %table_id,
        columns = columns.len(),
        effects = recorder.effects.len(),
        links = links.len(),
        "evaluated table"
    );
    TableEvaluation {
        table: output,
        effects: recorder.effects,
        links,
        columns,
    }
}

/// Runs the checks every binding passes before its action: suppression,
/// cycle-disabled cross-table reads, and the matcher. Skips are recorded.
fn admits(
    binding: &Binding,
    cell: CellAddr,
    working: &Value,
    ctx: &EvalContext<'_>,
    lookups: &HashMap<ColumnAddr, HashSet<Value>>,
    recorder: &mut Recorder,
) -> bool {
    let rule = &binding.rule;
    if ctx.suppressed.contains(cell, rule.id) {
        return false;
    }
    if ctx.cross_table_disabled && binding.is_cross_table() {
        recorder.skipped(cell, rule.id, working, SkipReason::CrossTableDisabled);
        return false;
    }
    let lookup = binding.source.and_then(|s| lookups.get(&s));
    match rule.matcher.test(working, lookup) {
        MatchOutcome::Matched => true,
        MatchOutcome::NotMatched => false,
        MatchOutcome::TypeMismatch { expected, actual } => {
            recorder.skipped(cell, rule.id, working, SkipReason::TypeMismatch { expected, actual });
            false
        }
    }
}

fn note_link<'b>(
    binding: &'b Binding,
    cell: CellAddr,
    working: &Value,
    ctx: &EvalContext<'_>,
    lookups: &HashMap<ColumnAddr, HashSet<Value>>,
    recorder: &mut Recorder,
    pending: &mut Vec<PendingLink<'b>>,
) {
    if !admits(binding, cell, working, ctx, lookups, recorder) {
        return;
    }
    if let Some(target) = binding.link_target {
        if !working.base().is_null() {
            pending.push(PendingLink {
                binding,
                source: cell,
                target,
                key: working.base().clone(),
            });
        }
    }
}

/// Starts from `input` and copies every column outside `scope` from
/// `previous`. Returns `None` if the two tables no longer line up.
fn carry_over(input: &Table, previous: &Table, scope: &BTreeSet<ColumnId>) -> Option<Table> {
    if previous.id() != input.id() || previous.row_count() != input.row_count() {
        return None;
    }
    let mut output = input.clone();
    for column in input.column_ids() {
        if !scope.contains(&column) {
            output.copy_column_from(previous, column).ok()?;
        }
    }
    Some(output)
}

fn lookup_set(source: ColumnAddr, input: &Table, outputs: &Catalog) -> HashSet<Value> {
    let table = if source.table == input.id() {
        Some(input)
    } else {
        outputs.get(source.table)
    };
    table
        .into_iter()
        .flat_map(|t| t.column_values(source.column))
        .map(Value::base)
        .filter(|v| !v.is_null())
        .cloned()
        .collect()
}

fn resolve_links(pending: &[PendingLink<'_>], output: &Table, outputs: &Catalog) -> Vec<LinkRecord> {
    let mut keyed: HashMap<ColumnAddr, HashMap<Value, Vec<usize>>> = HashMap::new();
    let mut links = Vec::new();
    for link in pending {
        let table = if link.target.table == output.id() {
            Some(output)
        } else {
            outputs.get(link.target.table)
        };
        let Some(table) = table else { continue };
        let rows = keyed
            .entry(link.target)
            .or_insert_with(|| rows_by_key(table, link.target.column));
        for &row in rows.get(&link.key).into_iter().flatten() {
            let target = CellAddr::new(link.target.table, row, link.target.column);
            if target == link.source {
                continue;
            }
            links.push(LinkRecord {
                source: link.source,
                target,
                rule: link.binding.rule.id,
                key: link.key.clone(),
            });
        }
    }
    links
}

fn rows_by_key(table: &Table, column: ColumnId) -> HashMap<Value, Vec<usize>> {
    let mut rows: HashMap<Value, Vec<usize>> = HashMap::new();
    for (row, value) in table.column_values(column).enumerate() {
        let base = value.base();
        if !base.is_null() {
            rows.entry(base.clone()).or_default().push(row);
        }
    }
    rows
}
