//! Multi-table evaluation passes.
//!
//! A pass schedules the tables, evaluates them wave by wave, and commits
//! each table's result into a fresh output catalog. Each result is computed
//! on its own copy and dropped if its table was cancelled before commit, so
//! the caller only ever sees complete tables.

use std::collections::BTreeSet;
use std::thread;

use tabula_foundation::{ColumnId, TableId};
use tabula_storage::{Catalog, Table};
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::evaluate::{EvalContext, Suppressions, TableEvaluation, evaluate};
use crate::incremental::ScopeSet;
use crate::index::RuleIndex;
use crate::link::LinkRecord;
use crate::provenance::{Effect, LogicalClock};
use crate::schedule::{DependencyGraph, Schedule};

/// Inputs to a pass.
#[derive(Clone, Copy)]
pub struct PassRequest<'a> {
    /// Source tables.
    pub inputs: &'a Catalog,
    /// Outputs of the previous pass.
    pub previous: &'a Catalog,
    /// Current bindings.
    pub index: &'a RuleIndex,
    /// Columns to evaluate. `None` evaluates everything.
    pub scope: Option<&'a ScopeSet>,
    /// Reverted (cell, rule) pairs.
    pub suppressed: &'a Suppressions,
    /// Cancellation.
    pub cancel: &'a CancelToken,
    /// Evaluate independent tables on separate threads.
    pub parallel: bool,
    /// Record skip effects.
    pub record_skips: bool,
}

impl<'a> PassRequest<'a> {
    /// A full, sequential pass that records skips.
    #[must_use]
    pub const fn new(
        inputs: &'a Catalog,
        previous: &'a Catalog,
        index: &'a RuleIndex,
        suppressed: &'a Suppressions,
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            inputs,
            previous,
            index,
            scope: None,
            suppressed,
            cancel,
            parallel: false,
            record_skips: true,
        }
    }

    /// Restricts the pass to a scope.
    #[must_use]
    pub const fn with_scope(mut self, scope: &'a ScopeSet) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Enables parallel evaluation within a wave.
    #[must_use]
    pub const fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Sets whether skip effects are recorded.
    #[must_use]
    pub const fn with_record_skips(mut self, record: bool) -> Self {
        self.record_skips = record;
        self
    }
}

/// Result of a pass.
#[derive(Clone, Debug)]
pub struct PassOutcome {
    /// Committed table evaluations in schedule order. Effect ticks are
    /// unique and increasing across the whole pass.
    pub evaluations: Vec<TableEvaluation>,
    /// Previous outputs with every committed table replaced. Outputs of
    /// tables no longer in the input catalog are dropped.
    pub outputs: Catalog,
    /// Tables whose evaluation was cancelled.
    pub cancelled: BTreeSet<TableId>,
    /// The schedule used.
    pub schedule: Schedule,
}

impl PassOutcome {
    /// All committed effects in pass order.
    pub fn effects(&self) -> impl Iterator<Item = &Effect> {
        self.evaluations.iter().flat_map(|e| e.effects.iter())
    }

    /// All committed links.
    pub fn links(&self) -> impl Iterator<Item = &LinkRecord> {
        self.evaluations.iter().flat_map(|e| e.links.iter())
    }

    /// Tables that were evaluated and committed.
    pub fn evaluated_tables(&self) -> impl Iterator<Item = TableId> + '_ {
        self.evaluations.iter().map(|e| e.table.id())
    }
}

struct Job<'a> {
    input: &'a Table,
    columns: Option<BTreeSet<ColumnId>>,
    cyclic: bool,
}

/// Runs one evaluation pass.
#[must_use]
pub fn run_pass(request: &PassRequest<'_>) -> PassOutcome {
    let graph = DependencyGraph::from_index(request.index, request.inputs.ids());
    let schedule = graph.schedule();

    let mut outputs: Catalog = request
        .previous
        .iter()
        .filter(|t| request.inputs.contains(t.id()))
        .cloned()
        .collect();
    let mut evaluations = Vec::new();
    let mut cancelled = BTreeSet::new();
    let mut clock = LogicalClock::new();

    for wave in schedule.waves() {
        let mut jobs = Vec::new();
        for &table in wave {
            let Some(input) = request.inputs.get(table) else {
                continue;
            };
            let columns = match request.scope {
                None => None,
                Some(scope) => {
                    let columns = scope.columns_of(table);
                    if columns.is_empty() {
                        continue;
                    }
                    Some(columns)
                }
            };
            if request.cancel.is_cancelled(table) {
                cancelled.insert(table);
                continue;
            }
            jobs.push(Job {
                input,
                columns,
                cyclic: schedule.is_cyclic(table),
            });
        }

        let results = evaluate_wave(request, &jobs, &outputs);

        for mut evaluation in results {
            let table = evaluation.table.id();
            if request.cancel.is_cancelled(table) {
                debug!(%table, "discarding cancelled evaluation");
                cancelled.insert(table);
                continue;
            }
            for effect in &mut evaluation.effects {
                effect.tick = clock.tick();
            }
            outputs.upsert(evaluation.table.clone());
            evaluations.push(evaluation);
        }
    }

    info!(
        evaluated = evaluations.len(),
        cancelled = cancelled.len(),
        waves = schedule.waves().len(),
        "evaluation pass complete"
    );
    PassOutcome {
        evaluations,
        outputs,
        cancelled,
        schedule,
    }
}

fn evaluate_wave(request: &PassRequest<'_>, jobs: &[Job<'_>], outputs: &Catalog) -> Vec<TableEvaluation> {
    let run = |job: &Job<'_>| {
        let ctx = EvalContext::new(request.index, outputs, request.suppressed)
            .with_cross_table_disabled(job.cyclic)
            .with_record_skips(request.record_skips);
        let previous = outputs.get(job.input.id());
        evaluate(job.input, previous, job.columns.as_ref(), &ctx)
    };

    if request.parallel && jobs.len() > 1 {
        let run = &run;
        thread::scope(|s| {
            let handles: Vec<_> = jobs.iter().map(|job| s.spawn(move || run(job))).collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|payload| std::panic::resume_unwind(payload)))
                .collect()
        })
    } else {
        jobs.iter().map(run).collect()
    }
}
