//! Evaluation sessions.
//!
//! A [`Session`] owns the working set (source tables and rule declarations),
//! the evaluated outputs, the change log, and the link store. It is the
//! surface the outer API layer talks to: load, evaluate, apply versioned
//! changes, query provenance, and revert.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tabula_engine::{
    CancelToken, CellAddr, Change, ChangeLog, ColumnAddr, DependencyGraph, Diagnostics, LinkRecord,
    LinkStore, PassOutcome, PassRequest, ProvenanceEntry, Reevaluator, Rule, RuleCompiler, RuleDecl,
    RuleIndex, ScopeSet, Suppressions, VersionedChange, run_pass,
};
use tabula_foundation::{ColumnId, EntryId, Error, ErrorKind, Result, RuleId, TableId};
use tabula_storage::{Catalog, Table};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::notify::{ChangeNotification, changed_effects, changed_values};
use crate::serialize::SessionState;

/// How a load combines with the existing working set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoadMode {
    /// Discard the existing set first.
    #[default]
    Replace,
    /// Add to the existing set.
    Merge,
}

/// Outcome of loading rule declarations.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Rules that entered the working set.
    pub accepted: Vec<RuleId>,
    /// Declarations that were rejected, with the reason.
    pub rejected: Vec<Error>,
}

impl LoadReport {
    /// Returns true if every declaration was accepted.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Result of a full evaluation.
#[derive(Clone, Debug)]
pub struct Snapshot {
    /// Every evaluated table.
    pub outputs: Catalog,
    /// The whole change log.
    pub entries: Vec<ProvenanceEntry>,
    /// Every link.
    pub links: Vec<LinkRecord>,
    /// Rule warnings and top-level diagnostics.
    pub diagnostics: Diagnostics,
    /// Tables whose evaluation was cancelled; they keep their prior state.
    pub cancelled: BTreeSet<TableId>,
}

/// Result of a scoped re-evaluation.
#[derive(Clone, Debug, Default)]
pub struct Delta {
    /// Columns that were scheduled.
    pub scope: ScopeSet,
    /// Re-evaluated tables.
    pub tables: Vec<Table>,
    /// Entries recorded by this pass.
    pub entries: Vec<ProvenanceEntry>,
    /// Links whose source lies in a re-evaluated column.
    pub links: Vec<LinkRecord>,
    /// What the grid should refresh.
    pub notifications: Vec<ChangeNotification>,
    /// Tables whose evaluation was cancelled; their scope stays pending.
    pub cancelled: BTreeSet<TableId>,
}

impl Delta {
    /// Returns true if nothing was re-evaluated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.entries.is_empty() && self.notifications.is_empty()
    }
}

/// Session state for one working set.
pub struct Session {
    config: SessionConfig,

    /// Source tables.
    inputs: Catalog,

    /// Evaluated tables.
    outputs: Catalog,

    /// Declarations as loaded, with creation numbers filled in.
    decls: BTreeMap<RuleId, RuleDecl>,

    /// Compiled rules.
    rules: BTreeMap<RuleId, Arc<Rule>>,

    index: RuleIndex,
    log: ChangeLog,
    links: LinkStore,
    suppressed: Suppressions,

    /// Columns whose outputs are stale: cancelled scopes and loads not yet
    /// evaluated.
    pending: ScopeSet,

    notifications: Vec<ChangeNotification>,
    last_version: Option<u64>,
    cancel: CancelToken,
    next_created: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Creates an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    /// Creates an empty session with a configuration.
    #[must_use]
    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            config,
            inputs: Catalog::new(),
            outputs: Catalog::new(),
            decls: BTreeMap::new(),
            rules: BTreeMap::new(),
            index: RuleIndex::default(),
            log: ChangeLog::new(),
            links: LinkStore::new(),
            suppressed: Suppressions::new(),
            pending: ScopeSet::new(),
            notifications: Vec::new(),
            last_version: None,
            cancel: CancelToken::new(),
            next_created: 0,
        }
    }

    /// Restores a session from saved state. Nothing is evaluated yet.
    ///
    /// # Errors
    /// Returns an error if the state holds duplicate tables or rules, or a
    /// malformed rule.
    pub fn from_state(state: SessionState, config: SessionConfig) -> Result<Self> {
        let mut session = Self::with_config(config);
        let mut inputs = Catalog::new();
        for table in state.tables {
            inputs.insert(table)?;
        }
        session.load_tables(inputs.iter().cloned(), LoadMode::Replace);
        let report = session.load_rules(state.rules, LoadMode::Replace);
        if let Some(error) = report.rejected.into_iter().next() {
            return Err(error);
        }
        session.last_version = state.version;
        Ok(session)
    }

    /// Captures the inputs needed to rebuild this session.
    #[must_use]
    pub fn state(&self) -> SessionState {
        SessionState {
            tables: self.inputs.iter().cloned().collect(),
            rules: self.decls.values().cloned().collect(),
            version: self.last_version,
        }
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Loads source tables.
    ///
    /// With [`LoadMode::Merge`], a table whose id is already loaded is
    /// replaced and its outputs, provenance, links, and reverts are dropped.
    pub fn load_tables(&mut self, tables: impl IntoIterator<Item = Table>, mode: LoadMode) {
        if mode == LoadMode::Replace {
            self.inputs.clear();
            self.outputs.clear();
            self.log.clear();
            self.links.clear();
            self.suppressed = Suppressions::new();
            self.pending = ScopeSet::new();
        }
        let mut loaded = BTreeSet::new();
        for table in tables {
            let id = table.id();
            if self.inputs.upsert(table).is_some() {
                self.prune_table(id);
            }
            loaded.extend(self.inputs.get(id).into_iter().flat_map(|t| {
                t.column_ids().map(move |c| ColumnAddr::new(id, c))
            }));
        }
        info!(tables = self.inputs.len(), ?mode, "tables loaded");
        self.rebuild_index(loaded);
    }

    /// Loads rule declarations. Each declaration is compiled independently;
    /// malformed or duplicate ones are reported and left out.
    pub fn load_rules(&mut self, decls: impl IntoIterator<Item = RuleDecl>, mode: LoadMode) -> LoadReport {
        if mode == LoadMode::Replace {
            self.decls.clear();
            self.rules.clear();
            self.suppressed = Suppressions::new();
        }
        let mut report = LoadReport::default();
        for decl in decls {
            match self.admit(decl) {
                Ok(id) => report.accepted.push(id),
                Err(e) => {
                    warn!(error = %e, "rule rejected");
                    report.rejected.push(e);
                }
            }
        }
        info!(
            accepted = report.accepted.len(),
            rejected = report.rejected.len(),
            ?mode,
            "rules loaded"
        );
        self.rebuild_index(BTreeSet::new());
        report
    }

    /// Compiles and inserts one new declaration.
    fn admit(&mut self, decl: RuleDecl) -> Result<RuleId> {
        let (decl, rule) = self.compile(decl)?;
        if self.rules.contains_key(&rule.id) {
            return Err(Error::new(ErrorKind::DuplicateRule(rule.id)));
        }
        let id = rule.id;
        self.next_created = self.next_created.max(rule.created + 1);
        self.decls.insert(id, decl);
        self.rules.insert(id, Arc::new(rule));
        Ok(id)
    }

    /// Compiles a declaration, filling in its creation number.
    fn compile(&self, mut decl: RuleDecl) -> Result<(RuleDecl, Rule)> {
        let rule = RuleCompiler::compile(&decl, self.next_created)?;
        decl.created = Some(rule.created);
        Ok((decl, rule))
    }

    /// Rebuilds the index and marks every column whose bindings changed,
    /// plus `touched`, as pending.
    fn rebuild_index(&mut self, touched: BTreeSet<ColumnAddr>) {
        let index = RuleIndex::build(self.rules.values(), &self.inputs);
        let mut seed = self.index.diff(&index);
        seed.extend(touched);
        self.pending.extend(index.dependents(seed));
        self.index = index;
    }

    /// Drops everything derived from one table.
    fn prune_table(&mut self, table: TableId) {
        self.log.discard_table(table);
        self.links.discard_table(table);
        self.suppressed.discard_table(table);
        self.pending.remove_table(table);
        self.outputs.remove(table).ok();
    }

    // =========================================================================
    // Evaluation
    // =========================================================================

    /// Evaluates every table from scratch.
    ///
    /// Cancelled tables keep their previous outputs and provenance and stay
    /// pending for the next incremental pass.
    pub fn evaluate_all(&mut self) -> Snapshot {
        let outcome = self.pass(None);
        let cancelled = outcome.cancelled.clone();
        self.pending = self
            .inputs
            .iter()
            .filter(|t| cancelled.contains(&t.id()))
            .flat_map(|t| {
                let id = t.id();
                t.column_ids().map(move |c| ColumnAddr::new(id, c))
            })
            .collect();
        self.commit(outcome, None);
        Snapshot {
            outputs: self.outputs.clone(),
            entries: self.log.entries().to_vec(),
            links: self.links.iter().cloned().collect(),
            diagnostics: self.diagnostics(),
            cancelled,
        }
    }

    /// Applies a versioned change and re-evaluates only what it affects.
    ///
    /// # Errors
    /// Returns [`ErrorKind::StaleInput`] for an out-of-order version (unless
    /// the session is configured to accept them), and the underlying error
    /// if the change does not apply: unknown table, column, row, or rule,
    /// a duplicate, or a malformed rule. On error nothing changes.
    pub fn evaluate_incremental(&mut self, change: VersionedChange) -> Result<Delta> {
        let VersionedChange { version, change } = change;
        if let Some(last) = self.last_version {
            if version <= last {
                if self.config.reject_stale {
                    return Err(Error::stale_input(last, version));
                }
                warn!(last, version, "applying stale change");
            }
        }

        let mut inputs = self.inputs.clone();
        let mut decls = self.decls.clone();
        let mut rules = self.rules.clone();
        let mut next_created = self.next_created;
        self.apply(&change, &mut inputs, &mut decls, &mut rules, &mut next_created)?;

        // The change applied cleanly; commit it.
        self.prune_for(&change);
        let before = std::mem::take(&mut self.index);
        let after = RuleIndex::build(rules.values(), &inputs);
        let mut scope = Reevaluator::new(&before, &after, &inputs, &self.outputs).affected_scopes(&change);
        // Readers of a cancelled table saw its stale output and must catch up too.
        scope.extend(after.dependents(std::mem::take(&mut self.pending).iter()));

        self.inputs = inputs;
        self.decls = decls;
        self.rules = rules;
        self.next_created = next_created;
        self.index = after;
        self.last_version = Some(self.last_version.map_or(version, |last| last.max(version)));

        debug!(kind = change.kind(), version, %scope, "change applied");
        Ok(self.run_scoped(scope))
    }

    /// Applies `change` to copies of the working set.
    fn apply(
        &self,
        change: &Change,
        inputs: &mut Catalog,
        decls: &mut BTreeMap<RuleId, RuleDecl>,
        rules: &mut BTreeMap<RuleId, Arc<Rule>>,
        next_created: &mut u64,
    ) -> Result<()> {
        match change {
            Change::RuleAdded(decl) => {
                let (decl, rule) = self.compile(decl.clone())?;
                if rules.contains_key(&rule.id) {
                    return Err(Error::new(ErrorKind::DuplicateRule(rule.id)));
                }
                *next_created = (*next_created).max(rule.created + 1);
                decls.insert(rule.id, decl);
                rules.insert(rule.id, Arc::new(rule));
            }
            Change::RuleEdited(decl) => {
                let id = decl.id.ok_or_else(|| Error::malformed_rule(None, "missing id"))?;
                let existing = rules.get(&id).ok_or_else(|| Error::rule_not_found(id))?;
                let mut decl = decl.clone();
                decl.created = decl.created.or(Some(existing.created));
                let (decl, rule) = self.compile(decl)?;
                decls.insert(id, decl);
                rules.insert(id, Arc::new(rule));
            }
            Change::RuleRemoved(id) => {
                rules.remove(id).ok_or_else(|| Error::rule_not_found(*id))?;
                decls.remove(id);
            }
            Change::TableAdded(table) => inputs.insert(table.clone())?,
            Change::TableRemoved(table) => {
                inputs.remove(*table)?;
            }
            Change::CellEdited {
                table,
                row,
                column,
                value,
            } => {
                let table = inputs
                    .get_mut(*table)
                    .ok_or_else(|| Error::table_not_found(*table))?;
                table.set(*row, *column, value.clone())?;
            }
            Change::ColumnAdded { table, name, ty } => {
                inputs
                    .get_mut(*table)
                    .ok_or_else(|| Error::table_not_found(*table))?
                    .add_column(name, *ty);
            }
            Change::ColumnRenamed { table, column, name } => {
                inputs
                    .get_mut(*table)
                    .ok_or_else(|| Error::table_not_found(*table))?
                    .rename_column(*column, name)?;
            }
            Change::ColumnRemoved { table, column } => {
                inputs
                    .get_mut(*table)
                    .ok_or_else(|| Error::table_not_found(*table))?
                    .remove_column(*column)?;
            }
        }
        Ok(())
    }

    /// Drops derived state the change invalidates outright.
    fn prune_for(&mut self, change: &Change) {
        match change {
            Change::TableRemoved(table) => self.prune_table(*table),
            Change::RuleRemoved(rule) => self.suppressed.discard_rule(*rule),
            Change::CellEdited {
                table, row, column, ..
            } => self.suppressed.clear_cell(CellAddr::new(*table, *row, *column)),
            Change::ColumnRemoved { table, column } => {
                let addr = ColumnAddr::new(*table, *column);
                self.log.discard_columns(&BTreeSet::from([addr]));
                self.links.discard_column(addr);
                self.suppressed.discard_column(addr);
                self.pending.remove_all(&BTreeSet::from([addr]));
            }
            Change::RuleAdded(_)
            | Change::RuleEdited(_)
            | Change::TableAdded(_)
            | Change::ColumnAdded { .. }
            | Change::ColumnRenamed { .. } => {}
        }
    }

    /// Runs a pass over `scope` plus anything pending and commits it.
    fn run_scoped(&mut self, scope: ScopeSet) -> Delta {
        let outcome = self.pass(Some(&scope));
        let cancelled = outcome.cancelled.clone();
        self.pending = scope
            .iter()
            .filter(|c| cancelled.contains(&c.table) && self.inputs.contains(c.table))
            .collect();
        let links = outcome.links().cloned().collect();
        let tables = outcome.evaluations.iter().map(|e| e.table.clone()).collect();
        let (entries, notifications) = self.commit(outcome, Some(&scope));
        Delta {
            scope,
            tables,
            links,
            entries,
            notifications,
            cancelled,
        }
    }

    fn pass(&self, scope: Option<&ScopeSet>) -> PassOutcome {
        let mut request = PassRequest::new(
            &self.inputs,
            &self.outputs,
            &self.index,
            &self.suppressed,
            &self.cancel,
        )
        .with_parallel(self.config.parallel_tables)
        .with_record_skips(self.config.record_skips);
        if let Some(scope) = scope {
            request = request.with_scope(scope);
        }
        let outcome = run_pass(&request);
        // Cancellations apply to one pass only.
        self.cancel.reset();
        outcome
    }

    /// Merges a pass into the log, link store, and outputs. Returns the new
    /// entries and the notifications raised.
    fn commit(
        &mut self,
        outcome: PassOutcome,
        scope: Option<&ScopeSet>,
    ) -> (Vec<ProvenanceEntry>, Vec<ChangeNotification>) {
        self.log.begin_pass();
        let mut notifications = Vec::new();
        let mut ids = Vec::new();

        for evaluation in &outcome.evaluations {
            let table = evaluation.table.id();
            let columns = match scope {
                Some(_) => evaluation.column_addrs(),
                None => self
                    .log
                    .query(table, None, None)
                    .map(|e| e.effect.column_addr())
                    .chain(evaluation.column_addrs())
                    .collect(),
            };

            let previous = self.outputs.get(table);
            for addr in &columns {
                let column = addr.column;
                let mut rows = if evaluation.table.has_column(column) {
                    changed_values(previous, &evaluation.table, column)
                } else {
                    BTreeSet::new()
                };
                let old = self.log.query(table, None, Some(column)).map(|e| &e.effect);
                let new = evaluation.effects.iter().filter(|e| e.column == column);
                rows.extend(changed_effects(old, new));
                notifications.extend(ChangeNotification::covering(table, column, &rows));
            }

            self.log.discard_columns(&columns);
            ids.extend(self.log.record(evaluation.effects.iter().cloned()));
            self.links.replace_columns(&columns, evaluation.links.iter().cloned());
        }

        let ids: BTreeSet<EntryId> = ids.into_iter().collect();
        let entries: Vec<ProvenanceEntry> = self
            .log
            .entries()
            .iter()
            .filter(|e| ids.contains(&e.id))
            .cloned()
            .collect();

        self.outputs = outcome.outputs;
        self.notifications.extend(notifications.iter().cloned());
        info!(
            tables = outcome.evaluations.len(),
            entries = entries.len(),
            notifications = notifications.len(),
            pending = self.pending.len(),
            "pass committed"
        );
        (entries, notifications)
    }

    // =========================================================================
    // Provenance and Revert
    // =========================================================================

    /// Provenance entries for a table, optionally narrowed to a row and a
    /// column, in the order they were recorded.
    #[must_use]
    pub fn provenance(&self, table: TableId, row: Option<usize>, column: Option<ColumnId>) -> Vec<&ProvenanceEntry> {
        self.log.query(table, row, column).collect()
    }

    /// The whole change log.
    #[must_use]
    pub fn change_log(&self) -> &ChangeLog {
        &self.log
    }

    /// Undoes one entry.
    ///
    /// The entry's rule is suppressed for that cell and the column, plus
    /// every column that reads it, is re-evaluated. Later rules on the cell
    /// see the restored value, so a later tag survives only if its matcher
    /// still matches. The suppression lasts until the cell is edited or the
    /// rule, column, or table is removed.
    ///
    /// # Errors
    /// Returns [`ErrorKind::EntryNotFound`] if the entry does not exist or
    /// was superseded by a later pass, and [`ErrorKind::NotRevertible`] for
    /// skip entries.
    pub fn revert(&mut self, entry: EntryId) -> Result<Delta> {
        let effect = &self
            .log
            .get(entry)
            .ok_or_else(|| Error::entry_not_found(entry))?
            .effect;
        if effect.is_skip() {
            return Err(Error::new(ErrorKind::NotRevertible(entry)));
        }
        let cell = effect.cell();
        let rule = effect.rule;
        self.suppressed.insert(cell, rule);

        let pending = std::mem::take(&mut self.pending);
        let seed = pending.iter().chain([cell.column_addr()]);
        let scope: ScopeSet = self.index.dependents(seed).into();
        info!(%entry, %cell, %rule, "reverting");
        Ok(self.run_scoped(scope))
    }

    /// Reverted (cell, rule) pairs.
    #[must_use]
    pub fn suppressions(&self) -> &Suppressions {
        &self.suppressed
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Every link.
    #[must_use]
    pub fn links(&self) -> &LinkStore {
        &self.links
    }

    /// Links whose source or target lies in `table`.
    pub fn links_for(&self, table: TableId) -> impl Iterator<Item = &LinkRecord> {
        self.links.for_table(table)
    }

    /// Rule warnings from the current index and diagnostics from the current
    /// schedule.
    #[must_use]
    pub fn diagnostics(&self) -> Diagnostics {
        let schedule = DependencyGraph::from_index(&self.index, self.inputs.ids()).schedule();
        Diagnostics {
            warnings: self.index.warnings().clone(),
            top_level: schedule.diagnostics(),
        }
    }

    /// Counts of skip entries by reason code.
    #[must_use]
    pub fn skip_summary(&self) -> BTreeMap<&'static str, usize> {
        self.log.skip_summary()
    }

    /// An evaluated table.
    #[must_use]
    pub fn output(&self, table: TableId) -> Option<&Table> {
        self.outputs.get(table)
    }

    /// A source table.
    #[must_use]
    pub fn source(&self, table: TableId) -> Option<&Table> {
        self.inputs.get(table)
    }

    /// Every evaluated table.
    #[must_use]
    pub fn outputs(&self) -> &Catalog {
        &self.outputs
    }

    /// Every source table.
    #[must_use]
    pub fn inputs(&self) -> &Catalog {
        &self.inputs
    }

    /// The current index.
    #[must_use]
    pub fn index(&self) -> &RuleIndex {
        &self.index
    }

    /// Loaded declarations in id order.
    pub fn rule_decls(&self) -> impl Iterator<Item = &RuleDecl> {
        self.decls.values()
    }

    /// Columns whose outputs are stale.
    #[must_use]
    pub fn pending(&self) -> &ScopeSet {
        &self.pending
    }

    /// Drains queued change notifications.
    pub fn take_notifications(&mut self) -> Vec<ChangeNotification> {
        std::mem::take(&mut self.notifications)
    }

    /// A handle for cancelling the next pass, wholly or per table. Clones
    /// share state, so it can be handed to another thread.
    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// The last change version applied.
    #[must_use]
    pub fn last_version(&self) -> Option<u64> {
        self.last_version
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}
