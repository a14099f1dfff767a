//! Rule index: which rules apply to which column, in what order.
//!
//! Building the index resolves every rule's references against the current
//! tables. The result maps each bound column to its [`Binding`]s sorted by
//! [`OrderKey`](crate::rule::OrderKey), plus a reverse map from each column
//! to the columns whose bindings read it. The reverse map drives both table
//! scheduling and incremental scoping.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tabula_foundation::{ColumnId, RuleId, TableId};
use tabula_storage::Catalog;
use tracing::{debug, warn};

use crate::diagnostic::Warning;
use crate::resolver::{ColumnAddr, Resolver, Unresolved};
use crate::rule::{ColumnRef, Rule, Scope};

// =============================================================================
// Binding
// =============================================================================

/// A rule bound to one concrete column, with its other references resolved
/// from that column's table.
#[derive(Clone, Debug, PartialEq)]
pub struct Binding {
    /// The rule.
    pub rule: Arc<Rule>,
    /// The column the rule acts on.
    pub target: ColumnAddr,
    /// Column read by an `InColumn` matcher.
    pub source: Option<ColumnAddr>,
    /// Column searched by a link action.
    pub link_target: Option<ColumnAddr>,
}

impl Binding {
    /// Columns this binding reads besides its target.
    pub fn reads(&self) -> impl Iterator<Item = ColumnAddr> {
        self.source.into_iter().chain(self.link_target)
    }

    /// Returns true if the binding reads a table other than its own.
    #[must_use]
    pub fn is_cross_table(&self) -> bool {
        self.reads().any(|addr| addr.table != self.target.table)
    }
}

// =============================================================================
// Rule Index
// =============================================================================

/// Per-column ordered rule bindings.
#[derive(Clone, Debug, Default)]
pub struct RuleIndex {
    bindings: BTreeMap<ColumnAddr, Vec<Binding>>,
    /// Column read → columns whose bindings read it.
    readers: BTreeMap<ColumnAddr, BTreeSet<ColumnAddr>>,
    warnings: BTreeMap<RuleId, Vec<Warning>>,
}

impl RuleIndex {
    /// Builds the index for the enabled rules over the given tables.
    ///
    /// The result does not depend on the order `rules` are supplied in.
    pub fn build<'r>(rules: impl IntoIterator<Item = &'r Arc<Rule>>, catalog: &Catalog) -> Self {
        let mut ordered: Vec<&Arc<Rule>> = rules.into_iter().filter(|r| r.enabled).collect();
        ordered.sort_by_key(|r| r.order_key());

        let resolver = Resolver::new(catalog);
        let mut index = Self::default();
        for rule in ordered {
            index.bind_rule(rule, &resolver);
        }
        debug!(
            columns = index.bindings.len(),
            bindings = index.binding_count(),
            warnings = index.warnings.values().map(Vec::len).sum::<usize>(),
            "built rule index"
        );
        index
    }

    fn bind_rule(&mut self, rule: &Arc<Rule>, resolver: &Resolver<'_>) {
        let catalog = resolver.catalog();
        let mut targets = Vec::new();

        for reference in &rule.columns {
            match (&reference.table, rule.scope) {
                (Some(_), scope) => match resolver.resolve_qualified(reference) {
                    Ok(addr) if scope.admits(addr.table) => targets.push(addr),
                    Ok(addr) => {
                        let Scope::Local(owner) = scope else { continue };
                        let reason = Unresolved::OutOfScope {
                            owner,
                            table: addr.table,
                        };
                        self.warn(rule, Some(owner), reference, reason);
                    }
                    Err(reason) => self.warn(rule, None, reference, reason),
                },
                (None, Scope::Global) => targets.extend(catalog.iter().filter_map(|table| {
                    table
                        .column_by_name(&reference.column)
                        .map(|c| ColumnAddr::new(table.id(), c.id))
                })),
                (None, Scope::Local(owner)) => {
                    let resolved = catalog
                        .get(owner)
                        .ok_or(Unresolved::MissingTableId(owner))
                        .and_then(|table| Resolver::resolve_in(table, &reference.column));
                    match resolved {
                        Ok(addr) => targets.push(addr),
                        Err(reason) => self.warn(rule, Some(owner), reference, reason),
                    }
                }
            }
        }

        let mut seen = BTreeSet::new();
        for target in targets {
            if !seen.insert(target) {
                continue;
            }
            let Some(table) = catalog.get(target.table) else {
                continue;
            };
            let mut resolve = |reference: Option<&ColumnRef>| match reference {
                None => Ok(None),
                Some(reference) => match resolver.resolve(reference, table) {
                    Ok(addr) => Ok(Some(addr)),
                    Err(reason) => {
                        self.warn(rule, Some(target.table), reference, reason);
                        Err(())
                    }
                },
            };
            let Ok(source) = resolve(rule.match_source()) else {
                continue;
            };
            let Ok(link_target) = resolve(rule.link_target()) else {
                continue;
            };

            let binding = Binding {
                rule: Arc::clone(rule),
                target,
                source,
                link_target,
            };
            for read in binding.reads() {
                self.readers.entry(read).or_default().insert(target);
            }
            self.bindings.entry(target).or_default().push(binding);
        }
    }

    fn warn(&mut self, rule: &Rule, table: Option<TableId>, reference: &ColumnRef, reason: Unresolved) {
        warn!(rule = %rule.id, %reference, %reason, "unresolved column reference");
        self.warnings
            .entry(rule.id)
            .or_default()
            .push(Warning::UnresolvedReference {
                rule: rule.id,
                table,
                reference: reference.clone(),
                reason,
            });
    }

    /// Bindings for a column, in evaluation order.
    #[must_use]
    pub fn bindings(&self, addr: ColumnAddr) -> &[Binding] {
        self.bindings.get(&addr).map_or(&[], Vec::as_slice)
    }

    /// Rules for a column, in evaluation order.
    pub fn rules_for(&self, addr: ColumnAddr) -> impl Iterator<Item = &Rule> {
        self.bindings(addr).iter().map(|b| &*b.rule)
    }

    /// Bound columns of one table, ascending by column id.
    pub fn columns_of(&self, table: TableId) -> impl Iterator<Item = (ColumnId, &[Binding])> {
        let range = ColumnAddr::new(table, ColumnId::new(0))..=ColumnAddr::new(table, ColumnId::new(u64::MAX));
        self.bindings
            .range(range)
            .map(|(addr, bindings)| (addr.column, bindings.as_slice()))
    }

    /// Every bound column.
    pub fn bound_columns(&self) -> impl Iterator<Item = ColumnAddr> + '_ {
        self.bindings.keys().copied()
    }

    /// Every binding, grouped by column.
    pub fn iter(&self) -> impl Iterator<Item = (ColumnAddr, &[Binding])> {
        self.bindings.iter().map(|(addr, b)| (*addr, b.as_slice()))
    }

    /// Total number of bindings.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.bindings.values().map(Vec::len).sum()
    }

    /// Returns true if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Resolution warnings by rule.
    #[must_use]
    pub fn warnings(&self) -> &BTreeMap<RuleId, Vec<Warning>> {
        &self.warnings
    }

    /// Columns whose bindings differ between `self` and `other`.
    #[must_use]
    pub fn diff(&self, other: &Self) -> BTreeSet<ColumnAddr> {
        self.bindings
            .keys()
            .chain(other.bindings.keys())
            .filter(|addr| self.bindings(**addr) != other.bindings(**addr))
            .copied()
            .collect()
    }

    /// Closes a set of columns over readers: the result holds the seed plus
    /// every bound column whose bindings read, directly or transitively, a
    /// column in the set.
    #[must_use]
    pub fn dependents(&self, seed: impl IntoIterator<Item = ColumnAddr>) -> BTreeSet<ColumnAddr> {
        let mut closed = BTreeSet::new();
        let mut pending: Vec<ColumnAddr> = seed.into_iter().collect();
        while let Some(addr) = pending.pop() {
            if !closed.insert(addr) {
                continue;
            }
            if let Some(readers) = self.readers.get(&addr) {
                pending.extend(readers.iter().filter(|r| !closed.contains(r)));
            }
        }
        closed
    }

    /// For each table, the other tables its bindings read.
    #[must_use]
    pub fn table_dependencies(&self) -> BTreeMap<TableId, BTreeSet<TableId>> {
        let mut deps: BTreeMap<TableId, BTreeSet<TableId>> = BTreeMap::new();
        for binding in self.bindings.values().flatten() {
            for read in binding.reads() {
                if read.table != binding.target.table {
                    deps.entry(binding.target.table).or_default().insert(read.table);
                }
            }
        }
        deps
    }
}
