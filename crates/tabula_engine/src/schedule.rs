//! Table scheduling.
//!
//! A table that reads another table's evaluated output (through an
//! `InColumn` matcher or a link) must be evaluated after it. The
//! [`DependencyGraph`] records those edges; [`DependencyGraph::schedule`]
//! groups tables into waves whose members depend only on earlier waves.
//!
//! Tables on a cycle cannot be ordered. They are scheduled as if they had no
//! dependencies and their cross-table bindings are disabled for the pass.

use std::collections::{BTreeMap, BTreeSet};

use tabula_foundation::TableId;
use tracing::warn;

use crate::diagnostic::Diagnostic;
use crate::index::RuleIndex;

// =============================================================================
// Dependency Graph
// =============================================================================

/// Table → tables it reads.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    nodes: BTreeSet<TableId>,
    deps: BTreeMap<TableId, BTreeSet<TableId>>,
}

impl DependencyGraph {
    /// Creates a graph of unconnected tables.
    #[must_use]
    pub fn new(tables: impl IntoIterator<Item = TableId>) -> Self {
        Self {
            nodes: tables.into_iter().collect(),
            deps: BTreeMap::new(),
        }
    }

    /// Builds the graph from an index's cross-table bindings.
    ///
    /// Edges touching tables outside `tables` are dropped.
    #[must_use]
    pub fn from_index(index: &RuleIndex, tables: impl IntoIterator<Item = TableId>) -> Self {
        let mut graph = Self::new(tables);
        for (dependent, dependencies) in index.table_dependencies() {
            for dependency in dependencies {
                graph.add_dependency(dependent, dependency);
            }
        }
        graph
    }

    /// Records that `dependent` reads `dependency`. Self edges are ignored,
    /// as are edges between tables not in the graph.
    pub fn add_dependency(&mut self, dependent: TableId, dependency: TableId) {
        if dependent != dependency
            && self.nodes.contains(&dependent)
            && self.nodes.contains(&dependency)
        {
            self.deps.entry(dependent).or_default().insert(dependency);
        }
    }

    /// Tables in the graph.
    pub fn tables(&self) -> impl Iterator<Item = TableId> + '_ {
        self.nodes.iter().copied()
    }

    /// Tables `table` reads.
    pub fn dependencies(&self, table: TableId) -> impl Iterator<Item = TableId> + '_ {
        self.deps.get(&table).into_iter().flatten().copied()
    }

    /// Strongly connected components with more than one table, each sorted,
    /// in ascending order of their first table.
    #[must_use]
    pub fn cycles(&self) -> Vec<Vec<TableId>> {
        let mut tarjan = Tarjan::new(self);
        for table in &self.nodes {
            if !tarjan.indices.contains_key(table) {
                tarjan.visit(*table);
            }
        }
        let mut cycles: Vec<Vec<TableId>> = tarjan
            .components
            .into_iter()
            .filter(|c| c.len() > 1)
            .map(|mut c| {
                c.sort_unstable();
                c
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// Orders the tables into waves.
    #[must_use]
    pub fn schedule(&self) -> Schedule {
        let cycles = self.cycles();
        let cyclic: BTreeSet<TableId> = cycles.iter().flatten().copied().collect();
        for cycle in &cycles {
            warn!(tables = ?cycle, "cyclic link dependency; cross-table rules disabled");
        }

        let mut placed = BTreeSet::new();
        let mut waves = Vec::new();
        while placed.len() < self.nodes.len() {
            let wave: Vec<TableId> = self
                .nodes
                .iter()
                .copied()
                .filter(|t| !placed.contains(t))
                .filter(|t| cyclic.contains(t) || self.dependencies(*t).all(|d| placed.contains(&d)))
                .collect();
            if wave.is_empty() {
                break;
            }
            placed.extend(wave.iter().copied());
            waves.push(wave);
        }

        Schedule {
            waves,
            cycles,
            cyclic,
        }
    }
}

struct Tarjan<'g> {
    graph: &'g DependencyGraph,
    next: usize,
    indices: BTreeMap<TableId, usize>,
    lowlinks: BTreeMap<TableId, usize>,
    stack: Vec<TableId>,
    on_stack: BTreeSet<TableId>,
    components: Vec<Vec<TableId>>,
}

impl<'g> Tarjan<'g> {
    fn new(graph: &'g DependencyGraph) -> Self {
        Self {
            graph,
            next: 0,
            indices: BTreeMap::new(),
            lowlinks: BTreeMap::new(),
            stack: Vec::new(),
            on_stack: BTreeSet::new(),
            components: Vec::new(),
        }
    }

    /// Visits every table reachable from `root` with an explicit frame
    /// stack, so long dependency chains cannot overflow the call stack.
    fn visit(&mut self, root: TableId) {
        let mut frames = Vec::new();
        self.enter(root, &mut frames);
        while let Some(frame) = frames.last_mut() {
            let v = frame.table;
            let next = frame.dependencies.get(frame.next).copied();
            frame.next += 1;
            match next {
                Some(w) => match self.indices.get(&w).copied() {
                    None => self.enter(w, &mut frames),
                    Some(w_index) if self.on_stack.contains(&w) => self.lower(v, w_index),
                    Some(_) => {}
                },
                None => {
                    frames.pop();
                    let low = self.lowlinks[&v];
                    if let Some(parent) = frames.last() {
                        self.lower(parent.table, low);
                    }
                    if low == self.indices[&v] {
                        self.pop_component(v);
                    }
                }
            }
        }
    }

    fn enter(&mut self, v: TableId, frames: &mut Vec<Frame>) {
        let index = self.next;
        self.next += 1;
        self.indices.insert(v, index);
        self.lowlinks.insert(v, index);
        self.stack.push(v);
        self.on_stack.insert(v);
        frames.push(Frame {
            table: v,
            dependencies: self.graph.dependencies(v).collect(),
            next: 0,
        });
    }

    fn lower(&mut self, v: TableId, to: usize) {
        if let Some(low) = self.lowlinks.get_mut(&v) {
            *low = (*low).min(to);
        }
    }

    fn pop_component(&mut self, v: TableId) {
        let mut component = Vec::new();
        while let Some(w) = self.stack.pop() {
            self.on_stack.remove(&w);
            component.push(w);
            if w == v {
                break;
            }
        }
        self.components.push(component);
    }
}

struct Frame {
    table: TableId,
    dependencies: Vec<TableId>,
    next: usize,
}

// =============================================================================
// Schedule
// =============================================================================

/// Tables grouped into dependency waves.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Schedule {
    waves: Vec<Vec<TableId>>,
    cycles: Vec<Vec<TableId>>,
    cyclic: BTreeSet<TableId>,
}

impl Schedule {
    /// Waves in evaluation order. Tables within a wave are independent.
    #[must_use]
    pub fn waves(&self) -> &[Vec<TableId>] {
        &self.waves
    }

    /// All tables in evaluation order.
    pub fn order(&self) -> impl Iterator<Item = TableId> + '_ {
        self.waves.iter().flatten().copied()
    }

    /// Returns true if `table` is on a cycle.
    #[must_use]
    pub fn is_cyclic(&self, table: TableId) -> bool {
        self.cyclic.contains(&table)
    }

    /// The cycles found.
    #[must_use]
    pub fn cycles(&self) -> &[Vec<TableId>] {
        &self.cycles
    }

    /// One diagnostic per cycle.
    #[must_use]
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.cycles
            .iter()
            .map(|tables| Diagnostic::CyclicLinkDependency {
                tables: tables.clone(),
            })
            .collect()
    }
}
