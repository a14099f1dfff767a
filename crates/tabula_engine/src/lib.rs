//! Rule index, evaluation, provenance, and incremental re-evaluation for Tabula.
//!
//! This crate provides:
//! - [`RuleCompiler`] - Validation of rule declarations into [`Rule`]s
//! - [`Resolver`] - Column reference resolution against the loaded tables
//! - [`RuleIndex`] - Per-column ordered rule bindings
//! - [`evaluate`] - Single-table evaluation with provenance and links
//! - [`run_pass`] - Scheduled multi-table evaluation with cancellation
//! - [`ChangeLog`] - Append-only provenance store
//! - [`Reevaluator`] - Minimal re-evaluation scopes for a change
//!
//! # Data flow
//!
//! ```text
//! tables + rules ──► RuleIndex ──► DependencyGraph ──► Schedule
//!                        │                               │
//!                        ▼                               ▼
//!                    Resolver ─────────────────────► run_pass ──► outputs
//!                                                        │        ChangeLog
//!                                                        │        LinkStore
//!                                   Reevaluator ─► ScopeSet (narrows the next pass)
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod cancel;
pub mod diagnostic;
pub mod evaluate;
pub mod incremental;
pub mod index;
pub mod link;
pub mod pass;
pub mod pattern;
pub mod provenance;
pub mod resolver;
pub mod rule;
pub mod schedule;
pub mod transform;

pub use cancel::CancelToken;
pub use diagnostic::{Diagnostic, Diagnostics, SkipReason, Warning};
pub use evaluate::{EvalContext, Suppressions, TableEvaluation, evaluate};
pub use incremental::{Change, Reevaluator, ScopeSet, VersionedChange};
pub use index::{Binding, RuleIndex};
pub use link::{CellAddr, LinkRecord, LinkStore};
pub use pass::{PassOutcome, PassRequest, run_pass};
pub use pattern::{CompareOp, MatchOutcome, Matcher, Pattern};
pub use provenance::{ChangeLog, Effect, EffectKind, LogicalClock, ProvenanceEntry};
pub use resolver::{ColumnAddr, Resolver, Unresolved};
pub use rule::compiler::{ActionDecl, MatcherDecl, RuleCompiler, RuleDecl, TransformDecl};
pub use rule::{Action, ColumnRef, OrderKey, Rule, Scope};
pub use schedule::{DependencyGraph, Schedule};
pub use transform::Transform;
