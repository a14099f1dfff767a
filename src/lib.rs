//! Tabula - Deterministic rule engine for tabular data
//!
//! This crate re-exports all layers of the Tabula system for convenient access.
//! For detailed documentation, see the individual layer crates.
//!
//! # Architecture
//!
//! ```text
//! Layer 3: tabula_runtime    : Sessions, persistence, CLI
//! Layer 2: tabula_engine     : Rules, index, evaluation, provenance, scheduling
//! Layer 1: tabula_storage    : Column arenas, tables, catalog
//! Layer 0: tabula_foundation : Core types (Value, ids, Error)
//! ```

pub use tabula_engine as engine;
pub use tabula_foundation as foundation;
pub use tabula_runtime as runtime;
pub use tabula_storage as storage;
