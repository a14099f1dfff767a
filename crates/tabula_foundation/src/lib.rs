//! Core types, values, identifiers, and errors for Tabula.
//!
//! This crate provides:
//! - [`Value`] - The scalar cell value, including tagged-entity wrappers
//! - [`TableId`], [`ColumnId`], [`RuleId`], [`EntryId`] - Stable identifiers
//! - [`Type`] - Declared column types
//! - [`Error`] - Rich error types with context

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;
pub mod types;
pub mod value;

pub use error::{Error, ErrorContext, ErrorKind, Result};
pub use ids::{ColumnId, EntryId, RuleId, TableId};
pub use types::Type;
pub use value::{Tagged, Value};
