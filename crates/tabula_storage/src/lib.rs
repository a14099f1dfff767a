//! Column arenas, tables, and the table catalog for Tabula.
//!
//! This crate provides:
//! - [`Column`] - A stable-id column definition with a display name
//! - [`Row`] - A persistent mapping from column id to value
//! - [`Table`] - An ordered column arena plus persistent rows
//! - [`Catalog`] - The working set of tables, ordered by id

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod catalog;
pub mod table;

pub use catalog::Catalog;
pub use table::{Column, Row, Table};
