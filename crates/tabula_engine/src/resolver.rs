//! Column reference resolution.
//!
//! Rules name columns by display name; everything downstream works with
//! [`ColumnAddr`]s. Resolution is re-run whenever the table set or a column
//! name changes, so a rename can make a rule bind or unbind without the rule
//! itself being touched.

use std::fmt;
use std::sync::Arc;

use tabula_foundation::{ColumnId, TableId};
use tabula_storage::{Catalog, Table};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::rule::ColumnRef;

/// A resolved column: table id plus column id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ColumnAddr {
    /// Owning table.
    pub table: TableId,
    /// Column within the table.
    pub column: ColumnId,
}

impl ColumnAddr {
    /// Creates an address.
    #[must_use]
    pub const fn new(table: TableId, column: ColumnId) -> Self {
        Self { table, column }
    }
}

impl fmt::Display for ColumnAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// Why a reference did not resolve.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Unresolved {
    /// No table has the qualifying name.
    MissingTable(Arc<str>),
    /// A local rule's table id is not loaded.
    MissingTableId(TableId),
    /// The table exists but has no column with that name.
    MissingColumn {
        /// Table searched.
        table: TableId,
        /// Column name looked for.
        column: Arc<str>,
    },
    /// A qualified reference points outside a local rule's table.
    OutOfScope {
        /// The rule's table.
        owner: TableId,
        /// The table the reference names.
        table: TableId,
    },
}

impl fmt::Display for Unresolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTable(name) => write!(f, "no table named {name:?}"),
            Self::MissingTableId(id) => write!(f, "{id} is not loaded"),
            Self::MissingColumn { table, column } => {
                write!(f, "{table} has no column named {column:?}")
            }
            Self::OutOfScope { owner, table } => {
                write!(f, "{table} is outside the scope of a rule local to {owner}")
            }
        }
    }
}

/// Resolves references against a catalog.
#[derive(Clone, Copy)]
pub struct Resolver<'a> {
    catalog: &'a Catalog,
}

impl<'a> Resolver<'a> {
    /// Creates a resolver over the given tables.
    #[must_use]
    pub const fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Resolves a reference from the point of view of `context`.
    ///
    /// Unqualified references resolve against `context`; qualified ones
    /// against the named table, wherever it is.
    ///
    /// # Errors
    /// Returns why the reference cannot be resolved.
    pub fn resolve(&self, reference: &ColumnRef, context: &Table) -> Result<ColumnAddr, Unresolved> {
        match &reference.table {
            Some(_) => self.resolve_qualified(reference),
            None => Self::resolve_in(context, &reference.column),
        }
    }

    /// Resolves a reference that must carry a table name.
    ///
    /// An unqualified reference is reported as [`Unresolved::MissingTable`]
    /// with an empty name.
    ///
    /// # Errors
    /// Returns why the reference cannot be resolved.
    pub fn resolve_qualified(&self, reference: &ColumnRef) -> Result<ColumnAddr, Unresolved> {
        let name = reference
            .table
            .as_ref()
            .ok_or_else(|| Unresolved::MissingTable(Arc::from("")))?;
        let table = self
            .catalog
            .table_by_name(name)
            .ok_or_else(|| Unresolved::MissingTable(name.clone()))?;
        Self::resolve_in(table, &reference.column)
    }

    /// Resolves a column name within one table.
    ///
    /// # Errors
    /// Returns [`Unresolved::MissingColumn`] if no column has that name.
    pub fn resolve_in(table: &Table, column: &Arc<str>) -> Result<ColumnAddr, Unresolved> {
        table
            .column_by_name(column)
            .map(|c| ColumnAddr::new(table.id(), c.id))
            .ok_or_else(|| Unresolved::MissingColumn {
                table: table.id(),
                column: column.clone(),
            })
    }

    /// The catalog being resolved against.
    #[must_use]
    pub const fn catalog(&self) -> &'a Catalog {
        self.catalog
    }
}
