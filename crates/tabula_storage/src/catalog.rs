//! The working set of loaded tables.

use std::collections::BTreeMap;

use tabula_foundation::{Error, ErrorKind, Result, TableId};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::table::Table;

/// The set of loaded tables, ordered by id.
///
/// Iteration is always in id order so every consumer sees tables in the same
/// sequence regardless of load order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Catalog {
    tables: BTreeMap<TableId, Table>,
}

impl Catalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog from tables, replacing duplicates by id.
    #[must_use]
    pub fn from_tables(tables: impl IntoIterator<Item = Table>) -> Self {
        let mut catalog = Self::new();
        for table in tables {
            catalog.upsert(table);
        }
        catalog
    }

    /// Returns the number of tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns true if no tables are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Returns a table id one past the largest loaded id.
    #[must_use]
    pub fn next_table_id(&self) -> TableId {
        self.tables
            .keys()
            .next_back()
            .map_or(TableId::new(0), |id| id.next())
    }

    /// Adds a new table.
    ///
    /// # Errors
    /// Returns an error if a table with the same id is already loaded.
    pub fn insert(&mut self, table: Table) -> Result<()> {
        let id = table.id();
        if self.tables.contains_key(&id) {
            return Err(Error::new(ErrorKind::DuplicateTable(id)));
        }
        self.tables.insert(id, table);
        Ok(())
    }

    /// Adds or replaces a table, returning the previous one.
    pub fn upsert(&mut self, table: Table) -> Option<Table> {
        self.tables.insert(table.id(), table)
    }

    /// Removes a table.
    ///
    /// # Errors
    /// Returns an error if the table is not loaded.
    pub fn remove(&mut self, id: TableId) -> Result<Table> {
        self.tables
            .remove(&id)
            .ok_or_else(|| Error::table_not_found(id))
    }

    /// Returns true if the table is loaded.
    #[must_use]
    pub fn contains(&self, id: TableId) -> bool {
        self.tables.contains_key(&id)
    }

    /// Looks up a table by id.
    #[must_use]
    pub fn get(&self, id: TableId) -> Option<&Table> {
        self.tables.get(&id)
    }

    /// Looks up a table by id for mutation.
    pub fn get_mut(&mut self, id: TableId) -> Option<&mut Table> {
        self.tables.get_mut(&id)
    }

    /// Looks up a table by id, failing if absent.
    ///
    /// # Errors
    /// Returns an error if the table is not loaded.
    pub fn require(&self, id: TableId) -> Result<&Table> {
        self.get(id).ok_or_else(|| Error::table_not_found(id))
    }

    /// Looks up a table by exact, case-sensitive display name.
    ///
    /// When display names collide the table with the lowest id wins.
    #[must_use]
    pub fn table_by_name(&self, name: &str) -> Option<&Table> {
        self.tables.values().find(|t| t.name() == name)
    }

    /// Iterates over tables in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    /// Iterates over table ids in order.
    pub fn ids(&self) -> impl Iterator<Item = TableId> + '_ {
        self.tables.keys().copied()
    }

    /// Removes every table.
    pub fn clear(&mut self) {
        self.tables.clear();
    }
}

impl FromIterator<Table> for Catalog {
    fn from_iter<I: IntoIterator<Item = Table>>(iter: I) -> Self {
        Self::from_tables(iter)
    }
}
