//! Tables with stable column identity.
//!
//! A table's columns form an arena keyed by [`ColumnId`]; the display name is
//! just a field, so renames and reorders never change what an id refers to.
//! Rows use persistent maps and the row list is a persistent vector, so
//! cloning a table is O(1) and evaluation can work on a snapshot while the
//! previous state stays intact.

use std::sync::Arc;

use im::{OrdMap, Vector};
use tabula_foundation::{ColumnId, Error, Result, TableId, Type, Value};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

static NULL: Value = Value::Null;

/// A column definition.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Column {
    /// Stable identifier, unique within the owning table.
    pub id: ColumnId,
    /// Display name. Rules refer to columns by this name.
    pub name: Arc<str>,
    /// Declared type.
    pub ty: Type,
}

/// A row: a persistent mapping from column id to value.
///
/// Cells that were never written read as [`Value::Null`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Row(OrdMap<ColumnId, Value>);

impl Row {
    /// Creates an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self(OrdMap::new())
    }

    /// Returns the value in `column`, or null.
    #[must_use]
    pub fn get(&self, column: ColumnId) -> &Value {
        self.0.get(&column).unwrap_or(&NULL)
    }

    /// Writes a value, returning the previous one.
    pub fn set(&mut self, column: ColumnId, value: Value) -> Value {
        if value.is_null() && !matches!(value, Value::Tagged(_)) {
            self.0.remove(&column).unwrap_or_default()
        } else {
            self.0.insert(column, value).unwrap_or_default()
        }
    }

    /// Removes a cell entirely.
    pub fn remove(&mut self, column: ColumnId) -> Value {
        self.0.remove(&column).unwrap_or_default()
    }

    /// Iterates over non-null cells in column id order.
    pub fn iter(&self) -> impl Iterator<Item = (ColumnId, &Value)> {
        self.0.iter().map(|(c, v)| (*c, v))
    }
}

/// A table: an ordered column arena and a sequence of rows.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Table {
    id: TableId,
    name: Arc<str>,
    columns: Vec<Column>,
    /// Next column id to allocate. Never decreases, so ids are never reused.
    next_column: u64,
    rows: Vector<Row>,
}

impl Table {
    /// Creates an empty table.
    #[must_use]
    pub fn new(id: TableId, name: impl AsRef<str>) -> Self {
        Self {
            id,
            name: Arc::from(name.as_ref()),
            columns: Vec::new(),
            next_column: 0,
            rows: Vector::new(),
        }
    }

    /// Builder: adds a free-form column.
    #[must_use]
    pub fn with_column(mut self, name: impl AsRef<str>) -> Self {
        self.add_column(name, Type::Any);
        self
    }

    /// Builder: appends a row given values in column display order.
    ///
    /// # Panics
    /// Panics if a value is not accepted by its column's declared type.
    /// Intended for fixtures; use [`Table::push_record`] for fallible input.
    #[must_use]
    pub fn with_row<V: Into<Value>>(mut self, values: impl IntoIterator<Item = V>) -> Self {
        self.push_record(values.into_iter().map(Into::into))
            .expect("fixture row must match column types");
        self
    }

    /// Returns the table id.
    #[must_use]
    pub const fn id(&self) -> TableId {
        self.id
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renames the table. Its id is unchanged.
    pub fn rename(&mut self, name: impl AsRef<str>) {
        self.name = Arc::from(name.as_ref());
    }

    // =========================================================================
    // Columns
    // =========================================================================

    /// Returns the columns in display order.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Returns the column ids in display order.
    pub fn column_ids(&self) -> impl Iterator<Item = ColumnId> + '_ {
        self.columns.iter().map(|c| c.id)
    }

    /// Looks up a column by id.
    #[must_use]
    pub fn column(&self, id: ColumnId) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == id)
    }

    /// Returns true if the column exists.
    #[must_use]
    pub fn has_column(&self, id: ColumnId) -> bool {
        self.column(id).is_some()
    }

    /// Looks up a column by exact, case-sensitive display name.
    ///
    /// If several columns share a display name the first in display order wins.
    #[must_use]
    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| &*c.name == name)
    }

    /// Adds a column and returns its freshly allocated id.
    pub fn add_column(&mut self, name: impl AsRef<str>, ty: Type) -> ColumnId {
        let id = ColumnId::new(self.next_column);
        self.next_column += 1;
        self.columns.push(Column {
            id,
            name: Arc::from(name.as_ref()),
            ty,
        });
        id
    }

    /// Removes a column and every cell in it.
    ///
    /// # Errors
    /// Returns an error if the column does not exist.
    pub fn remove_column(&mut self, id: ColumnId) -> Result<Column> {
        let position = self
            .columns
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| Error::column_not_found(self.id, id))?;
        let column = self.columns.remove(position);
        for row in self.rows.iter_mut() {
            row.remove(id);
        }
        Ok(column)
    }

    /// Changes a column's display name.
    ///
    /// # Errors
    /// Returns an error if the column does not exist.
    pub fn rename_column(&mut self, id: ColumnId, name: impl AsRef<str>) -> Result<()> {
        let table = self.id;
        let column = self
            .columns
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::column_not_found(table, id))?;
        column.name = Arc::from(name.as_ref());
        Ok(())
    }

    /// Moves a column to a new display position.
    ///
    /// # Errors
    /// Returns an error if the column does not exist.
    pub fn move_column(&mut self, id: ColumnId, position: usize) -> Result<()> {
        let from = self
            .columns
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| Error::column_not_found(self.id, id))?;
        let column = self.columns.remove(from);
        let to = position.min(self.columns.len());
        self.columns.insert(to, column);
        Ok(())
    }

    // =========================================================================
    // Rows
    // =========================================================================

    /// Returns the number of rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Returns a row by index.
    #[must_use]
    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    /// Iterates over rows in order.
    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter()
    }

    /// Appends a row given values in column display order.
    ///
    /// Missing trailing values are null; extra values are an error.
    ///
    /// # Errors
    /// Returns an error if there are more values than columns or a value is
    /// not accepted by its column's declared type.
    pub fn push_record(&mut self, values: impl IntoIterator<Item = Value>) -> Result<usize> {
        let values: Vec<Value> = values.into_iter().collect();
        if values.len() > self.columns.len() {
            return Err(Error::arity_mismatch(self.columns.len(), values.len()));
        }
        let mut row = Row::new();
        for (column, value) in self.columns.iter().zip(values) {
            Self::check_type(column, &value)?;
            row.set(column.id, value);
        }
        self.rows.push_back(row);
        Ok(self.rows.len() - 1)
    }

    /// Appends a row given `(column, value)` pairs.
    ///
    /// # Errors
    /// Returns an error if a column does not exist or a value is not accepted
    /// by its column's declared type.
    pub fn push_row(&mut self, cells: impl IntoIterator<Item = (ColumnId, Value)>) -> Result<usize> {
        let mut row = Row::new();
        for (id, value) in cells {
            let column = self
                .column(id)
                .ok_or_else(|| Error::column_not_found(self.id, id))?;
            Self::check_type(column, &value)?;
            row.set(id, value);
        }
        self.rows.push_back(row);
        Ok(self.rows.len() - 1)
    }

    /// Reads a cell.
    ///
    /// # Errors
    /// Returns an error if the row or column does not exist.
    pub fn get(&self, row: usize, column: ColumnId) -> Result<&Value> {
        if !self.has_column(column) {
            return Err(Error::column_not_found(self.id, column));
        }
        self.rows
            .get(row)
            .map(|r| r.get(column))
            .ok_or_else(|| Error::row_out_of_bounds(self.id, row, self.rows.len()))
    }

    /// Writes a cell, returning the previous value.
    ///
    /// # Errors
    /// Returns an error if the row or column does not exist, or the value is
    /// not accepted by the column's declared type.
    pub fn set(&mut self, row: usize, column: ColumnId, value: Value) -> Result<Value> {
        let col = self
            .column(column)
            .ok_or_else(|| Error::column_not_found(self.id, column))?;
        Self::check_type(col, &value)?;
        let length = self.rows.len();
        let target = self
            .rows
            .get_mut(row)
            .ok_or_else(|| Error::row_out_of_bounds(self.id, row, length))?;
        Ok(target.set(column, value))
    }

    /// Overwrites one column's cells with the same column from `other`.
    ///
    /// Both tables must hold the column and have the same number of rows.
    ///
    /// # Errors
    /// Returns an error if either table lacks the column, the row counts
    /// differ, or a copied value is rejected by this table's declared type.
    pub fn copy_column_from(&mut self, other: &Table, column: ColumnId) -> Result<()> {
        if !other.has_column(column) {
            return Err(Error::column_not_found(other.id, column));
        }
        if other.row_count() != self.row_count() {
            return Err(Error::arity_mismatch(self.row_count(), other.row_count()));
        }
        for (index, value) in other.column_values(column).enumerate() {
            self.set(index, column, value.clone())?;
        }
        Ok(())
    }

    /// Iterates over one column's values in row order.
    pub fn column_values(&self, column: ColumnId) -> impl Iterator<Item = &Value> {
        self.rows.iter().map(move |r| r.get(column))
    }

    fn check_type(column: &Column, value: &Value) -> Result<()> {
        let actual = value.value_type();
        if column.ty.accepts(actual) {
            Ok(())
        } else {
            Err(Error::type_mismatch(column.ty, actual))
        }
    }
}
