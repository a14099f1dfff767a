//! JSON project files.
//!
//! A project names its tables, their columns, and their rows, plus the rule
//! declarations to apply:
//!
//! ```json
//! {
//!   "tables": [
//!     {
//!       "id": 1,
//!       "name": "Customers",
//!       "columns": ["Name", { "name": "Age", "type": "int" }],
//!       "rows": [["Ann", 31], ["Bob", null]]
//!     }
//!   ],
//!   "rules": [
//!     {
//!       "id": 1,
//!       "columns": [{ "column": "Name" }],
//!       "matcher": "any",
//!       "action": { "replace": "uppercase" }
//!     }
//!   ]
//! }
//! ```
//!
//! Table ids are optional and assigned in file order when absent.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tabula_engine::RuleDecl;
use tabula_foundation::{Error, ErrorKind, Result, TableId, Type, Value};
use tabula_storage::Table;

use crate::config::SessionConfig;
use crate::session::{LoadMode, LoadReport, Session};

/// A column as written in a project file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnSpec {
    /// A free-form column.
    Name(String),
    /// A column with a declared type.
    Typed {
        /// Display name.
        name: String,
        /// Declared type.
        #[serde(rename = "type", default)]
        ty: Type,
    },
}

impl ColumnSpec {
    fn parts(&self) -> (&str, Type) {
        match self {
            Self::Name(name) => (name, Type::Any),
            Self::Typed { name, ty } => (name, *ty),
        }
    }
}

/// A table as written in a project file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Stable id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TableId>,
    /// Display name.
    pub name: String,
    /// Columns in display order.
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
    /// Rows, each listing values in column order.
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
}

/// A project file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Tables.
    #[serde(default)]
    pub tables: Vec<TableSpec>,
    /// Rule declarations.
    #[serde(default)]
    pub rules: Vec<RuleDecl>,
}

impl Project {
    /// Parses a project from JSON text.
    ///
    /// # Errors
    /// Returns an error if the text is not a valid project.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::new(ErrorKind::SerializationError(e.to_string())))
    }

    /// Renders the project as pretty-printed JSON.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::new(ErrorKind::SerializationError(e.to_string())))
    }

    /// Reads a project file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            Error::new(ErrorKind::IoError(format!(
                "failed to read file '{}': {e}",
                path.display()
            )))
        })?;
        Self::from_json(&text)
    }

    /// Builds the tables, assigning ids to those without one.
    ///
    /// # Errors
    /// Returns an error if a row has more values than its table has columns,
    /// or a value does not fit its column's type.
    pub fn tables(&self) -> Result<Vec<Table>> {
        let mut next = self
            .tables
            .iter()
            .filter_map(|t| t.id)
            .max()
            .map_or(TableId::new(1), TableId::next);
        let mut tables = Vec::with_capacity(self.tables.len());
        for spec in &self.tables {
            let id = spec.id.unwrap_or_else(|| {
                let id = next;
                next = next.next();
                id
            });
            let mut table = Table::new(id, &spec.name);
            for column in &spec.columns {
                let (name, ty) = column.parts();
                table.add_column(name, ty);
            }
            for row in &spec.rows {
                table.push_record(row.iter().cloned())?;
            }
            tables.push(table);
        }
        Ok(tables)
    }

    /// Opens a session over this project. Rejected rules are reported, not
    /// fatal.
    ///
    /// # Errors
    /// Returns an error if the tables cannot be built.
    pub fn into_session(self, config: SessionConfig) -> Result<(Session, LoadReport)> {
        let tables = self.tables()?;
        let mut session = Session::with_config(config);
        session.load_tables(tables, LoadMode::Replace);
        let report = session.load_rules(self.rules, LoadMode::Replace);
        Ok((session, report))
    }
}
