//! Error types for the Tabula system.
//!
//! Uses `thiserror` for ergonomic error definition with rich context.
//!
//! Only structural failures are errors. Per-cell and per-rule conditions
//! (unresolved references, type mismatches, cyclic links) are reported as
//! diagnostics by the engine and never abort an evaluation pass.

use std::fmt;

use thiserror::Error;

use crate::ids::{ColumnId, EntryId, RuleId, TableId};
use crate::types::Type;

/// The main error type for Tabula operations.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional context about where the error occurred.
    pub context: Option<ErrorContext>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Adds context to this error.
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Creates a table not found error.
    #[must_use]
    pub fn table_not_found(id: TableId) -> Self {
        Self::new(ErrorKind::TableNotFound(id))
    }

    /// Creates a column not found error.
    #[must_use]
    pub fn column_not_found(table: TableId, column: ColumnId) -> Self {
        Self::new(ErrorKind::ColumnNotFound { table, column })
    }

    /// Creates a row out of bounds error.
    #[must_use]
    pub fn row_out_of_bounds(table: TableId, row: usize, length: usize) -> Self {
        Self::new(ErrorKind::RowOutOfBounds { table, row, length })
    }

    /// Creates an arity mismatch error.
    #[must_use]
    pub fn arity_mismatch(expected: usize, actual: usize) -> Self {
        Self::new(ErrorKind::ArityMismatch { expected, actual })
    }

    /// Creates a rule not found error.
    #[must_use]
    pub fn rule_not_found(id: RuleId) -> Self {
        Self::new(ErrorKind::RuleNotFound(id))
    }

    /// Creates a provenance entry not found error.
    #[must_use]
    pub fn entry_not_found(id: EntryId) -> Self {
        Self::new(ErrorKind::EntryNotFound(id))
    }

    /// Creates a malformed rule error.
    #[must_use]
    pub fn malformed_rule(rule: Option<RuleId>, reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedRule {
            rule,
            reason: reason.into(),
        })
    }

    /// Creates an invalid pattern error.
    #[must_use]
    pub fn invalid_pattern(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidPattern {
            pattern: pattern.into(),
            message: message.into(),
        })
    }

    /// Creates a type mismatch error.
    #[must_use]
    pub fn type_mismatch(expected: Type, actual: Type) -> Self {
        Self::new(ErrorKind::TypeMismatch { expected, actual })
    }

    /// Creates a stale input error.
    #[must_use]
    pub fn stale_input(last: u64, received: u64) -> Self {
        Self::new(ErrorKind::StaleInput { last, received })
    }

    /// Returns true if this error rejected a rule definition.
    #[must_use]
    pub fn is_malformed_rule(&self) -> bool {
        matches!(self.kind, ErrorKind::MalformedRule { .. })
    }
}

/// Categorized error kinds for pattern matching.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// Table was not found in the working set.
    #[error("table not found: {0}")]
    TableNotFound(TableId),

    /// Column was not found in its table.
    #[error("column not found: {column} in {table}")]
    ColumnNotFound {
        /// The table that was queried.
        table: TableId,
        /// The column that was not found.
        column: ColumnId,
    },

    /// Row index past the end of the table.
    #[error("row {row} out of bounds in {table} (length {length})")]
    RowOutOfBounds {
        /// The table that was accessed.
        table: TableId,
        /// The row that was accessed.
        row: usize,
        /// The number of rows in the table.
        length: usize,
    },

    /// A record had more values than its table has columns.
    #[error("arity mismatch: expected at most {expected} values, got {actual}")]
    ArityMismatch {
        /// Number of columns in the table.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },

    /// Rule was not found in the working set.
    #[error("rule not found: {0}")]
    RuleNotFound(RuleId),

    /// Provenance entry was not found (or has been superseded).
    #[error("provenance entry not found: {0}")]
    EntryNotFound(EntryId),

    /// A table with this id is already loaded.
    #[error("duplicate table: {0}")]
    DuplicateTable(TableId),

    /// A rule with this id is already loaded.
    #[error("duplicate rule: {0}")]
    DuplicateRule(RuleId),

    /// A rule definition is missing required fields or is otherwise invalid.
    #[error("malformed rule{}: {reason}", .rule.map(|r| format!(" {r}")).unwrap_or_default())]
    MalformedRule {
        /// The rule id, if the definition carried one.
        rule: Option<RuleId>,
        /// What is wrong with the definition.
        reason: String,
    },

    /// A pattern failed to compile.
    #[error("invalid pattern {pattern:?}: {message}")]
    InvalidPattern {
        /// The offending pattern source.
        pattern: String,
        /// The compiler's complaint.
        message: String,
    },

    /// Type mismatch between a declared and an actual type.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The expected type.
        expected: Type,
        /// The actual type encountered.
        actual: Type,
    },

    /// An input event carried a version at or below one already applied.
    #[error("stale input: version {received} is not newer than {last}")]
    StaleInput {
        /// The last version applied.
        last: u64,
        /// The version that was received.
        received: u64,
    },

    /// The provenance entry records no effect that can be undone.
    #[error("entry {0} cannot be reverted")]
    NotRevertible(EntryId),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// File I/O failed.
    #[error("I/O error: {0}")]
    IoError(String),

    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Context about where an error occurred.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Source file or input name.
    pub source: Option<String>,
    /// Chain of operations that led to the error, outermost first.
    pub stack: Vec<String>,
}

impl ErrorContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the source.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Adds a frame.
    #[must_use]
    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.stack.push(frame.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(source) = &self.source {
            write!(f, "at {source}")?;
        }
        if !self.stack.is_empty() {
            writeln!(f)?;
            for frame in &self.stack {
                writeln!(f, "  in {frame}")?;
            }
        }
        Ok(())
    }
}

/// Result type alias for Tabula operations.
pub type Result<T> = std::result::Result<T, Error>;
