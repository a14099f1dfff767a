//! Cooperative cancellation.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tabula_foundation::TableId;

/// A shared cancellation flag, for all work or for individual tables.
///
/// Clones share state. Evaluation checks the token before starting a table
/// and again before committing its result; a table cancelled in between is
/// discarded and its previous state kept.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    all: Arc<AtomicBool>,
    tables: Arc<Mutex<BTreeSet<TableId>>>,
}

impl CancelToken {
    /// Creates a token with nothing cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels all in-flight work.
    pub fn cancel_all(&self) {
        self.all.store(true, Ordering::SeqCst);
    }

    /// Cancels work for one table.
    pub fn cancel_table(&self, table: TableId) {
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(table);
    }

    /// Returns true if work for `table` should stop.
    #[must_use]
    pub fn is_cancelled(&self, table: TableId) -> bool {
        self.all.load(Ordering::SeqCst)
            || self
                .tables
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(&table)
    }

    /// Returns true if everything was cancelled.
    #[must_use]
    pub fn is_all_cancelled(&self) -> bool {
        self.all.load(Ordering::SeqCst)
    }

    /// Clears every cancellation.
    pub fn reset(&self) {
        self.all.store(false, Ordering::SeqCst);
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
