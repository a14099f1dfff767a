//! Session configuration.

/// Configuration for a [`Session`](crate::Session).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Evaluate independent tables of a wave on separate threads.
    pub parallel_tables: bool,

    /// Record skipped rule applications as provenance entries.
    pub record_skips: bool,

    /// Reject changes whose version is not newer than the last one applied.
    /// When false, stale changes are logged and applied anyway.
    pub reject_stale: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            parallel_tables: false,
            record_skips: true,
            reject_stale: true,
        }
    }
}

impl SessionConfig {
    /// Parallel evaluation without skip records, for large batch runs.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            parallel_tables: true,
            record_skips: false,
            reject_stale: true,
        }
    }

    /// Sequential evaluation with every skip recorded.
    #[must_use]
    pub fn audit() -> Self {
        Self::default()
    }

    /// Builder method to set parallel evaluation.
    #[must_use]
    pub fn with_parallel_tables(mut self, parallel: bool) -> Self {
        self.parallel_tables = parallel;
        self
    }

    /// Builder method to set skip recording.
    #[must_use]
    pub fn with_record_skips(mut self, record: bool) -> Self {
        self.record_skips = record;
        self
    }

    /// Builder method to set stale version handling.
    #[must_use]
    pub fn with_reject_stale(mut self, reject: bool) -> Self {
        self.reject_stale = reject;
        self
    }
}
