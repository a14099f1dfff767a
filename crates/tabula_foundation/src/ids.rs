//! Stable identifiers for tables, columns, rules, and provenance entries.
//!
//! Identifiers are assigned once and never derived from display names, so a
//! rename never changes what an id refers to.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
        #[cfg_attr(feature = "serde", serde(transparent))]
        pub struct $name(pub u64);

        impl $name {
            /// Creates an identifier from its raw value.
            #[must_use]
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Returns the raw value of this identifier.
            #[must_use]
            pub const fn raw(self) -> u64 {
                self.0
            }

            /// Returns the identifier that follows this one.
            #[must_use]
            pub const fn next(self) -> Self {
                Self(self.0 + 1)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $label, self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

define_id!(
    /// Identifier of a table. Stable across renames of the table's display name.
    TableId,
    "Table"
);

define_id!(
    /// Identifier of a column, unique within its table.
    ///
    /// Column ids are allocated from a per-table counter and are never reused
    /// after the column is removed.
    ColumnId,
    "Col"
);

define_id!(
    /// Identifier of a rule, assigned by the layer that authored it.
    RuleId,
    "Rule"
);

define_id!(
    /// Identifier of a provenance entry, unique for the lifetime of a change log.
    EntryId,
    "Entry"
);
