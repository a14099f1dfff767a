//! Scalar cell values.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::types::Type;

/// A cell value.
///
/// Values are immutable and cheaply cloneable. A cell that has been recognized
/// as one or more entity types holds a [`Value::Tagged`] wrapper around its
/// underlying value; tagging never alters the underlying value.
#[derive(Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Value {
    /// The null value (empty cell).
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating point.
    Float(f64),
    /// String value.
    String(Arc<str>),
    /// A value carrying entity-type labels.
    Tagged(Arc<Tagged>),
}

/// An underlying value plus the entity-type labels attached to it.
///
/// The base value is never itself tagged and the label set is never empty;
/// [`Value`]'s tagging helpers maintain both properties.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Tagged {
    /// The underlying value.
    pub base: Value,
    /// Entity-type labels, ordered for deterministic output.
    pub tags: BTreeSet<Arc<str>>,
}

impl Value {
    /// Creates a string value.
    #[must_use]
    pub fn string(s: impl AsRef<str>) -> Self {
        Self::String(Arc::from(s.as_ref()))
    }

    /// Returns the type of the underlying value.
    #[must_use]
    pub fn value_type(&self) -> Type {
        match self.base() {
            Self::Null => Type::Null,
            Self::Bool(_) => Type::Bool,
            Self::Int(_) => Type::Int,
            Self::Float(_) => Type::Float,
            Self::String(_) | Self::Tagged(_) => Type::String,
        }
    }

    /// Returns true if the underlying value is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self.base(), Self::Null)
    }

    /// Returns the underlying value, looking through any tag wrapper.
    #[must_use]
    pub fn base(&self) -> &Value {
        match self {
            Self::Tagged(tagged) => &tagged.base,
            other => other,
        }
    }

    /// Returns the entity-type labels attached to this value, if any.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        let tags = match self {
            Self::Tagged(tagged) => Some(&tagged.tags),
            _ => None,
        };
        tags.into_iter().flatten().map(|tag| &**tag)
    }

    /// Returns true if the given label is attached.
    #[must_use]
    pub fn has_tag(&self, label: &str) -> bool {
        match self {
            Self::Tagged(tagged) => tagged.tags.contains(label),
            _ => false,
        }
    }

    /// Returns a copy of this value with `label` attached.
    ///
    /// Attaching a label that is already present returns an equal value.
    #[must_use]
    pub fn with_tag(&self, label: &str) -> Self {
        let mut tags = match self {
            Self::Tagged(tagged) => tagged.tags.clone(),
            _ => BTreeSet::new(),
        };
        tags.insert(Arc::from(label));
        Self::Tagged(Arc::new(Tagged {
            base: self.base().clone(),
            tags,
        }))
    }

    /// Returns a copy of this value with `label` detached.
    ///
    /// Removing the last label unwraps the value back to its base.
    #[must_use]
    pub fn without_tag(&self, label: &str) -> Self {
        match self {
            Self::Tagged(tagged) if tagged.tags.contains(label) => {
                let mut tags = tagged.tags.clone();
                tags.remove(label);
                if tags.is_empty() {
                    tagged.base.clone()
                } else {
                    Self::Tagged(Arc::new(Tagged {
                        base: tagged.base.clone(),
                        tags,
                    }))
                }
            }
            other => other.clone(),
        }
    }

    /// Returns a copy of this value whose underlying value is `base`,
    /// keeping every attached label.
    #[must_use]
    pub fn with_base(&self, base: Value) -> Self {
        let base = base.base().clone();
        match self {
            Self::Tagged(tagged) => Self::Tagged(Arc::new(Tagged {
                base,
                tags: tagged.tags.clone(),
            })),
            _ => base,
        }
    }

    /// Attempts to extract a string reference from the underlying value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self.base() {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Attempts to extract a number as f64 (converts int to float).
    ///
    /// Note: Converting large i64 values to f64 may lose precision.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_number(&self) -> Option<f64> {
        match self.base() {
            Self::Int(n) => Some(*n as f64),
            Self::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Like [`Value::as_number`], but also parses numeric text.
    ///
    /// Imported data is frequently textual, so `"42"` and `" 4.5 "` are
    /// treated as numbers while `"abc"` is not.
    #[must_use]
    pub fn to_number(&self) -> Option<f64> {
        self.as_number()
            .or_else(|| self.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(Arc::from(s))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

// Implement PartialEq manually to handle float comparison
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Tagged(a), Self::Tagged(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(b) => b.hash(state),
            Self::Int(n) => n.hash(state),
            Self::Float(n) => n.to_bits().hash(state),
            Self::String(s) => s.hash(state),
            Self::Tagged(t) => t.hash(state),
        }
    }
}

impl PartialOrd for Value {
    #[allow(clippy::cast_precision_loss)]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.base(), other.base()) {
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            (Self::Bool(a), Self::Bool(b)) => a.partial_cmp(b),
            (Self::Int(a), Self::Int(b)) => a.partial_cmp(b),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            // Cross-type numeric comparison intentionally loses precision for large i64
            (Self::Int(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            (Self::Float(a), Self::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Self::String(a), Self::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Tagged(t) => {
                write!(f, "{:?}#{{", t.base)?;
                for (i, tag) in t.tags.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{tag}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Tagged(t) => write!(f, "{}", t.base),
        }
    }
}
