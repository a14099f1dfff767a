//! Cell matchers.
//!
//! A [`Matcher`] decides whether a rule applies to a cell. Matchers always
//! look at the cell's base value: labels attached by earlier rules in the
//! chain never affect matching.

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use regex::{Regex, RegexBuilder};
use tabula_foundation::{Error, Result, Type, Value};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::rule::ColumnRef;

// =============================================================================
// Pattern
// =============================================================================

/// A compiled text pattern, written either as a glob or as a regex.
#[derive(Clone)]
pub struct Pattern {
    source: Arc<str>,
    glob: bool,
    case_insensitive: bool,
    regex: Regex,
}

impl Pattern {
    /// Compiles a glob where `*` matches any run of characters and `?`
    /// matches exactly one. The glob must cover the whole text.
    ///
    /// # Errors
    /// Returns [`ErrorKind::InvalidPattern`](tabula_foundation::ErrorKind)
    /// if the translated expression exceeds the regex size limits.
    pub fn glob(source: &str, case_insensitive: bool) -> Result<Self> {
        Self::build(source, &glob_to_regex(source), true, case_insensitive)
    }

    /// Compiles a regular expression. Unanchored: it matches anywhere.
    ///
    /// # Errors
    /// Returns [`ErrorKind::InvalidPattern`](tabula_foundation::ErrorKind)
    /// if the expression does not compile.
    pub fn regex(source: &str, case_insensitive: bool) -> Result<Self> {
        Self::build(source, source, false, case_insensitive)
    }

    fn build(source: &str, expression: &str, glob: bool, case_insensitive: bool) -> Result<Self> {
        let regex = RegexBuilder::new(expression)
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|e| Error::invalid_pattern(source, e.to_string()))?;
        Ok(Self {
            source: Arc::from(source),
            glob,
            case_insensitive,
            regex,
        })
    }

    /// The pattern as written.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns true if this pattern was written as a glob.
    #[must_use]
    pub const fn is_glob(&self) -> bool {
        self.glob
    }

    /// Returns true if the pattern matches `text`.
    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Replaces every match in `text`. `$1`/`${name}` expand capture groups.
    #[must_use]
    pub fn replace_all<'t>(&self, text: &'t str, replacement: &str) -> Cow<'t, str> {
        self.regex.replace_all(text, replacement)
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut expression = String::with_capacity(glob.len() + 8);
    expression.push_str("(?s)^");
    let mut buf = [0u8; 4];
    for c in glob.chars() {
        match c {
            '*' => expression.push_str(".*"),
            '?' => expression.push('.'),
            other => expression.push_str(&regex::escape(other.encode_utf8(&mut buf))),
        }
    }
    expression.push('$');
    expression
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
            && self.glob == other.glob
            && self.case_insensitive == other.case_insensitive
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.glob { "glob" } else { "regex" };
        let flag = if self.case_insensitive { "/i" } else { "" };
        write!(f, "{kind}({:?}){flag}", self.source)
    }
}

// =============================================================================
// Comparison
// =============================================================================

/// Numeric comparison operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum CompareOp {
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `==`
    Eq,
    /// `!=`
    Ne,
}

impl CompareOp {
    /// Applies the operator as `left op right`.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn apply(self, left: f64, right: f64) -> bool {
        match self {
            Self::Lt => left < right,
            Self::Le => left <= right,
            Self::Gt => left > right,
            Self::Ge => left >= right,
            Self::Eq => left == right,
            Self::Ne => left != right,
        }
    }
}

// =============================================================================
// Matcher
// =============================================================================

/// Result of testing a cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchOutcome {
    /// The rule applies.
    Matched,
    /// The rule does not apply.
    NotMatched,
    /// The cell's type cannot be tested by this matcher.
    TypeMismatch {
        /// Type the matcher needs.
        expected: Type,
        /// Type the cell holds.
        actual: Type,
    },
}

/// Cell predicate.
#[derive(Clone, Debug, PartialEq)]
pub enum Matcher {
    /// Matches every non-null cell.
    Any,
    /// Matches cells equal to the value.
    Exact(Value),
    /// Matches cells equal to any of the values.
    OneOf(Vec<Value>),
    /// Matches the cell's text against a pattern.
    Pattern(Pattern),
    /// Compares the cell numerically. Numeric text is parsed.
    Compare {
        /// Operator, applied as `cell op value`.
        op: CompareOp,
        /// Right-hand operand.
        value: f64,
    },
    /// Matches cells whose value occurs in another column.
    InColumn(ColumnRef),
}

impl Matcher {
    /// Tests a cell value.
    ///
    /// `lookup` holds the base values of the referenced column for
    /// [`Matcher::InColumn`]; other matchers ignore it. A missing lookup set
    /// matches nothing.
    #[must_use]
    pub fn test(&self, value: &Value, lookup: Option<&HashSet<Value>>) -> MatchOutcome {
        let base = value.base();
        let matched = match self {
            Self::Any => !base.is_null(),
            Self::Exact(expected) => base == expected.base(),
            Self::OneOf(options) => options.iter().any(|o| base == o.base()),
            Self::Pattern(pattern) => {
                if base.is_null() {
                    false
                } else {
                    pattern.is_match(&text_of(base))
                }
            }
            Self::Compare { op, value: right } => {
                if base.is_null() {
                    return MatchOutcome::NotMatched;
                }
                match base.to_number() {
                    Some(left) => op.apply(left, *right),
                    None => {
                        return MatchOutcome::TypeMismatch {
                            expected: Type::Float,
                            actual: base.value_type(),
                        };
                    }
                }
            }
            Self::InColumn(_) => !base.is_null() && lookup.is_some_and(|set| set.contains(base)),
        };
        if matched {
            MatchOutcome::Matched
        } else {
            MatchOutcome::NotMatched
        }
    }
}

fn text_of(value: &Value) -> Cow<'_, str> {
    match value.as_str() {
        Some(s) => Cow::Borrowed(s),
        None => Cow::Owned(value.to_string()),
    }
}
