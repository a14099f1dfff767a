//! Rule compiler - validates declarations into executable rules.
//!
//! Declarations arrive from outside (project files, snapshots, callers) with
//! every field optional. [`RuleCompiler::compile`] rejects anything that
//! cannot be evaluated with [`ErrorKind::MalformedRule`], so a [`Rule`]
//! that exists is always well-formed.
//!
//! [`ErrorKind::MalformedRule`]: tabula_foundation::ErrorKind::MalformedRule

use std::sync::Arc;

use tabula_foundation::{Error, Result, RuleId, Value};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{Action, ColumnRef, Rule, Scope};
use crate::pattern::{CompareOp, Matcher, Pattern};
use crate::transform::Transform;

// =============================================================================
// Declarations
// =============================================================================

/// Matcher as declared.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MatcherDecl {
    /// Every non-null cell.
    Any,
    /// Cells equal to a value.
    Exact(Value),
    /// Cells equal to any listed value.
    OneOf(Vec<Value>),
    /// Glob over the cell text.
    Glob {
        /// Glob source.
        pattern: String,
        /// Ignore case.
        #[cfg_attr(feature = "serde", serde(default))]
        case_insensitive: bool,
    },
    /// Regular expression over the cell text.
    Regex {
        /// Expression source.
        pattern: String,
        /// Ignore case.
        #[cfg_attr(feature = "serde", serde(default))]
        case_insensitive: bool,
    },
    /// Numeric comparison.
    Compare {
        /// Operator.
        op: CompareOp,
        /// Right-hand operand.
        value: f64,
    },
    /// Membership in another column.
    InColumn(ColumnRef),
}

/// Transform as declared.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TransformDecl {
    /// Lowercase text.
    Lowercase,
    /// Uppercase text.
    Uppercase,
    /// Strip surrounding whitespace.
    Trim,
    /// Fixed value.
    Constant(Value),
    /// Regex substitution.
    RegexReplace {
        /// Expression source.
        pattern: String,
        /// Replacement text.
        replacement: String,
    },
    /// Keyword substitution from `original:new` options.
    Keywords(Vec<String>),
}

/// Action as declared.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ActionDecl {
    /// Attach a label.
    Tag(String),
    /// Rewrite the value.
    Replace(TransformDecl),
    /// Link to rows of the target column holding the same key.
    Link {
        /// Column searched for matching keys.
        target: Option<ColumnRef>,
    },
}

/// A rule as supplied by the caller. Every field is optional so that
/// validation, not deserialization, reports what is missing.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RuleDecl {
    /// Stable identity.
    pub id: Option<RuleId>,
    /// Display name.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub name: Option<String>,
    /// Global or local to one table. Defaults to global.
    pub scope: Option<Scope>,
    /// Columns acted on.
    pub columns: Vec<ColumnRef>,
    /// Cell predicate.
    pub matcher: Option<MatcherDecl>,
    /// Effect.
    pub action: Option<ActionDecl>,
    /// Priority (lower runs first). Defaults to 0.
    pub priority: Option<i32>,
    /// Creation sequence number. Assigned on load when absent.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub created: Option<u64>,
    /// Defaults to enabled.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub enabled: Option<bool>,
}

impl RuleDecl {
    /// Starts a declaration with an id.
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self {
            id: Some(RuleId::new(id)),
            ..Self::default()
        }
    }

    /// Sets the name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Makes the rule local to a table.
    #[must_use]
    pub fn local(mut self, table: tabula_foundation::TableId) -> Self {
        self.scope = Some(Scope::Local(table));
        self
    }

    /// Adds a column reference, parsed as `Column` or `Table.Column`.
    #[must_use]
    pub fn column(mut self, reference: &str) -> Self {
        self.columns.push(ColumnRef::parse(reference));
        self
    }

    /// Sets the matcher.
    #[must_use]
    pub fn matching(mut self, matcher: MatcherDecl) -> Self {
        self.matcher = Some(matcher);
        self
    }

    /// Sets a glob matcher.
    #[must_use]
    pub fn glob(self, pattern: &str) -> Self {
        self.matching(MatcherDecl::Glob {
            pattern: pattern.to_string(),
            case_insensitive: false,
        })
    }

    /// Sets a tag action.
    #[must_use]
    pub fn tag(mut self, label: &str) -> Self {
        self.action = Some(ActionDecl::Tag(label.to_string()));
        self
    }

    /// Sets a replace action.
    #[must_use]
    pub fn replace(mut self, transform: TransformDecl) -> Self {
        self.action = Some(ActionDecl::Replace(transform));
        self
    }

    /// Sets a link action, target parsed as `Column` or `Table.Column`.
    #[must_use]
    pub fn link(mut self, target: &str) -> Self {
        self.action = Some(ActionDecl::Link {
            target: Some(ColumnRef::parse(target)),
        });
        self
    }

    /// Sets the priority.
    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Sets the creation sequence number.
    #[must_use]
    pub fn created(mut self, created: u64) -> Self {
        self.created = Some(created);
        self
    }

    /// Enables or disables the rule.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }
}

// =============================================================================
// Rule Compiler
// =============================================================================

/// Compiles rule declarations into executable rules.
pub struct RuleCompiler;

impl RuleCompiler {
    /// Compiles a declaration.
    ///
    /// `created` is used when the declaration carries no creation number.
    ///
    /// # Errors
    /// Returns `MalformedRule` if the id, columns, matcher, or action are
    /// missing, a pattern does not compile, a tag label is empty, a link has
    /// no target, or a local rule names no table.
    pub fn compile(decl: &RuleDecl, created: u64) -> Result<Rule> {
        let id = decl
            .id
            .ok_or_else(|| Error::malformed_rule(None, "missing id"))?;
        let malformed = |reason: &str| Error::malformed_rule(Some(id), reason);

        if decl.columns.is_empty() {
            return Err(malformed("no columns"));
        }
        if let Some(bad) = decl.columns.iter().find(|c| c.column.is_empty()) {
            return Err(malformed(&format!("empty column name in {bad}")));
        }

        let matcher = decl
            .matcher
            .as_ref()
            .ok_or_else(|| malformed("missing matcher"))?;
        let matcher = Self::compile_matcher(matcher).map_err(|e| malformed(&e.to_string()))?;

        let action = decl
            .action
            .as_ref()
            .ok_or_else(|| malformed("missing action"))?;
        let action = Self::compile_action(action).map_err(|e| malformed(&e))?;

        let name = decl
            .name
            .clone()
            .unwrap_or_else(|| format!("rule-{}", id.raw()));

        Ok(Rule {
            id,
            name: Arc::from(name),
            scope: decl.scope.unwrap_or_default(),
            columns: decl.columns.clone(),
            matcher,
            action,
            priority: decl.priority.unwrap_or(0),
            created: decl.created.unwrap_or(created),
            enabled: decl.enabled.unwrap_or(true),
        })
    }

    fn compile_matcher(decl: &MatcherDecl) -> Result<Matcher> {
        Ok(match decl {
            MatcherDecl::Any => Matcher::Any,
            MatcherDecl::Exact(value) => Matcher::Exact(value.clone()),
            MatcherDecl::OneOf(values) => Matcher::OneOf(values.clone()),
            MatcherDecl::Glob {
                pattern,
                case_insensitive,
            } => Matcher::Pattern(Pattern::glob(pattern, *case_insensitive)?),
            MatcherDecl::Regex {
                pattern,
                case_insensitive,
            } => Matcher::Pattern(Pattern::regex(pattern, *case_insensitive)?),
            MatcherDecl::Compare { op, value } => {
                if !value.is_finite() {
                    return Err(Error::invalid_pattern(
                        value.to_string(),
                        "comparison operand must be finite",
                    ));
                }
                Matcher::Compare {
                    op: *op,
                    value: *value,
                }
            }
            MatcherDecl::InColumn(reference) => Matcher::InColumn(reference.clone()),
        })
    }

    fn compile_action(decl: &ActionDecl) -> std::result::Result<Action, String> {
        match decl {
            ActionDecl::Tag(label) => {
                if label.trim().is_empty() {
                    Err("empty tag label".to_string())
                } else {
                    Ok(Action::Tag(Arc::from(label.as_str())))
                }
            }
            ActionDecl::Replace(transform) => Self::compile_transform(transform).map(Action::Replace),
            ActionDecl::Link { target } => target
                .clone()
                .map(|target| Action::Link { target })
                .ok_or_else(|| "link without target".to_string()),
        }
    }

    fn compile_transform(decl: &TransformDecl) -> std::result::Result<Transform, String> {
        Ok(match decl {
            TransformDecl::Lowercase => Transform::Lowercase,
            TransformDecl::Uppercase => Transform::Uppercase,
            TransformDecl::Trim => Transform::Trim,
            TransformDecl::Constant(value) => Transform::Constant(value.clone()),
            TransformDecl::RegexReplace {
                pattern,
                replacement,
            } => Transform::RegexReplace {
                pattern: Pattern::regex(pattern, false).map_err(|e| e.to_string())?,
                replacement: Arc::from(replacement.as_str()),
            },
            TransformDecl::Keywords(options) => Transform::Keywords(
                Transform::parse_keywords(options.iter().map(String::as_str))
                    .map_err(|bad| format!("keyword option {bad:?} is not original:new"))?,
            ),
        })
    }
}
