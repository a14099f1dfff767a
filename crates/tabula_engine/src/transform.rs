//! Value transforms used by replace actions.

use std::sync::Arc;

use tabula_foundation::{Type, Value};

use crate::pattern::Pattern;

/// A pure rewrite of a base value.
#[derive(Clone, Debug, PartialEq)]
pub enum Transform {
    /// Lowercase text.
    Lowercase,
    /// Uppercase text.
    Uppercase,
    /// Strip surrounding whitespace.
    Trim,
    /// Replace with a fixed value.
    Constant(Value),
    /// Regex substitution over text.
    RegexReplace {
        /// Compiled pattern.
        pattern: Pattern,
        /// Replacement, with `$n` group expansion.
        replacement: Arc<str>,
    },
    /// Keyword substitution: each `(original, new)` pair rewrites
    /// occurrences of `original`, carrying along any alphanumeric or
    /// parenthesized suffix glued to the occurrence.
    Keywords(Vec<(Arc<str>, Arc<str>)>),
}

impl Transform {
    /// Applies the transform to a base value.
    ///
    /// Null passes through every text transform unchanged.
    ///
    /// # Errors
    /// Returns the offending value type when a text transform is applied to
    /// a non-text value.
    pub fn apply(&self, value: &Value) -> std::result::Result<Value, Type> {
        if let Self::Constant(constant) = self {
            return Ok(constant.clone());
        }
        if value.is_null() {
            return Ok(Value::Null);
        }
        let text = value.as_str().ok_or_else(|| value.value_type())?;
        let rewritten = match self {
            Self::Lowercase => text.to_lowercase(),
            Self::Uppercase => text.to_uppercase(),
            Self::Trim => text.trim().to_string(),
            Self::RegexReplace {
                pattern,
                replacement,
            } => pattern.replace_all(text, replacement).into_owned(),
            Self::Keywords(pairs) => replace_keywords(text, pairs),
            Self::Constant(constant) => return Ok(constant.clone()),
        };
        Ok(Value::from(rewritten))
    }

    /// Parses keyword options written as `original:new`, with exactly one
    /// colon and a non-empty original.
    ///
    /// Returns the first malformed option on failure.
    pub fn parse_keywords<'a>(
        options: impl IntoIterator<Item = &'a str>,
    ) -> std::result::Result<Vec<(Arc<str>, Arc<str>)>, &'a str> {
        options
            .into_iter()
            .map(|option| match option.split_once(':') {
                Some((original, new)) if !original.is_empty() && !new.contains(':') => {
                    Ok((Arc::from(original), Arc::from(new)))
                }
                _ => Err(option),
            })
            .collect()
    }
}

/// Occurrences are located in the untouched input, then rewritten in the
/// accumulated result, so one pair never feeds matches to the next.
fn replace_keywords(text: &str, pairs: &[(Arc<str>, Arc<str>)]) -> String {
    let mut result = text.to_string();
    for (original, new) in pairs {
        if original.is_empty() {
            continue;
        }
        let mut from = 0;
        while let Some(offset) = text[from..].find(&**original) {
            let start = from + offset;
            let keyword_end = start + original.len();
            let end = keyword_end
                + text[keyword_end..]
                    .char_indices()
                    .find(|&(_, c)| !(c.is_alphanumeric() || c == '(' || c == ')'))
                    .map_or(text.len() - keyword_end, |(i, _)| i);
            let occurrence = &text[start..end];
            let replacement = format!("{new}{}", &text[keyword_end..end]);
            result = result.replace(occurrence, &replacement);
            from = keyword_end;
        }
    }
    result
}
