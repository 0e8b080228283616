//! Validation of the classifier's answer.
//!
//! The model is told to reply with a bare JSON array of strings, but nothing
//! enforces that. Its output is parsed into an untyped [`Value`] and then
//! checked structurally before anything downstream sees it:
//!
//! 1. [`parse_completion`] trims and parses; invalid JSON is
//!    `RESPONSE_PARSE_FAILURE`.
//! 2. [`validate`] requires an array whose every element is a non-empty
//!    string; anything else is `RESPONSE_NOT_ARRAY`. One bad element rejects
//!    the whole array, nothing is filtered.

use crate::error::{StageError, ValidationError};
use crate::output::IngredientList;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\n(.*?)\n?```$").unwrap());

/// Trim the raw completion and parse it as JSON.
///
/// With `strip_fences`, a single outer ```` ``` ```` / ```` ```json ```` fence
/// is removed first.
pub fn parse_completion(raw: &str, strip_fences: bool) -> Result<Value, StageError> {
    let trimmed = raw.trim();
    let body = if strip_fences {
        strip_outer_fence(trimmed)
    } else {
        trimmed
    };
    serde_json::from_str(body).map_err(|source| StageError::ResponseParse { source })
}

fn strip_outer_fence(input: &str) -> &str {
    match RE_OUTER_FENCE.captures(input).and_then(|c| c.get(1)) {
        Some(m) => m.as_str().trim(),
        None => input,
    }
}

/// Check that `parsed` is an array of non-empty strings.
pub fn validate(parsed: Value) -> Result<IngredientList, ValidationError> {
    let items = match parsed {
        Value::Array(items) => items,
        other => {
            return Err(ValidationError::NotArray {
                found: json_kind(&other),
            })
        }
    };

    let mut names = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match item {
            Value::String(s) if s.trim().is_empty() => {
                return Err(ValidationError::EmptyElement { index });
            }
            Value::String(s) => names.push(s),
            other => {
                return Err(ValidationError::NonStringElement {
                    index,
                    found: json_kind(&other),
                })
            }
        }
    }
    Ok(IngredientList::from_validated(names))
}

/// Human name of a JSON value's type, for error messages.
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
