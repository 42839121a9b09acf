//! Extraction of JSON objects from free-form model output

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static OBJECT_SPAN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{[\s\S]*\}").expect("object span pattern is valid")
});

static TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r",\s*([}\]])").expect("trailing comma pattern is valid")
});

/// Pull the outermost `{...}` span out of `text` and parse it
///
/// Models often wrap JSON in markdown fences or prose, and sometimes leave
/// trailing commas; both are tolerated. Returns a description of the
/// problem when no object can be recovered.
pub fn extract_object(text: &str) -> Result<Value, String> {
    let span = OBJECT_SPAN
        .find(text.trim())
        .ok_or_else(|| "no JSON object found in response".to_string())?
        .as_str();

    match serde_json::from_str::<Value>(span) {
        Ok(value) => Ok(value),
        Err(first_err) => {
            let repaired = TRAILING_COMMA.replace_all(span, "$1");
            serde_json::from_str::<Value>(&repaired)
                .map_err(|_| format!("failed to parse JSON: {}", first_err))
        }
    }
}

/// Read a list-of-strings field leniently
///
/// Missing or null becomes an empty list and a bare string becomes a
/// one-element list. Blank entries are dropped. Any other shape is an error.
pub fn string_list(value: Option<&Value>, field: &str) -> Result<Vec<String>, String> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(non_blank(s).into_iter().collect()),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => non_blank(s).map(Ok),
                Value::Null => None,
                other => Some(Err(format!("{} contains a non-string entry: {}", field, other))),
            })
            .collect(),
        Some(other) => Err(format!("{} must be a list of strings, got {}", field, other)),
    }
}

fn non_blank(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
