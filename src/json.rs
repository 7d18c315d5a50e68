//! Typed field extraction from parsed ARI documents.
//!
//! Event and response bodies arrive as opaque [`serde_json::Value`] trees;
//! these helpers look up nested fields by path. A missing or mistyped field
//! is a distinct, catchable [`AriError::MissingField`], never a panic.

use serde_json::Value;

use crate::error::{AriError, AriResult};

fn descend<'a>(doc: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut node = doc;
    for key in path {
        node = node.get(key)?;
    }
    Some(node)
}

fn missing(path: &[&str]) -> AriError {
    AriError::MissingField {
        path: path.join("."),
    }
}

/// String field at a nested path.
pub fn get_str<'a>(doc: &'a Value, path: &[&str]) -> AriResult<&'a str> {
    descend(doc, path)
        .and_then(Value::as_str)
        .ok_or_else(|| missing(path))
}

/// Like [`get_str`], but absence (or a non-string value) is `None`.
pub fn opt_str<'a>(doc: &'a Value, path: &[&str]) -> Option<&'a str> {
    descend(doc, path).and_then(Value::as_str)
}

/// Array of strings at a nested path; non-string elements are skipped.
pub fn get_string_array(doc: &Value, path: &[&str]) -> AriResult<Vec<String>> {
    let array = descend(doc, path)
        .and_then(Value::as_array)
        .ok_or_else(|| missing(path))?;
    Ok(array
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect())
}
