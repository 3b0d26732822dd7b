//! `{{path}}` templates in emitted topics and payloads.
//!
//! A string that is exactly one placeholder is replaced by the resolved
//! value itself, keeping its JSON type. Placeholders inside a longer string
//! are rendered as text. Missing paths render as `null` or the empty string.

use crate::domain::path::resolve;
use crate::error::RouteError;
use pan_types::Message;
use serde_json::{Map, Value};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Returns true if `text` contains a placeholder.
#[must_use]
pub fn has_placeholder(text: &str) -> bool {
    text.contains(OPEN)
}

/// Render placeholders in `text` as a string.
pub fn render_str(text: &str, message: &Message) -> Result<String, RouteError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + OPEN.len()..];
        let end = after_open
            .find(CLOSE)
            .ok_or_else(|| RouteError::Template(format!("unterminated placeholder in '{text}'")))?;

        let path = after_open[..end].trim();
        if let Some(value) = resolve(message, path) {
            match value.as_ref() {
                Value::String(s) => out.push_str(s),
                Value::Null => {}
                other => out.push_str(&other.to_string()),
            }
        }
        rest = &after_open[end + CLOSE.len()..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Path of a string that is exactly one placeholder.
fn sole_placeholder(text: &str) -> Option<&str> {
    let inner = text.trim().strip_prefix(OPEN)?.strip_suffix(CLOSE)?;
    if inner.contains(OPEN) || inner.contains(CLOSE) {
        return None;
    }
    Some(inner.trim())
}

/// Render every string inside `template`.
pub fn render_value(template: &Value, message: &Message) -> Result<Value, RouteError> {
    match template {
        Value::String(text) => {
            if let Some(path) = sole_placeholder(text) {
                return Ok(resolve(message, path).map_or(Value::Null, |v| v.into_owned()));
            }
            if has_placeholder(text) {
                return render_str(text, message).map(Value::String);
            }
            Ok(template.clone())
        }
        Value::Array(items) => items
            .iter()
            .map(|item| render_value(item, message))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut rendered = Map::with_capacity(map.len());
            for (key, value) in map {
                rendered.insert(key.clone(), render_value(value, message)?);
            }
            Ok(Value::Object(rendered))
        }
        _ => Ok(template.clone()),
    }
}
