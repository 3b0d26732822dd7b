//! Field paths into a message.
//!
//! | Path | Resolves to |
//! |------|-------------|
//! | `topic` | message topic |
//! | `id` | message id |
//! | `timestamp` | publish time in ms |
//! | `retained` | retain flag |
//! | `source` | publisher identity, if any |
//! | `payload` | the whole payload |
//! | `payload.a.b` | nested object field |
//! | `payload.items.0` | array element |

use pan_types::Message;
use serde_json::Value;
use std::borrow::Cow;

/// Path segment delimiter.
pub const PATH_DELIMITER: char = '.';

const ROOTS: [&str; 6] = ["topic", "id", "timestamp", "retained", "source", "payload"];

/// Returns true if `path` starts with a known root.
#[must_use]
pub fn is_valid_path(path: &str) -> bool {
    let mut parts = path.split(PATH_DELIMITER);
    let Some(root) = parts.next() else {
        return false;
    };
    if !ROOTS.contains(&root) {
        return false;
    }
    // Only the payload can be descended into
    let rest: Vec<&str> = parts.collect();
    if rest.is_empty() {
        return true;
    }
    root == "payload" && rest.iter().all(|segment| !segment.is_empty())
}

/// Resolve `path` against `message`. Missing fields resolve to `None`.
#[must_use]
pub fn resolve<'a>(message: &'a Message, path: &str) -> Option<Cow<'a, Value>> {
    let mut parts = path.split(PATH_DELIMITER);
    match parts.next()? {
        "topic" => leaf(parts, Value::String(message.topic.clone())),
        "id" => leaf(parts, Value::from(message.id.0)),
        "timestamp" => leaf(parts, Value::from(message.timestamp)),
        "retained" => leaf(parts, Value::Bool(message.retained)),
        "source" => {
            let source = message.source.clone()?;
            leaf(parts, Value::String(source))
        }
        "payload" => {
            let mut current = &message.payload;
            for segment in parts {
                current = step(current, segment)?;
            }
            Some(Cow::Borrowed(current))
        }
        _ => None,
    }
}

fn leaf<'a, 'p>(mut rest: impl Iterator<Item = &'p str>, value: Value) -> Option<Cow<'a, Value>> {
    match rest.next() {
        None => Some(Cow::Owned(value)),
        Some(_) => None,
    }
}

fn step<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}
