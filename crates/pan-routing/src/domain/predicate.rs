//! Route match predicates.
//!
//! Predicates are a small boolean tree over the topic and message fields,
//! written as tagged JSON:
//!
//! ```json
//! { "type": "all", "conditions": [
//!     { "type": "topic", "pattern": "order.created" },
//!     { "type": "field", "path": "payload.total", "op": "gte", "value": 1000 }
//! ] }
//! ```

use crate::domain::path::{is_valid_path, resolve};
use crate::error::RouteError;
use pan_bus::topic;
use pan_types::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Comparison applied by a field predicate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Exists,
    Contains,
}

/// Predicate tree deciding whether a rule fires.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RouteMatch {
    /// Topic matches a subscription pattern.
    Topic { pattern: String },
    /// A message field compares against a value.
    Field {
        path: String,
        op: FieldOp,
        #[serde(default)]
        value: Value,
    },
    /// Every condition holds.
    All { conditions: Vec<RouteMatch> },
    /// At least one condition holds.
    Any { conditions: Vec<RouteMatch> },
    /// The condition does not hold.
    Not { condition: Box<RouteMatch> },
    /// Always fires.
    Always,
}

impl RouteMatch {
    /// Topic pattern predicate.
    #[must_use]
    pub fn topic(pattern: impl Into<String>) -> Self {
        Self::Topic {
            pattern: pattern.into(),
        }
    }

    /// Field comparison predicate.
    #[must_use]
    pub fn field(path: impl Into<String>, op: FieldOp, value: Value) -> Self {
        Self::Field {
            path: path.into(),
            op,
            value,
        }
    }

    /// Conjunction.
    #[must_use]
    pub fn all(conditions: Vec<RouteMatch>) -> Self {
        Self::All { conditions }
    }

    /// Disjunction.
    #[must_use]
    pub fn any(conditions: Vec<RouteMatch>) -> Self {
        Self::Any { conditions }
    }

    /// Negation.
    #[must_use]
    pub fn negate(condition: RouteMatch) -> Self {
        Self::Not {
            condition: Box::new(condition),
        }
    }

    /// Check the predicate is well formed.
    pub fn validate(&self) -> Result<(), RouteError> {
        match self {
            Self::Topic { pattern } => topic::validate_pattern(pattern)
                .map_err(|e| RouteError::InvalidDefinition(e.to_string())),
            Self::Field { path, op, value } => {
                if !is_valid_path(path) {
                    return Err(RouteError::InvalidDefinition(format!(
                        "unknown field path '{path}'"
                    )));
                }
                if *op == FieldOp::In && !value.is_array() {
                    return Err(RouteError::InvalidDefinition(format!(
                        "'in' on '{path}' needs an array value"
                    )));
                }
                Ok(())
            }
            Self::All { conditions } | Self::Any { conditions } => {
                conditions.iter().try_for_each(RouteMatch::validate)
            }
            Self::Not { condition } => condition.validate(),
            Self::Always => Ok(()),
        }
    }

    /// Evaluate against a message.
    #[must_use]
    pub fn evaluate(&self, message: &Message) -> bool {
        match self {
            Self::Topic { pattern } => topic::matches(pattern, &message.topic),
            Self::Field { path, op, value } => match resolve(message, path) {
                Some(actual) => compare(&actual, *op, value),
                None => false,
            },
            Self::All { conditions } => conditions.iter().all(|c| c.evaluate(message)),
            Self::Any { conditions } => conditions.iter().any(|c| c.evaluate(message)),
            Self::Not { condition } => !condition.evaluate(message),
            Self::Always => true,
        }
    }
}

/// Equality that treats numerically equal numbers as equal (`1 == 1.0`).
#[must_use]
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) if a.is_number() && b.is_number() => x == y,
        _ => a == b,
    }
}

fn ordering(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn compare(actual: &Value, op: FieldOp, expected: &Value) -> bool {
    match op {
        FieldOp::Eq => values_equal(actual, expected),
        FieldOp::Ne => !values_equal(actual, expected),
        FieldOp::Gt => ordering(actual, expected) == Some(Ordering::Greater),
        FieldOp::Gte => matches!(
            ordering(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FieldOp::Lt => ordering(actual, expected) == Some(Ordering::Less),
        FieldOp::Lte => matches!(
            ordering(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        FieldOp::In => expected
            .as_array()
            .is_some_and(|items| items.iter().any(|item| values_equal(actual, item))),
        FieldOp::Exists => true,
        FieldOp::Contains => match (actual, expected) {
            (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
            (Value::Array(items), _) => items.iter().any(|item| values_equal(item, expected)),
            (Value::Object(map), Value::String(key)) => map.contains_key(key),
            _ => false,
        },
    }
}
