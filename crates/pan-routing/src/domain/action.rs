//! Route actions.

use crate::error::RouteError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Level for `log` actions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// Something a rule does when it fires.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RouteAction {
    /// Publish a new message. Defaults to the triggering payload.
    Emit {
        topic: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
        #[serde(default)]
        retain: bool,
    },
    /// Write a tracing event.
    Log {
        #[serde(default)]
        level: LogLevel,
        message: String,
    },
    /// Re-publish the triggering payload under another topic.
    Forward {
        topic: String,
        #[serde(default)]
        retain: bool,
    },
    /// Invoke a registered callback.
    Call { callback: String },
}

impl RouteAction {
    /// Emit the triggering payload on `topic`.
    #[must_use]
    pub fn emit(topic: impl Into<String>) -> Self {
        Self::Emit {
            topic: topic.into(),
            payload: None,
            retain: false,
        }
    }

    /// Emit `payload` (which may contain templates) on `topic`.
    #[must_use]
    pub fn emit_with(topic: impl Into<String>, payload: Value) -> Self {
        Self::Emit {
            topic: topic.into(),
            payload: Some(payload),
            retain: false,
        }
    }

    /// Log `message` at `level`.
    #[must_use]
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        Self::Log {
            level,
            message: message.into(),
        }
    }

    /// Forward to `topic`.
    #[must_use]
    pub fn forward(topic: impl Into<String>) -> Self {
        Self::Forward {
            topic: topic.into(),
            retain: false,
        }
    }

    /// Call the callback registered as `name`.
    #[must_use]
    pub fn call(name: impl Into<String>) -> Self {
        Self::Call {
            callback: name.into(),
        }
    }

    /// Short label for logs and errors.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Emit { .. } => "emit",
            Self::Log { .. } => "log",
            Self::Forward { .. } => "forward",
            Self::Call { .. } => "call",
        }
    }

    /// Check the action is well formed.
    pub fn validate(&self) -> Result<(), RouteError> {
        match self {
            Self::Emit { topic, .. } | Self::Forward { topic, .. } if topic.trim().is_empty() => {
                Err(RouteError::InvalidDefinition(format!(
                    "{} action needs a topic",
                    self.kind()
                )))
            }
            Self::Call { callback } if callback.trim().is_empty() => Err(
                RouteError::InvalidDefinition("call action needs a callback name".to_string()),
            ),
            _ => Ok(()),
        }
    }
}
