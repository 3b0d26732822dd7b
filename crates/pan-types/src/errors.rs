//! # Error Types
//!
//! Structural bus errors returned to callers, and the handler errors that
//! are captured during delivery and reported out-of-band.

use crate::message::{MessageId, SubscriptionId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by bus operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    /// Topic is empty, has empty segments or contains a wildcard.
    #[error("Invalid topic '{topic}': {reason}")]
    InvalidTopic { topic: String, reason: String },

    /// Subscription pattern is malformed.
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Serialized payload exceeds the configured limit.
    #[error("Payload too large: {size} bytes > {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    /// Publisher exceeded its message-rate window.
    #[error("Rate limited: publisher '{publisher}' exceeded its message rate")]
    RateLimited { publisher: String },

    /// No reply arrived before the deadline.
    #[error("Request to '{topic}' timed out after {timeout_ms}ms")]
    RequestTimeout { topic: String, timeout_ms: u64 },

    /// `reply` was called with a message that carries no reply topic.
    #[error("Message has no reply_to topic")]
    MissingReplyTo,

    /// The bus has been shut down.
    #[error("Message bus closed")]
    Closed,

    /// Payload could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl BusError {
    /// Short machine-readable label, used for metrics and observation events.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidTopic { .. } => "invalid_topic",
            Self::InvalidPattern { .. } => "invalid_pattern",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::RateLimited { .. } => "rate_limited",
            Self::RequestTimeout { .. } => "request_timeout",
            Self::MissingReplyTo => "missing_reply_to",
            Self::Closed => "closed",
            Self::Serialization(_) => "serialization",
        }
    }
}

/// Error raised by a subscriber's handler.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandlerError {
    /// Handler returned an error.
    #[error("Handler failed: {0}")]
    Failed(String),

    /// Handler panicked; the panic was contained.
    #[error("Handler panicked: {0}")]
    Panicked(String),
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::Failed(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::Failed(message.to_string())
    }
}

impl From<BusError> for HandlerError {
    fn from(err: BusError) -> Self {
        Self::Failed(err.to_string())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Failed(err.to_string())
    }
}

/// Result type returned by subscription handlers.
pub type HandlerResult = Result<(), HandlerError>;

/// A handler error captured during delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerFailure {
    /// Subscription whose handler failed.
    pub subscription: SubscriptionId,
    /// Topic of the message being delivered.
    pub topic: String,
    /// Message being delivered.
    pub message_id: MessageId,
    /// What went wrong.
    pub error: HandlerError,
}
