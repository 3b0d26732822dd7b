//! # Message Model
//!
//! The immutable `Message` value and the identifiers that travel with it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Monotonically assigned message identifier (first id on a bus is 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a subscription, used to unsubscribe.
///
/// Ids grow with registration order, which is also delivery order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Correlates a request with its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a new random correlation ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse from the hyphenated or simple string form.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }

    /// Get the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// 32-character hex form, safe to embed as a topic segment.
    #[must_use]
    pub fn simple(&self) -> String {
        self.0.simple().to_string()
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A published message.
///
/// Immutable after construction. Retained copies live in the retained store
/// independently of delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique id assigned by the bus.
    pub id: MessageId,
    /// Concrete topic, e.g. `user.profile.updated`.
    pub topic: String,
    /// Opaque payload.
    pub payload: Value,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Whether the message was published with `retain`.
    #[serde(default)]
    pub retained: bool,
    /// Set on requests and their replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
    /// Private topic a responder should publish the reply to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    /// Publisher identity (rate-limit key).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Message {
    /// Build a message from publish options.
    #[must_use]
    pub fn new(id: MessageId, topic: impl Into<String>, payload: Value, options: &PublishOptions) -> Self {
        Self {
            id,
            topic: topic.into(),
            payload,
            timestamp: current_timestamp_ms(),
            retained: options.retain,
            correlation_id: options.correlation_id,
            reply_to: options.reply_to.clone(),
            source: options.source.clone(),
        }
    }

    /// Returns true if this message expects a reply.
    #[must_use]
    pub fn is_request(&self) -> bool {
        self.reply_to.is_some()
    }

    /// Returns true if the payload is the retained-clear marker (`null` or `""`).
    #[must_use]
    pub fn is_clear_marker(&self) -> bool {
        is_empty_payload(&self.payload)
    }

    /// Deserialize the payload into a concrete type.
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

/// Empty payloads clear a retained entry when published with `retain`.
#[must_use]
pub fn is_empty_payload(payload: &Value) -> bool {
    match payload {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Options accepted by `publish`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOptions {
    /// Store the message as the topic's retained message.
    pub retain: bool,
    /// Publisher identity used as the rate-limit key.
    pub source: Option<String>,
    /// Correlation id for request/reply.
    pub correlation_id: Option<CorrelationId>,
    /// Reply topic for requests.
    pub reply_to: Option<String>,
}

impl PublishOptions {
    /// Options for a retained publish.
    #[must_use]
    pub fn retained() -> Self {
        Self {
            retain: true,
            ..Self::default()
        }
    }

    /// Set the retain flag.
    #[must_use]
    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    /// Set the publisher identity.
    #[must_use]
    pub fn from_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attach a correlation id.
    #[must_use]
    pub fn with_correlation(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Attach a reply topic.
    #[must_use]
    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }
}

/// Outcome of a successful publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishReceipt {
    /// Id assigned to the published message.
    pub message_id: MessageId,
    /// Handlers that returned successfully.
    pub delivered: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
}

/// Current Unix time in milliseconds.
#[must_use]
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
