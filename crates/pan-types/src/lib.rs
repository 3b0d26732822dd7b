//! # PAN Types Crate
//!
//! Message model and error taxonomy shared by the bus, the routing engine
//! and the inspector.
//!
//! ## Design Principles
//!
//! - **Immutable messages**: a `Message` is built once at publish time and
//!   shared as `Arc<Message>` during delivery.
//! - **Opaque payloads**: payloads are `serde_json::Value` and are never
//!   interpreted by the bus itself.
//! - **Explicit errors**: structural publish errors are returned to the
//!   caller, handler errors travel out-of-band as `HandlerFailure`.

pub mod errors;
pub mod message;

pub use errors::*;
pub use message::*;

/// Topic segment delimiter.
pub const TOPIC_DELIMITER: char = '.';

/// Wildcard token matching exactly one topic segment.
pub const WILDCARD: &str = "*";

/// Reserved namespace for private request/reply topics.
pub const REPLY_NAMESPACE: &str = "$reply";

/// Returns true for topics under [`REPLY_NAMESPACE`].
#[must_use]
pub fn is_reply_topic(topic: &str) -> bool {
    topic.split(TOPIC_DELIMITER).next() == Some(REPLY_NAMESPACE)
}
