//! Outbound Ports (Driven Ports)
//!
//! What the routing engine needs from the outside: somewhere to publish
//! emitted messages, and callbacks for `call` actions.

use pan_types::{BusError, HandlerResult, Message, PublishOptions, PublishReceipt};
use serde_json::Value;
use std::sync::Arc;

/// Callback invoked by a `call` action.
pub type RouteCallback = Arc<dyn Fn(&Message) -> HandlerResult + Send + Sync>;

/// Destination for messages emitted by route actions.
pub trait MessageSink: Send + Sync {
    /// Publish a message.
    fn publish(
        &self,
        topic: &str,
        payload: Value,
        options: PublishOptions,
    ) -> Result<PublishReceipt, BusError>;
}
