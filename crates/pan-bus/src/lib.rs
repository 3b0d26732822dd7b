//! # PAN Bus - In-Process Topic Bus
//!
//! Topic-based publish/subscribe with retained messages, request/reply,
//! wildcard subscriptions and backpressure controls.
//!
//! ## Components
//!
//! ```text
//! ┌──────────────┐  publish()   ┌─────────────────────────────────────┐
//! │  Publisher   │ ───────────► │            MessageBus               │
//! └──────────────┘              │  topic ─► rate limiter ─► retained  │
//!                               │              │                      │
//!                               │        registry lookup              │
//!                               └──────────────┼──────────────────────┘
//!                                              ▼
//!                                 handlers (subscription order)
//!                                              │
//!                                              ▼
//!                                     taps (BusEvent stream)
//! ```
//!
//! ## Topics
//!
//! - Topics are `.`-delimited: `user.profile.updated`
//! - `*` in a pattern matches exactly one segment
//! - The bare pattern `*` matches every topic
//!
//! ## Example
//!
//! ```ignore
//! use pan_bus::{MessageBus, PublishOptions};
//! use serde_json::json;
//!
//! let bus = MessageBus::new();
//! let _sub = bus.subscribe("user.*", |message| {
//!     println!("{} -> {}", message.topic, message.payload);
//!     Ok(())
//! })?;
//! bus.publish("user.login", json!({"id": 42}), PublishOptions::default())?;
//! ```

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod bus;
pub mod config;
pub mod pending;
pub mod rate_limiter;
pub mod registry;
pub mod retained;
pub mod stats;
pub mod tap;
pub mod topic;

// Re-export main types
pub use bus::{ErrorHook, MessageBus, MessagePublisher, SubscriptionHandle, WeakMessageBus};
pub use config::{BusConfig, BusConfigBuilder, ConfigError, RateLimitConfig};
pub use pending::{PendingRequestStore, PendingStats};
pub use rate_limiter::{RateLimiter, ANONYMOUS_PUBLISHER};
pub use registry::{Handler, Registration, SubscriptionRegistry};
pub use retained::{RetainedEntry, RetainedStore};
pub use stats::{BusStats, TopicCount};
pub use tap::{BusEvent, Tap, TapError, TapStream};

pub use pan_types::{
    BusError, CorrelationId, HandlerError, HandlerFailure, HandlerResult, Message, MessageId,
    PublishOptions, PublishReceipt, SubscriptionId,
};
