//! # PAN Routing
//!
//! Declarative routing rules evaluated against every message on a bus.
//!
//! ## Architecture
//!
//! This crate follows Hexagonal Architecture (Ports & Adapters):
//!
//! - **Domain Layer** (`domain/`): Pure logic, no bus access
//!   - `RouteMatch`: Topic and field predicates combined with all/any/not
//!   - `RouteAction`: emit, forward, log and call actions
//!   - `RouteDefinition`: A rule as loaded from JSON
//!   - `{{path}}` templates resolved against the triggering message
//!
//! - **Ports Layer** (`ports/`): Trait definitions
//!   - `RoutingApi`: Driving port (route administration)
//!   - `MessageSink`: Driven port (where emitted messages go)
//!
//! - **Service Layer** (`service/`): Orchestration
//!   - `RoutingEngine`: Implements `RoutingApi`
//!
//! - **Adapters Layer** (`adapters/`): External connections
//!   - `BusRouter`: Attaches an engine to a `MessageBus`
//!
//! ## Rule Semantics
//!
//! - Every enabled rule whose predicate matches fires, in registration order
//! - Actions of a fired rule run in declaration order
//! - A failed action is recorded in the rule's stats and does not stop the others
//! - Emitted messages are routed too; nesting stops at `MAX_ROUTE_DEPTH`
//!
//! ## Usage Example
//!
//! ```ignore
//! use pan_bus::MessageBus;
//! use pan_routing::{BusRouter, RoutingApi};
//!
//! let bus = MessageBus::new();
//! let router = BusRouter::attach(&bus)?;
//! router.load_routes(r#"[{
//!     "name": "vip-orders",
//!     "match": { "type": "field", "path": "payload.total", "op": "gte", "value": 1000 },
//!     "actions": [{ "type": "emit", "topic": "alert.vip" }]
//! }]"#)?;
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod adapters;
pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

// Re-exports for convenience
pub use adapters::{BusRouter, BusRoutingEngine};
pub use domain::{
    FieldOp, LogLevel, RouteAction, RouteDefinition, RouteId, RouteMatch, RouteSnapshot,
    RouteStats,
};
pub use error::RouteError;
pub use ports::{MessageSink, RouteCallback, RoutingApi};
pub use service::{RoutingEngine, MAX_ROUTE_DEPTH};
