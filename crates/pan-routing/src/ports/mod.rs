//! Ports Layer
//!
//! Defines the interfaces (traits) for:
//! - Driving Ports (inbound) - route administration
//! - Driven Ports (outbound) - publishing and callbacks

pub mod inbound;
pub mod outbound;

pub use inbound::RoutingApi;
pub use outbound::{MessageSink, RouteCallback};
