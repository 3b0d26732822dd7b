//! Service Layer
//!
//! The routing engine that evaluates rules and runs their actions.

pub mod routing_engine;

pub use routing_engine::{RoutingEngine, MAX_ROUTE_DEPTH};
