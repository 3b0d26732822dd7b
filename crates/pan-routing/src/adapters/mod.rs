//! Adapters Layer (Driven Adapters)
//!
//! Connects the routing engine to a live `MessageBus`.

pub mod bus_adapter;

pub use bus_adapter::{BusRouter, BusRoutingEngine};
