//! Cross-crate integration tests.

pub mod inspector_flows;
pub mod properties;
pub mod routing_flows;
