//! Inbound Ports (Driving Ports)
//!
//! The administrative API for managing route rules.

use crate::domain::{RouteDefinition, RouteId, RouteSnapshot};
use crate::error::RouteError;
use crate::ports::outbound::RouteCallback;

/// Route administration API (Driving Port)
pub trait RoutingApi: Send + Sync {
    /// Validate and register a rule. Rules are evaluated in registration order.
    fn add_route(&self, definition: RouteDefinition) -> Result<RouteId, RouteError>;

    /// Remove a rule. Returns false if it was not registered.
    fn remove_route(&self, id: RouteId) -> bool;

    /// All rules in registration order, with their statistics.
    fn list_routes(&self) -> Vec<RouteSnapshot>;

    /// One rule by id.
    fn get_route(&self, id: RouteId) -> Option<RouteSnapshot>;

    /// Start evaluating a rule.
    fn enable(&self, id: RouteId) -> Result<(), RouteError>;

    /// Stop evaluating a rule without removing it.
    fn disable(&self, id: RouteId) -> Result<(), RouteError>;

    /// Register the callback invoked by `call` actions named `name`.
    ///
    /// Replaces any callback previously registered under that name.
    fn register_callback(&self, name: &str, callback: RouteCallback);

    /// Add every rule from a JSON array of definitions.
    ///
    /// All definitions are validated before any is added.
    fn load_routes(&self, json: &str) -> Result<Vec<RouteId>, RouteError>;
}
