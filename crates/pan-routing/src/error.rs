//! Error types for the routing engine

use crate::domain::RouteId;
use pan_types::BusError;
use thiserror::Error;

/// Errors that can occur in the routing engine
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("Route not found: {0}")]
    NotFound(RouteId),

    #[error("Invalid route definition: {0}")]
    InvalidDefinition(String),

    #[error("Unknown callback: {0}")]
    UnknownCallback(String),

    #[error("Callback '{name}' failed: {reason}")]
    Callback { name: String, reason: String },

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Template error: {0}")]
    Template(String),
}
