//! Error types for the inspector

use thiserror::Error;

/// Errors that can occur while inspecting a bus
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InspectorError {
    #[error("Invalid inspector configuration: {0}")]
    InvalidConfig(String),

    #[error("Snapshot serialization failed: {0}")]
    Serialization(String),

    #[error("Telemetry error: {0}")]
    Telemetry(String),

    #[error("Message bus closed")]
    BusClosed,
}

impl From<serde_json::Error> for InspectorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<pan_telemetry::TelemetryError> for InspectorError {
    fn from(err: pan_telemetry::TelemetryError) -> Self {
        Self::Telemetry(err.to_string())
    }
}
