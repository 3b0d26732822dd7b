//! Bus snapshots.
//!
//! A snapshot captures bus statistics, the retained messages and the trace
//! history as JSON. Importing a snapshot restores only its retained
//! messages.

use crate::error::InspectorError;
use crate::history::TraceRecord;
use pan_bus::{BusStats, MessageBus};
use pan_types::Message;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Point-in-time view of a bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusSnapshot {
    /// Milliseconds since the epoch.
    pub exported_at: u64,
    pub stats: BusStats,
    /// Retained messages in publish order.
    pub retained: Vec<Message>,
    #[serde(default)]
    pub history: Vec<TraceRecord>,
}

impl BusSnapshot {
    /// Serialize as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, InspectorError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a snapshot.
    pub fn from_json(json: &str) -> Result<Self, InspectorError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load the retained messages into `bus`. Returns the number restored.
    pub fn restore_into(self, bus: &MessageBus) -> Result<usize, InspectorError> {
        if bus.is_closed() {
            return Err(InspectorError::BusClosed);
        }
        let offered = self.retained.len();
        let restored = bus.restore_retained(self.retained);
        info!(
            offered = offered,
            restored = restored,
            exported_at = self.exported_at,
            "Snapshot imported"
        );
        Ok(restored)
    }
}

/// Restore the retained messages of a JSON snapshot into `bus`.
pub fn import_json(bus: &MessageBus, json: &str) -> Result<usize, InspectorError> {
    BusSnapshot::from_json(json)?.restore_into(bus)
}
