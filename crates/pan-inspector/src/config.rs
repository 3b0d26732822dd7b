//! Inspector configuration.

use crate::error::InspectorError;
use serde::{Deserialize, Serialize};

/// Default number of trace records kept.
pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

/// Inspector settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectorConfig {
    /// Trace records kept before the oldest are dropped.
    pub history_limit: usize,
    /// Record per-subscriber deliveries in the history.
    ///
    /// Deliveries are always counted in metrics.
    pub record_deliveries: bool,
    /// Feed observations into the Prometheus counters.
    pub export_metrics: bool,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            record_deliveries: true,
            export_metrics: true,
        }
    }
}

impl InspectorConfig {
    /// Keep `limit` trace records.
    #[must_use]
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Skip delivery records in the history.
    #[must_use]
    pub fn without_deliveries(mut self) -> Self {
        self.record_deliveries = false;
        self
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<(), InspectorError> {
        if self.history_limit == 0 {
            return Err(InspectorError::InvalidConfig(
                "history_limit must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
