//! Inspector metrics.
//!
//! Counts observed events locally and, when enabled, forwards them to the
//! process-wide Prometheus counters in `pan-telemetry`.

use pan_bus::BusEvent;
use pan_telemetry::metrics as prom;
use pan_types::is_reply_topic;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Counters over everything the inspector has observed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectorMetrics {
    pub published: u64,
    pub delivered: u64,
    /// Deliveries that were retained replays.
    pub replayed: u64,
    pub handler_errors: u64,
    pub rejected: u64,
    /// Published messages per topic, private reply topics excluded.
    pub topics: BTreeMap<String, u64>,
    /// Rejections per reason.
    pub rejections: BTreeMap<String, u64>,
}

impl InspectorMetrics {
    /// Count one event.
    pub fn record(&mut self, event: &BusEvent, export: bool) {
        match event {
            BusEvent::Published { message } => {
                self.published += 1;
                if !is_reply_topic(&message.topic) {
                    *self.topics.entry(message.topic.clone()).or_insert(0) += 1;
                }
                if export {
                    prom::record_published(&message.topic);
                }
            }
            BusEvent::Delivered { replay, .. } => {
                self.delivered += 1;
                if *replay {
                    self.replayed += 1;
                }
                if export {
                    prom::record_delivered(*replay);
                }
            }
            BusEvent::HandlerFailed { .. } => {
                self.handler_errors += 1;
                if export {
                    prom::record_handler_error();
                }
            }
            BusEvent::Rejected { reason, .. } => {
                self.rejected += 1;
                *self.rejections.entry(reason.kind().to_string()).or_insert(0) += 1;
                if export {
                    prom::record_rejected(reason.kind());
                }
            }
        }
    }

    /// Topics by descending publish count, ties by name.
    #[must_use]
    pub fn busiest_topics(&self, limit: usize) -> Vec<(String, u64)> {
        let mut topics: Vec<(String, u64)> = self
            .topics
            .iter()
            .map(|(topic, count)| (topic.clone(), *count))
            .collect();
        topics.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        topics.truncate(limit);
        topics
    }
}
