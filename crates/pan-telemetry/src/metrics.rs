//! Prometheus metrics for the PAN message bus.
//!
//! All metrics follow the naming convention: `pan_<component>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., messages_published_total)
//! - **Gauge**: Value that can go up or down (e.g., retained_messages)

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // BUS METRICS
    // =========================================================================

    /// Messages accepted by the bus, labelled by the first topic segment
    pub static ref MESSAGES_PUBLISHED: IntCounterVec = IntCounterVec::new(
        Opts::new("pan_bus_messages_published_total", "Messages accepted by the bus"),
        &["topic_root"]
    ).expect("metric creation failed");

    /// Successful handler invocations
    pub static ref MESSAGES_DELIVERED: IntCounter = IntCounter::new(
        "pan_bus_messages_delivered_total",
        "Messages delivered to subscription handlers"
    ).expect("metric creation failed");

    /// Retained messages replayed to new subscribers
    pub static ref MESSAGES_REPLAYED: IntCounter = IntCounter::new(
        "pan_bus_messages_replayed_total",
        "Retained messages replayed on subscribe"
    ).expect("metric creation failed");

    /// Handler errors and panics
    pub static ref HANDLER_ERRORS: IntCounter = IntCounter::new(
        "pan_bus_handler_errors_total",
        "Subscription handlers that returned an error or panicked"
    ).expect("metric creation failed");

    /// Rejected publishes by reason
    pub static ref PUBLISH_REJECTED: IntCounterVec = IntCounterVec::new(
        Opts::new("pan_bus_publish_rejected_total", "Publishes rejected before delivery"),
        &["reason"]  // reason: invalid_topic/payload_too_large/rate_limited
    ).expect("metric creation failed");

    // =========================================================================
    // STATE GAUGES
    // =========================================================================

    /// Live subscriptions
    pub static ref SUBSCRIPTIONS: IntGauge = IntGauge::new(
        "pan_bus_subscriptions",
        "Number of live subscriptions"
    ).expect("metric creation failed");

    /// Retained topics
    pub static ref RETAINED_MESSAGES: IntGauge = IntGauge::new(
        "pan_bus_retained_messages",
        "Number of retained topics"
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once; already registered metrics are kept.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(MESSAGES_PUBLISHED.clone()),
        Box::new(MESSAGES_DELIVERED.clone()),
        Box::new(MESSAGES_REPLAYED.clone()),
        Box::new(HANDLER_ERRORS.clone()),
        Box::new(PUBLISH_REJECTED.clone()),
        Box::new(SUBSCRIPTIONS.clone()),
        Box::new(RETAINED_MESSAGES.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// First segment of a topic, used as a bounded-cardinality label.
#[must_use]
pub fn topic_root(topic: &str) -> &str {
    topic.split('.').next().unwrap_or(topic)
}

/// Count an accepted publish.
pub fn record_published(topic: &str) {
    crate::metric_inc!(MESSAGES_PUBLISHED, &[topic_root(topic)]);
}

/// Count a handler delivery.
pub fn record_delivered(replay: bool) {
    crate::metric_inc!(MESSAGES_DELIVERED);
    if replay {
        crate::metric_inc!(MESSAGES_REPLAYED);
    }
}

/// Count a handler failure.
pub fn record_handler_error() {
    crate::metric_inc!(HANDLER_ERRORS);
}

/// Count a rejected publish.
pub fn record_rejected(reason: &str) {
    crate::metric_inc!(PUBLISH_REJECTED, &[reason]);
}
