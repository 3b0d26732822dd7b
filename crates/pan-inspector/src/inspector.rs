//! # Inspector
//!
//! Consumes a bus tap and turns the events into trace history and metrics.
//!
//! Two ways to drive it:
//!
//! - `drain()` processes everything buffered so far, synchronously
//! - `run().await` processes events until the bus shuts down
//!
//! While `run` owns the inspector, an [`InspectorView`] gives read access
//! to history and metrics from elsewhere.

use crate::config::InspectorConfig;
use crate::error::InspectorError;
use crate::history::{TraceEvent, TraceHistory, TraceRecord};
use crate::metrics::InspectorMetrics;
use crate::snapshot::BusSnapshot;
use pan_bus::{BusEvent, MessageBus, Tap, TapError, WeakMessageBus};
use pan_telemetry::{log_event, log_message_event};
use pan_types::{current_timestamp_ms, Message, MessageId};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

struct InspectorState {
    history: TraceHistory,
    metrics: InspectorMetrics,
}

/// Tap consumer keeping history and metrics for one bus.
pub struct Inspector {
    bus: WeakMessageBus,
    tap: Tap,
    config: InspectorConfig,
    state: Arc<Mutex<InspectorState>>,
}

impl Inspector {
    /// Start observing `bus`. Only events after this call are seen.
    pub fn new(bus: &MessageBus, config: InspectorConfig) -> Result<Self, InspectorError> {
        config.validate()?;
        if bus.is_closed() {
            return Err(InspectorError::BusClosed);
        }
        if config.export_metrics {
            pan_telemetry::register_metrics()?;
        }

        let state = InspectorState {
            history: TraceHistory::new(config.history_limit),
            metrics: InspectorMetrics::default(),
        };

        log_event!(
            info,
            "inspector",
            "Inspector attached",
            history_limit = config.history_limit
        );

        Ok(Self {
            bus: bus.downgrade(),
            tap: bus.tap(),
            config,
            state: Arc::new(Mutex::new(state)),
        })
    }

    /// Process every buffered event. Returns the number processed.
    pub fn drain(&mut self) -> usize {
        let mut processed = 0;
        loop {
            match self.tap.try_recv() {
                Ok(Some(event)) => {
                    self.observe(&event);
                    processed += 1;
                }
                Ok(None) | Err(TapError::Closed) => break,
            }
        }
        self.refresh_gauges();
        if processed > 0 {
            debug!(processed = processed, "Inspector drained events");
        }
        processed
    }

    /// Process events until the bus shuts down. Returns the number processed.
    pub async fn run(&mut self) -> usize {
        let mut processed = 0;
        while let Some(event) = self.tap.recv().await {
            self.observe(&event);
            processed += 1;
        }
        log_event!(
            info,
            "inspector",
            "Bus closed, inspector stopped",
            processed = processed,
            skipped = self.tap.skipped()
        );
        processed
    }

    fn observe(&self, event: &BusEvent) {
        if let BusEvent::HandlerFailed { failure } = event {
            log_message_event!(
                debug,
                "inspector",
                "Handler failure traced",
                failure.topic,
                failure.message_id,
                subscription = %failure.subscription
            );
        }

        let mut state = self.state.lock();
        state.metrics.record(event, self.config.export_metrics);

        let keep = self.config.record_deliveries || !matches!(event, BusEvent::Delivered { .. });
        if keep {
            state.history.push(TraceEvent::from_bus_event(event));
        }
    }

    fn refresh_gauges(&self) {
        if !self.config.export_metrics {
            return;
        }
        if let Some(bus) = self.bus.upgrade() {
            let stats = bus.stats();
            pan_telemetry::SUBSCRIPTIONS.set(i64::try_from(stats.subscriptions).unwrap_or(i64::MAX));
            pan_telemetry::RETAINED_MESSAGES.set(i64::try_from(stats.retained).unwrap_or(i64::MAX));
        }
    }

    /// Read-only handle sharing this inspector's history and metrics.
    #[must_use]
    pub fn view(&self) -> InspectorView {
        InspectorView {
            state: self.state.clone(),
        }
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &InspectorConfig {
        &self.config
    }

    /// Events lost because the tap fell behind.
    #[must_use]
    pub fn skipped(&self) -> u64 {
        self.tap.skipped()
    }

    /// Metrics observed so far.
    #[must_use]
    pub fn metrics(&self) -> InspectorMetrics {
        self.view().metrics()
    }

    /// Trace history, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<TraceRecord> {
        self.view().history()
    }

    /// Published messages after `last_id` still held in history.
    #[must_use]
    pub fn messages_since(&self, last_id: MessageId) -> Vec<Message> {
        self.view().messages_since(last_id)
    }

    /// Drain pending events, then capture the bus state.
    pub fn snapshot(&mut self) -> Result<BusSnapshot, InspectorError> {
        self.drain();
        let bus = self.bus.upgrade().ok_or(InspectorError::BusClosed)?;
        if bus.is_closed() {
            return Err(InspectorError::BusClosed);
        }

        Ok(BusSnapshot {
            exported_at: current_timestamp_ms(),
            stats: bus.stats(),
            retained: bus
                .retained_messages()
                .iter()
                .map(|message| Message::clone(message))
                .collect(),
            history: self.history(),
        })
    }

    /// Snapshot serialized as JSON.
    pub fn export_json(&mut self) -> Result<String, InspectorError> {
        self.snapshot()?.to_json()
    }
}

/// Shared read access to an inspector's history and metrics.
#[derive(Clone)]
pub struct InspectorView {
    state: Arc<Mutex<InspectorState>>,
}

impl InspectorView {
    #[must_use]
    pub fn metrics(&self) -> InspectorMetrics {
        self.state.lock().metrics.clone()
    }

    #[must_use]
    pub fn history(&self) -> Vec<TraceRecord> {
        self.state.lock().history.records()
    }

    /// The most recent `count` records.
    #[must_use]
    pub fn recent(&self, count: usize) -> Vec<TraceRecord> {
        self.state.lock().history.recent(count)
    }

    #[must_use]
    pub fn messages_since(&self, last_id: MessageId) -> Vec<Message> {
        self.state.lock().history.messages_since(last_id)
    }

    /// Records referring to `topic`.
    #[must_use]
    pub fn topic_history(&self, topic: &str) -> Vec<TraceRecord> {
        self.state.lock().history.for_topic(topic)
    }

    /// Forget history and metrics.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.history.clear();
        state.metrics = InspectorMetrics::default();
    }
}
