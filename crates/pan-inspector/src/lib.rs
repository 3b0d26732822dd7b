//! # PAN Inspector
//!
//! Debug and introspection layer for the PAN message bus.
//!
//! Taps a bus and keeps:
//!
//! - a bounded trace history of published, delivered, failed and rejected events
//! - counters per event kind and per topic, mirrored into Prometheus
//! - the published messages needed to replay "everything since id N"
//!
//! Snapshots bundle bus stats, retained messages and the trace history as
//! JSON; importing one restores the retained messages into another bus.
//!
//! ## Example
//!
//! ```ignore
//! use pan_bus::MessageBus;
//! use pan_inspector::{Inspector, InspectorConfig};
//!
//! let bus = MessageBus::new();
//! let mut inspector = Inspector::new(&bus, InspectorConfig::default())?;
//! bus.publish("user.login", serde_json::json!({"id": 1}), Default::default())?;
//! inspector.drain();
//! println!("{}", inspector.export_json()?);
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config;
pub mod error;
pub mod history;
pub mod inspector;
pub mod metrics;
pub mod snapshot;

pub use config::{InspectorConfig, DEFAULT_HISTORY_LIMIT};
pub use error::InspectorError;
pub use history::{TraceEvent, TraceHistory, TraceRecord};
pub use inspector::{Inspector, InspectorView};
pub use metrics::InspectorMetrics;
pub use snapshot::{import_json, BusSnapshot};
