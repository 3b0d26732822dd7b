//! # Trace History
//!
//! Bounded, ordered record of observed bus events. When full, the oldest
//! record is dropped.

use pan_bus::BusEvent;
use pan_types::{current_timestamp_ms, HandlerFailure, Message, MessageId, SubscriptionId};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// What a trace record describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEvent {
    Published {
        message: Message,
    },
    Delivered {
        message_id: MessageId,
        topic: String,
        subscription: SubscriptionId,
        replay: bool,
    },
    HandlerFailed {
        failure: HandlerFailure,
    },
    Rejected {
        topic: String,
        reason: String,
        error: String,
    },
}

impl TraceEvent {
    /// Convert an observed bus event.
    #[must_use]
    pub fn from_bus_event(event: &BusEvent) -> Self {
        match event {
            BusEvent::Published { message } => Self::Published {
                message: Message::clone(message),
            },
            BusEvent::Delivered {
                message_id,
                topic,
                subscription,
                replay,
            } => Self::Delivered {
                message_id: *message_id,
                topic: topic.clone(),
                subscription: *subscription,
                replay: *replay,
            },
            BusEvent::HandlerFailed { failure } => Self::HandlerFailed {
                failure: failure.clone(),
            },
            BusEvent::Rejected { topic, reason } => Self::Rejected {
                topic: topic.clone(),
                reason: reason.kind().to_string(),
                error: reason.to_string(),
            },
        }
    }

    /// Topic the event refers to.
    #[must_use]
    pub fn topic(&self) -> &str {
        match self {
            Self::Published { message } => &message.topic,
            Self::Delivered { topic, .. } | Self::Rejected { topic, .. } => topic,
            Self::HandlerFailed { failure } => &failure.topic,
        }
    }
}

/// One entry in the trace history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceRecord {
    /// Position in the stream of records, starting at 1.
    pub seq: u64,
    /// When the inspector observed the event (ms since epoch).
    pub recorded_at: u64,
    #[serde(flatten)]
    pub event: TraceEvent,
}

/// Bounded trace history.
#[derive(Debug)]
pub struct TraceHistory {
    records: VecDeque<TraceRecord>,
    limit: usize,
    next_seq: u64,
}

impl TraceHistory {
    /// Create a history keeping at most `limit` records.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(limit.min(1024)),
            limit: limit.max(1),
            next_seq: 1,
        }
    }

    /// Append a record, dropping the oldest if full.
    pub fn push(&mut self, event: TraceEvent) -> u64 {
        if self.records.len() >= self.limit {
            self.records.pop_front();
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.records.push_back(TraceRecord {
            seq,
            recorded_at: current_timestamp_ms(),
            event,
        });
        seq
    }

    /// All records, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<TraceRecord> {
        self.records.iter().cloned().collect()
    }

    /// The most recent `count` records, oldest first.
    #[must_use]
    pub fn recent(&self, count: usize) -> Vec<TraceRecord> {
        let skip = self.records.len().saturating_sub(count);
        self.records.iter().skip(skip).cloned().collect()
    }

    /// Published messages with an id greater than `last_id`, in id order.
    ///
    /// Only messages still in the history are returned.
    #[must_use]
    pub fn messages_since(&self, last_id: MessageId) -> Vec<Message> {
        self.records
            .iter()
            .filter_map(|record| match &record.event {
                TraceEvent::Published { message } if message.id > last_id => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    /// Records referring to `topic`.
    #[must_use]
    pub fn for_topic(&self, topic: &str) -> Vec<TraceRecord> {
        self.records
            .iter()
            .filter(|record| record.event.topic() == topic)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Drop all records. Sequence numbers keep increasing.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}
