//! # Observation Taps
//!
//! Read-only streams of bus activity for tracing and tooling.
//!
//! Every tap receives its own copy of each event over a broadcast channel.
//! Taps never influence delivery: a tap that falls behind skips the oldest
//! events and keeps going.

use pan_types::{BusError, HandlerFailure, Message, MessageId, SubscriptionId};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::Stream;
use tracing::debug;

/// Errors from tap operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TapError {
    /// The bus was shut down or dropped.
    #[error("Message bus closed")]
    Closed,
}

/// An observed bus event.
#[derive(Debug, Clone)]
pub enum BusEvent {
    /// A message was accepted. Emitted once per successful publish.
    Published { message: Arc<Message> },
    /// A handler returned successfully.
    Delivered {
        message_id: MessageId,
        topic: String,
        subscription: SubscriptionId,
        /// True when delivered as a retained replay on subscribe.
        replay: bool,
    },
    /// A handler returned an error or panicked.
    HandlerFailed { failure: HandlerFailure },
    /// A publish was rejected before delivery.
    Rejected { topic: String, reason: BusError },
}

impl BusEvent {
    /// Topic the event refers to.
    #[must_use]
    pub fn topic(&self) -> &str {
        match self {
            Self::Published { message } => &message.topic,
            Self::Delivered { topic, .. } | Self::Rejected { topic, .. } => topic,
            Self::HandlerFailed { failure } => &failure.topic,
        }
    }

    /// Short label for the event kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Published { .. } => "published",
            Self::Delivered { .. } => "delivered",
            Self::HandlerFailed { .. } => "handler_failed",
            Self::Rejected { .. } => "rejected",
        }
    }
}

/// Receiving end of an observation channel.
pub struct Tap {
    receiver: broadcast::Receiver<BusEvent>,
    /// Events skipped because this tap lagged.
    skipped: u64,
}

impl Tap {
    pub(crate) fn new(receiver: broadcast::Receiver<BusEvent>) -> Self {
        Self {
            receiver,
            skipped: 0,
        }
    }

    /// A tap that is already closed.
    pub(crate) fn closed() -> Self {
        let (sender, receiver) = broadcast::channel(1);
        drop(sender);
        Self::new(receiver)
    }

    /// Receive the next event.
    ///
    /// # Returns
    ///
    /// - `Some(event)` - The next event
    /// - `None` - The bus was shut down or dropped
    pub async fn recv(&mut self) -> Option<BusEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    self.skipped += count;
                    debug!(lagged = count, "Tap lagged, some events dropped");
                }
            }
        }
    }

    /// Try to receive the next event without waiting.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(event))` - An event was available
    /// - `Ok(None)` - Nothing buffered right now
    /// - `Err(TapError::Closed)` - The bus is gone and the buffer is drained
    pub fn try_recv(&mut self) -> Result<Option<BusEvent>, TapError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Ok(Some(event)),
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => return Err(TapError::Closed),
                Err(broadcast::error::TryRecvError::Lagged(count)) => {
                    self.skipped += count;
                }
            }
        }
    }

    /// Number of events dropped because this tap fell behind.
    #[must_use]
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Convert into a `Stream` of events.
    #[must_use]
    pub fn into_stream(self) -> TapStream {
        TapStream {
            inner: BroadcastStream::new(self.receiver),
        }
    }
}

/// A stream wrapper for taps.
///
/// Implements `tokio_stream::Stream`; lagged gaps are skipped.
pub struct TapStream {
    inner: BroadcastStream<BusEvent>,
}

impl Stream for TapStream {
    type Item = BusEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => return Poll::Ready(Some(event)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(count)))) => {
                    debug!(lagged = count, "Tap stream lagged, some events dropped");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
