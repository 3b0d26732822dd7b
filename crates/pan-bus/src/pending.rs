//! Pending request store for request/reply.
//!
//! Maps correlation IDs to requesters waiting on a reply. The requester holds
//! the oneshot receiver; the reply subscription completes the entry.

use dashmap::DashMap;
use pan_types::{CorrelationId, Message};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// A request waiting for its reply
struct PendingRequest {
    /// Channel to deliver the reply
    sender: oneshot::Sender<Arc<Message>>,
    /// When the request was registered
    created_at: Instant,
    /// Request topic (for logging)
    topic: String,
    /// Deadline for this request
    timeout: Duration,
}

/// Statistics for the pending request store
#[derive(Debug, Default)]
pub struct PendingStats {
    /// Total requests registered
    pub total_registered: AtomicU64,
    /// Total requests completed with a reply
    pub total_completed: AtomicU64,
    /// Total requests that timed out
    pub total_timeouts: AtomicU64,
    /// Total requests cancelled (dropped or shut down)
    pub total_cancelled: AtomicU64,
}

/// Store of in-flight requests.
///
/// Flow:
/// 1. `request` calls `register()` to get a correlation id and a receiver
/// 2. It subscribes to the reply topic derived from the correlation id
/// 3. The reply handler calls `complete()` with the reply message
/// 4. `request` awaits the receiver, or times out and calls `cancel()`
pub struct PendingRequestStore {
    pending: DashMap<CorrelationId, PendingRequest>,
    stats: Arc<PendingStats>,
}

impl PendingRequestStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
            stats: Arc::new(PendingStats::default()),
        }
    }

    /// Register a pending request and get a receiver for the reply.
    pub fn register(
        &self,
        topic: &str,
        timeout: Duration,
    ) -> (CorrelationId, oneshot::Receiver<Arc<Message>>) {
        let correlation_id = CorrelationId::new();
        let (tx, rx) = oneshot::channel();

        self.pending.insert(
            correlation_id,
            PendingRequest {
                sender: tx,
                created_at: Instant::now(),
                topic: topic.to_string(),
                timeout,
            },
        );
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);

        debug!(
            correlation_id = %correlation_id,
            topic = topic,
            "Registered pending request"
        );

        (correlation_id, rx)
    }

    /// Complete a pending request with its reply.
    ///
    /// Returns false if the id is unknown, already completed, or the
    /// requester is gone.
    pub fn complete(&self, correlation_id: CorrelationId, reply: Arc<Message>) -> bool {
        let Some((_, pending)) = self.pending.remove(&correlation_id) else {
            debug!(
                correlation_id = %correlation_id,
                "Reply for unknown or completed request"
            );
            return false;
        };

        let response_time = pending.created_at.elapsed();
        match pending.sender.send(reply) {
            Ok(()) => {
                self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    correlation_id = %correlation_id,
                    topic = pending.topic,
                    response_time_ms = response_time.as_millis() as u64,
                    "Completed pending request"
                );
                true
            }
            Err(_) => {
                // Receiver dropped (request cancelled)
                self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Record a timeout and forget the request.
    pub fn expire(&self, correlation_id: &CorrelationId) -> bool {
        let Some((_, pending)) = self.pending.remove(correlation_id) else {
            return false;
        };
        self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
        warn!(
            correlation_id = %correlation_id,
            topic = pending.topic,
            timeout_ms = u64::try_from(pending.timeout.as_millis()).unwrap_or(u64::MAX),
            "Request timed out"
        );
        true
    }

    /// Cancel a pending request
    pub fn cancel(&self, correlation_id: &CorrelationId) -> bool {
        if self.pending.remove(correlation_id).is_some() {
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Drop every pending request; waiting requesters observe a closed channel.
    pub fn cancel_all(&self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        self.stats
            .total_cancelled
            .fetch_add(count as u64, Ordering::Relaxed);
        count
    }

    /// Number of requests currently waiting
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Check if a correlation ID is pending
    #[must_use]
    pub fn is_pending(&self, correlation_id: &CorrelationId) -> bool {
        self.pending.contains_key(correlation_id)
    }

    /// Get statistics
    #[must_use]
    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }
}

impl Default for PendingRequestStore {
    fn default() -> Self {
        Self::new()
    }
}
