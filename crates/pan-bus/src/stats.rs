//! # Bus Statistics
//!
//! Publish counters behind the bus lock and the read-only `BusStats` snapshot.
//!
//! Per-topic counts are kept for at most [`MAX_TRACKED_TOPICS`] topics; the
//! topic published least recently is forgotten first. Private reply topics
//! are never counted per topic.

use lru::LruCache;
use pan_types::is_reply_topic;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

/// Window used for `messages_per_second`.
const RATE_WINDOW: Duration = Duration::from_secs(1);

/// Topics with a per-topic publish count.
pub const MAX_TRACKED_TOPICS: usize = 4096;

/// Publish count for one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicCount {
    pub topic: String,
    pub count: u64,
}

/// Read-only snapshot of bus activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusStats {
    /// Messages accepted since the bus was created.
    pub total_messages: u64,
    /// Messages accepted in the trailing one-second window.
    pub messages_per_second: u64,
    /// Busiest topics, descending by count, ties broken by topic name.
    pub top_topics: Vec<TopicCount>,
    /// Live subscriptions.
    pub subscriptions: usize,
    /// Retained topics.
    pub retained: usize,
    /// Requests waiting for a reply.
    pub pending_requests: usize,
    /// Handler failures since creation.
    pub handler_errors: u64,
    /// Publishes rejected since creation.
    pub rejected: u64,
}

/// Accumulates publish counts.
#[derive(Debug)]
pub struct StatsTracker {
    total_messages: u64,
    topic_counts: LruCache<String, u64>,
    recent: VecDeque<Instant>,
}

impl Default for StatsTracker {
    fn default() -> Self {
        Self::with_topic_capacity(MAX_TRACKED_TOPICS)
    }
}

impl StatsTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tracker counting at most `capacity` distinct topics.
    #[must_use]
    pub fn with_topic_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            total_messages: 0,
            topic_counts: LruCache::new(capacity),
            recent: VecDeque::new(),
        }
    }

    /// Record an accepted publish.
    pub fn record_publish(&mut self, topic: &str) {
        self.record_publish_at(topic, Instant::now());
    }

    fn record_publish_at(&mut self, topic: &str, now: Instant) {
        self.total_messages += 1;
        if !is_reply_topic(topic) {
            match self.topic_counts.get_mut(topic) {
                Some(count) => *count += 1,
                None => {
                    self.topic_counts.put(topic.to_string(), 1);
                }
            }
        }
        self.recent.push_back(now);
        self.prune(now);
    }

    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.recent.front() {
            if now.duration_since(*front) >= RATE_WINDOW {
                self.recent.pop_front();
            } else {
                break;
            }
        }
    }

    /// Distinct topics currently counted.
    #[must_use]
    pub fn tracked_topics(&self) -> usize {
        self.topic_counts.len()
    }

    /// Total accepted publishes.
    #[must_use]
    pub fn total_messages(&self) -> u64 {
        self.total_messages
    }

    /// Publishes in the trailing second.
    pub fn messages_per_second(&mut self) -> u64 {
        self.prune(Instant::now());
        self.recent.len() as u64
    }

    /// The `limit` busiest topics.
    #[must_use]
    pub fn top_topics(&self, limit: usize) -> Vec<TopicCount> {
        let mut counts: Vec<TopicCount> = self
            .topic_counts
            .iter()
            .map(|(topic, count)| TopicCount {
                topic: topic.clone(),
                count: *count,
            })
            .collect();
        counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.topic.cmp(&b.topic)));
        counts.truncate(limit);
        counts
    }

    /// Forget all counts.
    pub fn reset(&mut self) {
        *self = Self::with_topic_capacity(self.topic_counts.cap().get());
    }
}
