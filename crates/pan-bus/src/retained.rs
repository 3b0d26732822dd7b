//! # Retained Message Store
//!
//! Holds the most recent retained message per topic, bounded by capacity
//! with least-recently-accessed eviction.
//!
//! - `put` and `get` mark an entry as accessed.
//! - Enumeration (`matching`, `entries`) does not change access order and
//!   returns messages in publish order.
//! - A capacity of zero disables retention entirely.

use crate::topic;
use lru::LruCache;
use pan_types::{current_timestamp_ms, Message};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

/// A retained message and its last access time.
#[derive(Debug, Clone)]
pub struct RetainedEntry {
    /// The retained message.
    pub message: Arc<Message>,
    /// Milliseconds since the Unix epoch of the last put/get.
    pub last_access: u64,
}

/// Bounded LRU store keyed by topic.
pub struct RetainedStore {
    /// `None` when retention is disabled.
    cache: Option<LruCache<String, RetainedEntry>>,
}

impl RetainedStore {
    /// Create a store holding at most `capacity` topics.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: NonZeroUsize::new(capacity).map(LruCache::new),
        }
    }

    /// Insert or replace the entry for `topic`.
    ///
    /// Returns the topic evicted to make room, if any.
    pub fn put(&mut self, topic: &str, message: Arc<Message>) -> Option<String> {
        let cache = self.cache.as_mut()?;

        let evicted = if !cache.contains(topic) && cache.len() >= cache.cap().get() {
            cache.pop_lru().map(|(evicted_topic, _)| evicted_topic)
        } else {
            None
        };

        cache.put(
            topic.to_string(),
            RetainedEntry {
                message,
                last_access: current_timestamp_ms(),
            },
        );

        if let Some(evicted_topic) = &evicted {
            debug!(evicted = %evicted_topic, inserted = topic, "Retained entry evicted");
        }
        evicted
    }

    /// Get the retained message for `topic`, marking it accessed.
    pub fn get(&mut self, topic: &str) -> Option<Arc<Message>> {
        let entry = self.cache.as_mut()?.get_mut(topic)?;
        entry.last_access = current_timestamp_ms();
        Some(entry.message.clone())
    }

    /// Look at an entry without touching access order.
    #[must_use]
    pub fn peek(&self, topic: &str) -> Option<&RetainedEntry> {
        self.cache.as_ref()?.peek(topic)
    }

    /// Remove the entry for `topic`. No-op if absent.
    pub fn remove(&mut self, topic: &str) -> Option<Arc<Message>> {
        self.cache
            .as_mut()?
            .pop(topic)
            .map(|entry| entry.message)
    }

    /// Remove all entries.
    pub fn clear(&mut self) {
        if let Some(cache) = self.cache.as_mut() {
            cache.clear();
        }
    }

    /// Retained messages whose topic matches `pattern`, in publish order.
    #[must_use]
    pub fn matching(&self, pattern: &str) -> Vec<Arc<Message>> {
        let Some(cache) = self.cache.as_ref() else {
            return Vec::new();
        };
        let mut messages: Vec<Arc<Message>> = cache
            .iter()
            .filter(|(stored_topic, _)| topic::matches(pattern, stored_topic))
            .map(|(_, entry)| entry.message.clone())
            .collect();
        messages.sort_by_key(|m| m.id);
        messages
    }

    /// All retained messages, in publish order.
    #[must_use]
    pub fn entries(&self) -> Vec<Arc<Message>> {
        self.matching(pan_types::WILDCARD)
    }

    /// Number of retained topics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.as_ref().map_or(0, LruCache::len)
    }

    /// Returns true if nothing is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity (zero when disabled).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.cache.as_ref().map_or(0, |c| c.cap().get())
    }
}
