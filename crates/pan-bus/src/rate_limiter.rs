//! # Rate Limiter
//!
//! Per-publisher token buckets protecting the publish path.
//!
//! ## Algorithm
//!
//! Each publisher key owns a bucket holding at most `max_messages` tokens:
//! - Tokens refill continuously at `max_messages` per `window`
//! - Each publish consumes one token
//! - Publishes are rejected (never queued) when no token is available

use crate::config::RateLimitConfig;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Key used when a publish carries no source.
pub const ANONYMOUS_PUBLISHER: &str = "anonymous";

/// Buckets idle longer than this many windows are pruned.
const IDLE_WINDOWS_BEFORE_PRUNE: u32 = 4;

/// Number of buckets above which idle ones are pruned.
const PRUNE_THRESHOLD: usize = 1024;

/// Token bucket for a single publisher.
#[derive(Debug)]
struct TokenBucket {
    /// Current token count.
    tokens: u64,
    /// Last refill time.
    last_refill: Instant,
}

impl TokenBucket {
    fn full(capacity: u64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    /// Refill tokens based on elapsed time.
    ///
    /// `last_refill` only advances by the time the added tokens account for,
    /// so progress toward the next token survives frequent calls.
    fn refill(&mut self, capacity: u64, window: Duration, now: Instant) {
        let elapsed = now.duration_since(self.last_refill);
        let window_secs = window.as_secs_f64();
        if window_secs <= 0.0 {
            self.tokens = capacity;
            self.last_refill = now;
            return;
        }

        let tokens_to_add = (elapsed.as_secs_f64() / window_secs * capacity as f64) as u64;
        if tokens_to_add == 0 {
            return;
        }

        let tokens = self.tokens.saturating_add(tokens_to_add);
        if tokens >= capacity {
            self.tokens = capacity;
            self.last_refill = now;
        } else {
            self.tokens = tokens;
            let earned = window.mul_f64(tokens_to_add as f64 / capacity as f64);
            self.last_refill = (self.last_refill + earned).min(now);
        }
    }
}

/// Token-bucket rate limiter keyed by publisher.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: HashMap<String, TokenBucket>,
}

impl RateLimiter {
    /// Create a new rate limiter.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: HashMap::new(),
        }
    }

    /// Try to acquire a token for `publisher`.
    ///
    /// Returns `true` if the publish is allowed, `false` if rate limited.
    pub fn try_acquire(&mut self, publisher: &str) -> bool {
        let now = Instant::now();
        let capacity = self.config.max_messages;
        let window = self.config.window();

        if self.buckets.len() > PRUNE_THRESHOLD {
            self.prune_idle(now);
        }

        let bucket = self
            .buckets
            .entry(publisher.to_string())
            .or_insert_with(|| TokenBucket::full(capacity, now));
        bucket.refill(capacity, window, now);

        if bucket.tokens == 0 {
            return false;
        }
        bucket.tokens -= 1;
        true
    }

    /// Forget all buckets.
    pub fn reset(&mut self) {
        self.buckets.clear();
    }

    /// Drop buckets that have been idle for several windows; they would be full anyway.
    fn prune_idle(&mut self, now: Instant) {
        let idle = self.config.window() * IDLE_WINDOWS_BEFORE_PRUNE;
        self.buckets
            .retain(|_, bucket| now.duration_since(bucket.last_refill) < idle);
    }
}
