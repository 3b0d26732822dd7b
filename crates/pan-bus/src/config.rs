//! Bus configuration and validation
//!
//! # Example
//!
//! ```ignore
//! use pan_bus::BusConfigBuilder;
//!
//! let config = BusConfigBuilder::new()
//!     .max_payload_bytes(16 * 1024)
//!     .retained_capacity(500)
//!     .rate_limit(100, 1_000)
//!     .build()?;
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default maximum serialized payload size (64 KiB).
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 64 * 1024;

/// Default number of retained topics.
pub const DEFAULT_RETAINED_CAPACITY: usize = 1000;

/// Default number of topics reported by `stats().top_topics`.
pub const DEFAULT_TOP_TOPICS: usize = 10;

/// Default buffer of each observation tap before it lags.
pub const DEFAULT_TAP_CAPACITY: usize = 1024;

/// Errors raised by configuration validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_payload_bytes cannot be 0")]
    ZeroPayloadLimit,

    #[error("rate limit max_messages cannot be 0")]
    ZeroRateLimit,

    #[error("rate limit window_ms cannot be 0")]
    ZeroRateWindow,

    #[error("tap_capacity cannot be 0")]
    ZeroTapCapacity,
}

/// Publish rate allowed per publisher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Messages allowed per window (also the burst size).
    pub max_messages: u64,
    /// Window length in milliseconds.
    pub window_ms: u64,
}

impl RateLimitConfig {
    /// Window as a `Duration`.
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_messages: 1000,
            window_ms: 1000,
        }
    }
}

/// Message bus configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Maximum serialized JSON payload size in bytes.
    pub max_payload_bytes: usize,
    /// Maximum number of retained topics (0 disables retention).
    pub retained_capacity: usize,
    /// Per-publisher rate limit; `None` disables rate limiting.
    pub rate_limit: Option<RateLimitConfig>,
    /// Number of topics reported in `stats().top_topics`.
    pub top_topics: usize,
    /// Buffered events per observation tap.
    pub tap_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            retained_capacity: DEFAULT_RETAINED_CAPACITY,
            rate_limit: Some(RateLimitConfig::default()),
            top_topics: DEFAULT_TOP_TOPICS,
            tap_capacity: DEFAULT_TAP_CAPACITY,
        }
    }
}

impl BusConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_payload_bytes == 0 {
            return Err(ConfigError::ZeroPayloadLimit);
        }
        if let Some(limit) = &self.rate_limit {
            if limit.max_messages == 0 {
                return Err(ConfigError::ZeroRateLimit);
            }
            if limit.window_ms == 0 {
                return Err(ConfigError::ZeroRateWindow);
            }
        }
        if self.tap_capacity == 0 {
            return Err(ConfigError::ZeroTapCapacity);
        }
        Ok(())
    }

    /// Builder-style method to disable rate limiting
    #[must_use]
    pub fn without_rate_limit(mut self) -> Self {
        self.rate_limit = None;
        self
    }

    /// Builder-style method to set retained capacity
    #[must_use]
    pub fn with_retained_capacity(mut self, capacity: usize) -> Self {
        self.retained_capacity = capacity;
        self
    }
}

/// Builder for BusConfig with validation
#[derive(Default)]
pub struct BusConfigBuilder {
    max_payload_bytes: Option<usize>,
    retained_capacity: Option<usize>,
    rate_limit: Option<Option<RateLimitConfig>>,
    top_topics: Option<usize>,
    tap_capacity: Option<usize>,
}

impl BusConfigBuilder {
    /// Create a new builder with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the payload size limit in bytes
    #[must_use]
    pub fn max_payload_bytes(mut self, bytes: usize) -> Self {
        self.max_payload_bytes = Some(bytes);
        self
    }

    /// Set the retained store capacity
    #[must_use]
    pub fn retained_capacity(mut self, capacity: usize) -> Self {
        self.retained_capacity = Some(capacity);
        self
    }

    /// Allow `max_messages` per `window_ms` for each publisher
    #[must_use]
    pub fn rate_limit(mut self, max_messages: u64, window_ms: u64) -> Self {
        self.rate_limit = Some(Some(RateLimitConfig {
            max_messages,
            window_ms,
        }));
        self
    }

    /// Disable rate limiting
    #[must_use]
    pub fn no_rate_limit(mut self) -> Self {
        self.rate_limit = Some(None);
        self
    }

    /// Set how many topics `stats()` reports
    #[must_use]
    pub fn top_topics(mut self, count: usize) -> Self {
        self.top_topics = Some(count);
        self
    }

    /// Set the buffer size of observation taps
    #[must_use]
    pub fn tap_capacity(mut self, capacity: usize) -> Self {
        self.tap_capacity = Some(capacity);
        self
    }

    /// Build the BusConfig, validating all parameters
    pub fn build(self) -> Result<BusConfig, ConfigError> {
        let defaults = BusConfig::default();

        let config = BusConfig {
            max_payload_bytes: self.max_payload_bytes.unwrap_or(defaults.max_payload_bytes),
            retained_capacity: self.retained_capacity.unwrap_or(defaults.retained_capacity),
            rate_limit: self.rate_limit.unwrap_or(defaults.rate_limit),
            top_topics: self.top_topics.unwrap_or(defaults.top_topics),
            tap_capacity: self.tap_capacity.unwrap_or(defaults.tap_capacity),
        };

        config.validate()?;
        Ok(config)
    }
}
