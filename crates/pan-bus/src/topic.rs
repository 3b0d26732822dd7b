//! # Topic Matching
//!
//! Topics are `.`-delimited segment lists, e.g. `user.profile.updated`.
//!
//! ## Wildcard Semantics
//!
//! - A pattern segment `*` matches exactly one concrete segment.
//! - There is no multi-level wildcard: `a.*` does not match `a.b.c`.
//! - The bare pattern `*` is the universal pattern and matches every topic.
//! - `#` is an ordinary character. Segments such as `**` or `a*` are
//!   rejected by [`validate_pattern`].
//!
//! [`matches`] is pure and total; validation happens in the bus before any
//! matching is attempted.

use pan_types::{BusError, TOPIC_DELIMITER, WILDCARD};

/// Split a topic or pattern into its segments.
pub fn segments(s: &str) -> impl Iterator<Item = &str> {
    s.split(TOPIC_DELIMITER)
}

/// Returns true for the universal pattern.
#[must_use]
pub fn is_universal(pattern: &str) -> bool {
    pattern == WILDCARD
}

/// Returns true if `topic` is matched by `pattern`.
///
/// Case-sensitive. Segment counts must be equal unless the pattern is
/// universal. The empty pattern matches only the empty topic.
#[must_use]
pub fn matches(pattern: &str, topic: &str) -> bool {
    if is_universal(pattern) {
        return true;
    }
    if pattern.is_empty() || topic.is_empty() {
        return pattern == topic;
    }

    let mut pattern_segments = segments(pattern);
    let mut topic_segments = segments(topic);
    loop {
        match (pattern_segments.next(), topic_segments.next()) {
            (None, None) => return true,
            (Some(p), Some(t)) => {
                if p != WILDCARD && p != t {
                    return false;
                }
            }
            _ => return false,
        }
    }
}

/// Validate a concrete topic used for publishing.
pub fn validate_topic(topic: &str) -> Result<(), BusError> {
    let invalid = |reason: &str| BusError::InvalidTopic {
        topic: topic.to_string(),
        reason: reason.to_string(),
    };

    if topic.is_empty() {
        return Err(invalid("topic is empty"));
    }
    if segments(topic).any(str::is_empty) {
        return Err(invalid("topic has an empty segment"));
    }
    if topic.contains(WILDCARD) {
        return Err(invalid("wildcards are not allowed in published topics"));
    }
    Ok(())
}

/// Validate a subscription pattern.
pub fn validate_pattern(pattern: &str) -> Result<(), BusError> {
    let invalid = |reason: &str| BusError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    if pattern.is_empty() {
        return Err(invalid("pattern is empty"));
    }
    for segment in segments(pattern) {
        if segment.is_empty() {
            return Err(invalid("pattern has an empty segment"));
        }
        if segment.contains(WILDCARD) && segment != WILDCARD {
            return Err(invalid("'*' must be a whole segment; multi-level wildcards are not supported"));
        }
    }
    Ok(())
}
