//! # Subscription Registry
//!
//! Maps subscription patterns to handler registrations.
//!
//! Patterns are stored in a segment trie: each node has literal children
//! and at most one wildcard child. The universal pattern `*` is kept in a
//! separate list because it matches topics of any depth.
//!
//! ## Ordering
//!
//! `find_matching` returns registrations in ascending subscription id order
//! across all matching patterns, i.e. the order they were registered.

use crate::topic::{self, segments};
use pan_types::{HandlerResult, Message, SubscriptionId, WILDCARD};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Shared handler invoked for every matching message.
pub type Handler = Arc<dyn Fn(&Message) -> HandlerResult + Send + Sync>;

/// A registered subscription.
#[derive(Clone)]
pub struct Registration {
    /// Subscription id (delivery order).
    pub id: SubscriptionId,
    /// Pattern the subscription was registered with.
    pub pattern: String,
    /// Handler to invoke.
    pub handler: Handler,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct TrieNode {
    literals: HashMap<String, TrieNode>,
    wildcard: Option<Box<TrieNode>>,
    registrations: Vec<Registration>,
}

impl TrieNode {
    fn is_empty(&self) -> bool {
        self.registrations.is_empty() && self.literals.is_empty() && self.wildcard.is_none()
    }

    fn insert(&mut self, parts: &[&str], registration: Registration) {
        match parts.split_first() {
            None => self.registrations.push(registration),
            Some((&first, rest)) if first == WILDCARD => self
                .wildcard
                .get_or_insert_with(Box::default)
                .insert(rest, registration),
            Some((&first, rest)) => self
                .literals
                .entry(first.to_string())
                .or_default()
                .insert(rest, registration),
        }
    }

    /// Remove `id` below this node, pruning nodes left empty.
    fn remove(&mut self, parts: &[&str], id: SubscriptionId) -> bool {
        let Some((&first, rest)) = parts.split_first() else {
            let before = self.registrations.len();
            self.registrations.retain(|r| r.id != id);
            return self.registrations.len() != before;
        };

        if first == WILDCARD {
            let Some(child) = self.wildcard.as_mut() else {
                return false;
            };
            let removed = child.remove(rest, id);
            if child.is_empty() {
                self.wildcard = None;
            }
            removed
        } else {
            let Some(child) = self.literals.get_mut(first) else {
                return false;
            };
            let removed = child.remove(rest, id);
            if child.is_empty() {
                self.literals.remove(first);
            }
            removed
        }
    }

    fn collect(&self, parts: &[&str], out: &mut Vec<Registration>) {
        let Some((&first, rest)) = parts.split_first() else {
            out.extend(self.registrations.iter().cloned());
            return;
        };
        if let Some(child) = self.literals.get(first) {
            child.collect(rest, out);
        }
        if let Some(child) = &self.wildcard {
            child.collect(rest, out);
        }
    }
}

/// Registry of live subscriptions.
#[derive(Default)]
pub struct SubscriptionRegistry {
    root: TrieNode,
    universal: Vec<Registration>,
    /// Subscription id to pattern, for removal.
    index: HashMap<SubscriptionId, String>,
    /// Live subscription count per pattern.
    patterns: BTreeMap<String, usize>,
    next_id: u64,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `pattern`. The pattern must already be valid.
    pub fn add(&mut self, pattern: &str, handler: Handler) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        let registration = Registration {
            id,
            pattern: pattern.to_string(),
            handler,
        };

        if topic::is_universal(pattern) {
            self.universal.push(registration);
        } else {
            let parts: Vec<&str> = segments(pattern).collect();
            self.root.insert(&parts, registration);
        }

        self.index.insert(id, pattern.to_string());
        *self.patterns.entry(pattern.to_string()).or_insert(0) += 1;
        id
    }

    /// Remove a subscription. Unknown ids are a no-op.
    pub fn remove(&mut self, id: SubscriptionId) -> bool {
        let Some(pattern) = self.index.remove(&id) else {
            return false;
        };

        let removed = if topic::is_universal(&pattern) {
            let before = self.universal.len();
            self.universal.retain(|r| r.id != id);
            self.universal.len() != before
        } else {
            let parts: Vec<&str> = segments(&pattern).collect();
            self.root.remove(&parts, id)
        };

        if let Some(count) = self.patterns.get_mut(&pattern) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.patterns.remove(&pattern);
            }
        }
        removed
    }

    /// Registrations matching a concrete topic, in subscription order.
    #[must_use]
    pub fn find_matching(&self, topic: &str) -> Vec<Registration> {
        let mut matched: Vec<Registration> = self.universal.clone();
        if !topic.is_empty() {
            let parts: Vec<&str> = segments(topic).collect();
            self.root.collect(&parts, &mut matched);
        }
        matched.sort_by_key(|r| r.id);
        matched
    }

    /// Look up a single registration.
    #[must_use]
    pub fn get(&self, id: SubscriptionId) -> Option<Registration> {
        let pattern = self.index.get(&id)?;
        if topic::is_universal(pattern) {
            return self.universal.iter().find(|r| r.id == id).cloned();
        }
        // A concrete topic built from the pattern reaches the pattern's node
        self.find_matching(pattern).into_iter().find(|r| r.id == id)
    }

    /// Returns true if `id` is registered.
    #[must_use]
    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.index.contains_key(&id)
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns true if there are no subscriptions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of distinct patterns with at least one subscription.
    #[must_use]
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Distinct live patterns with their subscription counts, sorted by pattern.
    #[must_use]
    pub fn patterns(&self) -> Vec<(String, usize)> {
        self.patterns
            .iter()
            .map(|(pattern, count)| (pattern.clone(), *count))
            .collect()
    }

    /// Remove every subscription. Ids keep increasing afterwards.
    pub fn clear(&mut self) {
        self.root = TrieNode::default();
        self.universal.clear();
        self.index.clear();
        self.patterns.clear();
    }
}
