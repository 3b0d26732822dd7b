//! Route rules and their statistics.

use crate::domain::action::RouteAction;
use crate::domain::predicate::RouteMatch;
use crate::error::RouteError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier assigned when a rule is added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteId(pub u64);

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "route-{}", self.0)
    }
}

fn default_enabled() -> bool {
    true
}

/// A rule as supplied by the caller.
///
/// ```json
/// {
///   "name": "vip-orders",
///   "match": { "type": "field", "path": "payload.total", "op": "gte", "value": 1000 },
///   "actions": [{ "type": "emit", "topic": "alert.vip" }]
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "match")]
    pub matcher: RouteMatch,
    pub actions: Vec<RouteAction>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl RouteDefinition {
    /// Enabled rule with no actions yet.
    #[must_use]
    pub fn new(name: impl Into<String>, matcher: RouteMatch) -> Self {
        Self {
            name: name.into(),
            matcher,
            actions: Vec::new(),
            enabled: true,
        }
    }

    /// Append an action.
    #[must_use]
    pub fn with_action(mut self, action: RouteAction) -> Self {
        self.actions.push(action);
        self
    }

    /// Start disabled.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Check the rule is well formed.
    pub fn validate(&self) -> Result<(), RouteError> {
        if self.actions.is_empty() {
            return Err(RouteError::InvalidDefinition(format!(
                "route '{}' has no actions",
                self.name
            )));
        }
        self.matcher.validate()?;
        self.actions.iter().try_for_each(RouteAction::validate)
    }
}

/// Per-rule counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStats {
    /// Times the rule matched and ran.
    pub invocations: u64,
    /// Milliseconds since the Unix epoch of the last run.
    pub last_fired: Option<u64>,
    /// Failed actions across all runs.
    pub failures: u64,
    /// Most recent action failure.
    pub last_error: Option<String>,
}

/// A registered rule.
#[derive(Clone, Debug)]
pub struct RouteRule {
    pub id: RouteId,
    pub definition: RouteDefinition,
    pub stats: RouteStats,
}

impl RouteRule {
    #[must_use]
    pub fn new(id: RouteId, definition: RouteDefinition) -> Self {
        Self {
            id,
            definition,
            stats: RouteStats::default(),
        }
    }

    /// Read-only view for listings.
    #[must_use]
    pub fn snapshot(&self) -> RouteSnapshot {
        RouteSnapshot {
            id: self.id,
            name: self.definition.name.clone(),
            enabled: self.definition.enabled,
            matcher: self.definition.matcher.clone(),
            actions: self.definition.actions.clone(),
            stats: self.stats.clone(),
        }
    }
}

/// Listing entry returned by `list_routes`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RouteSnapshot {
    pub id: RouteId,
    pub name: String,
    pub enabled: bool,
    #[serde(rename = "match")]
    pub matcher: RouteMatch,
    pub actions: Vec<RouteAction>,
    pub stats: RouteStats,
}
