//! Routing Engine
//!
//! Evaluates every enabled rule against each message, in registration
//! order, and runs the actions of every rule that matches.
//!
//! Actions run synchronously. A failing action is recorded in its rule's
//! statistics and never stops the remaining actions or rules. Emitted
//! messages may trigger rules again; nesting deeper than
//! [`MAX_ROUTE_DEPTH`] on one thread is cut off with a warning.

use crate::domain::{
    render_str, render_value, LogLevel, RouteAction, RouteDefinition, RouteId, RouteRule,
    RouteSnapshot,
};
use crate::error::RouteError;
use crate::ports::{MessageSink, RouteCallback, RoutingApi};
use pan_types::{current_timestamp_ms, Message, PublishOptions};
use parking_lot::RwLock;
use std::cell::Cell;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info, trace, warn};

/// Maximum nesting of route processing on one thread.
pub const MAX_ROUTE_DEPTH: usize = 8;

thread_local! {
    static ROUTE_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Tracks nesting of `process` calls on the current thread.
struct DepthGuard;

impl DepthGuard {
    fn enter() -> Option<Self> {
        ROUTE_DEPTH.with(|depth| {
            let current = depth.get();
            if current >= MAX_ROUTE_DEPTH {
                return None;
            }
            depth.set(current + 1);
            Some(Self)
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        ROUTE_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

#[derive(Default)]
struct RoutingState {
    rules: Vec<RouteRule>,
    next_id: u64,
}

/// Routing engine implementation
///
/// Implements the `RoutingApi` port and publishes through a `MessageSink`.
pub struct RoutingEngine<S: MessageSink> {
    sink: S,
    state: RwLock<RoutingState>,
    callbacks: RwLock<HashMap<String, RouteCallback>>,
    loops_stopped: AtomicU64,
}

impl<S: MessageSink> RoutingEngine<S> {
    /// Create an engine with no rules.
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            state: RwLock::new(RoutingState::default()),
            callbacks: RwLock::new(HashMap::new()),
            loops_stopped: AtomicU64::new(0),
        }
    }

    /// The sink emitted messages are published to.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Number of registered rules.
    pub fn rule_count(&self) -> usize {
        self.state.read().rules.len()
    }

    /// Times processing was cut off at [`MAX_ROUTE_DEPTH`].
    pub fn loops_stopped(&self) -> u64 {
        self.loops_stopped.load(Ordering::Relaxed)
    }

    /// Run every matching rule for `message`. Returns the number of rules fired.
    pub fn process(&self, message: &Message) -> usize {
        let Some(_depth) = DepthGuard::enter() else {
            self.loops_stopped.fetch_add(1, Ordering::Relaxed);
            warn!(
                topic = %message.topic,
                message_id = %message.id,
                max_depth = MAX_ROUTE_DEPTH,
                "Route loop stopped"
            );
            return 0;
        };

        // Lock released before actions run; they may re-enter through the bus
        let fired: Vec<(RouteId, Vec<RouteAction>)> = {
            let state = self.state.read();
            state
                .rules
                .iter()
                .filter(|rule| rule.definition.enabled && rule.definition.matcher.evaluate(message))
                .map(|rule| (rule.id, rule.definition.actions.clone()))
                .collect()
        };

        for (id, actions) in &fired {
            debug!(route = %id, topic = %message.topic, "Route fired");

            let mut failures = 0;
            let mut last_error = None;
            for action in actions {
                if let Err(err) = self.execute(action, message) {
                    warn!(
                        route = %id,
                        action = action.kind(),
                        error = %err,
                        "Route action failed"
                    );
                    failures += 1;
                    last_error = Some(err.to_string());
                }
            }
            self.record(*id, failures, last_error);
        }

        fired.len()
    }

    fn execute(&self, action: &RouteAction, message: &Message) -> Result<(), RouteError> {
        match action {
            RouteAction::Emit {
                topic,
                payload,
                retain,
            } => {
                let topic = render_str(topic, message)?;
                let payload = match payload {
                    Some(template) => render_value(template, message)?,
                    None => message.payload.clone(),
                };
                self.sink
                    .publish(&topic, payload, Self::options_for(message, *retain))?;
                Ok(())
            }
            RouteAction::Forward { topic, retain } => {
                let topic = render_str(topic, message)?;
                self.sink.publish(
                    &topic,
                    message.payload.clone(),
                    Self::options_for(message, *retain),
                )?;
                Ok(())
            }
            RouteAction::Log {
                level,
                message: template,
            } => {
                let text = render_str(template, message)?;
                log_at(*level, message, &text);
                Ok(())
            }
            RouteAction::Call { callback } => {
                let function = self
                    .callbacks
                    .read()
                    .get(callback)
                    .cloned()
                    .ok_or_else(|| RouteError::UnknownCallback(callback.clone()))?;

                match panic::catch_unwind(AssertUnwindSafe(|| function(message))) {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(err)) => Err(RouteError::Callback {
                        name: callback.clone(),
                        reason: err.to_string(),
                    }),
                    Err(_) => Err(RouteError::Callback {
                        name: callback.clone(),
                        reason: "callback panicked".to_string(),
                    }),
                }
            }
        }
    }

    /// Emitted messages keep the triggering publisher as their source.
    fn options_for(message: &Message, retain: bool) -> PublishOptions {
        let options = PublishOptions::default().with_retain(retain);
        match &message.source {
            Some(source) => options.from_source(source.clone()),
            None => options,
        }
    }

    fn record(&self, id: RouteId, failures: u64, last_error: Option<String>) {
        let mut state = self.state.write();
        // The rule may have been removed by one of its own actions
        let Some(rule) = state.rules.iter_mut().find(|rule| rule.id == id) else {
            return;
        };
        rule.stats.invocations += 1;
        rule.stats.last_fired = Some(current_timestamp_ms());
        rule.stats.failures += failures;
        if last_error.is_some() {
            rule.stats.last_error = last_error;
        }
    }

    fn set_enabled(&self, id: RouteId, enabled: bool) -> Result<(), RouteError> {
        let mut state = self.state.write();
        let rule = state
            .rules
            .iter_mut()
            .find(|rule| rule.id == id)
            .ok_or(RouteError::NotFound(id))?;
        rule.definition.enabled = enabled;
        debug!(route = %id, enabled = enabled, "Route toggled");
        Ok(())
    }
}

fn log_at(level: LogLevel, message: &Message, text: &str) {
    match level {
        LogLevel::Trace => trace!(topic = %message.topic, message_id = %message.id, "{}", text),
        LogLevel::Debug => debug!(topic = %message.topic, message_id = %message.id, "{}", text),
        LogLevel::Info => info!(topic = %message.topic, message_id = %message.id, "{}", text),
        LogLevel::Warn => warn!(topic = %message.topic, message_id = %message.id, "{}", text),
        LogLevel::Error => error!(topic = %message.topic, message_id = %message.id, "{}", text),
    }
}

impl<S: MessageSink> RoutingApi for RoutingEngine<S> {
    fn add_route(&self, definition: RouteDefinition) -> Result<RouteId, RouteError> {
        definition.validate()?;

        let mut state = self.state.write();
        state.next_id += 1;
        let id = RouteId(state.next_id);
        info!(route = %id, name = %definition.name, "Route added");
        state.rules.push(RouteRule::new(id, definition));
        Ok(id)
    }

    fn remove_route(&self, id: RouteId) -> bool {
        let mut state = self.state.write();
        let before = state.rules.len();
        state.rules.retain(|rule| rule.id != id);
        let removed = state.rules.len() != before;
        if removed {
            info!(route = %id, "Route removed");
        }
        removed
    }

    fn list_routes(&self) -> Vec<RouteSnapshot> {
        self.state.read().rules.iter().map(RouteRule::snapshot).collect()
    }

    fn get_route(&self, id: RouteId) -> Option<RouteSnapshot> {
        self.state
            .read()
            .rules
            .iter()
            .find(|rule| rule.id == id)
            .map(RouteRule::snapshot)
    }

    fn enable(&self, id: RouteId) -> Result<(), RouteError> {
        self.set_enabled(id, true)
    }

    fn disable(&self, id: RouteId) -> Result<(), RouteError> {
        self.set_enabled(id, false)
    }

    fn register_callback(&self, name: &str, callback: RouteCallback) {
        self.callbacks.write().insert(name.to_string(), callback);
        debug!(callback = name, "Route callback registered");
    }

    fn load_routes(&self, json: &str) -> Result<Vec<RouteId>, RouteError> {
        let definitions: Vec<RouteDefinition> = serde_json::from_str(json)
            .map_err(|e| RouteError::InvalidDefinition(e.to_string()))?;
        definitions.iter().try_for_each(RouteDefinition::validate)?;
        definitions
            .into_iter()
            .map(|definition| self.add_route(definition))
            .collect()
    }
}
