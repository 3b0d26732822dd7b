//! # Message Bus
//!
//! The in-process topic bus: publish, subscribe with retained replay,
//! request/reply and statistics.
//!
//! ## Delivery
//!
//! `publish` validates, assigns an id, updates the retained store and looks
//! up matching subscriptions while holding the bus lock. The lock is released
//! before any handler runs, so handlers may publish, subscribe or reply
//! re-entrantly. Handlers run synchronously on the publisher's thread in
//! subscription order; a failing or panicking handler is reported and
//! delivery continues with the next one.
//!
//! ```text
//! publish ──► validate ──► rate limit ──► retained store
//!                                             │
//!                          registry lookup ◄──┘
//!                                │
//!              handler 1 ──► handler 2 ──► ... (lock released)
//! ```
//!
//! ## Retained replay
//!
//! A new subscription sees its retained replay before any live message.
//! While the replay runs, live messages matching it are queued under the bus
//! lock instead of being delivered, then handed over in id order once the
//! replay is done. Publishes never wait on another subscriber's replay; a
//! queued message counts as delivered in the publisher's receipt.

use crate::config::{BusConfig, ConfigError};
use crate::pending::PendingRequestStore;
use crate::rate_limiter::{RateLimiter, ANONYMOUS_PUBLISHER};
use crate::registry::{Handler, Registration, SubscriptionRegistry};
use crate::retained::RetainedStore;
use crate::stats::{BusStats, StatsTracker};
use crate::tap::{BusEvent, Tap};
use crate::topic;
use async_trait::async_trait;
use pan_types::{
    BusError, CorrelationId, HandlerError, HandlerFailure, HandlerResult, Message, MessageId,
    PublishOptions, PublishReceipt, SubscriptionId, REPLY_NAMESPACE,
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Out-of-band receiver of handler failures.
pub type ErrorHook = Arc<dyn Fn(&HandlerFailure) + Send + Sync>;

/// Trait for publishing onto a bus.
///
/// Lets layers above the bus accept any publisher, including test doubles.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Publish a message.
    fn publish(
        &self,
        topic: &str,
        payload: Value,
        options: PublishOptions,
    ) -> Result<PublishReceipt, BusError>;

    /// Send a request and wait for the first reply payload.
    async fn request(
        &self,
        topic: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, BusError>;

    /// Total messages accepted so far.
    fn messages_published(&self) -> u64;
}

/// State serialized behind the bus lock.
struct BusState {
    registry: SubscriptionRegistry,
    retained: RetainedStore,
    rate_limiter: Option<RateLimiter>,
    stats: StatsTracker,
    last_message_id: u64,
    /// Live messages held back from subscriptions still replaying.
    replaying: HashMap<SubscriptionId, Vec<Arc<Message>>>,
}

struct BusInner {
    config: BusConfig,
    state: Mutex<BusState>,
    pending: Arc<PendingRequestStore>,
    /// `None` once the bus is shut down.
    taps: RwLock<Option<broadcast::Sender<BusEvent>>>,
    error_hook: RwLock<Option<ErrorHook>>,
    closed: AtomicBool,
    handler_errors: AtomicU64,
    rejected: AtomicU64,
}

/// Handle to an in-process message bus.
///
/// Cloning is cheap and every clone refers to the same bus.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

/// Non-owning reference to a `MessageBus`.
#[derive(Clone)]
pub struct WeakMessageBus {
    inner: Weak<BusInner>,
}

impl WeakMessageBus {
    /// Get the bus if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<MessageBus> {
        self.inner.upgrade().map(|inner| MessageBus { inner })
    }
}

impl fmt::Debug for WeakMessageBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakMessageBus")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

/// Keeps a subscription alive.
///
/// Dropping the handle unsubscribes. Use [`SubscriptionHandle::detach`] to
/// keep the subscription for the lifetime of the bus.
#[must_use = "dropping a SubscriptionHandle unsubscribes immediately"]
pub struct SubscriptionHandle {
    bus: WeakMessageBus,
    id: SubscriptionId,
    active: bool,
}

impl SubscriptionHandle {
    fn new(bus: WeakMessageBus, id: SubscriptionId) -> Self {
        Self {
            bus,
            id,
            active: true,
        }
    }

    /// Subscription id.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns true until `unsubscribe` or `detach` is called.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Remove the subscription. Safe to call more than once.
    ///
    /// Returns true if this call removed it.
    pub fn unsubscribe(&mut self) -> bool {
        if !std::mem::replace(&mut self.active, false) {
            return false;
        }
        self.bus
            .upgrade()
            .is_some_and(|bus| bus.unsubscribe(self.id))
    }

    /// Keep the subscription without a handle and return its id.
    pub fn detach(mut self) -> SubscriptionId {
        self.active = false;
        self.id
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

/// Cancels the pending entry if the request future is dropped early.
struct PendingGuard<'a> {
    pending: &'a PendingRequestStore,
    correlation_id: CorrelationId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.cancel(&self.correlation_id);
    }
}

/// Counts serialized bytes without allocating.
struct ByteCounter(usize);

impl io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn payload_size(payload: &Value) -> Result<usize, BusError> {
    let mut counter = ByteCounter(0);
    serde_json::to_writer(&mut counter, payload)
        .map_err(|e| BusError::Serialization(e.to_string()))?;
    Ok(counter.0)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn timeout_millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

fn invoke(handler: &Handler, message: &Message) -> HandlerResult {
    match panic::catch_unwind(AssertUnwindSafe(|| handler(message))) {
        Ok(result) => result,
        Err(payload) => Err(HandlerError::Panicked(panic_message(payload.as_ref()))),
    }
}

impl MessageBus {
    /// Create a bus with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::build(BusConfig::default())
    }

    /// Create a bus with a validated configuration.
    pub fn with_config(config: BusConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: BusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.tap_capacity.max(1));
        let state = BusState {
            registry: SubscriptionRegistry::new(),
            retained: RetainedStore::new(config.retained_capacity),
            rate_limiter: config.rate_limit.map(RateLimiter::new),
            stats: StatsTracker::new(),
            last_message_id: 0,
            replaying: HashMap::new(),
        };

        Self {
            inner: Arc::new(BusInner {
                config,
                state: Mutex::new(state),
                pending: Arc::new(PendingRequestStore::new()),
                taps: RwLock::new(Some(sender)),
                error_hook: RwLock::new(None),
                closed: AtomicBool::new(false),
                handler_errors: AtomicU64::new(0),
                rejected: AtomicU64::new(0),
            }),
        }
    }

    /// Create a non-owning reference.
    #[must_use]
    pub fn downgrade(&self) -> WeakMessageBus {
        WeakMessageBus {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    /// Returns true after `shutdown`.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Publish a message and deliver it to every matching subscription.
    ///
    /// # Errors
    ///
    /// - `Closed` after shutdown
    /// - `InvalidTopic` for empty, malformed or wildcard topics
    /// - `PayloadTooLarge` when the serialized payload exceeds the limit
    /// - `RateLimited` when the publisher has no tokens left
    ///
    /// Handler failures never fail the publish; they are counted in the
    /// returned receipt and reported through the error hook.
    pub fn publish(
        &self,
        topic: &str,
        payload: Value,
        options: PublishOptions,
    ) -> Result<PublishReceipt, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        if let Err(err) = topic::validate_topic(topic) {
            return Err(self.reject(topic, err));
        }

        let size = payload_size(&payload)?;
        let max = self.inner.config.max_payload_bytes;
        if size > max {
            return Err(self.reject(topic, BusError::PayloadTooLarge { size, max }));
        }

        let (message, registrations, queued) = {
            let mut state = self.inner.state.lock();
            if self.is_closed() {
                return Err(BusError::Closed);
            }

            let publisher = options.source.as_deref().unwrap_or(ANONYMOUS_PUBLISHER);
            let limited = state
                .rate_limiter
                .as_mut()
                .is_some_and(|limiter| !limiter.try_acquire(publisher));
            if limited {
                drop(state);
                return Err(self.reject(
                    topic,
                    BusError::RateLimited {
                        publisher: publisher.to_string(),
                    },
                ));
            }

            state.last_message_id += 1;
            let message = Arc::new(Message::new(
                MessageId(state.last_message_id),
                topic,
                payload,
                &options,
            ));

            if message.retained {
                if message.is_clear_marker() {
                    if state.retained.remove(topic).is_some() {
                        debug!(topic = topic, "Retained message cleared");
                    }
                } else if let Some(evicted) = state.retained.put(topic, message.clone()) {
                    warn!(evicted = %evicted, topic = topic, "Retained store full, evicted least recently used topic");
                }
            }

            state.stats.record_publish(topic);
            let mut registrations = state.registry.find_matching(topic);
            let mut queued = 0;
            if !state.replaying.is_empty() {
                let replaying = &mut state.replaying;
                registrations.retain(|registration| match replaying.get_mut(&registration.id) {
                    Some(queue) => {
                        queue.push(message.clone());
                        queued += 1;
                        false
                    }
                    None => true,
                });
            }
            (message, registrations, queued)
        };

        debug!(
            message_id = %message.id,
            topic = topic,
            retained = message.retained,
            subscribers = registrations.len(),
            queued = queued,
            "Message published"
        );

        self.emit(|| BusEvent::Published {
            message: message.clone(),
        });
        let (delivered, failed) = self.deliver(&message, &registrations, false);

        Ok(PublishReceipt {
            message_id: message.id,
            delivered: delivered + queued,
            failed,
        })
    }

    /// Publish any serializable payload.
    pub fn publish_json<T: Serialize + ?Sized>(
        &self,
        topic: &str,
        payload: &T,
        options: PublishOptions,
    ) -> Result<PublishReceipt, BusError> {
        let value =
            serde_json::to_value(payload).map_err(|e| BusError::Serialization(e.to_string()))?;
        self.publish(topic, value, options)
    }

    /// Subscribe `handler` to every topic matching `pattern`.
    ///
    /// Retained messages matching the pattern are replayed to this handler
    /// only, in publish order, before `subscribe` returns. Live messages
    /// published meanwhile reach the handler after the replay.
    pub fn subscribe<F>(&self, pattern: &str, handler: F) -> Result<SubscriptionHandle, BusError>
    where
        F: Fn(&Message) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(pattern, Arc::new(handler), true)
    }

    /// Subscribe `handler` to live traffic only, skipping retained replay.
    pub fn subscribe_live<F>(
        &self,
        pattern: &str,
        handler: F,
    ) -> Result<SubscriptionHandle, BusError>
    where
        F: Fn(&Message) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(pattern, Arc::new(handler), false)
    }

    fn register(
        &self,
        pattern: &str,
        handler: Handler,
        replay_retained: bool,
    ) -> Result<SubscriptionHandle, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        topic::validate_pattern(pattern)?;

        let (id, replay) = {
            let mut state = self.inner.state.lock();
            if self.is_closed() {
                return Err(BusError::Closed);
            }
            let id = state.registry.add(pattern, handler.clone());
            let replay = if replay_retained {
                state.retained.matching(pattern)
            } else {
                Vec::new()
            };
            if !replay.is_empty() {
                state.replaying.insert(id, Vec::new());
            }
            (id, replay)
        };

        debug!(
            subscription = %id,
            pattern = pattern,
            replayed = replay.len(),
            "Subscription added"
        );

        if !replay.is_empty() {
            let registration = Registration {
                id,
                pattern: pattern.to_string(),
                handler,
            };
            for message in &replay {
                self.deliver(message, std::slice::from_ref(&registration), true);
            }
            self.finish_replay(&registration);
        }

        Ok(SubscriptionHandle::new(self.downgrade(), id))
    }

    /// Hand queued live messages to a subscription whose replay is done.
    ///
    /// The queue is only dropped once it is observed empty under the lock, so
    /// later publishes go straight to the handler.
    fn finish_replay(&self, registration: &Registration) {
        let id = registration.id;
        loop {
            let queued = {
                let mut state = self.inner.state.lock();
                let queued = state
                    .replaying
                    .get_mut(&id)
                    .map(std::mem::take)
                    .unwrap_or_default();
                if queued.is_empty() {
                    state.replaying.remove(&id);
                    return;
                }
                queued
            };
            debug!(
                subscription = %id,
                queued = queued.len(),
                "Delivering messages held during replay"
            );
            for message in &queued {
                self.deliver(message, std::slice::from_ref(registration), false);
            }
        }
    }

    /// Remove a subscription by id. Unknown ids are a no-op.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = {
            let mut state = self.inner.state.lock();
            state.replaying.remove(&id);
            state.registry.remove(id)
        };
        if removed {
            debug!(subscription = %id, "Subscription removed");
        }
        removed
    }

    /// Send a request and wait for the first reply payload.
    pub async fn request(
        &self,
        topic: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, BusError> {
        let reply = self
            .request_message(topic, payload, PublishOptions::default(), timeout)
            .await?;
        Ok(Arc::try_unwrap(reply).map_or_else(|shared| shared.payload.clone(), |m| m.payload))
    }

    /// Send a request and wait for the whole reply message.
    ///
    /// A private subscription on `$reply.<correlation>` collects the reply.
    /// It is removed when the request resolves, times out or is dropped.
    pub async fn request_message(
        &self,
        topic: &str,
        payload: Value,
        options: PublishOptions,
        timeout: Duration,
    ) -> Result<Arc<Message>, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }

        let (correlation_id, receiver) = self.inner.pending.register(topic, timeout);
        let _guard = PendingGuard {
            pending: &self.inner.pending,
            correlation_id,
        };

        let reply_topic = format!("{REPLY_NAMESPACE}.{}", correlation_id.simple());
        let pending = Arc::clone(&self.inner.pending);
        let _reply_subscription = self.subscribe(&reply_topic, move |reply: &Message| {
            pending.complete(correlation_id, Arc::new(reply.clone()));
            Ok(())
        })?;

        let options = options
            .with_correlation(correlation_id)
            .with_reply_to(reply_topic);
        self.publish(topic, payload, options)?;

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(BusError::Closed),
            Err(_) => {
                self.inner.pending.expire(&correlation_id);
                Err(BusError::RequestTimeout {
                    topic: topic.to_string(),
                    timeout_ms: timeout_millis(timeout),
                })
            }
        }
    }

    /// Publish `payload` as the reply to `request`.
    pub fn reply(&self, request: &Message, payload: Value) -> Result<PublishReceipt, BusError> {
        let reply_to = request.reply_to.as_deref().ok_or(BusError::MissingReplyTo)?;
        let mut options = PublishOptions::default();
        if let Some(correlation_id) = request.correlation_id {
            options = options.with_correlation(correlation_id);
        }
        self.publish(reply_to, payload, options)
    }

    /// Snapshot of bus activity.
    #[must_use]
    pub fn stats(&self) -> BusStats {
        let mut state = self.inner.state.lock();
        BusStats {
            total_messages: state.stats.total_messages(),
            messages_per_second: state.stats.messages_per_second(),
            top_topics: state.stats.top_topics(self.inner.config.top_topics),
            subscriptions: state.registry.len(),
            retained: state.retained.len(),
            pending_requests: self.inner.pending.pending_count(),
            handler_errors: self.inner.handler_errors.load(Ordering::Relaxed),
            rejected: self.inner.rejected.load(Ordering::Relaxed),
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.state.lock().registry.len()
    }

    /// Live patterns with their subscription counts.
    #[must_use]
    pub fn patterns(&self) -> Vec<(String, usize)> {
        self.inner.state.lock().registry.patterns()
    }

    /// Retained message for `topic`, marking it recently used.
    #[must_use]
    pub fn retained(&self, topic: &str) -> Option<Arc<Message>> {
        self.inner.state.lock().retained.get(topic)
    }

    /// All retained messages in publish order.
    #[must_use]
    pub fn retained_messages(&self) -> Vec<Arc<Message>> {
        self.inner.state.lock().retained.entries()
    }

    /// Load retained messages without delivering them.
    ///
    /// Messages get fresh ids in their original order. Invalid topics, clear
    /// markers and oversized payloads are skipped. Returns the number loaded.
    pub fn restore_retained<I>(&self, messages: I) -> usize
    where
        I: IntoIterator<Item = Message>,
    {
        let mut messages: Vec<Message> = messages.into_iter().collect();
        messages.sort_by_key(|m| m.id);

        let max = self.inner.config.max_payload_bytes;
        let mut state = self.inner.state.lock();
        if self.is_closed() {
            return 0;
        }

        let mut restored = 0;
        for mut message in messages {
            if topic::validate_topic(&message.topic).is_err() || message.is_clear_marker() {
                debug!(topic = %message.topic, "Skipping unrestorable retained message");
                continue;
            }
            if payload_size(&message.payload).map_or(true, |size| size > max) {
                debug!(topic = %message.topic, "Skipping oversized retained message");
                continue;
            }

            state.last_message_id += 1;
            message.id = MessageId(state.last_message_id);
            message.retained = true;
            let topic = message.topic.clone();
            state.retained.put(&topic, Arc::new(message));
            restored += 1;
        }

        info!(restored = restored, "Retained messages restored");
        restored
    }

    /// Install the handler-failure hook, replacing any previous one.
    pub fn on_handler_error<F>(&self, hook: F)
    where
        F: Fn(&HandlerFailure) + Send + Sync + 'static,
    {
        *self.inner.error_hook.write() = Some(Arc::new(hook));
    }

    /// Open a new observation tap.
    #[must_use]
    pub fn tap(&self) -> Tap {
        match self.inner.taps.read().as_ref() {
            Some(sender) => Tap::new(sender.subscribe()),
            None => Tap::closed(),
        }
    }

    /// Remove every subscription, clear retained messages and rate-limit
    /// state, fail pending requests and close all taps. Idempotent.
    pub fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let (subscriptions, retained) = {
            let mut state = self.inner.state.lock();
            let counts = (state.registry.len(), state.retained.len());
            state.registry.clear();
            state.retained.clear();
            state.replaying.clear();
            if let Some(limiter) = state.rate_limiter.as_mut() {
                limiter.reset();
            }
            counts
        };
        let pending = self.inner.pending.cancel_all();
        self.inner.taps.write().take();

        info!(
            subscriptions = subscriptions,
            retained = retained,
            pending_requests = pending,
            "Message bus shut down"
        );
    }

    fn deliver(
        &self,
        message: &Message,
        registrations: &[Registration],
        replay: bool,
    ) -> (usize, usize) {
        let mut delivered = 0;
        let mut failed = 0;

        for registration in registrations {
            match invoke(&registration.handler, message) {
                Ok(()) => {
                    delivered += 1;
                    self.emit(|| BusEvent::Delivered {
                        message_id: message.id,
                        topic: message.topic.clone(),
                        subscription: registration.id,
                        replay,
                    });
                }
                Err(error) => {
                    failed += 1;
                    self.report_failure(HandlerFailure {
                        subscription: registration.id,
                        topic: message.topic.clone(),
                        message_id: message.id,
                        error,
                    });
                }
            }
        }

        (delivered, failed)
    }

    fn report_failure(&self, failure: HandlerFailure) {
        self.inner.handler_errors.fetch_add(1, Ordering::Relaxed);
        error!(
            subscription = %failure.subscription,
            topic = %failure.topic,
            message_id = %failure.message_id,
            error = %failure.error,
            "Subscription handler failed"
        );

        let hook = self.inner.error_hook.read().clone();
        if let Some(hook) = hook {
            hook(&failure);
        }
        self.emit(|| BusEvent::HandlerFailed { failure });
    }

    fn reject(&self, topic: &str, reason: BusError) -> BusError {
        self.inner.rejected.fetch_add(1, Ordering::Relaxed);
        warn!(topic = topic, reason = %reason, "Publish rejected");
        self.emit(|| BusEvent::Rejected {
            topic: topic.to_string(),
            reason: reason.clone(),
        });
        reason
    }

    fn emit(&self, event: impl FnOnce() -> BusEvent) {
        let taps = self.inner.taps.read();
        if let Some(sender) = taps.as_ref() {
            if sender.receiver_count() > 0 {
                // Err only means every tap was dropped meanwhile
                let _ = sender.send(event());
            }
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBus")
            .field("closed", &self.is_closed())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MessagePublisher for MessageBus {
    fn publish(
        &self,
        topic: &str,
        payload: Value,
        options: PublishOptions,
    ) -> Result<PublishReceipt, BusError> {
        MessageBus::publish(self, topic, payload, options)
    }

    async fn request(
        &self,
        topic: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, BusError> {
        MessageBus::request(self, topic, payload, timeout).await
    }

    fn messages_published(&self) -> u64 {
        self.inner.state.lock().stats.total_messages()
    }
}
