//! Bus Adapter for the routing engine
//!
//! Feeds every bus message into a [`RoutingEngine`] and publishes emitted
//! messages back onto the same bus.
//!
//! The engine holds only a weak reference to the bus, so an attached
//! router never keeps a shut-down bus alive.

use crate::ports::MessageSink;
use crate::service::RoutingEngine;
use pan_bus::{MessageBus, SubscriptionHandle, WeakMessageBus};
use pan_types::{BusError, PublishOptions, PublishReceipt, SubscriptionId, WILDCARD};
use serde_json::Value;
use std::ops::Deref;
use std::sync::Arc;
use tracing::info;

impl MessageSink for WeakMessageBus {
    fn publish(
        &self,
        topic: &str,
        payload: Value,
        options: PublishOptions,
    ) -> Result<PublishReceipt, BusError> {
        self.upgrade()
            .ok_or(BusError::Closed)?
            .publish(topic, payload, options)
    }
}

impl MessageSink for MessageBus {
    fn publish(
        &self,
        topic: &str,
        payload: Value,
        options: PublishOptions,
    ) -> Result<PublishReceipt, BusError> {
        MessageBus::publish(self, topic, payload, options)
    }
}

/// Routing engine publishing onto a bus.
pub type BusRoutingEngine = RoutingEngine<WeakMessageBus>;

/// A routing engine attached to a bus through a universal subscription.
///
/// The subscription skips retained replay, so stored messages are not
/// routed again; every live message from the moment the subscription is
/// registered is. Dropping the router removes its subscription.
pub struct BusRouter {
    engine: Arc<BusRoutingEngine>,
    subscription: SubscriptionHandle,
}

impl BusRouter {
    /// Attach a fresh engine to `bus`.
    pub fn attach(bus: &MessageBus) -> Result<Self, BusError> {
        Self::attach_engine(bus, Arc::new(RoutingEngine::new(bus.downgrade())))
    }

    /// Attach an existing engine to `bus`.
    pub fn attach_engine(bus: &MessageBus, engine: Arc<BusRoutingEngine>) -> Result<Self, BusError> {
        let handler_engine = engine.clone();
        let subscription = bus.subscribe_live(WILDCARD, move |message| {
            handler_engine.process(message);
            Ok(())
        })?;

        info!(
            subscription = %subscription.id(),
            routes = engine.rule_count(),
            "Router attached"
        );

        Ok(Self {
            engine,
            subscription,
        })
    }

    /// The attached engine.
    pub fn engine(&self) -> &Arc<BusRoutingEngine> {
        &self.engine
    }

    /// Id of the router's universal subscription.
    pub fn subscription_id(&self) -> SubscriptionId {
        self.subscription.id()
    }

    /// Stop routing. The engine and its rules remain usable.
    pub fn detach(mut self) -> Arc<BusRoutingEngine> {
        self.subscription.unsubscribe();
        info!("Router detached");
        self.engine.clone()
    }
}

impl Deref for BusRouter {
    type Target = BusRoutingEngine;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}
