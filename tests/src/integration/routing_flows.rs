//! # Routing Flows
//!
//! The routing engine attached to a live bus:
//!
//! 1. **Conditional emit**: a qualifying order raises exactly one alert
//! 2. **Declarative load**: JSON rules with templates and callbacks
//! 3. **Chains**: emitted messages are routed again
//! 4. **Loops**: a self-triggering rule is cut off without breaking the bus
//! 5. **Failures**: bus errors land in rule stats, not in the publisher

#[cfg(test)]
mod tests {
    use pan_bus::{BusConfig, BusConfigBuilder, HandlerResult, Message, MessageBus, PublishOptions};
    use pan_routing::{
        BusRouter, FieldOp, RouteAction, RouteDefinition, RouteMatch, RoutingApi, MAX_ROUTE_DEPTH,
    };
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::sync::Arc;

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    fn unlimited_bus() -> MessageBus {
        MessageBus::with_config(BusConfig::default().without_rate_limit()).unwrap()
    }

    fn collect(bus: &MessageBus, pattern: &str) -> (pan_bus::SubscriptionHandle, Arc<Mutex<Vec<Message>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handle = bus
            .subscribe(pattern, move |message| {
                sink.lock().push(message.clone());
                Ok(())
            })
            .unwrap();
        (handle, seen)
    }

    fn vip_rule() -> RouteDefinition {
        RouteDefinition::new(
            "vip-orders",
            RouteMatch::all(vec![
                RouteMatch::topic("order.created"),
                RouteMatch::field("payload.total", FieldOp::Gte, json!(1000)),
            ]),
        )
        .with_action(RouteAction::emit("alert.vip"))
    }

    // =========================================================================
    // CONDITIONAL EMIT
    // =========================================================================

    #[test]
    fn test_vip_order_raises_one_alert() {
        let bus = unlimited_bus();
        let router = BusRouter::attach(&bus).unwrap();
        let id = router.add_route(vip_rule()).unwrap();
        let (_alerts, alerts) = collect(&bus, "alert.vip");

        bus.publish("order.created", json!({ "total": 1500 }), PublishOptions::default())
            .unwrap();
        assert_eq!(alerts.lock().len(), 1);
        assert_eq!(alerts.lock()[0].payload, json!({ "total": 1500 }));

        bus.publish("order.created", json!({ "total": 999 }), PublishOptions::default())
            .unwrap();
        bus.publish("order.updated", json!({ "total": 5000 }), PublishOptions::default())
            .unwrap();
        assert_eq!(alerts.lock().len(), 1);

        let stats = router.get_route(id).unwrap().stats;
        assert_eq!(stats.invocations, 1);
        assert_eq!(stats.failures, 0);
    }

    #[test]
    fn test_disabled_rule_does_not_fire() {
        let bus = unlimited_bus();
        let router = BusRouter::attach(&bus).unwrap();
        let id = router.add_route(vip_rule().disabled()).unwrap();
        let (_alerts, alerts) = collect(&bus, "alert.vip");

        bus.publish("order.created", json!({ "total": 1500 }), PublishOptions::default())
            .unwrap();
        assert!(alerts.lock().is_empty());

        router.enable(id).unwrap();
        bus.publish("order.created", json!({ "total": 1500 }), PublishOptions::default())
            .unwrap();
        assert_eq!(alerts.lock().len(), 1);
    }

    // =========================================================================
    // DECLARATIVE LOAD
    // =========================================================================

    #[test]
    fn test_json_rules_with_templates_and_callbacks() {
        let bus = unlimited_bus();
        let router = BusRouter::attach(&bus).unwrap();

        let shipped: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = shipped.clone();
        router.register_callback(
            "ship",
            Arc::new(move |message: &Message| -> HandlerResult {
                sink.lock().push(message.payload["sku"].clone());
                Ok(())
            }),
        );

        router
            .load_routes(
                r#"[
                    {
                        "name": "notify-region",
                        "match": { "type": "any", "conditions": [
                            { "type": "field", "path": "payload.region", "op": "in", "value": ["eu", "us"] },
                            { "type": "field", "path": "payload.priority", "op": "exists" }
                        ]},
                        "actions": [
                            { "type": "emit",
                              "topic": "notify.{{payload.region}}",
                              "payload": { "sku": "{{payload.sku}}", "from": "{{topic}}" } },
                            { "type": "call", "callback": "ship" },
                            { "type": "log", "level": "info", "message": "routed {{payload.sku}}" }
                        ]
                    }
                ]"#,
            )
            .unwrap();
        let (_notify, notified) = collect(&bus, "notify.*");

        bus.publish(
            "order.paid",
            json!({ "region": "eu", "sku": 42 }),
            PublishOptions::default(),
        )
        .unwrap();
        bus.publish(
            "order.paid",
            json!({ "region": "apac", "sku": 7 }),
            PublishOptions::default(),
        )
        .unwrap();

        let notified = notified.lock();
        assert_eq!(notified.len(), 1);
        assert_eq!(notified[0].topic, "notify.eu");
        assert_eq!(notified[0].payload, json!({ "sku": 42, "from": "order.paid" }));
        assert_eq!(*shipped.lock(), vec![json!(42)]);
    }

    // =========================================================================
    // CHAINS & LOOPS
    // =========================================================================

    #[test]
    fn test_emitted_messages_are_routed() {
        let bus = unlimited_bus();
        let router = BusRouter::attach(&bus).unwrap();
        router
            .add_route(
                RouteDefinition::new("step-1", RouteMatch::topic("pipeline.start"))
                    .with_action(RouteAction::forward("pipeline.middle")),
            )
            .unwrap();
        router
            .add_route(
                RouteDefinition::new("step-2", RouteMatch::topic("pipeline.middle"))
                    .with_action(RouteAction::forward("pipeline.end")),
            )
            .unwrap();
        let (_end, ended) = collect(&bus, "pipeline.end");

        bus.publish("pipeline.start", json!("payload"), PublishOptions::default())
            .unwrap();

        assert_eq!(ended.lock().len(), 1);
        assert_eq!(ended.lock()[0].payload, json!("payload"));
    }

    #[test]
    fn test_route_loop_cut_off() {
        let bus = unlimited_bus();
        let router = BusRouter::attach(&bus).unwrap();
        router
            .add_route(
                RouteDefinition::new("echo", RouteMatch::topic("echo"))
                    .with_action(RouteAction::forward("echo")),
            )
            .unwrap();
        let (_echo, echoes) = collect(&bus, "echo");

        bus.publish("echo", json!(1), PublishOptions::default()).unwrap();

        assert_eq!(echoes.lock().len(), MAX_ROUTE_DEPTH + 1);
        assert_eq!(router.loops_stopped(), 1);

        // A fresh publish starts from depth zero again
        bus.publish("echo", json!(2), PublishOptions::default()).unwrap();
        assert_eq!(router.loops_stopped(), 2);
    }

    // =========================================================================
    // FAILURES
    // =========================================================================

    #[test]
    fn test_rate_limited_emit_recorded_in_stats() {
        let config = BusConfigBuilder::new().rate_limit(2, 60_000).build().unwrap();
        let bus = MessageBus::with_config(config).unwrap();
        let router = BusRouter::attach(&bus).unwrap();
        let id = router
            .add_route(
                RouteDefinition::new("copy", RouteMatch::topic("in"))
                    .with_action(RouteAction::forward("out")),
            )
            .unwrap();

        // Emits inherit the triggering source, so they share its budget
        let options = PublishOptions::default().from_source("feeder");
        bus.publish("in", json!(1), options.clone()).unwrap();

        let stats = router.get_route(id).unwrap().stats;
        assert_eq!(stats.invocations, 1);
        assert_eq!(stats.failures, 0);

        bus.publish("in", json!(2), options).unwrap_err();
        let stats = router.get_route(id).unwrap().stats;
        assert_eq!(stats.invocations, 1);
    }

    #[test]
    fn test_emit_failure_does_not_fail_publisher() {
        let bus = unlimited_bus();
        let router = BusRouter::attach(&bus).unwrap();
        let id = router
            .add_route(
                RouteDefinition::new("bad-topic", RouteMatch::Always)
                    .with_action(RouteAction::emit("out.{{payload.missing}}")),
            )
            .unwrap();

        let receipt = bus
            .publish("in", json!({}), PublishOptions::default())
            .unwrap();
        assert_eq!(receipt.failed, 0);

        let stats = router.get_route(id).unwrap().stats;
        assert_eq!(stats.failures, 1);
        assert!(stats.last_error.is_some());
    }
}
