//! # Inspector Flows
//!
//! The debug layer watching a bus with routing attached:
//!
//! 1. **Tracing**: routed traffic appears in history in causal order
//! 2. **Replay**: "everything since id N" for late consumers
//! 3. **Snapshots**: export from one bus, import into another
//! 4. **Streams**: tap events consumed as a `Stream`
//! 5. **Export**: observed traffic reaches the Prometheus counters

#[cfg(test)]
mod tests {
    use pan_bus::{BusConfig, BusEvent, MessageBus, MessageId, PublishOptions};
    use pan_inspector::{import_json, BusSnapshot, Inspector, InspectorConfig, TraceEvent};
    use pan_routing::{BusRouter, RouteAction, RouteDefinition, RouteMatch, RoutingApi};
    use serde_json::json;
    use std::time::Duration;
    use tokio_stream::StreamExt;

    fn unlimited_bus() -> MessageBus {
        MessageBus::with_config(BusConfig::default().without_rate_limit()).unwrap()
    }

    #[test]
    fn test_routed_traffic_traced_in_order() {
        let bus = unlimited_bus();
        let mut inspector = Inspector::new(&bus, InspectorConfig::default().without_deliveries()).unwrap();
        let router = BusRouter::attach(&bus).unwrap();
        router
            .add_route(
                RouteDefinition::new("audit", RouteMatch::topic("user.*"))
                    .with_action(RouteAction::emit("audit.{{payload.name}}")),
            )
            .unwrap();

        bus.publish("user.login", json!({ "name": "ada" }), PublishOptions::default())
            .unwrap();
        inspector.drain();

        let published: Vec<String> = inspector
            .history()
            .into_iter()
            .filter_map(|record| match record.event {
                TraceEvent::Published { message } => Some(message.topic),
                _ => None,
            })
            .collect();
        assert_eq!(published, vec!["user.login", "audit.ada"]);

        let metrics = inspector.metrics();
        assert_eq!(metrics.published, 2);
        assert_eq!(metrics.topics.get("audit.ada"), Some(&1));
    }

    #[test]
    fn test_replay_since_last_seen_id() {
        let bus = unlimited_bus();
        let mut inspector = Inspector::new(&bus, InspectorConfig::default()).unwrap();

        let mut last_seen = MessageId(0);
        for n in 1..=3 {
            last_seen = bus
                .publish("feed", json!(n), PublishOptions::default())
                .unwrap()
                .message_id;
        }
        for n in 4..=6 {
            bus.publish("feed", json!(n), PublishOptions::default())
                .unwrap();
        }
        inspector.drain();

        let missed: Vec<_> = inspector
            .messages_since(last_seen)
            .into_iter()
            .map(|message| message.payload)
            .collect();
        assert_eq!(missed, vec![json!(4), json!(5), json!(6)]);
    }

    #[test]
    fn test_snapshot_round_trip_between_buses() {
        let source = unlimited_bus();
        let mut inspector = Inspector::new(&source, InspectorConfig::default()).unwrap();
        source
            .publish("device.1.state", json!({ "on": true }), PublishOptions::retained())
            .unwrap();
        source
            .publish("device.2.state", json!({ "on": false }), PublishOptions::retained())
            .unwrap();
        source
            .publish("device.1.ping", json!(1), PublishOptions::default())
            .unwrap();

        let exported = inspector.export_json().unwrap();
        let snapshot = BusSnapshot::from_json(&exported).unwrap();
        assert_eq!(snapshot.stats.total_messages, 3);
        assert_eq!(snapshot.retained.len(), 2);
        assert_eq!(snapshot.history.len(), 3);

        let target = unlimited_bus();
        assert_eq!(import_json(&target, &exported).unwrap(), 2);

        // Restored entries replay to new subscribers like any retained message
        let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = target
            .subscribe("device.*.state", move |message| {
                sink.lock().push(message.topic.clone());
                Ok(())
            })
            .unwrap();
        assert_eq!(*seen.lock(), vec!["device.1.state", "device.2.state"]);
    }

    #[test]
    fn test_observed_traffic_exported_to_prometheus() {
        let bus = unlimited_bus();
        let mut inspector = Inspector::new(&bus, InspectorConfig::default()).unwrap();
        let _sub = bus.subscribe("exportflow.*", |_| Ok(())).unwrap();

        let published = pan_telemetry::MESSAGES_PUBLISHED.with_label_values(&["exportflow"]);
        let published_before = published.get();
        let delivered_before = pan_telemetry::MESSAGES_DELIVERED.get();

        for n in 0..3 {
            bus.publish("exportflow.tick", json!(n), PublishOptions::default())
                .unwrap();
        }
        inspector.drain();

        assert_eq!(published.get(), published_before + 3);
        assert!(pan_telemetry::MESSAGES_DELIVERED.get() >= delivered_before + 3);

        let text = pan_telemetry::encode_metrics().unwrap();
        assert!(text.contains(&format!(
            "pan_bus_messages_published_total{{topic_root=\"exportflow\"}} {}",
            published_before + 3
        )));
        assert!(text.contains("pan_bus_messages_delivered_total"));
        assert!(text.contains("pan_bus_subscriptions"));
    }

    #[tokio::test]
    async fn test_tap_as_stream() {
        let bus = unlimited_bus();
        let mut events = bus.tap().into_stream();
        let _sub = bus.subscribe("s", |_| Ok(())).unwrap();

        bus.publish("s", json!(1), PublishOptions::default()).unwrap();

        let first = tokio::time::timeout(Duration::from_secs(1), events.next())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(first, BusEvent::Published { .. }));
        let second = tokio::time::timeout(Duration::from_secs(1), events.next())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(second, BusEvent::Delivered { replay: false, .. }));

        bus.shutdown();
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn test_inspector_task_follows_bus() {
        let bus = unlimited_bus();
        let mut inspector = Inspector::new(&bus, InspectorConfig::default()).unwrap();
        let view = inspector.view();
        let task = tokio::spawn(async move { inspector.run().await });

        let responder = bus.clone();
        let _svc = bus
            .subscribe("svc.echo", move |request| {
                responder.reply(request, request.payload.clone())?;
                Ok(())
            })
            .unwrap();
        let reply = bus
            .request("svc.echo", json!("hello"), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply, json!("hello"));

        tokio::time::sleep(Duration::from_millis(20)).await;
        bus.shutdown();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();

        // The request and its reply were both published
        assert_eq!(view.metrics().published, 2);
        assert_eq!(view.topic_history("svc.echo").len(), 2);
    }
}
