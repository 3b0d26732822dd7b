//! # Bus Guarantees
//!
//! End-to-end checks of the message bus contract:
//!
//! 1. **Wildcards**: single-segment `*`, universal `*`, malformed patterns rejected
//! 2. **Retained replay**: delivered before `subscribe` returns
//! 3. **Isolation**: a failing or panicking handler never affects the others
//! 4. **Ordering**: per-publisher order is preserved
//! 5. **Eviction**: least recently used retained topic goes first
//! 6. **Request/reply**: replies resolve, timeouts leave nothing behind
//! 7. **Rate limiting**: the publish after the limit is rejected
//! 8. **Observation**: taps see one `Published` and one `Delivered` per subscriber
//! 9. **Teardown**: shutdown leaves no subscriptions and no retained entries

#[cfg(test)]
mod tests {
    use pan_bus::{
        BusConfig, BusConfigBuilder, BusError, BusEvent, HandlerError, Message, MessageBus,
        PublishOptions,
    };
    use pan_types::REPLY_NAMESPACE;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    fn unlimited_bus() -> MessageBus {
        MessageBus::with_config(BusConfig::default().without_rate_limit()).unwrap()
    }

    type Seen = Arc<Mutex<Vec<(String, Value)>>>;

    /// Subscribe a handler that records topic and payload.
    fn recorder(bus: &MessageBus, pattern: &str) -> (pan_bus::SubscriptionHandle, Seen) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handle = bus
            .subscribe(pattern, move |message: &Message| {
                sink.lock()
                    .push((message.topic.clone(), message.payload.clone()));
                Ok(())
            })
            .unwrap();
        (handle, seen)
    }

    fn topics(seen: &Seen) -> Vec<String> {
        seen.lock().iter().map(|(topic, _)| topic.clone()).collect()
    }

    // =========================================================================
    // WILDCARDS
    // =========================================================================

    #[test]
    fn test_single_segment_wildcard() {
        let bus = unlimited_bus();
        let (_middle, middle) = recorder(&bus, "a.*.c");
        let (_tail, tail) = recorder(&bus, "a.*");

        for topic in ["a.b.c", "a.b.b.c", "a.b", "a.x.c"] {
            bus.publish(topic, json!(null), PublishOptions::default())
                .unwrap();
        }

        assert_eq!(topics(&middle), vec!["a.b.c", "a.x.c"]);
        assert_eq!(topics(&tail), vec!["a.b"]);
    }

    #[test]
    fn test_universal_pattern_sees_everything() {
        let bus = unlimited_bus();
        let (_all, all) = recorder(&bus, "*");

        bus.publish("x", json!(1), PublishOptions::default()).unwrap();
        bus.publish("x.y.z", json!(2), PublishOptions::default())
            .unwrap();

        assert_eq!(topics(&all), vec!["x", "x.y.z"]);
    }

    #[test]
    fn test_malformed_patterns_rejected() {
        let bus = unlimited_bus();
        for pattern in ["a.**", "", "a..b", "a*"] {
            let result = bus.subscribe(pattern, |_| Ok(()));
            assert!(
                matches!(result, Err(BusError::InvalidPattern { .. })),
                "pattern {pattern:?} should be rejected"
            );
        }
        assert_eq!(bus.subscription_count(), 0);
    }

    // =========================================================================
    // RETAINED REPLAY
    // =========================================================================

    #[test]
    fn test_retained_replay_before_subscribe_returns() {
        let bus = unlimited_bus();
        bus.publish("x.y", json!({ "v": 1 }), PublishOptions::retained())
            .unwrap();

        let (_sub, seen) = recorder(&bus, "x.y");

        assert_eq!(*seen.lock(), vec![("x.y".to_string(), json!({ "v": 1 }))]);
    }

    #[test]
    fn test_retained_clear_removes_entry() {
        let bus = unlimited_bus();
        bus.publish("x.y", json!({ "v": 1 }), PublishOptions::retained())
            .unwrap();
        bus.publish("x.y", json!(null), PublishOptions::retained())
            .unwrap();

        let (_sub, seen) = recorder(&bus, "x.*");
        assert!(seen.lock().is_empty());
        assert!(bus.retained("x.y").is_none());
    }

    // =========================================================================
    // ISOLATION & ORDERING
    // =========================================================================

    #[test]
    fn test_failing_handlers_are_isolated() {
        let bus = unlimited_bus();
        let hooked = Arc::new(AtomicUsize::new(0));
        let hook_count = hooked.clone();
        bus.on_handler_error(move |_| {
            hook_count.fetch_add(1, Ordering::SeqCst);
        });

        let _err = bus
            .subscribe("t", |_| Err(HandlerError::from("first fails")))
            .unwrap();
        let _panics = bus.subscribe("t", |_| panic!("second panics")).unwrap();
        let (_ok, seen) = recorder(&bus, "t");

        let receipt = bus.publish("t", json!(7), PublishOptions::default()).unwrap();

        assert_eq!(receipt.delivered, 1);
        assert_eq!(receipt.failed, 2);
        assert_eq!(*seen.lock(), vec![("t".to_string(), json!(7))]);
        assert_eq!(hooked.load(Ordering::SeqCst), 2);
        assert_eq!(bus.stats().handler_errors, 2);
    }

    #[test]
    fn test_publish_order_preserved() {
        let bus = unlimited_bus();
        let (_sub, seen) = recorder(&bus, "t");

        bus.publish("t", json!(1), PublishOptions::default()).unwrap();
        bus.publish("t", json!(2), PublishOptions::default()).unwrap();

        let payloads: Vec<Value> = seen.lock().iter().map(|(_, p)| p.clone()).collect();
        assert_eq!(payloads, vec![json!(1), json!(2)]);
    }

    #[test]
    fn test_reentrant_publish_from_handler() {
        let bus = unlimited_bus();
        let inner = bus.clone();
        let _relay = bus
            .subscribe("ping", move |message| {
                inner.publish("pong", message.payload.clone(), PublishOptions::default())?;
                Ok(())
            })
            .unwrap();
        let (_sub, pongs) = recorder(&bus, "pong");

        bus.publish("ping", json!("hi"), PublishOptions::default())
            .unwrap();
        assert_eq!(*pongs.lock(), vec![("pong".to_string(), json!("hi"))]);
    }

    // =========================================================================
    // EVICTION
    // =========================================================================

    #[test]
    fn test_lru_eviction() {
        let bus = MessageBus::with_config(
            BusConfig::default()
                .without_rate_limit()
                .with_retained_capacity(2),
        )
        .unwrap();

        bus.publish("a", json!("a"), PublishOptions::retained()).unwrap();
        bus.publish("b", json!("b"), PublishOptions::retained()).unwrap();
        assert!(bus.retained("a").is_some());
        bus.publish("c", json!("c"), PublishOptions::retained()).unwrap();

        assert!(bus.retained("a").is_some());
        assert!(bus.retained("b").is_none());
        assert!(bus.retained("c").is_some());
        assert_eq!(bus.stats().retained, 2);
    }

    // =========================================================================
    // REQUEST / REPLY
    // =========================================================================

    #[tokio::test]
    async fn test_request_resolves_with_reply() {
        let bus = unlimited_bus();
        let responder = bus.clone();
        let _service = bus
            .subscribe("svc.add", move |request| {
                let a = request.payload["a"].as_i64().unwrap_or(0);
                let b = request.payload["b"].as_i64().unwrap_or(0);
                responder.reply(request, json!(a + b))?;
                Ok(())
            })
            .unwrap();
        let baseline = bus.subscription_count();

        let sum = bus
            .request("svc.add", json!({ "a": 1, "b": 2 }), Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(sum, json!(3));
        assert_eq!(bus.subscription_count(), baseline);
        assert_eq!(bus.stats().pending_requests, 0);
    }

    #[tokio::test]
    async fn test_many_requests_keep_topic_stats_small() {
        let config = BusConfigBuilder::new()
            .no_rate_limit()
            .top_topics(usize::MAX)
            .build()
            .unwrap();
        let bus = MessageBus::with_config(config).unwrap();
        let responder = bus.clone();
        let _service = bus
            .subscribe("svc.echo", move |request| {
                responder.reply(request, request.payload.clone())?;
                Ok(())
            })
            .unwrap();

        for n in 0..500 {
            let reply = bus
                .request("svc.echo", json!(n), Duration::from_secs(1))
                .await
                .unwrap();
            assert_eq!(reply, json!(n));
        }

        let stats = bus.stats();
        assert_eq!(stats.total_messages, 1_000);
        assert_eq!(stats.top_topics.len(), 1);
        assert_eq!(stats.top_topics[0].topic, "svc.echo");
        assert!(stats
            .top_topics
            .iter()
            .all(|count| !count.topic.starts_with(REPLY_NAMESPACE)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout_leaves_no_residue() {
        let bus = unlimited_bus();
        let started = tokio::time::Instant::now();

        let result = bus
            .request("svc.nobody", json!({}), Duration::from_millis(250))
            .await;

        assert_eq!(
            result,
            Err(BusError::RequestTimeout {
                topic: "svc.nobody".to_string(),
                timeout_ms: 250,
            })
        );
        assert!(started.elapsed() >= Duration::from_millis(250));
        assert_eq!(bus.subscription_count(), 0);
        assert_eq!(bus.stats().pending_requests, 0);
    }

    #[tokio::test]
    async fn test_async_responder() {
        let bus = unlimited_bus();
        let responder = bus.clone();
        let _service = bus
            .subscribe("svc.slow", move |request| {
                let bus = responder.clone();
                let request = request.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    let _ = bus.reply(&request, json!("done"));
                });
                Ok(())
            })
            .unwrap();

        let reply = bus
            .request("svc.slow", json!(null), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(reply, json!("done"));
    }

    // =========================================================================
    // RATE LIMITING
    // =========================================================================

    #[test]
    fn test_publish_after_limit_is_rejected() {
        let config = BusConfigBuilder::new().rate_limit(3, 60_000).build().unwrap();
        let bus = MessageBus::with_config(config).unwrap();
        let options = PublishOptions::default().from_source("sensor-1");

        for n in 0..3 {
            bus.publish("reading", json!(n), options.clone()).unwrap();
        }
        let result = bus.publish("reading", json!(3), options);

        assert_eq!(
            result,
            Err(BusError::RateLimited {
                publisher: "sensor-1".to_string(),
            })
        );
        // Other publishers keep their own budget
        assert!(bus
            .publish("reading", json!(0), PublishOptions::default().from_source("sensor-2"))
            .is_ok());
        assert_eq!(bus.stats().rejected, 1);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let config = BusConfigBuilder::new()
            .max_payload_bytes(32)
            .no_rate_limit()
            .build()
            .unwrap();
        let bus = MessageBus::with_config(config).unwrap();

        let result = bus.publish("big", json!("x".repeat(64)), PublishOptions::default());
        assert!(matches!(result, Err(BusError::PayloadTooLarge { max: 32, .. })));
        assert_eq!(bus.stats().total_messages, 0);
    }

    // =========================================================================
    // OBSERVATION
    // =========================================================================

    #[test]
    fn test_tap_sees_publish_and_each_delivery() {
        let bus = unlimited_bus();
        let mut tap = bus.tap();
        let _one = bus.subscribe("obs.*", |_| Ok(())).unwrap();
        let _two = bus.subscribe("obs.event", |_| Ok(())).unwrap();

        bus.publish("obs.event", json!(1), PublishOptions::default())
            .unwrap();

        let mut published = 0;
        let mut delivered = 0;
        while let Ok(Some(event)) = tap.try_recv() {
            match event {
                BusEvent::Published { .. } => published += 1,
                BusEvent::Delivered { replay, .. } => {
                    assert!(!replay);
                    delivered += 1;
                }
                other => panic!("unexpected event {}", other.kind()),
            }
        }
        assert_eq!(published, 1);
        assert_eq!(delivered, 2);
    }

    // =========================================================================
    // TEARDOWN
    // =========================================================================

    #[test]
    fn test_shutdown_clears_everything() {
        let bus = unlimited_bus();
        let (_sub, _) = recorder(&bus, "a.*");
        let (_all, _) = recorder(&bus, "*");
        bus.publish("a.b", json!(1), PublishOptions::retained())
            .unwrap();

        bus.shutdown();
        bus.shutdown();

        let stats = bus.stats();
        assert_eq!(stats.subscriptions, 0);
        assert_eq!(stats.retained, 0);
        assert_eq!(
            bus.publish("a.b", json!(2), PublishOptions::default()),
            Err(BusError::Closed)
        );
        assert!(matches!(bus.subscribe("a.*", |_| Ok(())), Err(BusError::Closed)));
    }

    #[test]
    fn test_dropped_handle_unsubscribes() {
        let bus = unlimited_bus();
        {
            let (_sub, _) = recorder(&bus, "scoped");
            assert_eq!(bus.subscription_count(), 1);
        }
        assert_eq!(bus.subscription_count(), 0);
    }

    // =========================================================================
    // PROPERTIES
    // =========================================================================

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn every_subscriber_sees_publish_order(payloads in prop::collection::vec(any::<i64>(), 1..40)) {
                let bus = unlimited_bus();
                let (_a, first) = recorder(&bus, "p.*");
                let (_b, second) = recorder(&bus, "*");

                for payload in &payloads {
                    bus.publish("p.q", json!(payload), PublishOptions::default()).unwrap();
                }

                let expected: Vec<Value> = payloads.iter().map(|p| json!(p)).collect();
                let got_first: Vec<Value> = first.lock().iter().map(|(_, p)| p.clone()).collect();
                let got_second: Vec<Value> = second.lock().iter().map(|(_, p)| p.clone()).collect();
                prop_assert_eq!(&got_first, &expected);
                prop_assert_eq!(&got_second, &expected);
            }

            #[test]
            fn retained_never_exceeds_capacity(
                capacity in 1usize..8,
                topics in prop::collection::vec("[a-d]{1,2}", 1..30),
            ) {
                let bus = MessageBus::with_config(
                    BusConfig::default().without_rate_limit().with_retained_capacity(capacity),
                ).unwrap();
                for topic in &topics {
                    bus.publish(topic, json!(1), PublishOptions::retained()).unwrap();
                    prop_assert!(bus.stats().retained <= capacity);
                }
            }
        }
    }
}
