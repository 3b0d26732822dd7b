//! # PAN Bus Benchmarks
//!
//! | Area | Operation |
//! |------|-----------|
//! | pan-bus | publish fan-out to N subscribers |
//! | pan-bus | pattern lookup with many registered patterns |
//! | pan-bus | retained replay on subscribe |
//! | pan-routing | rule evaluation per message |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pan_bus::{BusConfig, MessageBus, PublishOptions};
use pan_routing::{BusRouter, FieldOp, RouteAction, RouteDefinition, RouteMatch, RoutingApi};
use serde_json::json;
use std::time::Duration;

fn unlimited_bus() -> MessageBus {
    MessageBus::with_config(
        BusConfig::default()
            .without_rate_limit()
            .with_retained_capacity(10_000),
    )
    .unwrap_or_default()
}

// ============================================================================
// Publish fan-out
// ============================================================================

fn bench_publish_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("pan-bus-publish");
    group.measurement_time(Duration::from_secs(5));

    for subscribers in [1usize, 10, 100] {
        let bus = unlimited_bus();
        let handles: Vec<_> = (0..subscribers)
            .filter_map(|_| bus.subscribe("bench.*", |_| Ok(())).ok())
            .collect();

        group.throughput(Throughput::Elements(subscribers as u64));
        group.bench_with_input(
            BenchmarkId::new("fanout", subscribers),
            &subscribers,
            |b, _| {
                b.iter(|| {
                    black_box(
                        bus.publish("bench.topic", json!({ "n": 1 }), PublishOptions::default())
                            .is_ok(),
                    )
                })
            },
        );
        drop(handles);
    }

    group.finish();
}

// ============================================================================
// Pattern lookup
// ============================================================================

fn bench_pattern_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("pan-bus-registry");

    for patterns in [100usize, 1_000, 10_000] {
        let bus = unlimited_bus();
        let handles: Vec<_> = (0..patterns)
            .filter_map(|i| bus.subscribe(&format!("svc{}.*.event", i), |_| Ok(())).ok())
            .collect();

        group.bench_with_input(
            BenchmarkId::new("publish_one_match", patterns),
            &patterns,
            |b, _| {
                b.iter(|| {
                    black_box(
                        bus.publish("svc42.node.event", json!(null), PublishOptions::default())
                            .is_ok(),
                    )
                })
            },
        );
        drop(handles);
    }

    group.finish();
}

// ============================================================================
// Retained replay
// ============================================================================

fn bench_retained_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("pan-bus-retained");

    for retained in [10usize, 1_000] {
        let bus = unlimited_bus();
        for i in 0..retained {
            let _ = bus.publish(
                &format!("device.{}.state", i),
                json!({ "on": true }),
                PublishOptions::retained(),
            );
        }

        group.throughput(Throughput::Elements(retained as u64));
        group.bench_with_input(
            BenchmarkId::new("subscribe_replay", retained),
            &retained,
            |b, _| {
                b.iter(|| {
                    let handle = bus.subscribe("device.*.state", |_| Ok(()));
                    black_box(handle.is_ok())
                })
            },
        );
    }

    group.finish();
}

// ============================================================================
// Routing
// ============================================================================

fn bench_routing(c: &mut Criterion) {
    let mut group = c.benchmark_group("pan-routing");

    for rules in [1usize, 50] {
        let bus = unlimited_bus();
        let Ok(router) = BusRouter::attach(&bus) else {
            continue;
        };
        for i in 0..rules {
            let _ = router.add_route(
                RouteDefinition::new(
                    format!("rule-{}", i),
                    RouteMatch::all(vec![
                        RouteMatch::topic("order.*"),
                        RouteMatch::field("payload.total", FieldOp::Gte, json!(1_000_000)),
                    ]),
                )
                .with_action(RouteAction::emit("alert.vip")),
            );
        }

        group.bench_with_input(BenchmarkId::new("evaluate", rules), &rules, |b, _| {
            b.iter(|| {
                black_box(
                    bus.publish("order.created", json!({ "total": 10 }), PublishOptions::default())
                        .is_ok(),
                )
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_publish_fanout,
    bench_pattern_lookup,
    bench_retained_replay,
    bench_routing
);
criterion_main!(benches);
