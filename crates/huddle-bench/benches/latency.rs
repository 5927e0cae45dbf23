//! Latency benchmarks: publish to receive, and the per-event allocations
//! on the hot path.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use huddle_bench::{manager, rooms, subscribers};
use huddle_core::{Delivery, TopicBroker};
use huddle_protocol::{ChatEvent, Frame, Topic};
use std::time::Instant;

/// Benchmark publish + receive latency.
fn bench_pubsub_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("pubsub_latency");

    group.bench_function("single_subscriber", |b| {
        b.iter_custom(|iters| {
            let broker = TopicBroker::new();
            let mut rx = broker.subscribe("conn-1", &Topic::Public).unwrap();

            let start = Instant::now();
            for _ in 0..iters {
                broker.publish(&Topic::Public, ChatEvent::chat("userA", "hi"), None);
                let _ = rx.try_recv();
            }
            start.elapsed()
        });
    });

    group.bench_function("ten_subscribers", |b| {
        b.iter_custom(|iters| {
            let broker = TopicBroker::new();
            let mut rxs = subscribers(&broker, &Topic::Public, 10);

            let start = Instant::now();
            for _ in 0..iters {
                broker.publish(&Topic::Public, ChatEvent::chat("userA", "hi"), None);
                for rx in &mut rxs {
                    let _ = rx.try_recv();
                }
            }
            start.elapsed()
        });
    });

    group.bench_function("join_to_watcher", |b| {
        b.iter_custom(|iters| {
            let members = manager();
            let room = rooms(&members, 1, 8).remove(0);
            let mut rx = members
                .broker()
                .subscribe("watcher", &Topic::Room(room.id.clone()))
                .unwrap();

            let start = Instant::now();
            for _ in 0..iters {
                members.join(&room.id, "userA").unwrap();
                let _ = rx.try_recv();
                members.leave(&room.id, "userA").unwrap();
                let _ = rx.try_recv();
            }
            start.elapsed()
        });
    });

    group.finish();
}

/// Benchmark delivery envelope creation.
fn bench_delivery_creation(c: &mut Criterion) {
    let mut group = c.benchmark_group("delivery_creation");

    group.bench_function("chat", |b| {
        b.iter(|| {
            Delivery::new(
                black_box(Topic::Public),
                black_box(ChatEvent::chat("userA", "hi")),
            )
        })
    });

    group.bench_function("with_source", |b| {
        b.iter(|| {
            Delivery::new(
                black_box(Topic::Room("abc".to_string())),
                black_box(ChatEvent::chat("userA", "hi")),
            )
            .with_source(black_box("conn-123"))
        })
    });

    group.finish();
}

/// Benchmark frame creation and address parsing.
fn bench_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("frames");

    group.bench_function("event", |b| {
        b.iter(|| Frame::event(black_box("room/abc"), black_box(ChatEvent::chat("userA", "hi"))))
    });

    group.bench_function("error", |b| {
        b.iter(|| Frame::error(black_box(1), black_box(1004), black_box("Room is full")))
    });

    group.bench_function("parse_topic", |b| {
        b.iter(|| black_box("room/0190c2f4-7d1a-7c3e-9b2a-5d4e3f2a1b0c").parse::<Topic>())
    });

    group.bench_function("parse_destination", |b| {
        b.iter(|| {
            black_box("/app/chat/0190c2f4-7d1a-7c3e-9b2a-5d4e3f2a1b0c/sendMessage")
                .parse::<huddle_protocol::Destination>()
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_pubsub_latency,
    bench_delivery_creation,
    bench_frames,
);
criterion_main!(benches);
