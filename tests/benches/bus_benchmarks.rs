//! Insight Bus benchmarks.
//!
//! Run with `cargo bench -p ib-tests`.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use shared_bus::{handler_fn, ChannelOptions, MessageBus, MessageQueue};
use shared_types::{Draft, EnvelopeCodec, Message};
use std::sync::Arc;
use std::time::Duration;

fn sample_message(sequence: u64) -> Message {
    Message::stamp(
        "insight-results",
        sequence,
        Draft::event(
            "analysis-complete",
            json!({
                "result": {"type": "summary", "output": {"summary": "Contexts share nothing."}},
                "context": {"action": "quick-analysis", "tabId": 1}
            }),
        ),
    )
}

// ============================================================================
// Publish fan-out
// ============================================================================

fn bench_publish_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("bus-publish");
    group.measurement_time(Duration::from_secs(5));

    let rt = tokio::runtime::Runtime::new().unwrap();
    let _guard = rt.enter();

    for subscribers in [1usize, 4, 16] {
        let bus = MessageBus::new();
        bus.create_channel("fan-out", ChannelOptions::persistent(100)).unwrap();
        let _subs: Vec<_> = (0..subscribers)
            .map(|_| {
                bus.subscribe("fan-out", handler_fn(|_msg: Arc<Message>| async { Ok(()) }))
                    .unwrap()
            })
            .collect();

        group.throughput(Throughput::Elements(subscribers as u64));
        group.bench_with_input(
            BenchmarkId::new("subscribers", subscribers),
            &bus,
            |b, bus| {
                b.iter(|| black_box(bus.publish("fan-out", "tick", json!({"n": 1})).unwrap()))
            },
        );
    }

    group.finish();
}

// ============================================================================
// Envelope codec
// ============================================================================

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope-codec");
    let codec = EnvelopeCodec::new();
    let message = sample_message(42);
    let bytes = codec.encode(&message).unwrap();

    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("encode", |b| b.iter(|| black_box(codec.encode(&message).unwrap())));
    group.bench_function("decode", |b| b.iter(|| black_box(codec.decode(&bytes).unwrap())));

    group.finish();
}

// ============================================================================
// Backlog queue
// ============================================================================

fn bench_backlog_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("backlog-queue");

    for capacity in [10usize, 100, 1000] {
        group.bench_with_input(
            BenchmarkId::new("push_full", capacity),
            &capacity,
            |b, &capacity| {
                let mut queue = MessageQueue::new(capacity);
                for seq in 1..=capacity as u64 {
                    queue.push(Arc::new(sample_message(seq)));
                }
                let next = Arc::new(sample_message(capacity as u64 + 1));
                b.iter(|| black_box(queue.push(Arc::clone(&next))))
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_publish_fan_out, bench_codec, bench_backlog_push);
criterion_main!(benches);
