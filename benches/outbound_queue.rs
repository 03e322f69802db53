//! Outbound delivery benchmark suite.
//!
//! Benchmarks the delivery path at different scales:
//! - Queue drain: enqueue then encode and hand off N messages
//! - Supervisor throughput: send N messages through an open session
//!
//! Run with: cargo bench --bench outbound_queue
//! Results saved to: target/criterion/

use std::time::Duration;

use chat_link::queue::{OutboundMessage, OutboundQueue};
use chat_link::transport::MemoryTransport;
use chat_link::{ConnectionConfig, Event, Supervisor};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use serde_json::json;
use tokio::runtime::Runtime;

// ============================================================================
// Benchmark Parameters
// ============================================================================

const MESSAGE_COUNTS: &[usize] = &[100, 1_000, 10_000];

fn config(capacity: usize) -> ConnectionConfig {
    ConnectionConfig::builder()
        .endpoint("ws://bench.local/ws")
        .session_id("bench")
        .credential("bench")
        .queue_capacity(capacity)
        .build()
        .expect("valid bench config")
}

// ============================================================================
// Benchmark: Queue Drain
// ============================================================================

fn bench_queue_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_drain");

    for &count in MESSAGE_COUNTS {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("encode_and_drain", count), &count, |b, &n| {
            b.iter(|| {
                let mut queue = OutboundQueue::new();
                for i in 0..n {
                    queue.enqueue(OutboundMessage::new(json!({ "seq": i, "text": "hello" })));
                }
                let mut bytes = 0usize;
                let outcome = queue.drain(|message| {
                    bytes += message.encode().map(|f| f.len()).unwrap_or(0);
                    true
                });
                assert_eq!(outcome.sent, n);
                bytes
            });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Supervisor Throughput
// ============================================================================

fn bench_supervisor_send(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");

    let mut group = c.benchmark_group("supervisor_send");
    group.measurement_time(Duration::from_secs(10));

    for &count in MESSAGE_COUNTS {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("open_session", count), &count, |b, &n| {
            b.to_async(&rt).iter(|| async move { send_through_session(n).await });
        });
    }

    group.finish();
}

async fn send_through_session(count: usize) {
    let (transport, mut peers) = MemoryTransport::new();
    let supervisor = Supervisor::builder(config(count))
        .transport(transport)
        .spawn()
        .expect("spawn supervisor");
    let mut events = supervisor.subscribe();

    supervisor.connect().expect("connect");
    while let Some(event) = events.recv().await {
        if matches!(event, Event::Open { .. }) {
            break;
        }
    }
    let peer = peers.next().await.expect("peer");

    for i in 0..count {
        supervisor.send(&json!({ "seq": i })).expect("send");
    }
    while supervisor.queued() > 0 {
        tokio::task::yield_now().await;
    }

    assert_eq!(peer.sent().len(), count);
    supervisor.close();
}

// ============================================================================
// Criterion Setup
// ============================================================================

criterion_group!(benches, bench_queue_drain, bench_supervisor_send);
criterion_main!(benches);
