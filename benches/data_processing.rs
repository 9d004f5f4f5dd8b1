//! Benchmarks for the hot paths: queues, synchronization and negotiation
//!
//! Run with: cargo bench

use camflow::pipeline::{best_fit, Message, MessageQueue, SharedMessage};
use camflow::{StreamSynchronizer, SyncConfig};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::time::Duration;

fn message(ms: u64) -> SharedMessage {
    Arc::new(Message::buffer(Duration::from_millis(ms), ms, Vec::new()))
}

fn bench_queue_send_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_send_get");
    group.throughput(Throughput::Elements(1));

    for &blocking in &[true, false] {
        let name = if blocking { "blocking" } else { "drop_oldest" };
        group.bench_function(name, |b| {
            let queue = MessageQueue::new("bench", 8, blocking);
            let msg = message(0);
            b.iter(|| {
                queue.send(black_box(msg.clone())).unwrap();
                black_box(queue.get().unwrap());
            });
        });
    }

    group.bench_function("overflow", |b| {
        let queue = MessageQueue::new("bench", 4, false);
        let msg = message(0);
        b.iter(|| queue.send(black_box(msg.clone())).unwrap());
    });

    group.finish();
}

fn bench_synchronizer(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_sync");

    for streams in [2usize, 4, 8].iter() {
        let names: Vec<String> = (0..*streams).map(|i| format!("s{}", i)).collect();
        group.throughput(Throughput::Elements(*streams as u64));
        group.bench_with_input(BenchmarkId::new("aligned", streams), &names, |b, names| {
            let mut sync: StreamSynchronizer<SharedMessage> =
                StreamSynchronizer::new(names.iter().cloned(), SyncConfig::from_fps(500, 30.0));
            let mut t = 0u64;
            b.iter(|| {
                for (i, name) in names.iter().enumerate() {
                    let _ = black_box(sync.push(name, message(t + i as u64)));
                }
                t += 33;
            });
        });

        // One stream lagging: every push scans a growing backlog.
        group.bench_with_input(BenchmarkId::new("backlogged", streams), &names, |b, names| {
            let config = SyncConfig::new(Duration::from_millis(1)).with_max_backlog(100);
            let mut sync: StreamSynchronizer<SharedMessage> =
                StreamSynchronizer::new(names.iter().cloned(), config);
            let mut t = 0u64;
            b.iter(|| {
                for name in names.iter().skip(1) {
                    let _ = black_box(sync.push(name, message(t)));
                }
                t += 33;
            });
        });
    }

    group.finish();
}

fn bench_best_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("best_fit");

    for &(input, requested) in &[(1920u32, 640u32), (1080, 400), (4056, 300)] {
        group.bench_with_input(
            BenchmarkId::new("search", format!("{}->{}", input, requested)),
            &(input, requested),
            |b, &(input, requested)| b.iter(|| best_fit(black_box(input), black_box(requested))),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_queue_send_get, bench_synchronizer, bench_best_fit);
criterion_main!(benches);
