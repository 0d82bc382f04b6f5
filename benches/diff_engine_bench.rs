//! Performance benchmarks for the topology diff engine and fanout
//!
//! Targets:
//! - Diff of a 1000-node topology: <1ms
//! - Broadcast to 100 subscribers: <100µs

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use zeppelin_core::types::{kind, relation};
use zeppelin_core::{compute_diff, Edge, EventBroker, Node, Summary};

/// Create a fleet of `n` polecats spread over ten rigs
fn create_topology(n: usize, state: &str) -> (Vec<Node>, Vec<Edge>) {
    let mut nodes = vec![Node::new("mayor", kind::MAYOR, "Mayor", "running")];
    let mut edges = Vec::with_capacity(n);
    for i in 0..n {
        let rig = format!("rig-{}", i % 10);
        let id = format!("{}/polecats/p{}", rig, i);
        nodes.push(Node::new(&id, kind::POLECAT, format!("p{}", i), state).with_rig(&rig));
        edges.push(Edge::new(relation::MONITORING, format!("{}/witness", rig), id));
    }
    (nodes, edges)
}

/// Benchmark 1: Diff computation
fn bench_compute_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute_diff");

    for size in [10usize, 100, 1000] {
        group.throughput(Throughput::Elements(size as u64));

        let (old_nodes, old_edges) = create_topology(size, "working");
        let (new_nodes, new_edges) = create_topology(size, "idle");

        group.bench_with_input(BenchmarkId::new("unchanged", size), &size, |b, _| {
            b.iter(|| {
                compute_diff(
                    black_box(&old_nodes),
                    black_box(&old_nodes),
                    black_box(&old_edges),
                    black_box(&old_edges),
                    &Summary::default(),
                    &Summary::default(),
                )
            });
        });

        group.bench_with_input(BenchmarkId::new("all_updated", size), &size, |b, _| {
            b.iter(|| {
                compute_diff(
                    black_box(&old_nodes),
                    black_box(&new_nodes),
                    black_box(&old_edges),
                    black_box(&new_edges),
                    &Summary::default(),
                    &Summary::default(),
                )
            });
        });
    }

    group.finish();
}

/// Benchmark 2: Fanout
fn bench_broadcast(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadcast");

    for subscribers in [1usize, 10, 100] {
        let broker = EventBroker::new(1);
        // Queues fill on the first iteration; later sends exercise the drop path
        let _subs: Vec<_> = (0..subscribers).map(|_| broker.subscribe()).collect();
        let (nodes, edges) = create_topology(10, "working");
        let diff = compute_diff(&[], &nodes, &[], &edges, &Summary::default(), &Summary::default());

        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, _| b.iter(|| broker.broadcast(black_box(&diff))),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_compute_diff, bench_broadcast);
criterion_main!(benches);
