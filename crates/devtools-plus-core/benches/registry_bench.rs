//! Criterion benchmarks for the node identity registry.
//!
//! `identify` runs for every node the front-end sees, so both the first-sight
//! path (issue a handle) and the repeat path (lookup) matter.
//!
//! Run with:
//! ```bash
//! cargo bench --package devtools-plus-core --bench registry_bench
//! ```

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use devtools_plus_core::dom::{IdentityRegistry, MemoryNode, VendorNode};

fn make_nodes(count: usize) -> Vec<Arc<dyn VendorNode>> {
    (0..count)
        .map(|_| MemoryNode::element("div") as Arc<dyn VendorNode>)
        .collect()
}

fn bench_identify_first_sight(c: &mut Criterion) {
    let mut group = c.benchmark_group("identify_first_sight");
    for count in [100usize, 1_000, 10_000] {
        let nodes = make_nodes(count);
        group.bench_with_input(BenchmarkId::new("nodes", count), &nodes, |b, nodes| {
            b.iter(|| {
                let registry = IdentityRegistry::new();
                for node in nodes {
                    black_box(registry.identify(node).expect("valid node"));
                }
            })
        });
    }
    group.finish();
}

fn bench_identify_repeat(c: &mut Criterion) {
    let nodes = make_nodes(1_000);
    let registry = IdentityRegistry::new();
    for node in &nodes {
        registry.identify(node).expect("valid node");
    }

    c.bench_function("identify_repeat_1000", |b| {
        b.iter(|| {
            for node in &nodes {
                black_box(registry.identify(black_box(node)).expect("valid node"));
            }
        })
    });
}

fn bench_resolve(c: &mut Criterion) {
    let nodes = make_nodes(1_000);
    let registry = IdentityRegistry::new();
    let ids: Vec<_> = nodes
        .iter()
        .map(|n| registry.identify(n).expect("valid node"))
        .collect();

    c.bench_function("resolve_1000", |b| {
        b.iter(|| {
            for id in &ids {
                black_box(registry.resolve(black_box(*id)));
            }
        })
    });
}

criterion_group!(
    benches,
    bench_identify_first_sight,
    bench_identify_repeat,
    bench_resolve
);
criterion_main!(benches);
