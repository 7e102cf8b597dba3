//! Dependency resolution benchmarks.
//!
//! Measures fixed-point resolution over generated installed sets: a fully
//! consistent set (one pass) and a dependency chain whose root is missing,
//! which cascades one removal per pass.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use modhost_core::mods::{DependencyResolver, DescriptorStore, ModuleDescriptor};

/// `count` mods where every mod depends on the two before it.
fn consistent_store(count: usize) -> DescriptorStore {
    (0..count)
        .map(|i| {
            let mut d = ModuleDescriptor::new(&format!("mod-{}", i)).unwrap();
            for dep in i.saturating_sub(2)..i {
                d = d.with_dependency(&format!("mod-{}", dep));
            }
            d
        })
        .collect()
}

/// `count` mods in reverse chain order: `mod-i` depends on `mod-(i+1)`, and
/// the last link is missing.
fn cascading_store(count: usize) -> DescriptorStore {
    (0..count)
        .map(|i| {
            ModuleDescriptor::new(&format!("mod-{}", i))
                .unwrap()
                .with_dependency(&format!("mod-{}", i + 1))
        })
        .collect()
}

fn bench_consistent(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_consistent");

    for count in [16, 128, 512] {
        let store = consistent_store(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &store, |b, store| {
            b.iter(|| {
                let mut store = store.clone();
                black_box(DependencyResolver::new().resolve(&mut store))
            })
        });
    }

    group.finish();
}

fn bench_cascade(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_cascade");

    for count in [8, 32, 64] {
        let store = cascading_store(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &store, |b, store| {
            b.iter(|| {
                let mut store = store.clone();
                let report = DependencyResolver::new().resolve(&mut store);
                assert!(store.is_empty());
                black_box(report)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_consistent, bench_cascade);
criterion_main!(benches);
