//! Purge benchmarks
//!
//! Measures the validating scan and eviction over caches of different sizes.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use std::time::Duration;
use stow_benchmarks::{criterion_config, populated_cache};

/// Benchmark purges that evict every entry
fn bench_purge_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("purge_all");
    group.sample_size(20);

    for count in [100, 1000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::new("entries", count), count, |b, &count| {
            b.iter_batched(
                || populated_cache(count),
                |cache| {
                    let report = black_box(cache.purge(Duration::ZERO).unwrap());
                    // Temporary directory is removed outside the measurement
                    (cache, report)
                },
                BatchSize::PerIteration,
            );
        });
    }

    group.finish();
}

/// Benchmark purges that only scan because nothing is old enough
fn bench_purge_scan_only(c: &mut Criterion) {
    let mut group = c.benchmark_group("purge_scan_only");

    for count in [100, 1000, 10_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        let cache = populated_cache(*count);

        group.bench_with_input(BenchmarkId::new("entries", count), &cache, |b, cache| {
            b.iter(|| black_box(cache.purge(Duration::from_secs(3600)).unwrap()));
        });
    }

    group.finish();
}

criterion_group! {
    name = benches;
    config = criterion_config();
    targets = bench_purge_all, bench_purge_scan_only
}
criterion_main!(benches);
