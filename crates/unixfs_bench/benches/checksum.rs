//! Checksum algorithm benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use unixfs_bench::random_data;
use unixfs_core::ChecksumAlgorithm;

/// Benchmark each algorithm over slot-sized buffers.
fn bench_checksum(c: &mut Criterion) {
    let mut group = c.benchmark_group("checksum");

    for size in [256, 4096, 65536].iter() {
        let data = random_data(*size);
        group.throughput(Throughput::Bytes(*size as u64));
        for algorithm in ChecksumAlgorithm::ALL {
            group.bench_with_input(BenchmarkId::new(algorithm.name(), size), &data, |b, data| {
                b.iter(|| black_box(algorithm.checksum(black_box(data))));
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_checksum);
criterion_main!(benches);
