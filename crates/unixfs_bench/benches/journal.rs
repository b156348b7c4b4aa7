//! Journal append and read benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;
use unixfs_bench::{memory_journal, random_data};
use unixfs_core::{Config, SequenceNumber, TransactionId, TransactionJournal};

fn config() -> Config {
    Config::new().capacity(1024).slot_size(8192).sync_on_commit(false)
}

/// Benchmark appends to a memory-backed journal.
fn bench_memory_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("journal_memory_append");

    for size in [64, 512, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let journal = memory_journal(&config());
            let payload = random_data(size);

            b.iter(|| {
                let seq = journal.append(black_box(&payload), TransactionId::new(1)).unwrap();
                journal.release(black_box(seq)).unwrap();
            });
        });
    }

    group.finish();
}

/// Benchmark appends to a file-backed journal.
fn bench_file_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("journal_file_append");

    // Use larger sample size for file operations
    group.sample_size(50);

    for size in [64, 512, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let temp_dir = TempDir::new().unwrap();
            let journal = TransactionJournal::open(
                &temp_dir.path().join("journal.dat"),
                &temp_dir.path().join("journal.ctl"),
                &config(),
            )
            .unwrap();
            let payload = random_data(size);

            b.iter(|| {
                let seq = journal.append(black_box(&payload), TransactionId::new(1)).unwrap();
                journal.release(black_box(seq)).unwrap();
            });
        });
    }

    group.finish();
}

/// Benchmark verified reads of published entries.
fn bench_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("journal_read");

    for size in [64, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let journal = memory_journal(&config());
            let payload = random_data(size);
            for _ in 0..100 {
                journal.append(&payload, TransactionId::new(1)).unwrap();
            }

            let mut seq = 0u64;
            b.iter(|| {
                seq = seq % 100 + 1;
                let entry = journal.read(black_box(SequenceNumber::new(seq))).unwrap();
                black_box(entry);
            });
        });
    }

    group.finish();
}

/// Benchmark counter reservation and publication.
fn bench_counters(c: &mut Criterion) {
    let journal = memory_journal(&config());
    let counter = journal.counter();

    c.bench_function("dual_counter_reserve_publish", |b| {
        b.iter(|| {
            let seq = counter.increment_and_get_leading().unwrap();
            black_box(counter.compare_and_advance_trailing(seq));
        });
    });

    c.bench_function("dual_counter_snapshot", |b| {
        b.iter(|| black_box(counter.get_snapshot()));
    });
}

criterion_group!(benches, bench_memory_append, bench_file_append, bench_read, bench_counters);
criterion_main!(benches);
