//! Persistence driver benchmarks.

use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;
use unixfs_bench::{generate_pairs, memory_driver};
use unixfs_core::{encode_mutations, Config, Mutation, PersistenceDriver};

fn config() -> Config {
    Config::new().capacity(1024).slot_size(8192).sync_on_commit(false)
}

/// Benchmark single-put commits.
fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("driver_commit");

    for size in [64, 1024].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("memory", size), size, |b, &size| {
            let driver = memory_driver(config());
            let pairs = generate_pairs(1000, size);
            let mut i = 0usize;

            b.iter(|| {
                let (key, value) = &pairs[i % pairs.len()];
                i += 1;
                let mut txn = driver.begin();
                driver.stage(&mut txn, key, value).unwrap();
                black_box(driver.commit(&mut txn).unwrap());
            });
        });

        group.bench_with_input(BenchmarkId::new("file", size), size, |b, &size| {
            let temp_dir = TempDir::new().unwrap();
            let driver = PersistenceDriver::open(temp_dir.path(), config()).unwrap();
            let pairs = generate_pairs(1000, size);
            let mut i = 0usize;

            b.iter(|| {
                let (key, value) = &pairs[i % pairs.len()];
                i += 1;
                let mut txn = driver.begin();
                driver.stage(&mut txn, key, value).unwrap();
                black_box(driver.commit(&mut txn).unwrap());
            });
        });
    }

    group.finish();
}

/// Benchmark batched commits of many puts.
fn bench_batch_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("driver_batch_commit");

    for batch in [10, 100].iter() {
        group.throughput(Throughput::Elements(*batch as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), batch, |b, &batch| {
            let driver = memory_driver(config());
            let pairs = generate_pairs(batch, 32);

            b.iter(|| {
                let mut txn = driver.begin();
                for (key, value) in &pairs {
                    driver.stage(&mut txn, key, value).unwrap();
                }
                black_box(driver.commit(&mut txn).unwrap());
            });
        });
    }

    group.finish();
}

/// Benchmark commits from several threads at once.
fn bench_concurrent_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("driver_concurrent_commit");
    group.sample_size(20);

    for threads in [2usize, 4].iter() {
        group.throughput(Throughput::Elements((*threads * 100) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(threads), threads, |b, &threads| {
            let driver = Arc::new(memory_driver(config()));

            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|t| {
                        let driver = Arc::clone(&driver);
                        thread::spawn(move || {
                            for i in 0..100u32 {
                                let mut txn = driver.begin();
                                driver.stage(&mut txn, &[t as u8], &i.to_le_bytes()).unwrap();
                                driver.commit(&mut txn).unwrap();
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
            });
        });
    }

    group.finish();
}

/// Benchmark replaying published entries into an empty DataStore.
fn bench_recover(c: &mut Criterion) {
    let mut group = c.benchmark_group("driver_recover");
    group.sample_size(20);

    let entries = 500u64;
    group.throughput(Throughput::Elements(entries));
    group.bench_function("memory", |b| {
        b.iter_batched(
            || {
                let driver = memory_driver(config());
                let payload = encode_mutations(&[Mutation::put("key", "value")]);
                for _ in 0..entries {
                    let txid = driver.journal().next_transaction_id();
                    driver.journal().append(&payload, txid).unwrap();
                }
                driver
            },
            |driver| black_box(driver.recover().unwrap()),
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_commit,
    bench_batch_commit,
    bench_concurrent_commit,
    bench_recover
);
criterion_main!(benches);
