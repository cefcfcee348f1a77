//! Per-algorithm transaction benchmarks
//!
//! - `uncontended/*`: single thread, read-modify-write of one word
//! - `read_only/*`: single thread, reads of 16 words
//! - `contended_counter/*`: 4 threads incrementing one shared word
//!
//! ```bash
//! cargo bench --bench algorithms
//! cargo bench --bench algorithms -- "contended_counter"
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ferrotm_core::{Addr, Algorithm, Runtime, StmConfig};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

fn runtime(algorithm: Algorithm) -> Arc<Runtime> {
    Runtime::new(StmConfig {
        algorithm,
        memory_words: 4096,
        orec_count: 4096,
        max_threads: 16,
        ..StmConfig::default()
    })
    .unwrap()
}

fn uncontended_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("uncontended");
    group.throughput(Throughput::Elements(1));

    for algorithm in Algorithm::ALL {
        let rt = runtime(algorithm);
        let mut h = rt.attach().unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(algorithm), &algorithm, |b, _| {
            b.iter(|| {
                h.atomically(|tx| {
                    let v = tx.read(Addr(0))?;
                    tx.write(Addr(0), black_box(v + 1))
                })
                .unwrap()
            })
        });
    }
    group.finish();
}

fn read_only_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_only");
    group.throughput(Throughput::Elements(16));

    for algorithm in Algorithm::ALL {
        let rt = runtime(algorithm);
        let mut h = rt.attach().unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(algorithm), &algorithm, |b, _| {
            b.iter(|| {
                h.atomically(|tx| {
                    let mut sum = 0u64;
                    for i in 0..16 {
                        sum = sum.wrapping_add(tx.read(Addr(i))?);
                    }
                    Ok(black_box(sum))
                })
                .unwrap()
            })
        });
    }
    group.finish();
}

fn contended_counter_benchmarks(c: &mut Criterion) {
    const THREADS: usize = 4;
    let mut group = c.benchmark_group("contended_counter");
    group.throughput(Throughput::Elements(THREADS as u64));

    for algorithm in Algorithm::ALL {
        group.bench_with_input(BenchmarkId::from_parameter(algorithm), &algorithm, |b, &alg| {
            b.iter_custom(|iters| {
                let rt = runtime(alg);
                let barrier = Arc::new(Barrier::new(THREADS + 1));
                let workers: Vec<_> = (0..THREADS)
                    .map(|_| {
                        let rt = Arc::clone(&rt);
                        let barrier = Arc::clone(&barrier);
                        thread::spawn(move || {
                            let mut h = rt.attach().unwrap();
                            barrier.wait();
                            for _ in 0..iters {
                                h.atomically(|tx| {
                                    let v = tx.read(Addr(0))?;
                                    tx.write(Addr(0), v + 1)
                                })
                                .unwrap();
                            }
                        })
                    })
                    .collect();

                barrier.wait();
                let start = Instant::now();
                for w in workers {
                    w.join().unwrap();
                }
                start.elapsed()
            })
        });
    }
    group.finish();
}

criterion_group!(
    name = single_thread;
    config = Criterion::default().measurement_time(Duration::from_secs(5));
    targets = uncontended_benchmarks, read_only_benchmarks
);

criterion_group!(
    name = contention;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .sample_size(20);
    targets = contended_counter_benchmarks
);

criterion_main!(single_thread, contention);
