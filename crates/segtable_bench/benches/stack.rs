//! Stack benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use segtable_bench::{configs, random_rows};
use segtable_core::Stack;
use std::sync::Arc;
use std::thread;

/// Benchmark pushing into a fresh stack, growth included.
fn bench_push_fresh(c: &mut Criterion) {
    let mut group = c.benchmark_group("stack_push_fresh");

    for count in [1_000usize, 10_000, 100_000].iter() {
        let rows = random_rows(*count);
        group.throughput(Throughput::Elements(*count as u64));
        for (label, config) in configs() {
            group.bench_with_input(BenchmarkId::new(label, count), &rows, |b, rows| {
                b.iter(|| {
                    let stack = Stack::with_config(config.clone());
                    for row in rows {
                        black_box(stack.push(*row).unwrap());
                    }
                    stack
                });
            });
        }
    }

    group.finish();
}

/// Benchmark a push/pop pair on a warmed stack.
fn bench_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("stack_push_pop");

    for (label, config) in configs() {
        group.bench_function(label, |b| {
            let stack = Stack::with_config(config.clone());
            for row in random_rows(1_024) {
                stack.push(row).unwrap();
            }

            b.iter(|| {
                stack.push(black_box((7u64, 7u32))).unwrap();
                black_box(stack.pop())
            });
        });
    }

    group.finish();
}

/// Benchmark random field reads.
fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("stack_get");

    for (label, config) in configs() {
        group.bench_function(label, |b| {
            let mut stack = Stack::with_config(config.clone());
            for row in random_rows(65_536) {
                stack.push(row).unwrap();
            }
            let mut i = 0usize;

            b.iter(|| {
                i = (i + 7_919) & 65_535;
                black_box(stack.get::<1>(black_box(i)).copied())
            });
        });
    }

    group.finish();
}

/// Benchmark contended push/pop across threads.
fn bench_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("stack_contended");
    group.sample_size(20);

    for threads in [2usize, 4].iter() {
        let per_thread = 10_000;
        group.throughput(Throughput::Elements((threads * per_thread * 2) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(threads), threads, |b, &threads| {
            b.iter(|| {
                let stack = Arc::new(Stack::<(u64, u32)>::with_config(configs()[0].1.clone()));
                let handles: Vec<_> = (0..threads)
                    .map(|t| {
                        let stack = Arc::clone(&stack);
                        thread::spawn(move || {
                            for i in 0..per_thread {
                                stack.push((t as u64, i as u32)).unwrap();
                                black_box(stack.pop());
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

criterion_group!(benches, bench_push_fresh, bench_push_pop, bench_get, bench_contended);
criterion_main!(benches);
