//! Stress tests for segtable.
//!
//! These runners hammer a container from many threads and then verify what
//! came out against what went in.

use crate::fixtures::{DropCounter, DropToken};
use segtable_core::{GrowthPolicy, Queue, Stack, StatsSnapshot, StorageLayout, TableConfig};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone, Serialize)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
    /// Whether the popped rows matched the pushed rows.
    pub verified: bool,
    /// Growth counters of the container at the end of the run.
    pub stats: StatsSnapshot,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(
        successful: usize,
        failed: usize,
        duration: Duration,
        verified: bool,
        stats: StatsSnapshot,
    ) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
            verified,
            stats,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
        println!("Verified: {}", self.verified);
        println!(
            "Directories installed: {} (lost races: {})",
            self.stats.directories_installed, self.stats.cas_losses
        );
        println!(
            "Segments allocated: {}, recycled: {}, cache hits: {}",
            self.stats.segments_allocated, self.stats.segments_recycled, self.stats.cache_hits
        );
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of rows pushed in total.
    pub operations: usize,
    /// Number of producer threads, and of consumer threads where the runner
    /// has separate consumers.
    pub threads: usize,
    /// Rows per segment.
    pub segment_size: usize,
    /// Segment count of the first directory.
    pub initial_segments: usize,
    /// Segment storage layout.
    pub layout: StorageLayout,
    /// Growth heuristic.
    pub growth: GrowthPolicy,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 10_000,
            threads: 4,
            segment_size: 16,
            initial_segments: 1,
            layout: StorageLayout::Rows,
            growth: GrowthPolicy::Adaptive,
        }
    }
}

impl StressConfig {
    /// Table configuration for the container under test.
    pub fn table_config(&self) -> TableConfig {
        TableConfig::new()
            .segment_size(self.segment_size)
            .initial_segments(self.initial_segments)
            .layout(self.layout)
            .growth(self.growth)
    }

    fn per_thread(&self) -> usize {
        self.operations / self.threads.max(1)
    }
}

/// Checks that every producer's sequence numbers appear exactly once and
/// that each consumer saw any single producer's rows in push order.
fn verify_queue_logs(logs: &[Vec<(usize, usize)>], producers: usize, per_producer: usize) -> bool {
    let mut seen = vec![vec![false; per_producer]; producers];
    for log in logs {
        let mut last = vec![None; producers];
        for &(producer, seq) in log {
            if producer >= producers || seq >= per_producer || seen[producer][seq] {
                return false;
            }
            seen[producer][seq] = true;
            if last[producer].is_some_and(|prev| prev >= seq) {
                return false;
            }
            last[producer] = Some(seq);
        }
    }
    seen.iter().all(|row| row.iter().all(|&hit| hit))
}

/// Runs `threads` producers against `threads` consumers on one queue.
///
/// Verified when the multiset of popped rows equals the pushed rows and
/// rows of one producer come out in the order they were pushed.
pub fn stress_queue_mpmc(config: &StressConfig) -> StressTestResult {
    let threads = config.threads.max(1);
    let per_producer = config.per_thread();
    let expected = threads * per_producer;
    let queue: Arc<Queue<(usize, usize)>> = Arc::new(Queue::with_config(config.table_config()));
    let consumed = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(threads * 2));

    let start = Instant::now();

    let producers: Vec<_> = (0..threads)
        .map(|p| {
            let queue = Arc::clone(&queue);
            let failed = Arc::clone(&failed);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for seq in 0..per_producer {
                    if queue.push((p, seq)).is_err() {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..threads)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let consumed = Arc::clone(&consumed);
            let failed = Arc::clone(&failed);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut log = Vec::new();
                while consumed.load(Ordering::Acquire) + failed.load(Ordering::Acquire) < expected {
                    match queue.pop() {
                        Some(row) => {
                            consumed.fetch_add(1, Ordering::AcqRel);
                            log.push(row);
                        }
                        None => thread::yield_now(),
                    }
                }
                log
            })
        })
        .collect();

    for handle in producers {
        handle.join().expect("Producer panicked");
    }
    let logs: Vec<_> = consumers
        .into_iter()
        .map(|handle| handle.join().expect("Consumer panicked"))
        .collect();
    let duration = start.elapsed();

    let failed = failed.load(Ordering::Relaxed);
    let verified =
        failed == 0 && queue.is_empty() && verify_queue_logs(&logs, threads, per_producer);
    let popped: usize = logs.iter().map(Vec::len).sum();

    StressTestResult::new(
        expected + popped - failed,
        failed,
        duration,
        verified,
        queue.stats().snapshot(),
    )
}

/// Runs `threads` threads that each push their share and then pop the same
/// number of rows from one shared stack.
///
/// Verified when every pushed value is popped exactly once.
pub fn stress_stack_mpmc(config: &StressConfig) -> StressTestResult {
    let threads = config.threads.max(1);
    let per_thread = config.per_thread();
    let expected = threads * per_thread;
    let stack: Arc<Stack<(usize,)>> = Arc::new(Stack::with_config(config.table_config()));
    let failed = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(threads));

    let start = Instant::now();

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let stack = Arc::clone(&stack);
            let failed = Arc::clone(&failed);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..per_thread {
                    if stack.push((t * per_thread + i,)).is_err() {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
                let mut popped = Vec::with_capacity(per_thread);
                for _ in 0..per_thread {
                    if let Some((value,)) = stack.pop() {
                        popped.push(value);
                    }
                }
                popped
            })
        })
        .collect();

    let mut seen = vec![false; expected];
    let mut verified = true;
    let mut popped = 0;
    for handle in handles {
        for value in handle.join().expect("Thread panicked") {
            popped += 1;
            match seen.get_mut(value) {
                Some(hit) if !*hit => *hit = true,
                _ => verified = false,
            }
        }
    }
    let duration = start.elapsed();

    // Pops that found the stack momentarily empty leave rows behind.
    while let Some((value,)) = stack.pop() {
        match seen.get_mut(value) {
            Some(hit) if !*hit => *hit = true,
            _ => verified = false,
        }
    }

    let failed = failed.load(Ordering::Relaxed);
    verified &= failed == 0 && seen.iter().all(|&hit| hit);

    StressTestResult::new(
        expected + popped - failed,
        failed,
        duration,
        verified,
        stack.stats().snapshot(),
    )
}

/// Pushes `operations` rows single-threaded, checking every earlier row
/// after each growth, then drains through both containers.
///
/// Verified when every `get` returns its pushed value, the stack drains in
/// reverse order, the queue drains in push order, and no row leaks.
pub fn stress_growth_then_drain(config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let drops = DropCounter::new();
    let mut verified = true;
    let mut successful = 0;
    let mut failed = 0;

    let mut stack: Stack<(usize, DropToken)> = Stack::with_config(config.table_config());
    let mut installed = 0;
    for i in 0..config.operations {
        match stack.push((i, drops.token())) {
            Ok(_) => successful += 1,
            Err(_) => failed += 1,
        }
        let now = stack.stats().snapshot().directories_installed;
        if now != installed {
            installed = now;
            verified &= (0..=i).all(|j| stack.get::<0>(j) == Some(&j));
        }
    }
    for i in (0..config.operations).rev() {
        verified &= stack.pop().map(|(v, _)| v) == Some(i);
        successful += 1;
    }
    verified &= stack.size() == 0;

    let queue: Queue<(usize, DropToken)> = Queue::with_config(config.table_config());
    for i in 0..config.operations {
        match queue.push((i, drops.token())) {
            Ok(_) => successful += 1,
            Err(_) => failed += 1,
        }
    }
    for i in 0..config.operations {
        verified &= queue.pop().map(|(v, _)| v) == Some(i);
        successful += 1;
    }

    let stats = stack.stats().snapshot();
    drop(stack);
    drop(queue);
    verified &= failed == 0 && drops.live() == 0;

    StressTestResult::new(successful, failed, start.elapsed(), verified, stats)
}
