//! Growth statistics.
//!
//! Counters are updated only on the growth path, so steady-state pushes and
//! pops never touch them.
//!
//! ```rust
//! use segtable_core::{Stack, TableConfig};
//!
//! let config = TableConfig::new().segment_size(4).initial_segments(1);
//! let stack: Stack<(u32,)> = Stack::with_config(config);
//! for i in 0..64 {
//!     stack.push((i,)).unwrap();
//! }
//! let stats = stack.stats().snapshot();
//! assert!(stats.directories_installed >= 3);
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters describing a table's growth activity.
///
/// All counters are monotonically increasing and may be read while
/// operations are in progress.
#[derive(Debug, Default)]
pub struct TableStats {
    /// Directories successfully installed, including the first one.
    directories_installed: AtomicU64,
    /// Compare-and-swap rounds lost to a concurrent grower.
    cas_losses: AtomicU64,
    /// Segments obtained from the allocator.
    segments_allocated: AtomicU64,
    /// Segments obtained from the cache.
    cache_hits: AtomicU64,
    /// Segments handed back to the cache.
    segments_cached: AtomicU64,
    /// Idle segments released because the cache was full.
    segments_released: AtomicU64,
    /// Leading segments recycled from the dead prefix of a directory.
    segments_recycled: AtomicU64,
    /// Failed segment allocations.
    allocation_failures: AtomicU64,
}

/// A point-in-time copy of [`TableStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Directories successfully installed, including the first one.
    pub directories_installed: u64,
    /// Compare-and-swap rounds lost to a concurrent grower.
    pub cas_losses: u64,
    /// Segments obtained from the allocator.
    pub segments_allocated: u64,
    /// Segments obtained from the cache.
    pub cache_hits: u64,
    /// Segments handed back to the cache.
    pub segments_cached: u64,
    /// Idle segments released because the cache was full.
    pub segments_released: u64,
    /// Leading segments recycled from the dead prefix of a directory.
    pub segments_recycled: u64,
    /// Failed segment allocations.
    pub allocation_failures: u64,
}

impl TableStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_install(&self) {
        self.directories_installed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cas_loss(&self) {
        self.cas_losses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_allocated(&self) {
        self.segments_allocated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_returned(&self, cached: usize, released: usize) {
        self.segments_cached.fetch_add(cached as u64, Ordering::Relaxed);
        self.segments_released.fetch_add(released as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_recycled(&self, count: usize) {
        self.segments_recycled.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_allocation_failure(&self) {
        self.allocation_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Copies every counter.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            directories_installed: self.directories_installed.load(Ordering::Relaxed),
            cas_losses: self.cas_losses.load(Ordering::Relaxed),
            segments_allocated: self.segments_allocated.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            segments_cached: self.segments_cached.load(Ordering::Relaxed),
            segments_released: self.segments_released.load(Ordering::Relaxed),
            segments_recycled: self.segments_recycled.load(Ordering::Relaxed),
            allocation_failures: self.allocation_failures.load(Ordering::Relaxed),
        }
    }
}
