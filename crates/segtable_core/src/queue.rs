//! FIFO container built on a [`Table`].
//!
//! Four cursors drive the queue. Producers reserve slots with a plain
//! fetch-add on `produce_reserve`, write their row, then publish strictly in
//! slot order through `produce_commit`. Consumers reserve up to
//! `produce_commit` through `consume_reserve` and publish removals in order
//! through `consume_commit`, which doubles as the table's reclaim hint.

use crate::alloc::SegmentAllocator;
use crate::config::TableConfig;
use crate::cursor::Cursor;
use crate::error::{TableError, TableResult};
use crate::row::Row;
use crate::stats::TableStats;
use crate::table::Table;
use crossbeam_utils::{Backoff, CachePadded};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::error;

const HEALTHY: usize = usize::MAX;

/// A lock-free multi-producer, multi-consumer FIFO queue of rows.
///
/// Unlike [`crate::Stack`], a queue keeps one piece of sticky error state.
/// A push that fails to grow leaves a slot that will never be published,
/// so the queue records that slot and becomes poisoned: every later push
/// returns [`TableError::Poisoned`] and producers waiting behind the slot
/// give up instead of spinning forever. Rows published before the failure
/// can still be popped and [`Queue::is_poisoned`] reports the state.
///
/// ```rust
/// use segtable_core::Queue;
///
/// let queue: Queue<(i32,)> = Queue::new();
/// assert_eq!(queue.push((1,)).unwrap(), 0);
/// assert_eq!(queue.push((2,)).unwrap(), 1);
/// assert_eq!(queue.pop(), Some((1,)));
/// assert_eq!(queue.pop(), Some((2,)));
/// assert_eq!(queue.push((3,)).unwrap(), 2);
/// assert_eq!(queue.pop(), Some((3,)));
/// assert_eq!(queue.size(), 0);
/// ```
pub struct Queue<R: Row> {
    table: Table<R>,
    produce_reserve: CachePadded<AtomicUsize>,
    produce_commit: CachePadded<Cursor>,
    consume_reserve: CachePadded<AtomicUsize>,
    consume_commit: CachePadded<Cursor>,
    /// Lowest slot whose push failed to grow the table.
    poisoned_at: AtomicUsize,
}

impl<R: Row> Queue<R> {
    /// Creates an empty queue with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(TableConfig::default())
    }

    /// Creates an empty queue.
    #[must_use]
    pub fn with_config(config: TableConfig) -> Self {
        Self::from_table(Table::new(config))
    }

    /// Creates an empty queue drawing segment memory from `allocator`.
    #[must_use]
    pub fn with_allocator(config: TableConfig, allocator: Arc<dyn SegmentAllocator>) -> Self {
        Self::from_table(Table::with_allocator(config, allocator))
    }

    fn from_table(table: Table<R>) -> Self {
        Self {
            table,
            produce_reserve: CachePadded::new(AtomicUsize::new(0)),
            produce_commit: CachePadded::new(Cursor::none()),
            consume_reserve: CachePadded::new(AtomicUsize::new(0)),
            consume_commit: CachePadded::new(Cursor::none()),
            poisoned_at: AtomicUsize::new(HEALTHY),
        }
    }

    /// Appends a row and returns its index.
    ///
    /// Returns once every earlier push has published, so the row is visible
    /// to consumers when this call returns.
    ///
    /// # Errors
    ///
    /// Returns an allocation error if the table could not grow. That leaves
    /// a permanent gap in the produce order: the queue becomes poisoned and
    /// every push behind the gap fails with [`TableError::Poisoned`]. `row`
    /// is dropped in both cases.
    pub fn push(&self, row: R) -> TableResult<usize> {
        if self.is_poisoned() {
            return Err(TableError::Poisoned);
        }

        let slot = self.produce_reserve.fetch_add(1, Ordering::AcqRel);
        debug_assert!(slot != usize::MAX, "produce cursor exhausted");

        // SAFETY: the fetch-add hands out every slot exactly once, and no
        // consumer reaches `slot` before it is published below.
        let dir = match unsafe { self.table.insert(slot, row, Some(&*self.consume_commit)) } {
            Ok(dir) => dir,
            Err(err) => {
                self.poison(slot, &err);
                return Err(err);
            }
        };

        let backoff = Backoff::new();
        while self.produce_commit.advance(slot).is_err() {
            if slot > self.poisoned_at.load(Ordering::Acquire) {
                // The predecessor chain is broken and no consumer can ever
                // reach this slot, so the row is still ours to drop.
                // SAFETY: written above and never published.
                drop(unsafe { self.table.take(slot, &dir) });
                return Err(TableError::Poisoned);
            }
            backoff.snooze();
        }
        Ok(slot)
    }

    /// Removes the oldest published row, or returns `None` if there is none.
    pub fn pop(&self) -> Option<R> {
        let mut next = self.consume_reserve.load(Ordering::Acquire);
        let slot = loop {
            let last = self.produce_commit.load()?;
            if next > last {
                return None;
            }
            match self.consume_reserve.compare_exchange_weak(
                next,
                next + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break next,
                Err(observed) => next = observed,
            }
        };

        let dir = self
            .table
            .directory()
            .expect("published rows imply an installed directory");
        // SAFETY: `slot` was published by its producer and reserved by this
        // call alone. Its segment stays live until `consume_commit` passes it.
        let row = unsafe { self.table.take(slot, &dir) };

        let backoff = Backoff::new();
        while self.consume_commit.advance(slot).is_err() {
            backoff.snooze();
        }
        Some(row)
    }

    /// Published rows not yet consumed.
    #[must_use]
    pub fn size(&self) -> usize {
        // Consumed first: it never overtakes produced.
        let consumed = self.consume_commit.load().map_or(0, |c| c + 1);
        let produced = self.produce_commit.load().map_or(0, |p| p + 1);
        produced.saturating_sub(consumed)
    }

    /// Returns true if no published row is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Pops every published row and returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut removed = 0;
        while self.pop().is_some() {
            removed += 1;
        }
        removed
    }

    /// Returns true once a push has failed to grow the table.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned_at.load(Ordering::Acquire) != HEALTHY
    }

    /// Rows addressable without growing.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Growth counters of the underlying table.
    #[must_use]
    pub fn stats(&self) -> &TableStats {
        self.table.stats()
    }

    /// The configuration in effect.
    #[must_use]
    pub fn config(&self) -> &TableConfig {
        self.table.config()
    }

    fn poison(&self, slot: usize, err: &TableError) {
        let previous = self.poisoned_at.fetch_min(slot, Ordering::AcqRel);
        if previous == HEALTHY {
            error!(slot, error = %err, "queue poisoned by failed growth");
        }
    }
}

impl<R: Row> Default for Queue<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Row> Drop for Queue<R> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<R: Row> fmt::Debug for Queue<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("produce_commit", &*self.produce_commit)
            .field("consume_commit", &*self.consume_commit)
            .field("poisoned", &self.is_poisoned())
            .field("table", &self.table)
            .finish()
    }
}
