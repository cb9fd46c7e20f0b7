//! The growth engine shared by [`crate::Stack`] and [`crate::Queue`].
//!
//! A [`Table`] owns exactly one swappable reference to the current
//! [`Directory`]. Growth never mutates a directory in place: a grower
//! builds a replacement that shares the live segments by reference and
//! installs it with one compare-and-swap. A grower that loses the race
//! donates the segments it drew for its candidate to the [`SegmentCache`]
//! and retries against the directory that won.

use crate::alloc::{SegmentAllocator, SystemAllocator};
use crate::cache::SegmentCache;
use crate::config::TableConfig;
use crate::cursor::Cursor;
use crate::directory::Directory;
use crate::error::TableResult;
use crate::row::{Field, Row};
use crate::segment::Segment;
use crate::stats::TableStats;
use arc_swap::ArcSwapOption;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// A replacement directory that has not been installed yet.
struct Candidate<R: Row> {
    directory: Arc<Directory<R>>,
    /// Segments drawn from the cache or the allocator for this candidate.
    pending: Vec<Arc<Segment<R>>>,
    dead: usize,
    live: usize,
}

/// Segmented row storage with lock-free, copy-on-write growth.
pub struct Table<R: Row> {
    current: ArcSwapOption<Directory<R>>,
    cache: SegmentCache<R>,
    allocator: Arc<dyn SegmentAllocator>,
    config: TableConfig,
    shift: u32,
    mask: usize,
    stats: TableStats,
}

impl<R: Row> Table<R> {
    /// Creates a table that allocates from the global allocator.
    #[must_use]
    pub fn new(config: TableConfig) -> Self {
        Self::with_allocator(config, Arc::new(SystemAllocator))
    }

    /// Creates a table that allocates segment storage from `allocator`.
    ///
    /// No memory is allocated until the first index is requested.
    #[must_use]
    pub fn with_allocator(config: TableConfig, allocator: Arc<dyn SegmentAllocator>) -> Self {
        // Re-apply the builder rules in case fields were set directly.
        let config = TableConfig {
            segment_size: TableConfig::new().segment_size(config.segment_size).segment_size,
            initial_segments: config.initial_segments.max(1),
            ..config
        };
        let shift = config.segment_shift();
        Self {
            current: ArcSwapOption::empty(),
            cache: SegmentCache::new(),
            allocator,
            mask: config.segment_size - 1,
            shift,
            config,
            stats: TableStats::new(),
        }
    }

    /// The configuration in effect.
    #[must_use]
    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    /// Growth counters.
    #[must_use]
    pub fn stats(&self) -> &TableStats {
        &self.stats
    }

    /// Rows per segment.
    #[must_use]
    pub fn segment_size(&self) -> usize {
        self.config.segment_size
    }

    /// Logical segment holding index `n`, relative to a directory whose
    /// slot 0 is logical segment `offset`.
    #[inline]
    #[must_use]
    pub fn segment_index(&self, n: usize, offset: usize) -> usize {
        (n >> self.shift) - offset
    }

    /// Position of index `n` inside its segment.
    #[inline]
    #[must_use]
    pub fn offset_in_segment(&self, n: usize) -> usize {
        n & self.mask
    }

    /// Snapshot of the current directory, if one has been installed.
    ///
    /// The snapshot keeps its directory and segments alive even after a
    /// later growth replaces it.
    #[must_use]
    pub fn directory(&self) -> Option<Arc<Directory<R>>> {
        self.current.load_full()
    }

    /// Rows addressable through the current directory.
    #[must_use]
    pub fn capacity(&self) -> usize {
        match &*self.current.load() {
            Some(dir) => dir.len() << self.shift,
            None => 0,
        }
    }

    /// Idle segments waiting in the cache.
    #[must_use]
    pub fn cached_segments(&self) -> usize {
        self.cache.len()
    }

    /// Per-field pointers of index `n` in `dir`.
    ///
    /// # Panics
    ///
    /// Panics if `dir` does not cover `n`.
    #[inline]
    pub fn row_ptrs(&self, n: usize, dir: &Directory<R>) -> R::Ptrs {
        let segment = self.segment_index(n, dir.offset());
        dir.segment(segment).slot(self.offset_in_segment(n))
    }

    /// Pointer to field `I` of index `n` in `dir`.
    ///
    /// # Panics
    ///
    /// Panics if `dir` does not cover `n`.
    #[inline]
    pub fn component_ptr<const I: usize>(
        &self,
        n: usize,
        dir: &Directory<R>,
    ) -> *mut <R as Field<I>>::Type
    where
        R: Field<I>,
    {
        <R as Field<I>>::field_ptr(self.row_ptrs(n, dir))
    }

    /// Grows the table to cover `n`, then moves `row` into slot `n`.
    ///
    /// Returns the directory the row was written through.
    ///
    /// # Errors
    ///
    /// Returns an error if growth could not allocate; `row` is dropped.
    ///
    /// # Safety
    ///
    /// The caller must own slot `n` exclusively and the slot must be empty.
    pub unsafe fn insert(
        &self,
        n: usize,
        row: R,
        reclaim_hint: Option<&Cursor>,
    ) -> TableResult<Arc<Directory<R>>> {
        let dir = self.ensure_capacity(n, reclaim_hint)?;
        // SAFETY: the directory covers `n`; exclusivity is the caller's.
        unsafe { R::write(self.row_ptrs(n, &dir), row) };
        Ok(dir)
    }

    /// Moves the row out of slot `n`, leaving it empty.
    ///
    /// # Safety
    ///
    /// The caller must own slot `n` exclusively, the slot must hold a live
    /// row, and `dir` must cover `n`.
    pub unsafe fn take(&self, n: usize, dir: &Directory<R>) -> R {
        // SAFETY: forwarded caller contract.
        unsafe { R::read(self.row_ptrs(n, dir)) }
    }

    /// Ensures the installed directory covers index `n` and returns it.
    ///
    /// `reclaim_hint` is the highest fully consumed index (queue use). Whole
    /// segments below it are dropped from the front of the replacement
    /// directory and recycled at its tail or into the cache.
    ///
    /// # Errors
    ///
    /// Returns an error only if a segment cannot be allocated.
    pub fn ensure_capacity(
        &self,
        n: usize,
        reclaim_hint: Option<&Cursor>,
    ) -> TableResult<Arc<Directory<R>>> {
        let mut dir = match self.current.load_full() {
            Some(dir) => dir,
            None => self.install_initial()?,
        };

        while !dir.covers(n, self.shift) {
            // Someone else already replaced it; no point building.
            if let Some(latest) = self.current.load_full() {
                if !Arc::ptr_eq(&latest, &dir) {
                    dir = latest;
                    continue;
                }
            }

            let candidate = self.build_candidate(&dir, n, reclaim_hint)?;
            dir = match self.try_install(&dir, candidate) {
                Ok(installed) => installed,
                Err(Some(winner)) => winner,
                Err(None) => self.install_initial()?,
            };
        }

        Ok(dir)
    }

    /// Builds a replacement for `dir` that covers `n`.
    fn build_candidate(
        &self,
        dir: &Directory<R>,
        n: usize,
        reclaim_hint: Option<&Cursor>,
    ) -> TableResult<Candidate<R>> {
        let old_len = dir.len();
        let dead = reclaim_hint
            .and_then(Cursor::load)
            .map_or(0, |consumed| (consumed >> self.shift).saturating_sub(dir.offset()))
            .min(old_len);
        let live = old_len - dead;
        let offset = dir.offset() + dead;
        let needed = self.segment_index(n, offset);
        let new_len = self
            .config
            .growth
            .next_len(old_len, dead, needed, self.config.initial_segments);

        let mut pending = Vec::new();
        let mut segments = Vec::with_capacity(new_len);
        for slot in 0..new_len {
            if slot < live {
                segments.push(Arc::clone(dir.segment(dead + slot)));
            } else if slot - live < dead {
                segments.push(Arc::clone(dir.segment(slot - live)));
            } else {
                match self.draw_segment() {
                    Ok(segment) => {
                        pending.push(Arc::clone(&segment));
                        segments.push(segment);
                    }
                    Err(err) => {
                        self.salvage(pending, old_len);
                        return Err(err);
                    }
                }
            }
        }

        Ok(Candidate {
            directory: Arc::new(Directory::new(segments, offset)),
            pending,
            dead,
            live,
        })
    }

    /// Swaps `candidate` in if `dir` is still current.
    ///
    /// On a loss the candidate's drawn segments go to the cache and the
    /// directory that won is returned as the error.
    fn try_install(
        &self,
        dir: &Arc<Directory<R>>,
        candidate: Candidate<R>,
    ) -> Result<Arc<Directory<R>>, Option<Arc<Directory<R>>>> {
        let Candidate {
            directory,
            pending,
            dead,
            live,
        } = candidate;
        let old_len = dir.len();
        let new_len = directory.len();

        let previous = self.current.compare_and_swap(dir, Some(Arc::clone(&directory)));
        let previous: Option<Arc<Directory<R>>> = (*previous).clone();
        let won = previous.as_ref().is_some_and(|prev| Arc::ptr_eq(prev, dir));

        if won {
            self.stats.record_install();
            let recycled = dead.min(new_len - live);
            self.stats.record_recycled(recycled);
            if recycled < dead {
                let surplus = dir.segments()[recycled..dead].iter().cloned();
                self.return_to_cache(surplus, dead - recycled, new_len);
            }
            debug!(
                old_segments = old_len,
                new_segments = new_len,
                offset = directory.offset(),
                reclaimed = dead,
                "installed segment directory"
            );
            Ok(directory)
        } else {
            self.stats.record_cas_loss();
            trace!(salvaged = pending.len(), "lost directory race");
            drop(directory);
            self.salvage(pending, old_len);
            Err(previous)
        }
    }

    fn install_initial(&self) -> TableResult<Arc<Directory<R>>> {
        let segments = self.build_initial()?;
        Ok(self.try_install_initial(segments))
    }

    fn build_initial(&self) -> TableResult<Vec<Arc<Segment<R>>>> {
        let count = self.config.initial_segments;
        let mut segments = Vec::with_capacity(count);
        for _ in 0..count {
            match self.allocate_segment() {
                Ok(segment) => segments.push(segment),
                Err(err) => {
                    self.salvage(segments, count);
                    return Err(err);
                }
            }
        }
        Ok(segments)
    }

    /// Installs the first directory, or salvages `segments` if another
    /// thread got there first.
    fn try_install_initial(&self, segments: Vec<Arc<Segment<R>>>) -> Arc<Directory<R>> {
        let count = segments.len();
        let candidate = Arc::new(Directory::new(segments.clone(), 0));
        let empty: Option<Arc<Directory<R>>> = None;
        let previous = self.current.compare_and_swap(&empty, Some(Arc::clone(&candidate)));
        let previous: Option<Arc<Directory<R>>> = (*previous).clone();

        match previous {
            None => {
                self.stats.record_install();
                debug!(segments = count, "installed initial segment directory");
                candidate
            }
            Some(winner) => {
                self.stats.record_cas_loss();
                trace!(salvaged = count, "lost initial directory race");
                drop(candidate);
                self.salvage(segments, winner.len());
                winner
            }
        }
    }

    fn draw_segment(&self) -> TableResult<Arc<Segment<R>>> {
        if let Some(segment) = self.cache.take() {
            self.stats.record_cache_hit();
            return Ok(segment);
        }
        self.allocate_segment()
    }

    fn allocate_segment(&self) -> TableResult<Arc<Segment<R>>> {
        match Segment::new(self.config.segment_size, self.config.layout, &self.allocator) {
            Ok(segment) => {
                self.stats.record_allocated();
                Ok(Arc::new(segment))
            }
            Err(err) => {
                self.stats.record_allocation_failure();
                warn!(error = %err, "segment allocation failed");
                Err(err)
            }
        }
    }

    /// Donates speculatively drawn segments to the cache.
    fn salvage(&self, pending: Vec<Arc<Segment<R>>>, dir_len: usize) {
        let count = pending.len();
        if count > 0 {
            self.return_to_cache(pending.into_iter(), count, dir_len);
        }
    }

    fn return_to_cache<I>(&self, segments: I, count: usize, dir_len: usize)
    where
        I: Iterator<Item = Arc<Segment<R>>>,
    {
        let limit = self.config.cache_limit.unwrap_or(dir_len);
        let kept = self.cache.put_all(segments, limit);
        self.stats.record_returned(kept, count - kept);
    }
}

impl<R: Row> Default for Table<R> {
    fn default() -> Self {
        Self::new(TableConfig::default())
    }
}

impl<R: Row> fmt::Debug for Table<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.current.load();
        let current: &Option<Arc<Directory<R>>> = &guard;
        f.debug_struct("Table")
            .field("segment_size", &self.config.segment_size)
            .field("segments", &current.as_ref().map(|dir| dir.len()))
            .field("offset", &current.as_ref().map(|dir| dir.offset()))
            .field("cached", &self.cache.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::BoundedAllocator;
    use crate::config::GrowthPolicy;
    use crate::error::TableError;
    use std::sync::Barrier;
    use std::thread;

    fn small() -> TableConfig {
        TableConfig::new().segment_size(16).initial_segments(1)
    }

    #[test]
    fn lazy_first_directory() {
        let table = Table::<(u32,)>::new(small());
        assert!(table.directory().is_none());
        assert_eq!(table.capacity(), 0);

        let dir = table.ensure_capacity(0, None).unwrap();
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.offset(), 0);
        assert_eq!(table.capacity(), 16);
        assert_eq!(table.stats().snapshot().directories_installed, 1);
    }

    #[test]
    fn index_mapping_is_shift_and_mask() {
        let table = Table::<(u32,)>::new(small());
        assert_eq!(table.segment_index(37, 0), 2);
        assert_eq!(table.segment_index(37, 1), 1);
        assert_eq!(table.offset_in_segment(37), 5);
        assert_eq!(table.segment_size(), 16);
    }

    #[test]
    fn growth_carries_segments_by_reference() {
        let table = Table::<(u32,)>::new(small());
        let first = table.ensure_capacity(0, None).unwrap();
        let grown = table.ensure_capacity(100, None).unwrap();

        assert!(grown.covers(100, 4));
        assert!(Arc::ptr_eq(first.segment(0), grown.segment(0)));
        assert!(table.stats().snapshot().directories_installed >= 2);
    }

    #[test]
    fn growth_preserves_written_rows() {
        let table = Table::<(usize, String)>::new(small());
        for i in 0..200 {
            unsafe { table.insert(i, (i, i.to_string()), None).unwrap() };
        }
        let dir = table.directory().unwrap();
        for i in 0..200 {
            let (a, b) = unsafe { <(usize, String)>::refs(table.row_ptrs(i, &dir)) };
            assert_eq!(*a, i);
            assert_eq!(*b, i.to_string());
        }
        for i in 0..200 {
            let _ = unsafe { table.take(i, &dir) };
        }
    }

    #[test]
    fn component_ptr_addresses_single_field() {
        let table = Table::<(u8, u64)>::new(small());
        let dir = unsafe { table.insert(3, (9, 99), None).unwrap() };
        let field = table.component_ptr::<1>(3, &dir);
        assert_eq!(unsafe { *field }, 99);
        let _ = unsafe { table.take(3, &dir) };
    }

    #[test]
    fn reclaim_hint_shifts_offset_and_recycles() {
        let config = small().growth(GrowthPolicy::Doubling).initial_segments(4);
        let table = Table::<(u32,)>::new(config);
        let first = table.ensure_capacity(63, None).unwrap();

        // Everything below index 40 is consumed: segments 0 and 1 are dead.
        let consumed = Cursor::at(40);
        let grown = table.ensure_capacity(64, Some(&consumed)).unwrap();

        assert_eq!(grown.offset(), 2);
        assert!(grown.covers(64, 4));
        assert!(grown.covers(40, 4));
        assert!(!grown.covers(31, 4));
        // Live segments 2 and 3 lead, dead 0 and 1 are reused at the tail.
        assert!(Arc::ptr_eq(grown.segment(0), first.segment(2)));
        assert!(Arc::ptr_eq(grown.segment(1), first.segment(3)));
        assert!(Arc::ptr_eq(grown.segment(2), first.segment(0)));
        assert!(Arc::ptr_eq(grown.segment(3), first.segment(1)));
        assert_eq!(table.stats().snapshot().segments_recycled, 2);
    }

    #[test]
    fn shrink_returns_surplus_to_cache() {
        let config = small().initial_segments(4);
        let table = Table::<(u32,)>::new(config);
        let first = table.ensure_capacity(16 * 64 - 1, None).unwrap();
        let segments = first.len();
        assert!(segments >= 64);

        // Nearly everything consumed: the replacement shrinks.
        let consumed = Cursor::at(16 * (segments - 1));
        let grown = table.ensure_capacity(16 * segments, Some(&consumed)).unwrap();
        assert!(grown.len() < segments);
        assert!(grown.covers(16 * segments, 4));
        assert!(table.cached_segments() > 0);
        assert!(table.stats().snapshot().segments_cached > 0);
    }

    #[test]
    fn cache_supplies_later_growth() {
        let config = small().initial_segments(4).cache_limit(64);
        let table = Table::<(u32,)>::new(config);
        let first = table.ensure_capacity(16 * 64 - 1, None).unwrap();
        let segments = first.len();
        let consumed = Cursor::at(16 * (segments - 1));
        table.ensure_capacity(16 * segments, Some(&consumed)).unwrap();
        drop(first);

        let cached = table.cached_segments();
        assert!(cached > 0);
        let before = table.stats().snapshot().cache_hits;
        let dir = table.directory().unwrap();
        table.ensure_capacity(dir.end() * 16 + 16 * 8, Some(&consumed)).unwrap();
        assert!(table.stats().snapshot().cache_hits > before);
    }

    #[test]
    fn allocation_failure_propagates() {
        let alloc = Arc::new(BoundedAllocator::new(16 * 4 * 2));
        let table = Table::<(u32,)>::with_allocator(small(), alloc);

        table.ensure_capacity(31, None).unwrap();
        let err = table.ensure_capacity(1000, None).unwrap_err();
        assert!(matches!(err, TableError::AllocationFailed { .. }));
        assert!(table.stats().snapshot().allocation_failures >= 1);
        // The installed directory is untouched.
        assert!(table.directory().unwrap().covers(31, 4));
    }

    #[test]
    fn initial_allocation_failure_leaves_table_empty() {
        let alloc = Arc::new(BoundedAllocator::new(8));
        let table = Table::<(u64,)>::with_allocator(small(), alloc);
        assert!(table.ensure_capacity(0, None).is_err());
        assert!(table.directory().is_none());
    }

    #[test]
    fn racing_growers_agree_on_one_directory() {
        let table = Arc::new(Table::<(u64,)>::new(small()));
        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let table = Arc::clone(&table);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let mut last = None;
                    for step in 0..50 {
                        let n = (step * threads + t) * 7;
                        let dir = table.ensure_capacity(n, None).unwrap();
                        assert!(dir.covers(n, 4));
                        last = Some(n);
                    }
                    last
                })
            })
            .collect();

        let mut highest = 0;
        for handle in handles {
            highest = highest.max(handle.join().unwrap().unwrap());
        }
        assert!(table.directory().unwrap().covers(highest, 4));
    }

    #[test]
    fn lost_growth_race_salvages_into_cache() {
        let table = Table::<(u64,)>::new(small().cache_limit(64));
        let stale = table.ensure_capacity(0, None).unwrap();
        let candidate = table.build_candidate(&stale, 100, None).unwrap();
        let drawn = candidate.pending.len();
        assert!(drawn > 0);

        // Another grower replaces the directory first.
        let winner = table.ensure_capacity(20, None).unwrap();
        assert!(!Arc::ptr_eq(&winner, &stale));

        let current = table.try_install(&stale, candidate).unwrap_err().unwrap();
        assert!(Arc::ptr_eq(&current, &winner));
        assert!(Arc::ptr_eq(&table.directory().unwrap(), &winner));

        let stats = table.stats().snapshot();
        assert_eq!(stats.cas_losses, 1);
        assert_eq!(stats.segments_cached, drawn as u64);
        assert_eq!(table.cached_segments(), drawn);

        table.ensure_capacity(100, None).unwrap();
        assert!(table.stats().snapshot().cache_hits > 0);
    }

    #[test]
    fn lost_initial_race_salvages_into_cache() {
        let table = Table::<(u64,)>::new(small().initial_segments(2));
        let segments = table.build_initial().unwrap();

        let winner = table.ensure_capacity(0, None).unwrap();
        let current = table.try_install_initial(segments);
        assert!(Arc::ptr_eq(&current, &winner));

        let stats = table.stats().snapshot();
        assert_eq!(stats.directories_installed, 1);
        assert_eq!(stats.cas_losses, 1);
        assert_eq!(stats.segments_cached, 2);
        assert_eq!(table.cached_segments(), 2);

        table.ensure_capacity(40, None).unwrap();
        assert!(table.stats().snapshot().cache_hits > 0);
    }

    #[test]
    fn debug_output_mentions_segments() {
        let table = Table::<(u8,)>::new(small());
        table.ensure_capacity(0, None).unwrap();
        let text = format!("{table:?}");
        assert!(text.contains("segments: Some(1)"));
    }
}
