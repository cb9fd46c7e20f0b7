//! Pool of idle segments.

use crate::row::Row;
use crate::segment::Segment;
use parking_lot::Mutex;
use std::sync::Arc;

/// A lock-guarded pool of previously allocated, currently idle segments.
///
/// The cache is only touched while a directory is being replaced, never on
/// a steady-state push or pop. Correctness never depends on it: an empty
/// cache just means every request falls back to a fresh allocation.
#[derive(Debug)]
pub struct SegmentCache<R: Row> {
    idle: Mutex<Vec<Arc<Segment<R>>>>,
}

impl<R: Row> Default for SegmentCache<R> {
    fn default() -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
        }
    }
}

impl<R: Row> SegmentCache<R> {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the most recently returned segment, if any.
    pub fn take(&self) -> Option<Arc<Segment<R>>> {
        self.idle.lock().pop()
    }

    /// Returns segments to the pool, keeping at most `limit` idle ones.
    ///
    /// Returns how many were kept; the rest are released.
    pub fn put_all<I>(&self, segments: I, limit: usize) -> usize
    where
        I: IntoIterator<Item = Arc<Segment<R>>>,
    {
        let mut idle = self.idle.lock();
        let mut kept = 0;
        for segment in segments {
            if idle.len() < limit {
                idle.push(segment);
                kept += 1;
            }
        }
        kept
    }

    /// Number of idle segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.idle.lock().len()
    }

    /// Returns true if no segment is idle.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.idle.lock().is_empty()
    }

    /// Releases every idle segment.
    pub fn clear(&self) {
        self.idle.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::{SegmentAllocator, SystemAllocator};
    use crate::segment::StorageLayout;

    fn segment() -> Arc<Segment<(u32,)>> {
        let alloc: Arc<dyn SegmentAllocator> = Arc::new(SystemAllocator);
        Arc::new(Segment::new(4, StorageLayout::Rows, &alloc).unwrap())
    }

    #[test]
    fn new_cache_is_empty() {
        let cache = SegmentCache::<(u32,)>::new();
        assert!(cache.is_empty());
        assert!(cache.take().is_none());
    }

    #[test]
    fn take_returns_last_put() {
        let cache = SegmentCache::new();
        let a = segment();
        let b = segment();
        assert_eq!(cache.put_all([a.clone(), b.clone()], 8), 2);
        assert!(Arc::ptr_eq(&cache.take().unwrap(), &b));
        assert!(Arc::ptr_eq(&cache.take().unwrap(), &a));
        assert!(cache.take().is_none());
    }

    #[test]
    fn limit_releases_surplus() {
        let cache = SegmentCache::new();
        let kept = cache.put_all((0..5).map(|_| segment()), 3);
        assert_eq!(kept, 3);
        assert_eq!(cache.len(), 3);

        assert_eq!(cache.put_all([segment()], 3), 0);
        cache.clear();
        assert!(cache.is_empty());
    }
}
