//! Segment directories.

use crate::row::Row;
use crate::segment::Segment;
use std::sync::Arc;

/// An immutable sequence of segment handles plus a segment offset.
///
/// Slot 0 of the directory holds logical segment `offset`. A directory is
/// never mutated after it is built; growth builds a replacement that shares
/// the still-live segments by reference.
#[derive(Debug)]
pub struct Directory<R: Row> {
    segments: Vec<Arc<Segment<R>>>,
    offset: usize,
}

impl<R: Row> Directory<R> {
    /// Creates a directory over `segments` starting at logical segment
    /// `offset`.
    #[must_use]
    pub fn new(segments: Vec<Arc<Segment<R>>>, offset: usize) -> Self {
        Self { segments, offset }
    }

    /// Logical segment index of directory slot 0.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of segment slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns true if the directory has no segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// One past the last logical segment index covered.
    #[must_use]
    pub fn end(&self) -> usize {
        self.offset + self.segments.len()
    }

    /// Returns true if logical index `n` falls inside the directory, given
    /// `shift = log2(rows per segment)`.
    #[must_use]
    pub fn covers(&self, n: usize, shift: u32) -> bool {
        let segment = n >> shift;
        segment >= self.offset && segment < self.end()
    }

    /// Segment at directory slot `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    #[must_use]
    pub fn segment(&self, index: usize) -> &Arc<Segment<R>> {
        &self.segments[index]
    }

    /// All segment handles in slot order.
    #[must_use]
    pub fn segments(&self) -> &[Arc<Segment<R>>] {
        &self.segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::{SegmentAllocator, SystemAllocator};
    use crate::segment::StorageLayout;

    fn directory(count: usize, offset: usize) -> Directory<(u8,)> {
        let alloc: Arc<dyn SegmentAllocator> = Arc::new(SystemAllocator);
        let segments = (0..count)
            .map(|_| Arc::new(Segment::new(16, StorageLayout::Rows, &alloc).unwrap()))
            .collect();
        Directory::new(segments, offset)
    }

    #[test]
    fn coverage_respects_offset() {
        let dir = directory(4, 2);
        assert_eq!(dir.len(), 4);
        assert_eq!(dir.end(), 6);
        // 16 rows per segment: logical segments 2..6 are indices 32..96
        assert!(!dir.covers(31, 4));
        assert!(dir.covers(32, 4));
        assert!(dir.covers(95, 4));
        assert!(!dir.covers(96, 4));
    }

    #[test]
    fn segments_in_slot_order() {
        let dir = directory(3, 0);
        assert!(Arc::ptr_eq(dir.segment(2), &dir.segments()[2]));
        assert!(!dir.is_empty());
    }
}
