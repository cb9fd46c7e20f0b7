//! Fixed-capacity blocks of row storage.

use crate::alloc::SegmentAllocator;
use crate::error::{TableError, TableResult};
use crate::row::Row;
use std::alloc::Layout;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::Arc;

/// Memory layout of rows inside a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageLayout {
    /// An array of row tuples.
    #[default]
    Rows,
    /// One parallel array per field.
    Columns,
}

/// A block holding up to `len` rows of uninitialised storage.
///
/// A segment never drops the rows it holds. Containers move every live row
/// out before a segment is cached or released, so an idle segment is
/// always empty.
pub struct Segment<R: Row> {
    base: NonNull<u8>,
    layout: Layout,
    storage: StorageLayout,
    offsets: Vec<usize>,
    len: usize,
    allocator: Arc<dyn SegmentAllocator>,
    _rows: PhantomData<R>,
}

// SAFETY: the segment owns its block; slot access is coordinated by the
// reservation protocol of the container that uses it, and rows are `Send`.
unsafe impl<R: Row> Send for Segment<R> {}
// SAFETY: as above, concurrent callers only touch slots they reserved.
unsafe impl<R: Row> Sync for Segment<R> {}

impl<R: Row> Segment<R> {
    /// Allocates storage for `len` rows.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::LayoutOverflow`] if the block size overflows,
    /// or [`TableError::AllocationFailed`] if the allocator is exhausted.
    pub fn new(
        len: usize,
        storage: StorageLayout,
        allocator: &Arc<dyn SegmentAllocator>,
    ) -> TableResult<Self> {
        let (layout, offsets) = match storage {
            StorageLayout::Rows => Layout::array::<R>(len).map(|layout| (layout, Vec::new())),
            StorageLayout::Columns => R::column_layout(len),
        }
        .map_err(|_| TableError::LayoutOverflow { rows: len })?;

        let base = if layout.size() == 0 {
            // Zero-sized rows need an aligned, non-null address only.
            NonNull::new(layout.align() as *mut u8).ok_or(TableError::LayoutOverflow { rows: len })?
        } else {
            allocator
                .allocate(layout)
                .map_err(|_| TableError::AllocationFailed {
                    bytes: layout.size(),
                })?
        };

        Ok(Self {
            base,
            layout,
            storage,
            offsets,
            len,
            allocator: Arc::clone(allocator),
            _rows: PhantomData,
        })
    }

    /// Number of rows the segment can hold.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the segment holds no slots at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Storage layout of this segment.
    #[must_use]
    pub fn storage(&self) -> StorageLayout {
        self.storage
    }

    /// Size of the backing block in bytes.
    #[must_use]
    pub fn memory_bytes(&self) -> usize {
        self.layout.size()
    }

    /// Per-field pointers of the slot at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset >= self.len()`.
    #[inline]
    pub fn slot(&self, offset: usize) -> R::Ptrs {
        assert!(offset < self.len, "slot {offset} out of segment of {}", self.len);
        // SAFETY: offset is in bounds of a block laid out for `len` rows.
        unsafe {
            match self.storage {
                StorageLayout::Rows => R::row_ptrs(self.base.as_ptr().cast::<R>().add(offset)),
                StorageLayout::Columns => R::column_ptrs(self.base.as_ptr(), &self.offsets, offset),
            }
        }
    }
}

impl<R: Row> Drop for Segment<R> {
    fn drop(&mut self) {
        if self.layout.size() != 0 {
            // SAFETY: `base` was returned by this allocator for `layout`.
            unsafe { self.allocator.deallocate(self.base, self.layout) };
        }
    }
}

impl<R: Row> fmt::Debug for Segment<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("len", &self.len)
            .field("storage", &self.storage)
            .field("bytes", &self.layout.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::{BoundedAllocator, SystemAllocator};
    use crate::row::Field;

    fn system() -> Arc<dyn SegmentAllocator> {
        Arc::new(SystemAllocator)
    }

    #[test]
    fn row_layout_slots_are_contiguous() {
        let seg = Segment::<(u64, u32)>::new(8, StorageLayout::Rows, &system()).unwrap();
        let a = <(u64, u32) as Field<0>>::field_ptr(seg.slot(0)) as usize;
        let b = <(u64, u32) as Field<0>>::field_ptr(seg.slot(1)) as usize;
        assert_eq!(b - a, std::mem::size_of::<(u64, u32)>());
        assert_eq!(seg.len(), 8);
        assert_eq!(seg.memory_bytes(), 8 * std::mem::size_of::<(u64, u32)>());
    }

    #[test]
    fn column_layout_slots_are_strided_per_field() {
        let seg = Segment::<(u64, u8)>::new(8, StorageLayout::Columns, &system()).unwrap();
        let a0 = <(u64, u8) as Field<0>>::field_ptr(seg.slot(0)) as usize;
        let a1 = <(u64, u8) as Field<0>>::field_ptr(seg.slot(1)) as usize;
        let b0 = <(u64, u8) as Field<1>>::field_ptr(seg.slot(0)) as usize;
        let b1 = <(u64, u8) as Field<1>>::field_ptr(seg.slot(1)) as usize;
        assert_eq!(a1 - a0, 8);
        assert_eq!(b1 - b0, 1);
        assert_eq!(b0 - a0, 64);
        assert_eq!(seg.storage(), StorageLayout::Columns);
    }

    #[test]
    fn slots_hold_values() {
        let seg = Segment::<(u32, String)>::new(4, StorageLayout::Columns, &system()).unwrap();
        unsafe {
            <(u32, String)>::write(seg.slot(3), (3, "three".into()));
            assert_eq!(<(u32, String)>::read(seg.slot(3)), (3, "three".to_string()));
        }
    }

    #[test]
    fn zero_sized_rows_skip_allocator() {
        let alloc: Arc<dyn SegmentAllocator> = Arc::new(BoundedAllocator::new(0));
        let seg = Segment::<((),)>::new(1024, StorageLayout::Rows, &alloc).unwrap();
        assert_eq!(seg.memory_bytes(), 0);
        let _ = seg.slot(1023);
    }

    #[test]
    fn allocation_failure_is_reported() {
        let alloc: Arc<dyn SegmentAllocator> = Arc::new(BoundedAllocator::new(16));
        let err = Segment::<(u64,)>::new(4, StorageLayout::Rows, &alloc).unwrap_err();
        assert_eq!(err, TableError::AllocationFailed { bytes: 32 });
    }

    #[test]
    fn drop_returns_memory() {
        let bounded = Arc::new(BoundedAllocator::new(1024));
        let alloc: Arc<dyn SegmentAllocator> = bounded.clone();
        let seg = Segment::<(u64,)>::new(16, StorageLayout::Rows, &alloc).unwrap();
        assert_eq!(bounded.in_use(), 128);
        drop(seg);
        assert_eq!(bounded.in_use(), 0);
    }

    #[test]
    #[should_panic(expected = "out of segment")]
    fn slot_out_of_bounds_panics() {
        let seg = Segment::<(u8,)>::new(2, StorageLayout::Rows, &system()).unwrap();
        let _ = seg.slot(2);
    }
}
