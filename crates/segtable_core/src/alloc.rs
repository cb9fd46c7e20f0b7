//! Memory sources for segment storage.

use std::alloc::{self, Layout};
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

/// The allocator could not satisfy a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("memory allocation failed")]
pub struct AllocError;

/// A memory source for segment row storage.
///
/// Only segment blocks are routed through this trait; directory arrays and
/// bookkeeping use the global allocator. Zero-sized layouts never reach
/// the allocator.
///
/// # Safety
///
/// A successful `allocate` must return a block that is valid for reads and
/// writes of `layout.size()` bytes, aligned to `layout.align()`, and not
/// aliased by any other live allocation until it is passed back to
/// `deallocate` with the same layout.
pub unsafe trait SegmentAllocator: Send + Sync + fmt::Debug {
    /// Allocates a block for `layout`.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError`] if the memory source is exhausted.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Returns a block to the memory source.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate` on this allocator with the same
    /// `layout`, and must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// The process-wide global allocator.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

// SAFETY: delegates to the global allocator, which upholds the contract.
unsafe impl SegmentAllocator for SystemAllocator {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        debug_assert!(layout.size() > 0);
        // SAFETY: callers never pass zero-sized layouts.
        let ptr = unsafe { alloc::alloc(layout) };
        NonNull::new(ptr).ok_or(AllocError)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: forwarded caller contract.
        unsafe { alloc::dealloc(ptr.as_ptr(), layout) }
    }
}

/// An allocator with a fixed byte budget.
///
/// Requests that would push the outstanding total past `limit` fail with
/// [`AllocError`]. Useful for bounding memory of an embedded table and for
/// exercising the exhaustion path.
#[derive(Debug)]
pub struct BoundedAllocator<A = SystemAllocator> {
    inner: A,
    limit: usize,
    in_use: AtomicUsize,
}

impl BoundedAllocator<SystemAllocator> {
    /// Creates a bounded allocator over the global allocator.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self::with_inner(SystemAllocator, limit)
    }
}

impl<A: SegmentAllocator> BoundedAllocator<A> {
    /// Creates a bounded allocator over `inner`.
    #[must_use]
    pub fn with_inner(inner: A, limit: usize) -> Self {
        Self {
            inner,
            limit,
            in_use: AtomicUsize::new(0),
        }
    }

    /// Bytes currently handed out.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    /// The byte budget.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }
}

// SAFETY: blocks come from `inner`, which upholds the contract.
unsafe impl<A: SegmentAllocator> SegmentAllocator for BoundedAllocator<A> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let size = layout.size();
        self.in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(size).filter(|&total| total <= self.limit)
            })
            .map_err(|_| AllocError)?;

        self.inner.allocate(layout).inspect_err(|_| {
            self.in_use.fetch_sub(size, Ordering::AcqRel);
        })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.deallocate(ptr, layout) };
        self.in_use.fetch_sub(layout.size(), Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_allocate_and_free() {
        let layout = Layout::array::<u64>(16).unwrap();
        let ptr = SystemAllocator.allocate(layout).unwrap();
        assert_eq!(ptr.as_ptr() as usize % layout.align(), 0);
        unsafe { SystemAllocator.deallocate(ptr, layout) };
    }

    #[test]
    fn bounded_tracks_usage() {
        let alloc = BoundedAllocator::new(1024);
        let layout = Layout::from_size_align(256, 8).unwrap();

        let a = alloc.allocate(layout).unwrap();
        let b = alloc.allocate(layout).unwrap();
        assert_eq!(alloc.in_use(), 512);

        unsafe {
            alloc.deallocate(a, layout);
            alloc.deallocate(b, layout);
        }
        assert_eq!(alloc.in_use(), 0);
    }

    #[test]
    fn bounded_rejects_over_budget() {
        let alloc = BoundedAllocator::new(300);
        let layout = Layout::from_size_align(200, 8).unwrap();

        let a = alloc.allocate(layout).unwrap();
        assert_eq!(alloc.allocate(layout), Err(AllocError));
        assert_eq!(alloc.in_use(), 200);

        unsafe { alloc.deallocate(a, layout) };
        let b = alloc.allocate(layout).unwrap();
        unsafe { alloc.deallocate(b, layout) };
        assert_eq!(alloc.limit(), 300);
    }
}
