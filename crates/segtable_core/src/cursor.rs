//! Index cursors with a "none yet" state.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

const NONE: usize = usize::MAX;

/// An atomic row index that may be unset.
///
/// The unset state sorts immediately before index 0: advancing from it
/// yields 0, so the predecessor of slot `s` is always `s.wrapping_sub(1)`.
pub struct Cursor(AtomicUsize);

impl Cursor {
    /// Creates an unset cursor.
    #[must_use]
    pub const fn none() -> Self {
        Self(AtomicUsize::new(NONE))
    }

    /// Creates a cursor at `index`.
    #[must_use]
    pub const fn at(index: usize) -> Self {
        Self(AtomicUsize::new(index))
    }

    /// Current index, or `None` if unset.
    #[inline]
    pub fn load(&self) -> Option<usize> {
        match self.0.load(Ordering::Acquire) {
            NONE => None,
            index => Some(index),
        }
    }

    /// Moves the cursor to `slot` if it currently sits on `slot`'s
    /// predecessor.
    ///
    /// Publishes everything written before the call to threads that later
    /// load `slot` or beyond.
    ///
    /// # Errors
    ///
    /// Returns the observed position if the predecessor has not been
    /// reached yet. May fail spuriously.
    #[inline]
    pub fn advance(&self, slot: usize) -> Result<(), Option<usize>> {
        self.0
            .compare_exchange_weak(slot.wrapping_sub(1), slot, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|observed| (observed != NONE).then_some(observed))
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::none()
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Cursor").field(&self.load()).finish()
    }
}
