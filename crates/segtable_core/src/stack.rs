//! LIFO container built on a [`Table`].
//!
//! The stack keeps a single atomic word holding two 32-bit cursors: the
//! write cursor (slots reserved) and the committed size (slots visible to
//! poppers). Both halves are equal when no operation is in flight; a push
//! or pop may only reserve while they are, so at most one mutation is
//! outstanding and a reader never observes a half-written row.

use crate::alloc::SegmentAllocator;
use crate::config::TableConfig;
use crate::error::{TableError, TableResult};
use crate::row::{Field, Row};
use crate::stats::TableStats;
use crate::table::Table;
use crossbeam_utils::{Backoff, CachePadded};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const COMMIT_MASK: u64 = u32::MAX as u64;
const WRITE_ONE: u64 = 1 << 32;

/// Most rows a stack can index.
pub const STACK_LIMIT: usize = u32::MAX as usize;

#[inline]
fn unpack(state: u64) -> (u32, u32) {
    ((state >> 32) as u32, (state & COMMIT_MASK) as u32)
}

#[inline]
fn pack(write: u32, committed: u32) -> u64 {
    (u64::from(write) << 32) | u64::from(committed)
}

/// A lock-free LIFO stack of rows.
///
/// ```rust
/// use segtable_core::Stack;
///
/// let stack: Stack<(i32, String)> = Stack::new();
/// assert_eq!(stack.push((1, "a".into())).unwrap(), 0);
/// assert_eq!(stack.push((2, "b".into())).unwrap(), 1);
/// assert_eq!(stack.pop(), Some((2, "b".into())));
/// assert_eq!(stack.pop(), Some((1, "a".into())));
/// assert_eq!(stack.pop(), None);
/// assert_eq!(stack.size(), 0);
/// ```
pub struct Stack<R: Row> {
    table: Table<R>,
    state: CachePadded<AtomicU64>,
}

impl<R: Row> Stack<R> {
    /// Creates an empty stack with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(TableConfig::default())
    }

    /// Creates an empty stack.
    #[must_use]
    pub fn with_config(config: TableConfig) -> Self {
        Self::from_table(Table::new(config))
    }

    /// Creates an empty stack drawing segment memory from `allocator`.
    #[must_use]
    pub fn with_allocator(config: TableConfig, allocator: Arc<dyn SegmentAllocator>) -> Self {
        Self::from_table(Table::with_allocator(config, allocator))
    }

    fn from_table(table: Table<R>) -> Self {
        Self {
            table,
            state: CachePadded::new(AtomicU64::new(0)),
        }
    }

    /// Pushes a row and returns its index.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::CapacityExceeded`] once [`STACK_LIMIT`] rows
    /// are stored, or an allocation error if the table could not grow. In
    /// both cases the stack is unchanged and `row` is dropped.
    pub fn push(&self, row: R) -> TableResult<usize> {
        let backoff = Backoff::new();
        let mut state = self.state.load(Ordering::Acquire);
        let slot = loop {
            let (write, committed) = unpack(state);
            if write != committed {
                backoff.snooze();
                state = self.state.load(Ordering::Acquire);
                continue;
            }
            if write == u32::MAX {
                return Err(TableError::CapacityExceeded { limit: STACK_LIMIT });
            }
            match self.state.compare_exchange_weak(
                state,
                pack(write + 1, committed),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break write as usize,
                Err(observed) => state = observed,
            }
        };

        // SAFETY: the reservation gives this call sole ownership of `slot`,
        // which is above the committed size and therefore empty.
        if let Err(err) = unsafe { self.table.insert(slot, row, None) } {
            // Nothing else can move while the reservation is outstanding.
            self.state.fetch_sub(WRITE_ONE, Ordering::AcqRel);
            return Err(err);
        }

        self.state.fetch_add(1, Ordering::AcqRel);
        Ok(slot)
    }

    /// Pops the most recently pushed row, or `None` if the stack is empty.
    pub fn pop(&self) -> Option<R> {
        let backoff = Backoff::new();
        let mut state = self.state.load(Ordering::Acquire);
        let slot = loop {
            let (write, committed) = unpack(state);
            if write == 0 {
                return None;
            }
            if write != committed {
                backoff.snooze();
                state = self.state.load(Ordering::Acquire);
                continue;
            }
            match self.state.compare_exchange_weak(
                state,
                pack(write - 1, committed),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break (write - 1) as usize,
                Err(observed) => state = observed,
            }
        };

        let dir = self
            .table
            .directory()
            .expect("committed rows imply an installed directory");
        // SAFETY: `slot` is below the committed size, so it holds a live
        // row, and the reservation makes this call its only accessor.
        let row = unsafe { self.table.take(slot, &dir) };

        self.state.fetch_sub(1, Ordering::AcqRel);
        Some(row)
    }

    /// Number of committed rows.
    ///
    /// While a pop is in flight the popped row is no longer counted.
    #[must_use]
    pub fn size(&self) -> usize {
        let (write, committed) = unpack(self.state.load(Ordering::Acquire));
        write.min(committed) as usize
    }

    /// Number of rows committed or reserved by an in-flight push.
    ///
    /// A row being popped still counts until its pop completes.
    #[must_use]
    pub fn max_size(&self) -> usize {
        let (write, committed) = unpack(self.state.load(Ordering::Acquire));
        write.max(committed) as usize
    }

    /// Returns true if no row is committed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Pops every row and returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut removed = 0;
        while self.pop().is_some() {
            removed += 1;
        }
        removed
    }

    /// Field `I` of row `index`.
    pub fn get<const I: usize>(&mut self, index: usize) -> Option<&<R as Field<I>>::Type>
    where
        R: Field<I>,
    {
        let ptr = self.field_ptr::<I>(index)?;
        // SAFETY: the row is live and `&mut self` excludes every mutation.
        Some(unsafe { &*ptr })
    }

    /// Mutable access to field `I` of row `index`.
    pub fn get_mut<const I: usize>(&mut self, index: usize) -> Option<&mut <R as Field<I>>::Type>
    where
        R: Field<I>,
    {
        let ptr = self.field_ptr::<I>(index)?;
        // SAFETY: as in `get`, and the exclusive borrow is handed on.
        Some(unsafe { &mut *ptr })
    }

    /// Every field of row `index`.
    pub fn get_row(&mut self, index: usize) -> Option<R::Refs<'_>> {
        let ptrs = self.slot_ptrs(index)?;
        // SAFETY: the row is live and `&mut self` excludes every mutation.
        Some(unsafe { R::refs(ptrs) })
    }

    /// Mutable access to every field of row `index`.
    pub fn get_row_mut(&mut self, index: usize) -> Option<R::RefsMut<'_>> {
        let ptrs = self.slot_ptrs(index)?;
        // SAFETY: as in `get_row`, and the exclusive borrow is handed on.
        Some(unsafe { R::refs_mut(ptrs) })
    }

    /// Exchanges rows `i` and `j`.
    ///
    /// Returns false, leaving the stack untouched, if either index is not
    /// below [`Self::size`].
    pub fn swap(&mut self, i: usize, j: usize) -> bool {
        let (Some(a), Some(b)) = (self.slot_ptrs(i), self.slot_ptrs(j)) else {
            return false;
        };
        if i != j {
            // SAFETY: both rows are live and `&mut self` is exclusive.
            unsafe { R::swap(a, b) };
        }
        true
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

    fn slot_ptrs(&mut self, index: usize) -> Option<R::Ptrs> {
        let (_, committed) = unpack(*self.state.get_mut());
        if index >= committed as usize {
            return None;
        }
        // The segment outlives the directory handle: growth needs `&self`,
        // which the caller's exclusive borrow rules out.
        let dir = self.table.directory()?;
        Some(self.table.row_ptrs(index, &dir))
    }

    fn field_ptr<const I: usize>(&mut self, index: usize) -> Option<*mut <R as Field<I>>::Type>
    where
        R: Field<I>,
    {
        self.slot_ptrs(index).map(<R as Field<I>>::field_ptr)
    }
}

impl<R: Row> Default for Stack<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Row> Drop for Stack<R> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<R: Row> fmt::Debug for Stack<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack")
            .field("size", &self.size())
            .field("table", &self.table)
            .finish()
    }
}
