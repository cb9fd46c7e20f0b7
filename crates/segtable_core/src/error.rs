//! Error types for table operations.

use thiserror::Error;

/// Result type for table operations.
pub type TableResult<T> = Result<T, TableError>;

/// Errors that can occur while growing or writing a table.
///
/// An empty container or an out-of-range index is never an error; those
/// are reported as `None`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    /// The segment allocator could not provide memory for a new segment.
    #[error("segment allocation failed: {bytes} bytes requested")]
    AllocationFailed {
        /// Size of the rejected allocation.
        bytes: usize,
    },

    /// The memory layout of a segment overflows `isize::MAX` bytes.
    #[error("segment layout overflow for {rows} rows")]
    LayoutOverflow {
        /// Rows per segment that were requested.
        rows: usize,
    },

    /// The stack index space is exhausted.
    #[error("capacity exceeded: at most {limit} rows")]
    CapacityExceeded {
        /// Maximum number of rows the container can index.
        limit: usize,
    },

    /// An earlier push failed to grow the queue, leaving a permanent gap
    /// in the produce order.
    #[error("queue is poisoned by an earlier allocation failure")]
    Poisoned,
}

impl TableError {
    /// Returns true if the error reports memory exhaustion.
    #[must_use]
    pub const fn is_allocation_failure(&self) -> bool {
        matches!(self, Self::AllocationFailed { .. })
    }
}
