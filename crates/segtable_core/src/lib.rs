//! # segtable core
//!
//! Lock-free, segment-based growable storage for fixed-schema rows.
//!
//! This crate provides:
//! - [`Table`] - the growth engine: a compare-and-swap replaced
//!   [`Directory`] of fixed-size [`Segment`]s plus a [`SegmentCache`]
//! - [`Stack`] - LIFO push/pop/get/swap over a two-cursor commit protocol
//! - [`Queue`] - FIFO push/pop over a four-cursor commit protocol whose
//!   consumed boundary lets growth recycle dead leading segments
//!
//! ## Design Principles
//!
//! - Index `n` lives in segment `(n >> log2(N)) - offset` at `n & (N - 1)`
//! - Directories are copy-on-write; segments are shared by reference
//! - A row becomes visible, or stops being visible, only at its commit step
//! - The segment cache is an optional fast path behind its own lock
//! - Allocation exhaustion is the only hard failure
//!
//! ## Example
//!
//! ```rust
//! use segtable_core::{Queue, Stack};
//!
//! let stack: Stack<(u32, String)> = Stack::new();
//! assert_eq!(stack.push((1, "a".to_string())).unwrap(), 0);
//! assert_eq!(stack.push((2, "b".to_string())).unwrap(), 1);
//! assert_eq!(stack.pop(), Some((2, "b".to_string())));
//!
//! let queue: Queue<(u64,)> = Queue::new();
//! queue.push((1,)).unwrap();
//! queue.push((2,)).unwrap();
//! assert_eq!(queue.pop(), Some((1,)));
//! ```

#![warn(missing_docs)]

mod alloc;
mod cache;
mod config;
mod cursor;
mod directory;
mod error;
mod queue;
mod row;
mod segment;
mod stack;
mod stats;
mod table;

pub use alloc::{AllocError, BoundedAllocator, SegmentAllocator, SystemAllocator};
pub use cache::SegmentCache;
pub use config::{GrowthPolicy, TableConfig};
pub use cursor::Cursor;
pub use directory::Directory;
pub use error::{TableError, TableResult};
pub use queue::Queue;
pub use row::{Field, Row};
pub use segment::{Segment, StorageLayout};
pub use stack::{Stack, STACK_LIMIT};
pub use stats::{StatsSnapshot, TableStats};
pub use table::Table;
