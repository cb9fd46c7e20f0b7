//! Test fixtures.
//!
//! Drop accounting for rows that own resources, and ready-made table
//! configurations that force frequent growth.

use segtable_core::TableConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Counts how many [`DropToken`]s it handed out and how many were dropped.
///
/// # Example
///
/// ```rust
/// use segtable_core::Stack;
/// use segtable_testkit::DropCounter;
///
/// let counter = DropCounter::new();
/// {
///     let stack = Stack::new();
///     stack.push((counter.token(),)).unwrap();
///     stack.push((counter.token(),)).unwrap();
/// }
/// assert_eq!(counter.created(), 2);
/// assert_eq!(counter.dropped(), 2);
/// assert_eq!(counter.live(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct DropCounter {
    inner: Arc<Counts>,
}

#[derive(Debug, Default)]
struct Counts {
    created: AtomicUsize,
    dropped: AtomicUsize,
}

impl DropCounter {
    /// Creates a counter with nothing handed out.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out a fresh token.
    pub fn token(&self) -> DropToken {
        let id = self.inner.created.fetch_add(1, Ordering::SeqCst);
        DropToken {
            id,
            counts: Arc::clone(&self.inner),
        }
    }

    /// Tokens handed out so far.
    pub fn created(&self) -> usize {
        self.inner.created.load(Ordering::SeqCst)
    }

    /// Tokens dropped so far.
    pub fn dropped(&self) -> usize {
        self.inner.dropped.load(Ordering::SeqCst)
    }

    /// Tokens still alive.
    ///
    /// # Panics
    ///
    /// Panics if more tokens were dropped than created.
    pub fn live(&self) -> usize {
        self.created()
            .checked_sub(self.dropped())
            .expect("token dropped more than once")
    }
}

/// A value whose drop is recorded by its [`DropCounter`].
#[derive(Debug)]
pub struct DropToken {
    id: usize,
    counts: Arc<Counts>,
}

impl DropToken {
    /// Creation order of this token, starting at 0.
    pub fn id(&self) -> usize {
        self.id
    }
}

impl PartialEq for DropToken {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Arc::ptr_eq(&self.counts, &other.counts)
    }
}

impl Drop for DropToken {
    fn drop(&mut self) {
        self.counts.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

/// 16-row segments and a single initial segment, so a few dozen pushes
/// already grow the table several times.
pub fn small_config() -> TableConfig {
    TableConfig::new().segment_size(16).initial_segments(1)
}

/// 4-row segments, for tests that want growth on almost every push.
pub fn tiny_config() -> TableConfig {
    TableConfig::new().segment_size(4).initial_segments(1)
}
