//! Table configuration.

use crate::segment::StorageLayout;

/// How a table picks the segment count of a replacement directory.
///
/// Both policies are heuristics only; any choice that covers the requested
/// index is correct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GrowthPolicy {
    /// Grow by half again; shrink toward a quarter or half of the current
    /// footprint once most leading segments are dead.
    #[default]
    Adaptive,
    /// Always double and never shrink. Dead leading segments are still
    /// recycled.
    Doubling,
}

impl GrowthPolicy {
    /// Chooses the segment count of the next directory.
    ///
    /// * `current` - segment count of the directory being replaced
    /// * `dead` - leading segments of that directory that are fully consumed
    /// * `needed` - index, relative to the new offset, of the segment that
    ///   must be covered
    /// * `floor` - the configured initial segment count
    ///
    /// The result is always greater than `needed`.
    #[must_use]
    pub fn next_len(self, current: usize, dead: usize, needed: usize, floor: usize) -> usize {
        let mut len = match self {
            Self::Adaptive => current.saturating_add(current >> 1),
            Self::Doubling => current.saturating_mul(2),
        }
        .max(current.saturating_add(1));

        while needed >= len {
            len = len.saturating_mul(2);
        }

        if self == Self::Adaptive {
            let smaller = (current >> 2).max(floor);
            let medium = (current >> 1).max(floor);
            let dead_pct = dead.saturating_mul(100);

            if dead_pct > current * 85 && needed < smaller {
                len = smaller;
            } else if dead_pct > current * 65 && needed < medium {
                len = medium;
            } else if dead_pct > current * 50 && needed < current {
                len = current;
            }
        }

        len
    }
}

/// Configuration for constructing a [`crate::Table`] and the containers
/// built on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    /// Rows per segment. Always a power of two.
    pub segment_size: usize,

    /// Segment count of the first directory.
    pub initial_segments: usize,

    /// Row-major or column-major segment storage.
    pub layout: StorageLayout,

    /// Grow/shrink heuristic.
    pub growth: GrowthPolicy,

    /// Maximum number of idle segments kept for reuse.
    ///
    /// `None` caps the cache at the segment count of the directory
    /// current at the time a segment is returned.
    pub cache_limit: Option<usize>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            segment_size: 1 << 10,
            initial_segments: 16,
            layout: StorageLayout::Rows,
            growth: GrowthPolicy::Adaptive,
            cache_limit: None,
        }
    }
}

impl TableConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets rows per segment, rounded down to a power of two (minimum 1).
    #[must_use]
    pub const fn segment_size(mut self, rows: usize) -> Self {
        self.segment_size = if rows <= 1 {
            1
        } else {
            1 << (usize::BITS - 1 - rows.leading_zeros())
        };
        self
    }

    /// Sets the segment count of the first directory (minimum 1).
    #[must_use]
    pub const fn initial_segments(mut self, count: usize) -> Self {
        self.initial_segments = if count == 0 { 1 } else { count };
        self
    }

    /// Sets the storage layout.
    #[must_use]
    pub const fn layout(mut self, layout: StorageLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Sets the growth policy.
    #[must_use]
    pub const fn growth(mut self, growth: GrowthPolicy) -> Self {
        self.growth = growth;
        self
    }

    /// Sets a fixed cap on idle cached segments.
    #[must_use]
    pub const fn cache_limit(mut self, limit: usize) -> Self {
        self.cache_limit = Some(limit);
        self
    }

    /// Number of low index bits that address a row within a segment.
    #[must_use]
    pub const fn segment_shift(&self) -> u32 {
        self.segment_size.trailing_zeros()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = TableConfig::default();
        assert_eq!(config.segment_size, 1024);
        assert_eq!(config.initial_segments, 16);
        assert_eq!(config.layout, StorageLayout::Rows);
        assert_eq!(config.growth, GrowthPolicy::Adaptive);
        assert_eq!(config.segment_shift(), 10);
    }

    #[test]
    fn segment_size_rounds_down_to_power_of_two() {
        assert_eq!(TableConfig::new().segment_size(1000).segment_size, 512);
        assert_eq!(TableConfig::new().segment_size(16).segment_size, 16);
        assert_eq!(TableConfig::new().segment_size(17).segment_size, 16);
        assert_eq!(TableConfig::new().segment_size(0).segment_size, 1);
        assert_eq!(TableConfig::new().segment_size(1).segment_size, 1);
    }

    #[test]
    fn builder_pattern() {
        let config = TableConfig::new()
            .segment_size(64)
            .initial_segments(0)
            .layout(StorageLayout::Columns)
            .growth(GrowthPolicy::Doubling)
            .cache_limit(3);

        assert_eq!(config.segment_size, 64);
        assert_eq!(config.segment_shift(), 6);
        assert_eq!(config.initial_segments, 1);
        assert_eq!(config.layout, StorageLayout::Columns);
        assert_eq!(config.cache_limit, Some(3));
    }

    #[test]
    fn adaptive_grows_by_half() {
        assert_eq!(GrowthPolicy::Adaptive.next_len(16, 0, 16, 16), 24);
        assert_eq!(GrowthPolicy::Adaptive.next_len(1, 0, 1, 1), 2);
    }

    #[test]
    fn adaptive_doubles_until_needed_segment_fits() {
        let len = GrowthPolicy::Adaptive.next_len(16, 0, 100, 16);
        assert!(len > 100);
        assert_eq!(len, 192);
    }

    #[test]
    fn adaptive_shrinks_when_mostly_dead() {
        // 90% of 64 segments consumed, only a few live ones needed
        assert_eq!(GrowthPolicy::Adaptive.next_len(64, 58, 6, 4), 16);
        // 70% consumed
        assert_eq!(GrowthPolicy::Adaptive.next_len(64, 45, 19, 4), 32);
        // 55% consumed, keep the footprint
        assert_eq!(GrowthPolicy::Adaptive.next_len(64, 36, 28, 4), 64);
    }

    #[test]
    fn shrink_never_drops_below_needed() {
        for dead in 0..64 {
            for needed in (64 - dead)..128 {
                let len = GrowthPolicy::Adaptive.next_len(64, dead, needed, 4);
                assert!(len > needed, "dead={dead} needed={needed} len={len}");
            }
        }
    }

    #[test]
    fn doubling_never_shrinks() {
        assert_eq!(GrowthPolicy::Doubling.next_len(64, 60, 4, 4), 128);
        assert_eq!(GrowthPolicy::Doubling.next_len(8, 0, 40, 4), 64);
    }
}
