//! Benchmark utilities.

use rand::Rng;
use segtable_core::{GrowthPolicy, StorageLayout, TableConfig};

/// Generate `count` random rows of a 64-bit key and a 32-bit payload.
pub fn random_rows(count: usize) -> Vec<(u64, u32)> {
    let mut rng = rand::thread_rng();
    (0..count).map(|_| (rng.gen(), rng.gen())).collect()
}

/// Configurations compared by every benchmark group, with a display label.
pub fn configs() -> Vec<(&'static str, TableConfig)> {
    let base = TableConfig::new().segment_size(256).initial_segments(1);
    vec![
        ("rows", base.clone()),
        ("columns", base.clone().layout(StorageLayout::Columns)),
        ("doubling", base.growth(GrowthPolicy::Doubling)),
    ]
}
