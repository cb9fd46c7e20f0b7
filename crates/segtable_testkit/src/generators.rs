//! Property-based test generators using proptest.
//!
//! Provides strategies for table configurations and container operation
//! sequences, plus the sequential models the sequences are checked against.

use proptest::prelude::*;
use segtable_core::{GrowthPolicy, StorageLayout, TableConfig};
use std::collections::VecDeque;

/// Strategy for storage layouts.
pub fn layout_strategy() -> impl Strategy<Value = StorageLayout> {
    prop_oneof![Just(StorageLayout::Rows), Just(StorageLayout::Columns)]
}

/// Strategy for growth policies.
pub fn growth_strategy() -> impl Strategy<Value = GrowthPolicy> {
    prop_oneof![Just(GrowthPolicy::Adaptive), Just(GrowthPolicy::Doubling)]
}

/// Strategy for small configurations that grow often.
pub fn config_strategy() -> impl Strategy<Value = TableConfig> {
    (
        0u32..6,
        1usize..4,
        layout_strategy(),
        growth_strategy(),
        prop::option::of(0usize..16),
    )
        .prop_map(|(shift, initial, layout, growth, cache_limit)| {
            let config = TableConfig::new()
                .segment_size(1 << shift)
                .initial_segments(initial)
                .layout(layout)
                .growth(growth);
            match cache_limit {
                Some(limit) => config.cache_limit(limit),
                None => config,
            }
        })
}

/// A single container operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerOperation {
    /// Push a value
    Push(u32),
    /// Pop a value
    Pop,
}

/// Strategy for container operations, biased towards pushes so sequences
/// actually grow the table.
pub fn container_operation_strategy() -> impl Strategy<Value = ContainerOperation> {
    prop_oneof![
        3 => any::<u32>().prop_map(ContainerOperation::Push),
        2 => Just(ContainerOperation::Pop),
    ]
}

/// Strategy for a sequence of container operations.
pub fn operation_sequence_strategy(
    max_len: usize,
) -> impl Strategy<Value = Vec<ContainerOperation>> {
    prop::collection::vec(container_operation_strategy(), 0..max_len)
}

/// Sequential reference stack.
#[derive(Debug, Default)]
pub struct StackModel(Vec<u32>);

impl StackModel {
    /// Applies `op` and returns what a pop yields.
    pub fn apply(&mut self, op: ContainerOperation) -> Option<u32> {
        match op {
            ContainerOperation::Push(v) => {
                self.0.push(v);
                None
            }
            ContainerOperation::Pop => self.0.pop(),
        }
    }

    /// Values held, oldest first.
    pub fn values(&self) -> &[u32] {
        &self.0
    }
}

/// Sequential reference queue.
#[derive(Debug, Default)]
pub struct QueueModel(VecDeque<u32>);

impl QueueModel {
    /// Applies `op` and returns what a pop yields.
    pub fn apply(&mut self, op: ContainerOperation) -> Option<u32> {
        match op {
            ContainerOperation::Push(v) => {
                self.0.push_back(v);
                None
            }
            ContainerOperation::Pop => self.0.pop_front(),
        }
    }

    /// Number of values held.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if nothing is held.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Configuration for property test runs.
#[derive(Debug, Clone)]
pub struct PropertyTestConfig {
    /// Number of test cases.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropertyTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropertyTestConfig {
    /// Quick test configuration (fewer cases).
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to a proptest config.
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use segtable_core::{Queue, Stack};

    proptest! {
        #![proptest_config(PropertyTestConfig::quick().to_proptest_config())]

        #[test]
        fn configs_are_normalised(config in config_strategy()) {
            prop_assert!(config.segment_size.is_power_of_two());
            prop_assert!(config.initial_segments >= 1);
        }

        #[test]
        fn stack_matches_model(
            config in config_strategy(),
            ops in operation_sequence_strategy(300),
        ) {
            let mut stack: Stack<(u32,)> = Stack::with_config(config);
            let mut model = StackModel::default();
            for op in ops {
                let expected = model.apply(op);
                match op {
                    ContainerOperation::Push(v) => {
                        stack.push((v,)).unwrap();
                    }
                    ContainerOperation::Pop => {
                        prop_assert_eq!(stack.pop().map(|(v,)| v), expected);
                    }
                }
                prop_assert_eq!(stack.size(), model.values().len());
            }
            for (i, v) in model.values().iter().enumerate() {
                prop_assert_eq!(stack.get::<0>(i), Some(v));
            }
        }

        #[test]
        fn queue_matches_model(
            config in config_strategy(),
            ops in operation_sequence_strategy(300),
        ) {
            let queue: Queue<(u32,)> = Queue::with_config(config);
            let mut model = QueueModel::default();
            for op in ops {
                let expected = model.apply(op);
                match op {
                    ContainerOperation::Push(v) => {
                        queue.push((v,)).unwrap();
                    }
                    ContainerOperation::Pop => {
                        prop_assert_eq!(queue.pop().map(|(v,)| v), expected);
                    }
                }
                prop_assert_eq!(queue.size(), model.len());
            }
        }
    }
}
