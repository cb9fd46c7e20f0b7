//! Concurrent stress commands.

use super::{report, CommandError, RunArgs};
use segtable_testkit::{stress_queue_mpmc, stress_stack_mpmc};
use tracing::info;

/// Runs the queue producer/consumer stress.
pub fn run_queue(args: &RunArgs) -> Result<(), CommandError> {
    let config = args.stress_config();
    info!(
        threads = config.threads,
        items = config.operations,
        "starting queue stress"
    );
    let result = stress_queue_mpmc(&config);
    report("stress-queue", args, &result)
}

/// Runs the shared stack stress.
pub fn run_stack(args: &RunArgs) -> Result<(), CommandError> {
    let config = args.stress_config();
    info!(
        threads = config.threads,
        items = config.operations,
        "starting stack stress"
    );
    let result = stress_stack_mpmc(&config);
    report("stress-stack", args, &result)
}
