//! Growth command implementation.

use super::{report, CommandError, RunArgs};
use segtable_testkit::stress_growth_then_drain;
use tracing::info;

/// Runs the single-threaded growth check.
pub fn run(args: &RunArgs) -> Result<(), CommandError> {
    let config = args.stress_config();
    info!(
        items = config.operations,
        segment_size = config.table_config().segment_size,
        "starting growth check"
    );
    let result = stress_growth_then_drain(&config);
    report("growth", args, &result)
}
