//! CLI command implementations.

pub mod growth;
pub mod stress;

use clap::{Args, ValueEnum};
use segtable_core::{GrowthPolicy, StorageLayout};
use segtable_testkit::{StressConfig, StressTestResult};
use serde::Serialize;
use thiserror::Error;

/// Errors reported by a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The run completed but its output did not match its input.
    #[error("{command}: verification failed")]
    VerificationFailed {
        /// Command that failed.
        command: &'static str,
    },

    /// The JSON report could not be produced.
    #[error("failed to encode report: {0}")]
    Report(#[from] serde_json::Error),
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    Text,
    /// JSON report on stdout
    Json,
}

/// Segment storage layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LayoutArg {
    /// One array of row tuples per segment
    Rows,
    /// One array per field per segment
    Columns,
}

impl From<LayoutArg> for StorageLayout {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Rows => StorageLayout::Rows,
            LayoutArg::Columns => StorageLayout::Columns,
        }
    }
}

/// Growth heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    /// Grow by half, shrink once most segments are dead
    Adaptive,
    /// Always double, never shrink
    Doubling,
}

impl From<PolicyArg> for GrowthPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Adaptive => GrowthPolicy::Adaptive,
            PolicyArg::Doubling => GrowthPolicy::Doubling,
        }
    }
}

/// Options shared by every run command.
#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Worker threads (producers, and as many consumers for the queue)
    #[arg(short, long, default_value_t = 4)]
    pub threads: usize,

    /// Rows pushed in total
    #[arg(short, long, default_value_t = 100_000)]
    pub items: usize,

    /// Rows per segment, rounded down to a power of two
    #[arg(long, default_value_t = 16)]
    pub segment_size: usize,

    /// Segments in the first directory
    #[arg(long, default_value_t = 1)]
    pub initial_segments: usize,

    /// Segment storage layout
    #[arg(long, value_enum, default_value_t = LayoutArg::Rows)]
    pub layout: LayoutArg,

    /// Growth heuristic
    #[arg(long, value_enum, default_value_t = PolicyArg::Adaptive)]
    pub policy: PolicyArg,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

impl RunArgs {
    /// Stress configuration described by these options.
    pub fn stress_config(&self) -> StressConfig {
        StressConfig {
            operations: self.items,
            threads: self.threads.max(1),
            segment_size: self.segment_size,
            initial_segments: self.initial_segments,
            layout: self.layout.into(),
            growth: self.policy.into(),
        }
    }
}

#[derive(Serialize)]
struct Report<'a> {
    command: &'static str,
    threads: usize,
    items: usize,
    segment_size: usize,
    initial_segments: usize,
    #[serde(flatten)]
    result: &'a StressTestResult,
}

/// Prints `result` in the requested format and turns a failed verification
/// into an error.
pub fn report(
    command: &'static str,
    args: &RunArgs,
    result: &StressTestResult,
) -> Result<(), CommandError> {
    match args.format {
        OutputFormat::Text => result.print_summary(command),
        OutputFormat::Json => {
            let report = Report {
                command,
                threads: args.threads,
                items: args.items,
                segment_size: args.segment_size,
                initial_segments: args.initial_segments,
                result,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    if result.verified {
        Ok(())
    } else {
        Err(CommandError::VerificationFailed { command })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use segtable_core::StatsSnapshot;
    use std::time::Duration;

    fn args(format: OutputFormat) -> RunArgs {
        RunArgs {
            threads: 0,
            items: 10,
            segment_size: 20,
            initial_segments: 2,
            layout: LayoutArg::Columns,
            policy: PolicyArg::Doubling,
            format,
        }
    }

    #[test]
    fn stress_config_maps_every_option() {
        let config = args(OutputFormat::Text).stress_config();
        assert_eq!(config.threads, 1);
        assert_eq!(config.operations, 10);
        assert_eq!(config.layout, StorageLayout::Columns);
        assert_eq!(config.growth, GrowthPolicy::Doubling);
        assert_eq!(config.table_config().segment_size, 16);
    }

    #[test]
    fn failed_verification_is_an_error() {
        let result = StressTestResult::new(1, 0, Duration::ZERO, false, StatsSnapshot::default());
        let err = report("growth", &args(OutputFormat::Json), &result).unwrap_err();
        assert_eq!(err.to_string(), "growth: verification failed");

        let result = StressTestResult { verified: true, ..result };
        assert!(report("growth", &args(OutputFormat::Json), &result).is_ok());
    }
}
