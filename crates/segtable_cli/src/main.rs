//! segtable CLI
//!
//! Command-line drivers that exercise the lock-free containers and report
//! throughput plus growth statistics.
//!
//! # Commands
//!
//! - `stress-queue` - Producers against consumers on one queue
//! - `stress-stack` - Threads pushing and popping one stack
//! - `growth` - Single-threaded growth with read-back checks, then drain

mod commands;

use clap::{Parser, Subcommand};
use commands::RunArgs;
use tracing_subscriber::EnvFilter;

/// segtable container stress tools.
#[derive(Parser)]
#[command(name = "segtable")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run producers against consumers on one queue
    StressQueue {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Run threads pushing then popping one stack
    StressStack {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Push with read-back checks after every growth, then drain
    Growth {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::StressQueue { run } => {
            commands::stress::run_queue(&run)?;
        }
        Commands::StressStack { run } => {
            commands::stress::run_stack(&run)?;
        }
        Commands::Growth { run } => {
            commands::growth::run(&run)?;
        }
        Commands::Version => {
            println!("segtable CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
