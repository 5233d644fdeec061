//! Gridlock Command-Line Interface
//!
//! Runs the deadlock simulation to completion and renders the engine's
//! event stream through structured logging.
//!
//! # Usage
//!
//! ```bash
//! # Default scenario: 4 transactions over resources X and Y
//! gridlock
//!
//! # Manufacture circular wait and watch it get resolved
//! gridlock --force-deadlock
//!
//! # Reproducible timing
//! gridlock -n 8 --seed 7 --min-delay-ms 50 --max-delay-ms 200
//! ```

use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gridlock_txn::{ResourceId, Simulation, SimulationConfig, SimulationReport};

/// Concurrent-transaction deadlock simulator
#[derive(Parser, Debug)]
#[command(
    name = "gridlock",
    version,
    about = "Simulates concurrent transactions, detects deadlocks, and resolves them",
    long_about = "Runs a set of concurrent transactions competing for shared exclusive\n\
                  resources. Circular waits are detected through a wait-for graph and\n\
                  resolved by aborting the youngest transaction in the cycle, which\n\
                  retries until every transaction has committed."
)]
struct Args {
    /// Number of concurrent transactions
    #[arg(short = 'n', long, default_value_t = 4, env = "GRIDLOCK_TRANSACTIONS")]
    transactions: usize,

    /// Seed for the randomized delays
    #[arg(long, default_value_t = 42, env = "GRIDLOCK_SEED")]
    seed: u64,

    /// Minimum per-step delay in milliseconds
    #[arg(long, default_value_t = 100, env = "GRIDLOCK_MIN_DELAY_MS")]
    min_delay_ms: u64,

    /// Maximum per-step delay in milliseconds
    #[arg(long, default_value_t = 500, env = "GRIDLOCK_MAX_DELAY_MS")]
    max_delay_ms: u64,

    /// Reverse the acquisition order of even transactions to manufacture
    /// circular wait
    #[arg(long)]
    force_deadlock: bool,

    /// Comma-separated resource keys
    #[arg(long, default_value = "X,Y", value_delimiter = ',')]
    resources: Vec<String>,

    /// Enable verbose output
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Suppress the event log, print only the final report
    #[arg(short = 'q', long)]
    quiet: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let config = SimulationConfig {
        transactions: args.transactions,
        resources: args.resources.iter().map(ResourceId::new).collect(),
        seed: args.seed,
        min_delay: Duration::from_millis(args.min_delay_ms),
        max_delay: Duration::from_millis(args.max_delay_ms),
        force_deadlock: args.force_deadlock,
    };

    let sim = Simulation::new(config)?;
    let events = sim.subscribe();
    let logger = thread::spawn(move || {
        for event in events {
            info!("{event}");
        }
    });

    let report = sim.run()?;

    // Dropping the simulation drops the last event sender, which ends
    // the logger loop once the stream is drained.
    drop(sim);
    logger
        .join()
        .map_err(|_| anyhow!("event logger thread panicked"))?;

    print_report(&report);
    Ok(())
}

fn init_logging(verbose: bool, quiet: bool) {
    let default = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn print_report(report: &SimulationReport) {
    println!();
    println!("Run report");
    println!("  transactions: {}", report.transactions);
    println!("  deadlocks:    {}", report.deadlocks);
    println!("  aborts:       {}", report.aborts);
    println!("  commits:      {}", report.commits);
    println!("  avg wait:     {:?}", report.average_wait);
    println!();
    println!("Demonstrated capabilities");
    for (capability, raised) in &report.capabilities {
        let check = if *raised { '✔' } else { '✗' };
        println!("  {check} {}", capability.label());
    }
}
