//! # srp CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use purchase_cli::graph::{run_graph, GraphArgs};
use purchase_cli::scenario::{run_scenario, RunArgs};

/// Safe remote purchase escrow toolkit.
///
/// Runs purchase scenarios against an in-process escrow host and prints
/// the state machine's transition table.
#[derive(Parser, Debug)]
#[command(name = "srp", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute a YAML scenario and print a JSON report.
    Run(RunArgs),

    /// Print the transition table for a settlement rule.
    Graph(GraphArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    tracing::debug!("srp CLI v{} starting", env!("CARGO_PKG_VERSION"));

    let result = match cli.command {
        Commands::Run(args) => run_scenario(&args),
        Commands::Graph(args) => run_graph(&args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(purchase_cli::EXIT_OPERATIONAL)
        }
    }
}
