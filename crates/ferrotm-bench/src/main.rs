//! # ftm
//!
//! Workload driver for the ferrotm transactional-memory runtime.
//!
//! ## Usage
//!
//! ```bash
//! # List protocols
//! ftm algorithms
//!
//! # Contended counter under Cohorts with 8 threads
//! ftm run --workload counter --algorithm cohorts --threads 8
//!
//! # Bank transfers with a config file, JSON report
//! ftm --json run --workload bank --config ftm.toml
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;
mod error;
mod output;
mod workload;

pub use error::BenchError;

/// ferrotm workload driver
#[derive(Parser, Debug)]
#[command(name = "ftm")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// CLI commands
#[derive(Debug, Subcommand)]
enum Commands {
    /// List available protocols
    Algorithms,
    /// Run a workload and verify its invariant
    Run(commands::run::RunArgs),
}

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let (text_layer, json_layer) = if cli.log_json {
        (None, Some(fmt::layer().json().with_writer(std::io::stderr)))
    } else {
        (Some(fmt::layer().with_writer(std::io::stderr)), None)
    };
    tracing_subscriber::registry()
        .with(text_layer)
        .with(json_layer)
        .with(filter)
        .init();

    let json = cli.json;
    if let Err(e) = run(cli) {
        if json {
            println!(
                "{}",
                serde_json::json!({
                    "error": format!("{:#}", e),
                    "success": false
                })
            );
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Algorithms => commands::algorithms::execute(cli.json).context("listing algorithms"),
        Commands::Run(args) => {
            let label = args.workload.name();
            args.execute(cli.json)
                .with_context(|| format!("running {} workload", label))
        }
    }
}
