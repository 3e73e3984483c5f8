//! # Codebrief CLI (`codebrief`)
//!
//! The `codebrief` binary drives the summarization pipeline from the command
//! line.
//!
//! ## Usage
//!
//! ```bash
//! codebrief --config ./codebrief.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `codebrief run` | Summarize the configured source and print the report |
//! | `codebrief sources` | Show the configured source and the units it yields |
//! | `codebrief backends` | List the registered summarization backends |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use codebrief::backend::known_backends;
use codebrief::config;
use codebrief::models::{BatchReport, EntryStatus};
use codebrief::run::{run_batch_with, RunOptions};
use codebrief::sources;

/// Codebrief — function-level source code summarization.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file describing the source, backend, and chunking budget.
#[derive(Parser)]
#[command(
    name = "codebrief",
    about = "Codebrief — harvest source code and summarize it function by function",
    version,
    long_about = "Codebrief harvests Python source from a local directory or a GitHub \
    repository, extracts function definitions, assembles token-budget-bounded chunks, \
    and routes them through a hosted summarization backend into an ordered batch report."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./codebrief.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Summarize the configured source and print a batch report.
    ///
    /// Lists units from the configured source, extracts functions, chunks
    /// them to the token budget, and summarizes each chunk with the
    /// configured backend. Ctrl-C stops dispatch; units already in flight
    /// finish and appear in the report.
    Run {
        /// Print the report as JSON instead of text.
        #[arg(long)]
        json: bool,

        /// Maximum number of units to process.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show the configured source and the units it yields.
    Sources,

    /// List the registered summarization backends.
    Backends,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    // Backend listing needs no config.
    if matches!(&cli.command, Commands::Backends) {
        println!("{:<10} {:<15} MODEL", "NAME", "KIND");
        for (name, kind, model) in known_backends() {
            println!("{:<10} {:<15} {}", name, kind, model);
        }
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Run { json, limit } => {
            let mut options = RunOptions::from_config(&cfg);
            options.limit = limit;

            let cancel = options.cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("interrupted; finishing in-flight units");
                    cancel.cancel();
                }
            });

            let report = run_batch_with(&cfg, options).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Commands::Sources => {
            sources::list_sources(&cfg).await?;
        }
        Commands::Backends => {}
    }

    Ok(())
}

fn print_report(report: &BatchReport) {
    println!(
        "Backend: {}  Units: {}  Elapsed: {} ms",
        report.backend, report.units_discovered, report.elapsed_ms
    );
    println!();

    for entry in &report.entries {
        match &entry.status {
            EntryStatus::Succeeded => {
                println!("[ok]   {} :: {}", entry.unit, entry.subject.label());
                for line in entry.summary.lines() {
                    println!("       {}", line);
                }
            }
            EntryStatus::Failed { reason } => {
                println!("[fail] {} :: {}", entry.unit, entry.subject.label());
                println!("       {}", reason);
            }
        }
    }

    println!();
    println!(
        "{} succeeded, {} failed, {} skipped",
        report.counts.succeeded, report.counts.failed, report.counts.skipped
    );
}
