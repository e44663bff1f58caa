// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Prescient CLI
//!
//! The `prescient` binary predicts which skills a task will need, preloads
//! them, and records what was actually used so later predictions improve.
//!
//! ## Commands
//!
//! - `prescient predict` - Rank resources for a task, optionally preloading them
//! - `prescient record` - Record the resources a finished task used
//! - `prescient stats` - Pattern store and cache statistics
//! - `prescient reclaim` - Run the eviction policy against the pattern store
//! - `prescient config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing::debug;

use prescient_cli::commands::{self, ConfigCommand, PredictArgs, ReclaimArgs, RecordArgs, StatsArgs};
use prescient_cli::embedded::EmbeddedPrescient;

/// Prescient - learn task patterns and preload the skills they need
#[derive(Parser)]
#[command(name = "prescient")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(short, long, global = true, env = "PRESCIENT_CONFIG_PATH", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Pattern store directory (overrides store.roots)
    #[arg(long, global = true, value_name = "DIR")]
    store: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "PRESCIENT_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict the resources a task will need
    Predict(PredictArgs),

    /// Record the resources a finished task used
    Record(RecordArgs),

    /// Show pattern store and cache statistics
    Stats(StatsArgs),

    /// Evict patterns using the configured policy
    Reclaim(ReclaimArgs),

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    let Some(command) = cli.command else {
        eprintln!("{}", "No command specified. Use --help for usage.".yellow());
        std::process::exit(1);
    };

    let open = || -> Result<EmbeddedPrescient> {
        let prescient = EmbeddedPrescient::new(cli.config.clone(), cli.store.clone())?;
        debug!(store = %prescient.store().path().display(), "Pattern store opened");
        Ok(prescient)
    };

    match command {
        Commands::Predict(args) => commands::task::predict(args, &open()?).await,
        Commands::Record(args) => commands::task::record(args, &open()?).await,
        Commands::Stats(args) => commands::store::stats(args, &open()?).await,
        Commands::Reclaim(args) => commands::store::reclaim(args, &open()?).await,
        Commands::Config { command } => commands::config::handle_command(command, cli.config.clone()).await,
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    Ok(())
}
