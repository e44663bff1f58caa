// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Pattern store commands
//!
//! Commands: stats, reclaim

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use crate::embedded::EmbeddedPrescient;

#[derive(Args, Debug, Clone)]
pub struct StatsArgs {
    /// Print statistics as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ReclaimArgs {
    /// Fraction of the record limit to free (default: eviction.target_free_fraction)
    #[arg(long, value_name = "FRACTION")]
    pub fraction: Option<f64>,
}

pub async fn stats(args: StatsArgs, prescient: &EmbeddedPrescient) -> Result<()> {
    let stats = prescient
        .predictor()
        .stats()
        .await
        .context("Failed to read pattern store")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let eviction = &prescient.config().eviction;
    println!("{}", "Pattern store:".bold());
    println!("  Location: {}", stats.store);
    println!("  Patterns: {} / {}", stats.patterns, eviction.max_records);
    println!("  Policy: {}", eviction.policy);
    println!();
    println!("{}", "Resource cache:".bold());
    println!("  Resident: {} / {}", stats.cached_resources, stats.cache_capacity);
    println!("  Bytes: {}", stats.cached_bytes);
    Ok(())
}

pub async fn reclaim(args: ReclaimArgs, prescient: &EmbeddedPrescient) -> Result<()> {
    let fraction = args
        .fraction
        .unwrap_or(prescient.config().eviction.target_free_fraction);
    if !(0.0..=1.0).contains(&fraction) {
        bail!("--fraction must be between 0 and 1, got {}", fraction);
    }

    let report = prescient
        .engine()
        .reclaim(fraction)
        .await
        .context("Failed to reclaim pattern store")?;

    println!(
        "{} {} pattern(s) evicted with {} policy, {} remaining",
        "✓".green(),
        report.evicted,
        report.policy,
        report.remaining
    );
    Ok(())
}
