// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Task commands
//!
//! Commands: predict, record

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;

use prescient_cortex::{Prediction, PredictionBasis, TaskAttributes, Tier};

use crate::embedded::EmbeddedPrescient;

/// Attributes describing a task. Every flag is optional.
#[derive(Args, Debug, Clone, Default)]
pub struct TaskArgs {
    /// Read attributes from a JSON file; flags override its fields
    #[arg(long, value_name = "FILE")]
    pub attributes: Option<PathBuf>,

    /// Task type (refactoring, bugfix, feature, ...)
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    pub task_type: Option<String>,

    /// Free-text task description; keywords are extracted from it
    #[arg(short, long)]
    pub description: Option<String>,

    /// Explicit keywords (repeatable or comma separated)
    #[arg(short, long = "keyword", value_delimiter = ',')]
    pub keywords: Vec<String>,

    #[arg(short, long)]
    pub language: Option<String>,

    #[arg(short, long)]
    pub framework: Option<String>,

    /// low, medium or high
    #[arg(long)]
    pub complexity: Option<String>,

    /// Files the task touches (repeatable)
    #[arg(long = "file", value_name = "PATH")]
    pub files: Vec<String>,
}

impl TaskArgs {
    pub fn to_attributes(&self) -> Result<TaskAttributes> {
        let mut attributes = match &self.attributes {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read task attributes {:?}", path))?;
                serde_json::from_str::<TaskAttributes>(&raw)
                    .with_context(|| format!("Failed to parse task attributes {:?}", path))?
            }
            None => TaskAttributes::default(),
        };

        if self.task_type.is_some() {
            attributes.task_type = self.task_type.clone();
        }
        if self.description.is_some() {
            attributes.description = self.description.clone();
        }
        if self.language.is_some() {
            attributes.language = self.language.clone();
        }
        if self.framework.is_some() {
            attributes.framework = self.framework.clone();
        }
        if self.complexity.is_some() {
            attributes.complexity = self.complexity.clone();
        }
        attributes.keywords.extend(self.keywords.iter().cloned());
        attributes.files.extend(self.files.iter().cloned());

        Ok(attributes)
    }
}

#[derive(Args, Debug, Clone)]
pub struct PredictArgs {
    #[command(flatten)]
    pub task: TaskArgs,

    /// Load core and probable resources after predicting
    #[arg(long)]
    pub preload: bool,

    /// How long to wait for core resources when preloading (milliseconds)
    #[arg(long, default_value_t = 5000, value_name = "MS")]
    pub wait_ms: u64,

    /// Print a readable summary instead of JSON
    #[arg(long)]
    pub human: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RecordArgs {
    #[command(flatten)]
    pub task: TaskArgs,

    /// Resources the task actually used (repeatable or comma separated)
    #[arg(short, long = "resource", value_delimiter = ',', required = true)]
    pub resources: Vec<String>,

    /// Quality score between 0 and 100
    #[arg(short, long, default_value_t = 100.0)]
    pub quality: f64,

    /// The task did not succeed
    #[arg(long)]
    pub failed: bool,
}

pub async fn predict(args: PredictArgs, prescient: &EmbeddedPrescient) -> Result<()> {
    let attributes = args.task.to_attributes()?;
    let predictor = prescient.predictor();
    let prediction = predictor.predict(&attributes).await;

    if !args.preload {
        if args.human {
            print_prediction(&prediction);
        } else {
            println!("{}", serde_json::to_string_pretty(&prediction)?);
        }
        return Ok(());
    }

    let plan = predictor.preload(&prediction);
    let readiness = predictor
        .wait_for_core(&plan, Duration::from_millis(args.wait_ms))
        .await;
    prescient.shutdown().await;

    if args.human {
        print_prediction(&prediction);
        println!();
        println!("{}", "Preload:".bold());
        for id in &readiness.ready {
            println!("  {} {}", "✓".green(), id);
        }
        for id in &readiness.missing {
            println!("  {} {}", "✗".red(), id);
        }
        if !plan.deferred.is_empty() {
            println!("  deferred: {}", plan.deferred.join(", ").dimmed());
        }
    } else {
        let output = serde_json::json!({
            "prediction": prediction,
            "preload": { "plan": plan, "core": readiness },
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    }

    Ok(())
}

pub async fn record(args: RecordArgs, prescient: &EmbeddedPrescient) -> Result<()> {
    if !(0.0..=100.0).contains(&args.quality) {
        bail!("--quality must be between 0 and 100, got {}", args.quality);
    }

    let attributes = args.task.to_attributes()?;
    let id = prescient
        .predictor()
        .record_task_outcome(&attributes, args.resources, args.quality, !args.failed)
        .await
        .context("Failed to record task outcome")?;

    println!("{} {}", "✓ Recorded pattern".green(), id);
    Ok(())
}

fn print_prediction(prediction: &Prediction) {
    println!("{} {}", "Fingerprint:".bold(), prediction.fingerprint);

    match &prediction.basis {
        PredictionBasis::Matched { patterns } => {
            println!("{} {} similar pattern(s)", "Basis:".bold(), patterns);
        }
        PredictionBasis::NoSimilarPatterns => {
            println!("{} {}", "Basis:".bold(), "defaults (no similar patterns)".yellow());
        }
        PredictionBasis::StoreUnavailable { retryable, reason } => {
            println!("{} {}", "Basis:".bold(), "defaults (store unavailable)".yellow());
            println!("  {} (retryable: {})", reason.dimmed(), retryable);
        }
    }
    println!();

    for tier in [Tier::Core, Tier::Probable, Tier::Optional] {
        let mut entries = prediction.in_tier(tier).peekable();
        if entries.peek().is_none() {
            continue;
        }
        println!("{}", format!("{tier}:").bold());
        for entry in entries {
            println!("  {:<32} {:.2}", entry.resource_id, entry.confidence);
        }
    }

    if !prediction.similar.is_empty() {
        println!();
        println!("{}", "Similar patterns:".bold());
        for similar in &prediction.similar {
            println!("  {} {:.2}", similar.pattern_id, similar.score);
        }
    }
}
