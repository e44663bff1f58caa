// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Skill Score Aggregator
//!
//! Turns ranked similar patterns into a ranked list of predicted resources.
//! Every pattern contributes to each resource it used:
//!
//! ```text
//! weight = 0.50 * similarity
//!        + 0.25 * quality_score / 100
//!        + 0.15 * success_rate
//!        + 0.10 * min(usage_count / 10, 1)
//! ```
//!
//! Totals are normalized by the largest total, so the top resource always
//! lands at 1.0, then bucketed into tiers. With no similar patterns the
//! aggregator serves a static default ranking for the task type instead of an
//! empty list.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use super::prediction::{ResourcePrediction, SimilarityResult, Tier};

const SIMILARITY_WEIGHT: f64 = 0.50;
const QUALITY_WEIGHT: f64 = 0.25;
const SUCCESS_WEIGHT: f64 = 0.15;
const USAGE_WEIGHT: f64 = 0.10;
const USAGE_SATURATION: f64 = 10.0;

/// Confidence by position in a default list: core, probable, then optional.
const DEFAULT_CONFIDENCES: [f64; 3] = [1.0, 0.80, 0.60];

pub const FALLBACK_TASK_TYPE: &str = "*";

/// Static per-task-type rankings served when nothing was learned yet.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultRankings {
    by_task_type: HashMap<String, Vec<String>>,
}

impl DefaultRankings {
    /// Built-in table. The `"*"` row applies to any unlisted task type.
    pub fn builtin() -> Self {
        let rows: [(&str, [&str; 3]); 7] = [
            ("refactoring", ["code-analysis", "refactoring-patterns", "test-generation"]),
            ("bugfix", ["debugging", "code-analysis", "test-generation"]),
            ("feature", ["code-generation", "test-generation", "documentation"]),
            ("testing", ["test-generation", "code-analysis", "coverage-report"]),
            ("documentation", ["documentation", "code-analysis", "style-guide"]),
            ("review", ["code-review", "security-audit", "style-guide"]),
            (FALLBACK_TASK_TYPE, ["code-analysis", "documentation", "test-generation"]),
        ];

        Self {
            by_task_type: rows
                .into_iter()
                .map(|(task_type, resources)| {
                    (task_type.to_string(), resources.iter().map(|r| r.to_string()).collect())
                })
                .collect(),
        }
    }

    /// Built-in table with configured rows layered on top. Empty rows are ignored.
    pub fn with_overrides(overrides: &HashMap<String, Vec<String>>) -> Self {
        let mut rankings = Self::builtin();
        for (task_type, resources) in overrides {
            if resources.is_empty() {
                continue;
            }
            rankings
                .by_task_type
                .insert(task_type.trim().to_lowercase(), resources.clone());
        }
        rankings
    }

    pub fn for_task_type(&self, task_type: &str) -> Vec<ResourcePrediction> {
        let resources = self
            .by_task_type
            .get(task_type)
            .or_else(|| self.by_task_type.get(FALLBACK_TASK_TYPE))
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut seen = std::collections::HashSet::new();
        resources
            .iter()
            .filter(|r| seen.insert(r.as_str()))
            .enumerate()
            .map(|(position, resource_id)| {
                let confidence = DEFAULT_CONFIDENCES[position.min(DEFAULT_CONFIDENCES.len() - 1)];
                ResourcePrediction {
                    resource_id: resource_id.clone(),
                    confidence,
                    tier: Tier::for_confidence(confidence).unwrap_or(Tier::Optional),
                }
            })
            .collect()
    }
}

impl Default for DefaultRankings {
    fn default() -> Self {
        Self::builtin()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SkillScoreAggregator {
    defaults: DefaultRankings,
}

impl SkillScoreAggregator {
    pub fn new(defaults: DefaultRankings) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> &DefaultRankings {
        &self.defaults
    }

    /// Contribution of one pattern to each resource it used.
    pub fn pattern_weight(result: &SimilarityResult) -> f64 {
        let pattern = &result.pattern;
        let usage = (pattern.usage_count as f64 / USAGE_SATURATION).min(1.0);

        SIMILARITY_WEIGHT * result.score
            + QUALITY_WEIGHT * (pattern.quality_score / 100.0)
            + SUCCESS_WEIGHT * pattern.success_rate
            + USAGE_WEIGHT * usage
    }

    /// Learned ranking, or the defaults for `task_type` when `results` is empty.
    pub fn aggregate(&self, results: &[SimilarityResult], task_type: &str) -> Vec<ResourcePrediction> {
        if results.is_empty() {
            return self.defaults.for_task_type(task_type);
        }
        self.rank(results)
    }

    /// Learned ranking only; empty when `results` is empty.
    pub fn rank(&self, results: &[SimilarityResult]) -> Vec<ResourcePrediction> {
        let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
        for result in results {
            let weight = Self::pattern_weight(result);
            for resource in &result.pattern.resources_used {
                *totals.entry(resource.as_str()).or_insert(0.0) += weight;
            }
        }

        let max_total = totals.values().copied().fold(0.0_f64, f64::max);
        if max_total <= 0.0 {
            return Vec::new();
        }

        let mut predictions: Vec<ResourcePrediction> = totals
            .into_iter()
            .filter_map(|(resource_id, total)| {
                let confidence = if total == max_total { 1.0 } else { (total / max_total).clamp(0.0, 1.0) };
                Tier::for_confidence(confidence).map(|tier| ResourcePrediction {
                    resource_id: resource_id.to_string(),
                    confidence,
                    tier,
                })
            })
            .collect();

        predictions.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.resource_id.cmp(&b.resource_id))
        });
        predictions
    }
}
