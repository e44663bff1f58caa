// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Similarity Matcher
//!
//! Scores stored patterns against a query fingerprint with fixed weights:
//!
//! | Component | Weight | Match |
//! |-----------|--------|-------|
//! | type | 0.35 | exact |
//! | language | 0.25 | exact |
//! | framework | 0.20 | exact |
//! | complexity | 0.10 | exact |
//! | keywords | 0.10 | Jaccard overlap |
//!
//! Only patterns scoring at least [`SIMILARITY_THRESHOLD`] survive, and at
//! most [`TOP_N`] are returned. The matcher is pure and never touches storage;
//! callers hand it a snapshot.

use std::cmp::Ordering;

use super::fingerprint::Fingerprint;
use super::pattern::PatternRecord;
use super::prediction::{SimilarityOutcome, SimilarityResult};

pub const SIMILARITY_THRESHOLD: f64 = 0.70;
pub const TOP_N: usize = 10;

// Weights in percentage points so exact matches sum without rounding drift.
const TYPE_WEIGHT: f64 = 35.0;
const LANGUAGE_WEIGHT: f64 = 25.0;
const FRAMEWORK_WEIGHT: f64 = 20.0;
const COMPLEXITY_WEIGHT: f64 = 10.0;
const KEYWORD_WEIGHT: f64 = 10.0;

#[derive(Debug, Clone)]
pub struct SimilarityMatcher {
    threshold: f64,
    limit: usize,
}

impl SimilarityMatcher {
    pub fn new() -> Self {
        Self {
            threshold: SIMILARITY_THRESHOLD,
            limit: TOP_N,
        }
    }

    /// Similarity in `[0, 1]`; identical fingerprints score exactly 1.0.
    pub fn score(query: &Fingerprint, candidate: &Fingerprint) -> f64 {
        let exact = |a: &str, b: &str| if a == b { 1.0 } else { 0.0 };

        let points = TYPE_WEIGHT * exact(&query.task_type, &candidate.task_type)
            + LANGUAGE_WEIGHT * exact(&query.language, &candidate.language)
            + FRAMEWORK_WEIGHT * exact(&query.framework, &candidate.framework)
            + COMPLEXITY_WEIGHT * if query.complexity == candidate.complexity { 1.0 } else { 0.0 }
            + KEYWORD_WEIGHT * query.keywords.overlap(&candidate.keywords);

        (points / 100.0).clamp(0.0, 1.0)
    }

    /// Ranked matches, best first. Ties go to the more used, then more recently
    /// updated pattern, then the lower id.
    pub fn find_similar<'a, I>(&self, query: &Fingerprint, patterns: I) -> SimilarityOutcome
    where
        I: IntoIterator<Item = &'a PatternRecord>,
    {
        let mut results: Vec<SimilarityResult> = patterns
            .into_iter()
            .filter_map(|pattern| {
                let score = Self::score(query, &pattern.fingerprint);
                (score >= self.threshold).then(|| SimilarityResult {
                    score,
                    pattern: pattern.clone(),
                })
            })
            .collect();

        if results.is_empty() {
            return SimilarityOutcome::NoMatch;
        }

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.pattern.usage_count.cmp(&a.pattern.usage_count))
                .then_with(|| b.pattern.updated_at.cmp(&a.pattern.updated_at))
                .then_with(|| a.pattern.id.cmp(&b.pattern.id))
        });
        results.truncate(self.limit);

        SimilarityOutcome::Matches(results)
    }
}

impl Default for SimilarityMatcher {
    fn default() -> Self {
        Self::new()
    }
}
