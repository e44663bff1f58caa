// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Ephemeral values produced by the matching pipeline. None of these are persisted.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::fingerprint::Fingerprint;
use super::pattern::{PatternId, PatternRecord};

pub const CORE_THRESHOLD: f64 = 0.90;
pub const PROBABLE_THRESHOLD: f64 = 0.70;
pub const OPTIONAL_THRESHOLD: f64 = 0.50;

/// A stored pattern scored against a query fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityResult {
    pub score: f64,
    pub pattern: PatternRecord,
}

impl SimilarityResult {
    pub fn pattern_id(&self) -> &PatternId {
        &self.pattern.id
    }
}

/// Output of the similarity matcher.
///
/// `NoMatch` means the store was readable but nothing cleared the threshold;
/// it is never used to signal an unavailable store.
#[derive(Debug, Clone, PartialEq)]
pub enum SimilarityOutcome {
    Matches(Vec<SimilarityResult>),
    NoMatch,
}

impl SimilarityOutcome {
    pub fn results(&self) -> &[SimilarityResult] {
        match self {
            Self::Matches(results) => results,
            Self::NoMatch => &[],
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, Self::Matches(_))
    }
}

/// Confidence bucket that decides load urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Loaded eagerly, in parallel
    Core,
    /// Loaded in parallel, may land after the caller's analysis
    Probable,
    /// Loaded only on explicit request
    Optional,
}

impl Tier {
    /// `None` below the optional threshold; those resources are discarded.
    pub fn for_confidence(confidence: f64) -> Option<Self> {
        if confidence >= CORE_THRESHOLD {
            Some(Self::Core)
        } else if confidence >= PROBABLE_THRESHOLD {
            Some(Self::Probable)
        } else if confidence >= OPTIONAL_THRESHOLD {
            Some(Self::Optional)
        } else {
            None
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Core => "core",
            Self::Probable => "probable",
            Self::Optional => "optional",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcePrediction {
    pub resource_id: String,
    pub confidence: f64,
    pub tier: Tier,
}

/// Where a ranking came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PredictionBasis {
    /// Learned from this many similar patterns
    Matched { patterns: usize },
    /// Store readable, nothing similar enough; static defaults served
    NoSimilarPatterns,
    /// Store could not be read; static defaults served
    StoreUnavailable { retryable: bool, reason: String },
}

/// Result of `predict`. Always carries at least one prediction.
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub fingerprint: Fingerprint,
    pub basis: PredictionBasis,
    pub predictions: Vec<ResourcePrediction>,
    pub similar: Vec<SimilarPattern>,
}

impl Prediction {
    pub fn in_tier(&self, tier: Tier) -> impl Iterator<Item = &ResourcePrediction> {
        self.predictions.iter().filter(move |p| p.tier == tier)
    }

    pub fn is_learned(&self) -> bool {
        matches!(self.basis, PredictionBasis::Matched { .. })
    }
}

/// `(pattern_id, score)` view of a similarity result, as reported to consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarPattern {
    pub pattern_id: PatternId,
    pub score: f64,
}

impl From<&SimilarityResult> for SimilarPattern {
    fn from(result: &SimilarityResult) -> Self {
        Self {
            pattern_id: result.pattern.id.clone(),
            score: result.score,
        }
    }
}
