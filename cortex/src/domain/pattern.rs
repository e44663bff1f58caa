// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

use super::fingerprint::Fingerprint;

/// Pattern identifier. Generated as a UUID, but any string read from a store is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternId(pub String);

impl PatternId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PatternId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PatternId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One historically completed task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRecord {
    pub id: PatternId,

    #[serde(default)]
    pub fingerprint: Fingerprint,

    #[serde(default)]
    pub resources_used: BTreeSet<String>,

    /// 0–100
    #[serde(default)]
    pub quality_score: f64,

    /// 0.0–1.0, running average across reuses
    #[serde(default)]
    pub success_rate: f64,

    #[serde(default = "default_usage_count")]
    pub usage_count: u64,

    #[serde(default = "epoch")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "epoch")]
    pub updated_at: DateTime<Utc>,
}

impl PatternRecord {
    pub fn new<I, S>(fingerprint: Fingerprint, resources_used: I, quality_score: f64, success: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let now = Utc::now();
        Self {
            id: PatternId::new(),
            fingerprint,
            resources_used: resources_used.into_iter().map(Into::into).collect(),
            quality_score: clamp_quality(quality_score),
            success_rate: if success { 1.0 } else { 0.0 },
            usage_count: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Folds one more outcome into the running averages.
    ///
    /// `usage_count` only ever grows; quality and success are averaged over
    /// every recorded use.
    pub fn record_reuse(&mut self, quality_score: f64, success: bool) {
        let previous = self.usage_count.max(1) as f64;
        let outcome = if success { 1.0 } else { 0.0 };

        self.success_rate = ((self.success_rate * previous + outcome) / (previous + 1.0)).clamp(0.0, 1.0);
        self.quality_score = clamp_quality((self.quality_score * previous + quality_score) / (previous + 1.0));
        self.usage_count = self.usage_count.saturating_add(1);
        self.updated_at = Utc::now();
    }

    /// Whether this record describes the same fingerprint and resource set.
    pub fn describes(&self, fingerprint: &Fingerprint, resources_used: &BTreeSet<String>) -> bool {
        &self.fingerprint == fingerprint && &self.resources_used == resources_used
    }
}

fn clamp_quality(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 100.0)
    }
}

fn default_usage_count() -> u64 {
    1
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fingerprint::Complexity;

    fn fingerprint() -> Fingerprint {
        Fingerprint::new("bugfix", ["auth"], "rust", "axum", Complexity::Medium)
    }

    #[test]
    fn test_new_record() {
        let record = PatternRecord::new(fingerprint(), ["debugging", "code-analysis"], 140.0, true);

        assert_eq!(record.quality_score, 100.0);
        assert_eq!(record.success_rate, 1.0);
        assert_eq!(record.usage_count, 1);
        assert_eq!(record.resources_used.len(), 2);
        assert_eq!(record.created_at, record.updated_at);
    }

    #[test]
    fn test_record_reuse_running_average() {
        let mut record = PatternRecord::new(fingerprint(), ["debugging"], 80.0, true);

        record.record_reuse(40.0, false);
        assert_eq!(record.usage_count, 2);
        assert_eq!(record.success_rate, 0.5);
        assert_eq!(record.quality_score, 60.0);

        record.record_reuse(60.0, true);
        assert_eq!(record.usage_count, 3);
        assert!((record.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(record.quality_score, 60.0);
    }

    #[test]
    fn test_missing_fields_are_defaulted() {
        let record: PatternRecord = serde_json::from_str(r#"{"id": "pattern-legacy-1"}"#).unwrap();

        assert_eq!(record.id.as_str(), "pattern-legacy-1");
        assert_eq!(record.fingerprint, Fingerprint::default());
        assert!(record.resources_used.is_empty());
        assert_eq!(record.usage_count, 1);
        assert_eq!(record.created_at, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_missing_id_is_rejected() {
        let result = serde_json::from_str::<PatternRecord>(r#"{"quality_score": 10}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_describes() {
        let record = PatternRecord::new(fingerprint(), ["debugging"], 80.0, true);
        let same: BTreeSet<String> = ["debugging".to_string()].into();
        let other: BTreeSet<String> = ["profiling".to_string()].into();

        assert!(record.describes(&fingerprint(), &same));
        assert!(!record.describes(&fingerprint(), &other));
    }
}
