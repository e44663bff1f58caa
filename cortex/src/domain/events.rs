// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Domain events for the prediction bounded context.
//! Published to the event bus for observers; nothing in the pipeline depends on them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::eviction::PolicyKind;
use super::pattern::PatternId;
use super::prediction::Tier;

/// Which store an eviction ran against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionTarget {
    PatternStore,
    ResourceCache,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PrescientEvent {
    // Learning

    /// A new pattern was appended to the store
    PatternRecorded {
        pattern_id: PatternId,
        task_type: String,
        resource_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// An existing pattern absorbed another outcome
    PatternReinforced {
        pattern_id: PatternId,
        usage_count: u64,
        success_rate: f64,
        timestamp: DateTime<Utc>,
    },

    /// Prediction found nothing learned and served the static ranking
    DefaultsServed {
        task_type: String,
        store_available: bool,
        timestamp: DateTime<Utc>,
    },

    // Loading

    PreloadStarted {
        core: usize,
        probable: usize,
        deferred: usize,
        timestamp: DateTime<Utc>,
    },

    ResourceLoaded {
        resource_id: String,
        tier: Option<Tier>,
        bytes: u64,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    ResourceLoadFailed {
        resource_id: String,
        tier: Option<Tier>,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    // Eviction

    PatternsEvicted {
        target: EvictionTarget,
        policy: PolicyKind,
        count: usize,
        remaining: usize,
        timestamp: DateTime<Utc>,
    },

    /// The adaptive policy resolved to a different concrete policy than last run
    EvictionPolicySwitched {
        from: PolicyKind,
        to: PolicyKind,
        hit_rate: Option<f64>,
        timestamp: DateTime<Utc>,
    },
}

impl PrescientEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            PrescientEvent::PatternRecorded { timestamp, .. } => *timestamp,
            PrescientEvent::PatternReinforced { timestamp, .. } => *timestamp,
            PrescientEvent::DefaultsServed { timestamp, .. } => *timestamp,
            PrescientEvent::PreloadStarted { timestamp, .. } => *timestamp,
            PrescientEvent::ResourceLoaded { timestamp, .. } => *timestamp,
            PrescientEvent::ResourceLoadFailed { timestamp, .. } => *timestamp,
            PrescientEvent::PatternsEvicted { timestamp, .. } => *timestamp,
            PrescientEvent::EvictionPolicySwitched { timestamp, .. } => *timestamp,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            PrescientEvent::PatternRecorded { .. } => "pattern_recorded",
            PrescientEvent::PatternReinforced { .. } => "pattern_reinforced",
            PrescientEvent::DefaultsServed { .. } => "defaults_served",
            PrescientEvent::PreloadStarted { .. } => "preload_started",
            PrescientEvent::ResourceLoaded { .. } => "resource_loaded",
            PrescientEvent::ResourceLoadFailed { .. } => "resource_load_failed",
            PrescientEvent::PatternsEvicted { .. } => "patterns_evicted",
            PrescientEvent::EvictionPolicySwitched { .. } => "eviction_policy_switched",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = PrescientEvent::PatternRecorded {
            pattern_id: PatternId::new(),
            task_type: "bugfix".to_string(),
            resource_count: 2,
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "pattern_recorded");

        let deserialized: PrescientEvent = serde_json::from_value(json).unwrap();
        assert_eq!(event.event_type(), deserialized.event_type());
    }

    #[test]
    fn test_eviction_event_fields() {
        let event = PrescientEvent::PatternsEvicted {
            target: EvictionTarget::ResourceCache,
            policy: PolicyKind::Frequency,
            count: 3,
            remaining: 7,
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["target"], "resource_cache");
        assert_eq!(json["policy"], "frequency");
        assert_eq!(event.event_type(), "patterns_evicted");
    }
}
