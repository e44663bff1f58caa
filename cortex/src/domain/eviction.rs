// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Eviction Policies
//!
//! Victim selection for the pattern store and the resource cache. Every
//! policy answers the same question ("which keys go?") so they can be swapped
//! through configuration without touching callers.
//!
//! | Policy | Victims first |
//! |--------|---------------|
//! | `recency` | oldest last use |
//! | `frequency` | lowest use count, then oldest last use |
//! | `time_to_live` | everything unused for longer than the TTL, oldest first |
//! | `adaptive` | delegates to an [`AdaptiveRule`] that picks one of the above |
//!
//! No policy ever selects more than `len - min_retained` victims.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use super::pattern::{PatternId, PatternRecord};

/// Anything the eviction engine can reclaim.
pub trait Evictable {
    type Key: Clone + Ord;

    fn eviction_key(&self) -> Self::Key;
    fn last_used_at(&self) -> DateTime<Utc>;
    fn use_count(&self) -> u64;
}

impl Evictable for PatternRecord {
    type Key = PatternId;

    fn eviction_key(&self) -> PatternId {
        self.id.clone()
    }

    fn last_used_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn use_count(&self) -> u64 {
        self.usage_count
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    #[default]
    Recency,
    Frequency,
    TimeToLive,
    Adaptive,
}

impl PolicyKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().replace('-', "_").as_str() {
            "recency" | "lru" => Some(Self::Recency),
            "frequency" | "lfu" => Some(Self::Frequency),
            "time_to_live" | "ttl" => Some(Self::TimeToLive),
            "adaptive" | "hybrid" => Some(Self::Adaptive),
            _ => None,
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Recency => "recency",
            Self::Frequency => "frequency",
            Self::TimeToLive => "time_to_live",
            Self::Adaptive => "adaptive",
        };
        f.write_str(name)
    }
}

/// Sliding window of cache hit/miss observations.
#[derive(Debug)]
pub struct HitRateWindow {
    capacity: usize,
    samples: Mutex<VecDeque<bool>>,
}

impl HitRateWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            capacity,
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn record(&self, hit: bool) {
        let mut samples = self.samples.lock();
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back(hit);
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }

    pub fn hit_rate(&self) -> Option<f64> {
        let samples = self.samples.lock();
        rate(samples.iter())
    }

    /// Hit rate of the newer half minus hit rate of the older half.
    /// Negative means hits are declining.
    pub fn trend(&self) -> Option<f64> {
        let samples = self.samples.lock();
        if samples.len() < 2 {
            return None;
        }
        let middle = samples.len() / 2;
        let older = rate(samples.iter().take(middle))?;
        let newer = rate(samples.iter().skip(middle))?;
        Some(newer - older)
    }
}

fn rate<'a>(samples: impl Iterator<Item = &'a bool>) -> Option<f64> {
    let (hits, total) = samples.fold((0usize, 0usize), |(h, t), hit| (h + usize::from(*hit), t + 1));
    (total > 0).then(|| hits as f64 / total as f64)
}

/// Decides which concrete policy the adaptive policy runs next.
pub trait AdaptiveRule: Send + Sync + fmt::Debug {
    fn choose(&self, window: &HitRateWindow) -> PolicyKind;
}

/// Default rule: recency while hit rate holds steady, frequency once it
/// declines by more than `decline_threshold` between the two window halves.
#[derive(Debug, Clone)]
pub struct HitRateTrendRule {
    pub min_samples: usize,
    pub decline_threshold: f64,
}

impl Default for HitRateTrendRule {
    fn default() -> Self {
        Self {
            min_samples: 20,
            decline_threshold: 0.10,
        }
    }
}

impl AdaptiveRule for HitRateTrendRule {
    fn choose(&self, window: &HitRateWindow) -> PolicyKind {
        if window.len() < self.min_samples {
            return PolicyKind::Recency;
        }
        match window.trend() {
            Some(trend) if trend <= -self.decline_threshold => PolicyKind::Frequency,
            _ => PolicyKind::Recency,
        }
    }
}

/// Victims chosen by one policy run.
#[derive(Debug, Clone, PartialEq)]
pub struct EvictionPlan<K> {
    pub policy: PolicyKind,
    pub victims: Vec<K>,
}

/// A configured eviction policy.
#[derive(Debug, Clone)]
pub struct EvictionPolicy {
    kind: PolicyKind,
    ttl: Duration,
    rule: Arc<dyn AdaptiveRule>,
    window: Arc<HitRateWindow>,
}

impl EvictionPolicy {
    pub fn new(kind: PolicyKind, ttl: Duration, window: Arc<HitRateWindow>) -> Self {
        Self {
            kind,
            ttl,
            rule: Arc::new(HitRateTrendRule::default()),
            window,
        }
    }

    pub fn with_rule(mut self, rule: Arc<dyn AdaptiveRule>) -> Self {
        self.rule = rule;
        self
    }

    pub fn kind(&self) -> PolicyKind {
        self.kind
    }

    pub fn window(&self) -> &Arc<HitRateWindow> {
        &self.window
    }

    /// Concrete policy for the next run; never `Adaptive`.
    pub fn resolve(&self) -> PolicyKind {
        match self.kind {
            PolicyKind::Adaptive => match self.rule.choose(&self.window) {
                PolicyKind::Adaptive => PolicyKind::Recency,
                chosen => chosen,
            },
            kind => kind,
        }
    }

    /// Number of items to drop so that `capacity * target_free_fraction` slots are free.
    pub fn quota(len: usize, capacity: usize, target_free_fraction: f64) -> usize {
        let fraction = if target_free_fraction.is_nan() {
            0.0
        } else {
            target_free_fraction.clamp(0.0, 1.0)
        };
        // rounded so 10 * 0.3 frees 3 slots, not 4
        let free = ((capacity as f64 * fraction).round() as usize).min(capacity);
        len.saturating_sub(capacity - free)
    }

    /// Picks victims from `items`. Time-to-live ignores `quota` and takes every
    /// expired item; all policies stop at `min_retained` survivors.
    pub fn select<T: Evictable>(
        &self,
        items: &[T],
        quota: usize,
        min_retained: usize,
        now: DateTime<Utc>,
    ) -> EvictionPlan<T::Key> {
        let policy = self.resolve();
        let allowed = items.len().saturating_sub(min_retained);

        let mut candidates: Vec<&T> = items.iter().collect();
        let take = match policy {
            PolicyKind::Frequency => {
                candidates.sort_by(|a, b| {
                    a.use_count()
                        .cmp(&b.use_count())
                        .then_with(|| a.last_used_at().cmp(&b.last_used_at()))
                        .then_with(|| a.eviction_key().cmp(&b.eviction_key()))
                });
                quota.min(allowed)
            }
            PolicyKind::TimeToLive => {
                // a TTL reaching past the representable range expires nothing
                match now.checked_sub_signed(self.ttl) {
                    Some(cutoff) => candidates.retain(|item| item.last_used_at() < cutoff),
                    None => candidates.clear(),
                }
                sort_by_recency(&mut candidates);
                candidates.len().min(allowed)
            }
            PolicyKind::Recency | PolicyKind::Adaptive => {
                sort_by_recency(&mut candidates);
                quota.min(allowed)
            }
        };

        EvictionPlan {
            policy,
            victims: candidates.into_iter().take(take).map(Evictable::eviction_key).collect(),
        }
    }
}

fn sort_by_recency<T: Evictable>(candidates: &mut [&T]) {
    candidates.sort_by(|a, b| {
        a.last_used_at()
            .cmp(&b.last_used_at())
            .then_with(|| a.use_count().cmp(&b.use_count()))
            .then_with(|| a.eviction_key().cmp(&b.eviction_key()))
    });
}
