// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Eviction Engine
//!
//! Keeps the pattern store within `max_records` and the resource cache within
//! its capacity, using the configured [`EvictionPolicy`].
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Reclaims pattern store and resource cache space

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::PrescientConfig;
use crate::domain::{
    BudgetTracker, EvictionPolicy, EvictionTarget, PatternFilter, PatternRepository, PolicyKind,
    PrescientEvent, RepositoryError,
};
use crate::infrastructure::{EventBus, TieredCacheLoader};

/// Outcome of one store reclaim.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReclaimReport {
    pub policy: PolicyKind,
    pub evicted: usize,
    pub remaining: usize,
}

pub struct EvictionEngine {
    repository: Arc<dyn PatternRepository>,
    policy: EvictionPolicy,
    max_records: usize,
    min_retained: usize,
    loader: Option<TieredCacheLoader>,
    budget: Arc<BudgetTracker>,
    events: EventBus,
    last_policy: Mutex<Option<PolicyKind>>,
}

impl EvictionEngine {
    pub fn new(
        repository: Arc<dyn PatternRepository>,
        policy: EvictionPolicy,
        max_records: usize,
        min_retained: usize,
        budget: Arc<BudgetTracker>,
        events: EventBus,
    ) -> Self {
        Self {
            repository,
            policy,
            max_records,
            min_retained,
            loader: None,
            budget,
            events,
            last_policy: Mutex::new(None),
        }
    }

    /// Engine sharing the budget's hit-rate window, so adaptive resolution
    /// follows the same cache traffic the predictor records.
    pub fn from_config(
        config: &PrescientConfig,
        repository: Arc<dyn PatternRepository>,
        budget: Arc<BudgetTracker>,
        events: EventBus,
    ) -> Self {
        let policy = config.eviction_policy(Arc::clone(budget.window()));
        Self::new(
            repository,
            policy,
            config.eviction.max_records,
            config.eviction.min_retained,
            budget,
            events,
        )
    }

    pub fn with_cache(mut self, loader: TieredCacheLoader) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn policy(&self) -> &EvictionPolicy {
        &self.policy
    }

    /// Removes patterns until `target_free_fraction` of `max_records` is free.
    ///
    /// Never leaves fewer than `min_retained` records. Time-to-live removes
    /// every expired record regardless of the fraction.
    pub async fn reclaim(&self, target_free_fraction: f64) -> Result<ReclaimReport, RepositoryError> {
        let records = self.repository.scan(PatternFilter::all()).await?.to_vec();
        let quota = EvictionPolicy::quota(records.len(), self.max_records, target_free_fraction);
        let plan = self.policy.select(&records, quota, self.min_retained, Utc::now());
        self.note_policy(plan.policy);

        if plan.victims.is_empty() {
            debug!(policy = %plan.policy, records = records.len(), "Nothing to evict");
            return Ok(ReclaimReport {
                policy: plan.policy,
                evicted: 0,
                remaining: records.len(),
            });
        }

        let evicted = self.repository.remove(&plan.victims).await?;
        let remaining = self.repository.count().await?;
        self.budget.record_evictions(evicted as u64, 0);

        info!(
            policy = %plan.policy,
            evicted,
            remaining,
            store = %self.repository.describe(),
            "Patterns evicted"
        );
        self.events.publish(PrescientEvent::PatternsEvicted {
            target: EvictionTarget::PatternStore,
            policy: plan.policy,
            count: evicted,
            remaining,
            timestamp: Utc::now(),
        });

        Ok(ReclaimReport {
            policy: plan.policy,
            evicted,
            remaining,
        })
    }

    /// Same reclaim against the resource cache. Zero when no cache is attached.
    pub fn reclaim_cache(&self, target_free_fraction: f64) -> usize {
        let Some(loader) = &self.loader else {
            return 0;
        };
        self.note_policy(self.policy.resolve());
        loader.reclaim(target_free_fraction, 0)
    }

    /// Runs a cache reclaim only when the byte budget is exceeded.
    pub fn relieve_memory_pressure(&self, target_free_fraction: f64) -> usize {
        if !self.budget.is_over_budget() {
            return 0;
        }
        self.reclaim_cache(target_free_fraction)
    }

    fn note_policy(&self, resolved: PolicyKind) {
        let mut last = self.last_policy.lock();
        let previous = last.replace(resolved);
        if let Some(from) = previous.filter(|from| *from != resolved) {
            info!(%from, to = %resolved, "Eviction policy switched");
            self.events.publish(PrescientEvent::EvictionPolicySwitched {
                from,
                to: resolved,
                hit_rate: self.policy.window().hit_rate(),
                timestamp: Utc::now(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Fingerprint, HitRateWindow, PatternRecord};
    use crate::infrastructure::InMemoryPatternRepository;
    use chrono::Duration;

    fn record(keyword: &str, usage_count: u64, age_hours: i64) -> PatternRecord {
        let mut record = PatternRecord::new(Fingerprint::default(), [keyword], 80.0, true);
        record.fingerprint.keywords = crate::domain::KeywordSet::new([keyword]);
        record.usage_count = usage_count;
        record.updated_at = Utc::now() - Duration::hours(age_hours);
        record
    }

    fn engine(
        repository: Arc<InMemoryPatternRepository>,
        kind: PolicyKind,
        max_records: usize,
        min_retained: usize,
        events: EventBus,
    ) -> EvictionEngine {
        let window = Arc::new(HitRateWindow::new(100));
        let budget = Arc::new(BudgetTracker::new(Arc::clone(&window)));
        let policy = EvictionPolicy::new(kind, Duration::hours(24), window);
        EvictionEngine::new(repository, policy, max_records, min_retained, budget, events)
    }

    #[tokio::test]
    async fn test_recency_reclaim_drops_oldest() {
        let records: Vec<PatternRecord> = (0..10).map(|i| record(&format!("k{i}"), 1, i)).collect();
        let oldest: Vec<_> = records[5..].iter().map(|r| r.id.clone()).collect();
        let repository = Arc::new(InMemoryPatternRepository::with_patterns(records));
        let events = EventBus::new(16);
        let mut receiver = events.subscribe();

        let engine = engine(repository.clone(), PolicyKind::Recency, 10, 2, events);
        let report = engine.reclaim(0.5).await.unwrap();

        assert_eq!(report.evicted, 5);
        assert_eq!(report.remaining, 5);
        for id in &oldest {
            assert!(repository.get(id).await.unwrap().is_none());
        }

        match receiver.try_recv().unwrap() {
            PrescientEvent::PatternsEvicted { target, count, .. } => {
                assert_eq!(target, EvictionTarget::PatternStore);
                assert_eq!(count, 5);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_min_retained_is_a_floor() {
        let records: Vec<PatternRecord> = (0..5).map(|i| record(&format!("k{i}"), 1, i)).collect();
        let repository = Arc::new(InMemoryPatternRepository::with_patterns(records));

        let engine = engine(repository.clone(), PolicyKind::Frequency, 5, 4, EventBus::new(16));
        let report = engine.reclaim(1.0).await.unwrap();

        assert_eq!(report.evicted, 1);
        assert_eq!(repository.count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_ttl_ignores_fraction() {
        let records = vec![record("fresh", 1, 1), record("stale", 1, 48), record("ancient", 1, 96)];
        let repository = Arc::new(InMemoryPatternRepository::with_patterns(records));

        let engine = engine(repository.clone(), PolicyKind::TimeToLive, 100, 0, EventBus::new(16));
        let report = engine.reclaim(0.0).await.unwrap();

        assert_eq!(report.policy, PolicyKind::TimeToLive);
        assert_eq!(report.evicted, 2);
        assert_eq!(repository.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_under_capacity_is_a_no_op() {
        let repository = Arc::new(InMemoryPatternRepository::with_patterns(vec![record("only", 1, 0)]));
        let events = EventBus::new(16);
        let mut receiver = events.subscribe();

        let engine = engine(repository.clone(), PolicyKind::Recency, 100, 0, events);
        let report = engine.reclaim(0.2).await.unwrap();

        assert_eq!(report.evicted, 0);
        assert_eq!(report.remaining, 1);
        assert!(receiver.try_recv().is_err());
        assert_eq!(engine.reclaim_cache(0.5), 0);
    }

    #[tokio::test]
    async fn test_adaptive_switch_is_published() {
        let records: Vec<PatternRecord> = (0..4).map(|i| record(&format!("k{i}"), 1, i)).collect();
        let repository = Arc::new(InMemoryPatternRepository::with_patterns(records));
        let events = EventBus::new(16);
        let mut receiver = events.subscribe();

        let engine = engine(repository, PolicyKind::Adaptive, 100, 0, events);
        engine.reclaim(0.0).await.unwrap();
        let first = engine.policy().resolve();

        // a steep hit-rate decline flips the adaptive rule
        let window = engine.policy().window();
        for _ in 0..50 {
            window.record(true);
        }
        for _ in 0..50 {
            window.record(false);
        }
        let second = engine.policy().resolve();
        engine.reclaim(0.0).await.unwrap();

        assert_eq!(first, PolicyKind::Recency);
        assert_eq!(second, PolicyKind::Frequency);
        let switched = receiver.drain().into_iter().find_map(|event| match event {
            PrescientEvent::EvictionPolicySwitched { from, to, .. } => Some((from, to)),
            _ => None,
        });
        assert_eq!(switched, Some((PolicyKind::Recency, PolicyKind::Frequency)));
    }
}
