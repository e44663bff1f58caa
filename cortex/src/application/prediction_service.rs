// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # SkillPredictor: Predict, Preload, Learn
//!
//! Application service tying the matching pipeline to storage and loading:
//!
//! ```text
//! TaskAttributes ─► FingerprintGenerator ─► scan ─► SimilarityMatcher
//!                                                      │
//!                     TieredCacheLoader ◄─ preload ◄─ SkillScoreAggregator
//! ```
//!
//! ## Never failing
//!
//! `predict` always returns a ranking. When the store is unreadable the
//! [`PredictionBasis::StoreUnavailable`] basis carries the reason and the
//! static defaults for the task type are served; when nothing is similar
//! enough the basis is [`PredictionBasis::NoSimilarPatterns`].
//!
//! ## Learning
//!
//! `record_outcome` reinforces an existing record that has the same
//! fingerprint and resource set, or appends a new one.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::PrescientConfig;
use crate::domain::{
    BudgetSnapshot, BudgetTracker, DefaultRankings, Fingerprint, FingerprintGenerator, PatternFilter,
    PatternId, PatternRecord, PatternRepository, Prediction, PredictionBasis, PrescientEvent,
    RepositoryError, SimilarPattern, SimilarityMatcher, SimilarityOutcome, SkillScoreAggregator,
    TaskAttributes,
};
use crate::infrastructure::{
    CacheEntry, CacheLookup, CoreReadiness, EventBus, LoadError, PreloadPlan, ResourceCache,
    ResourceLoader, TieredCacheLoader,
};

/// Point-in-time view of the predictor.
#[derive(Debug, Clone, Serialize)]
pub struct PredictorStats {
    pub store: String,
    pub patterns: usize,
    pub cached_resources: usize,
    pub cached_bytes: u64,
    pub cache_capacity: usize,
    pub budget: BudgetSnapshot,
}

pub struct SkillPredictor {
    repository: Arc<dyn PatternRepository>,
    generator: FingerprintGenerator,
    matcher: SimilarityMatcher,
    aggregator: SkillScoreAggregator,
    loader: TieredCacheLoader,
    budget: Arc<BudgetTracker>,
    events: EventBus,
}

impl SkillPredictor {
    pub fn new(
        repository: Arc<dyn PatternRepository>,
        loader: TieredCacheLoader,
        budget: Arc<BudgetTracker>,
        events: EventBus,
    ) -> Self {
        Self {
            repository,
            generator: FingerprintGenerator::new(),
            matcher: SimilarityMatcher::new(),
            aggregator: SkillScoreAggregator::default(),
            loader,
            budget,
            events,
        }
    }

    /// Wires cache, loader and budget from configuration.
    pub fn from_config(
        config: &PrescientConfig,
        repository: Arc<dyn PatternRepository>,
        resource_loader: Arc<dyn ResourceLoader>,
        events: EventBus,
    ) -> Self {
        let window = config.hit_rate_window();
        let budget = Arc::new(
            BudgetTracker::new(Arc::clone(&window)).with_byte_budget(config.cache.byte_budget),
        );
        let cache = Arc::new(ResourceCache::new(config.cache.capacity, config.eviction_policy(window)));
        let loader = TieredCacheLoader::new(
            resource_loader,
            cache,
            config.loader_settings(),
            Arc::clone(&budget),
            events.clone(),
        );

        Self::new(repository, loader, budget, events).with_defaults(config.default_rankings())
    }

    pub fn with_defaults(mut self, defaults: DefaultRankings) -> Self {
        self.aggregator = SkillScoreAggregator::new(defaults);
        self
    }

    pub fn with_generator(mut self, generator: FingerprintGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn repository(&self) -> &Arc<dyn PatternRepository> {
        &self.repository
    }

    pub fn loader(&self) -> &TieredCacheLoader {
        &self.loader
    }

    pub fn budget(&self) -> &Arc<BudgetTracker> {
        &self.budget
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn fingerprint(&self, attributes: &TaskAttributes) -> Fingerprint {
        self.generator.generate(attributes)
    }

    pub async fn predict(&self, attributes: &TaskAttributes) -> Prediction {
        let fingerprint = self.fingerprint(attributes);
        self.predict_fingerprint(fingerprint).await
    }

    pub async fn predict_fingerprint(&self, fingerprint: Fingerprint) -> Prediction {
        let task_type = fingerprint.task_type.clone();

        let outcome = self
            .repository
            .scan(PatternFilter::all())
            .await
            .map(|scan| self.matcher.find_similar(&fingerprint, &scan));

        let (basis, similar, mut predictions) = match outcome {
            Ok(SimilarityOutcome::Matches(results)) => {
                let similar: Vec<SimilarPattern> = results.iter().map(SimilarPattern::from).collect();
                let ranked = self.aggregator.rank(&results);
                (PredictionBasis::Matched { patterns: results.len() }, similar, ranked)
            }
            Ok(SimilarityOutcome::NoMatch) => (PredictionBasis::NoSimilarPatterns, Vec::new(), Vec::new()),
            Err(e) => {
                warn!(store = %self.repository.describe(), error = %e, "Pattern store unavailable, serving defaults");
                (
                    PredictionBasis::StoreUnavailable {
                        retryable: e.is_retryable(),
                        reason: e.to_string(),
                    },
                    Vec::new(),
                    Vec::new(),
                )
            }
        };

        // matched patterns that used no resources still need a ranking
        let used_defaults = predictions.is_empty();
        if used_defaults {
            predictions = self.aggregator.defaults().for_task_type(&task_type);
            self.events.publish(PrescientEvent::DefaultsServed {
                task_type: task_type.clone(),
                store_available: !matches!(basis, PredictionBasis::StoreUnavailable { .. }),
                timestamp: Utc::now(),
            });
        }
        self.budget.record_prediction(used_defaults);

        debug!(
            %fingerprint,
            basis = ?basis,
            predictions = predictions.len(),
            similar = similar.len(),
            "Prediction complete"
        );

        Prediction {
            fingerprint,
            basis,
            predictions,
            similar,
        }
    }

    /// Schedules background loads for `prediction` and returns immediately.
    pub fn preload(&self, prediction: &Prediction) -> PreloadPlan {
        self.loader.preload(&prediction.predictions)
    }

    pub async fn wait_for_core(&self, plan: &PreloadPlan, timeout: Duration) -> CoreReadiness {
        self.loader.wait_for_core(plan, timeout).await
    }

    pub fn get_cached(&self, resource_id: &str) -> CacheLookup {
        self.loader.get_cached(resource_id)
    }

    pub async fn load_on_demand(&self, resource_id: &str) -> Result<Arc<CacheEntry>, LoadError> {
        self.loader.load_on_demand(resource_id).await
    }

    /// Stops the background preload of one resource. `false` if none was running.
    pub fn cancel_preload(&self, resource_id: &str) -> bool {
        self.loader.cancel_preload(resource_id)
    }

    /// Records how a task went. Returns the id of the record that absorbed it.
    pub async fn record_outcome<I, S>(
        &self,
        fingerprint: Fingerprint,
        resources_used: I,
        quality_score: f64,
        success: bool,
    ) -> Result<PatternId, RepositoryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let resources: BTreeSet<String> = resources_used
            .into_iter()
            .map(Into::into)
            .map(|r: String| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();

        let existing = {
            let fingerprint = fingerprint.clone();
            let resources = resources.clone();
            let scan = self
                .repository
                .scan(PatternFilter::new(move |record| record.describes(&fingerprint, &resources)))
                .await?;
            scan.iter().map(|record| record.id.clone()).next()
        };

        if let Some(id) = existing {
            let reinforced = self
                .repository
                .update(&id, Box::new(move |record: &mut PatternRecord| record.record_reuse(quality_score, success)))
                .await?;

            if let Some(record) = reinforced {
                info!(pattern_id = %record.id, usage_count = record.usage_count, "Pattern reinforced");
                self.events.publish(PrescientEvent::PatternReinforced {
                    pattern_id: record.id.clone(),
                    usage_count: record.usage_count,
                    success_rate: record.success_rate,
                    timestamp: Utc::now(),
                });
                return Ok(record.id);
            }
            debug!(pattern_id = %id, "Pattern vanished before reinforcement, recording a new one");
        }

        let record = PatternRecord::new(fingerprint, resources, quality_score, success);
        self.repository.append(&record).await?;

        info!(pattern_id = %record.id, task_type = %record.fingerprint.task_type, "Pattern recorded");
        self.events.publish(PrescientEvent::PatternRecorded {
            pattern_id: record.id.clone(),
            task_type: record.fingerprint.task_type.clone(),
            resource_count: record.resources_used.len(),
            timestamp: Utc::now(),
        });
        Ok(record.id)
    }

    /// [`SkillPredictor::record_outcome`] for raw task attributes.
    pub async fn record_task_outcome<I, S>(
        &self,
        attributes: &TaskAttributes,
        resources_used: I,
        quality_score: f64,
        success: bool,
    ) -> Result<PatternId, RepositoryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fingerprint = self.fingerprint(attributes);
        self.record_outcome(fingerprint, resources_used, quality_score, success).await
    }

    pub async fn stats(&self) -> Result<PredictorStats, RepositoryError> {
        let cache = self.loader.cache();
        Ok(PredictorStats {
            store: self.repository.describe(),
            patterns: self.repository.count().await?,
            cached_resources: cache.len(),
            cached_bytes: cache.resident_bytes(),
            cache_capacity: cache.capacity(),
            budget: self.budget.snapshot(),
        })
    }

    /// Cancels outstanding loads.
    pub async fn shutdown(&self) {
        self.loader.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Complexity, Tier};
    use crate::infrastructure::InMemoryPatternRepository;
    use async_trait::async_trait;
    use bytes::Bytes;

    struct EchoLoader;

    #[async_trait]
    impl ResourceLoader for EchoLoader {
        async fn load(&self, resource_id: &str) -> Result<Bytes, LoadError> {
            Ok(Bytes::from(format!("# {resource_id}")))
        }
    }

    struct BrokenRepository;

    #[async_trait]
    impl PatternRepository for BrokenRepository {
        async fn append(&self, _record: &PatternRecord) -> Result<(), RepositoryError> {
            Err(self.timeout())
        }

        async fn update(
            &self,
            _id: &PatternId,
            _mutation: crate::domain::PatternMutation,
        ) -> Result<Option<PatternRecord>, RepositoryError> {
            Err(self.timeout())
        }

        async fn scan(&self, _filter: PatternFilter) -> Result<crate::domain::PatternScan, RepositoryError> {
            Err(self.timeout())
        }

        async fn count(&self) -> Result<usize, RepositoryError> {
            Err(self.timeout())
        }

        async fn remove(&self, _ids: &[PatternId]) -> Result<usize, RepositoryError> {
            Err(self.timeout())
        }

        fn describe(&self) -> String {
            "broken".to_string()
        }
    }

    impl BrokenRepository {
        fn timeout(&self) -> RepositoryError {
            RepositoryError::StoreLockTimeout {
                path: "/tmp/patterns.json.lock".into(),
                waited: Duration::from_secs(5),
            }
        }
    }

    fn predictor(repository: Arc<dyn PatternRepository>) -> SkillPredictor {
        SkillPredictor::from_config(&PrescientConfig::default(), repository, Arc::new(EchoLoader), EventBus::new(64))
    }

    fn fastapi_task() -> TaskAttributes {
        TaskAttributes::new()
            .with_type("refactoring")
            .with_keyword("auth")
            .with_keyword("database")
            .with_language("python")
            .with_framework("fastapi")
            .with_complexity("medium")
    }

    #[tokio::test]
    async fn test_empty_store_serves_defaults() {
        let predictor = predictor(Arc::new(InMemoryPatternRepository::new()));

        let prediction = predictor.predict(&fastapi_task()).await;

        assert_eq!(prediction.basis, PredictionBasis::NoSimilarPatterns);
        assert_eq!(prediction.predictions[0].resource_id, "code-analysis");
        assert_eq!(prediction.predictions[0].tier, Tier::Core);
        assert_eq!(predictor.budget().snapshot().default_fallbacks, 1);
    }

    #[tokio::test]
    async fn test_store_failure_is_reported_not_raised() {
        let predictor = predictor(Arc::new(BrokenRepository));

        let prediction = predictor.predict(&fastapi_task()).await;

        match &prediction.basis {
            PredictionBasis::StoreUnavailable { retryable, .. } => assert!(*retryable),
            other => panic!("unexpected basis {other:?}"),
        }
        assert!(!prediction.predictions.is_empty());
        assert!(predictor.stats().await.is_err());
    }

    #[tokio::test]
    async fn test_record_then_predict() {
        let predictor = predictor(Arc::new(InMemoryPatternRepository::new()));
        let fingerprint = predictor.fingerprint(&fastapi_task());

        let id = predictor
            .record_outcome(fingerprint.clone(), ["sql-review", "auth-patterns"], 90.0, true)
            .await
            .unwrap();

        let prediction = predictor.predict(&fastapi_task()).await;
        assert!(prediction.is_learned());
        assert_eq!(prediction.similar[0].pattern_id, id);
        assert_eq!(prediction.similar[0].score, 1.0);
        assert!(prediction.in_tier(Tier::Core).any(|p| p.resource_id == "sql-review"));
    }

    #[tokio::test]
    async fn test_identical_outcome_reinforces() {
        let repository = Arc::new(InMemoryPatternRepository::new());
        let predictor = predictor(repository.clone());
        let fingerprint = Fingerprint::new("bugfix", ["crash"], "rust", "tokio", Complexity::High);

        let first = predictor
            .record_outcome(fingerprint.clone(), ["debugging"], 80.0, true)
            .await
            .unwrap();
        let second = predictor
            .record_outcome(fingerprint.clone(), ["debugging"], 40.0, false)
            .await
            .unwrap();
        let third = predictor
            .record_outcome(fingerprint, ["debugging", "profiling"], 70.0, true)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_ne!(first, third);
        assert_eq!(repository.count().await.unwrap(), 2);

        let record = repository.get(&first).await.unwrap().unwrap();
        assert_eq!(record.usage_count, 2);
        assert!((record.quality_score - 60.0).abs() < 1e-9);
        assert!((record.success_rate - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_preload_and_lookup() {
        let predictor = predictor(Arc::new(InMemoryPatternRepository::new()));
        let prediction = predictor.predict(&fastapi_task()).await;

        let plan = predictor.preload(&prediction);
        let readiness = predictor.wait_for_core(&plan, Duration::from_secs(1)).await;
        assert!(readiness.is_complete());

        let lookup = predictor.get_cached(&plan.core[0]);
        assert_eq!(lookup.entry().unwrap().as_text(), Some("# code-analysis"));
        assert_eq!(lookup.entry().unwrap().confidence, Some(1.0));

        let deferred = &plan.deferred[0];
        let entry = predictor.load_on_demand(deferred).await.unwrap();
        assert_eq!(entry.resource_id, *deferred);
        assert_eq!(entry.confidence, None);

        predictor.shutdown().await;
        let stats = predictor.stats().await.unwrap();
        assert!(stats.cached_resources >= 2);
        assert!(stats.budget.loads_succeeded >= 2);
    }
}
