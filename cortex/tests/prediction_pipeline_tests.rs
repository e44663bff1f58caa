// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end tests for predict, preload and record against a real store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use prescient_cortex::{
    CacheLookup, Complexity, EventBus, EvictionEngine, Fingerprint, JsonPatternRepository, LoadError,
    LockOptions, PatternRecord, PatternRepository, PredictionBasis, PrescientConfig, PrescientEvent,
    ResourceLoader, SimilarityMatcher, SkillPredictor, TaskAttributes, Tier,
};

/// Loader backed by a map; ids missing from the map fail.
struct ScriptedLoader {
    resources: HashMap<&'static str, &'static str>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedLoader {
    fn new(resources: &[(&'static str, &'static str)], delay: Duration) -> Self {
        Self {
            resources: resources.iter().copied().collect(),
            delay,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ResourceLoader for ScriptedLoader {
    async fn load(&self, resource_id: &str) -> Result<Bytes, LoadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        match self.resources.get(resource_id) {
            Some(content) => Ok(Bytes::from_static(content.as_bytes())),
            None => Err(LoadError::ResourceLoadFailed {
                resource_id: resource_id.to_string(),
                reason: "scripted failure".to_string(),
            }),
        }
    }
}

fn store(dir: &tempfile::TempDir) -> Arc<JsonPatternRepository> {
    Arc::new(JsonPatternRepository::open(dir.path(), LockOptions::default()))
}

fn predictor(repository: Arc<dyn PatternRepository>, loader: Arc<ScriptedLoader>, events: EventBus) -> SkillPredictor {
    SkillPredictor::from_config(&PrescientConfig::default(), repository, loader, events)
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
async fn test_partial_keyword_overlap_scores_above_ninety() {
    let query = Fingerprint::new("refactoring", ["auth", "database"], "python", "fastapi", Complexity::Medium);
    let stored = Fingerprint::new("refactoring", ["auth"], "python", "fastapi", Complexity::Medium);

    let score = SimilarityMatcher::score(&query, &stored);
    assert!(score >= 0.90);
    assert!((score - 0.95).abs() < 1e-9);
}

#[tokio::test]
async fn test_empty_store_returns_task_defaults() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let events = EventBus::new(32);
    let mut receiver = events.subscribe();
    let predictor = predictor(store(&dir), Arc::new(ScriptedLoader::new(&[], Duration::ZERO)), events);

    let bugfix = predictor.predict(&TaskAttributes::new().with_type("bugfix")).await;
    assert_eq!(bugfix.basis, PredictionBasis::NoSimilarPatterns);
    let ids: Vec<_> = bugfix.predictions.iter().map(|p| p.resource_id.as_str()).collect();
    assert_eq!(ids, vec!["debugging", "code-analysis", "test-generation"]);
    assert_eq!(bugfix.predictions[0].confidence, 1.0);

    let unknown = predictor.predict(&TaskAttributes::new()).await;
    assert!(!unknown.predictions.is_empty());

    assert!(matches!(
        receiver.try_recv()?,
        PrescientEvent::DefaultsServed { store_available: true, .. }
    ));
    Ok(())
}

#[tokio::test]
async fn test_recorded_pattern_round_trips_into_predictions() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let repository = store(&dir);
    let predictor = predictor(
        repository.clone(),
        Arc::new(ScriptedLoader::new(&[], Duration::ZERO)),
        EventBus::new(32),
    );

    // noise that should rank below the recorded pattern
    for n in 0..15 {
        let fingerprint = Fingerprint::new("refactoring", [format!("other{n}")], "python", "django", Complexity::Medium);
        repository
            .append(&PatternRecord::new(fingerprint, ["django-admin"], 60.0, true))
            .await?;
    }

    let fingerprint = predictor.fingerprint(&fastapi_task());
    let id = predictor
        .record_outcome(fingerprint.clone(), ["sqlalchemy", "oauth-flows"], 95.0, true)
        .await?;

    let prediction = predictor.predict_fingerprint(fingerprint).await;
    assert_eq!(prediction.basis, PredictionBasis::Matched { patterns: 10 });
    assert_eq!(prediction.similar.len(), 10);
    assert_eq!(prediction.similar[0].pattern_id, id);
    assert_eq!(prediction.similar[0].score, 1.0);

    // nine partial matches outweigh one exact match in aggregate
    let top = &prediction.predictions[0];
    assert_eq!(top.resource_id, "django-admin");
    assert_eq!(top.confidence, 1.0);
    assert_eq!(top.tier, Tier::Core);
    Ok(())
}

#[tokio::test]
async fn test_store_persists_across_predictors() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let loader = Arc::new(ScriptedLoader::new(&[], Duration::ZERO));

    let writer = predictor(store(&dir), loader.clone(), EventBus::new(8));
    writer
        .record_task_outcome(&fastapi_task(), ["sqlalchemy"], 80.0, true)
        .await?;

    let reader = predictor(store(&dir), loader, EventBus::new(8));
    let prediction = reader.predict(&fastapi_task()).await;
    assert!(prediction.is_learned());
    Ok(())
}

#[tokio::test]
async fn test_failed_preload_is_isolated() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let repository = store(&dir);
    // code-analysis is missing from the loader
    let loader = Arc::new(ScriptedLoader::new(
        &[("refactoring-patterns", "# patterns"), ("test-generation", "# tests")],
        Duration::from_millis(10),
    ));
    let events = EventBus::new(64);
    let mut receiver = events.subscribe();
    let predictor = predictor(repository, loader, events);

    let prediction = predictor.predict(&TaskAttributes::new().with_type("refactoring")).await;
    let plan = predictor.preload(&prediction);
    let readiness = predictor.wait_for_core(&plan, Duration::from_secs(2)).await;

    assert_eq!(readiness.missing, vec!["code-analysis".to_string()]);

    // the probable and deferred tiers are unaffected by the core failure
    predictor.load_on_demand("refactoring-patterns").await?;
    predictor.load_on_demand("test-generation").await?;
    assert!(predictor.get_cached("refactoring-patterns").is_ready());
    assert!(matches!(predictor.get_cached("code-analysis"), CacheLookup::NotLoaded));
    assert!(predictor.load_on_demand("code-analysis").await.is_err());
    predictor.shutdown().await;

    let failures = receiver
        .drain()
        .into_iter()
        .filter(|e| matches!(e, PrescientEvent::ResourceLoadFailed { .. }))
        .count();
    assert!(failures >= 1);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_on_demand_loads_share_one_fetch() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let loader = Arc::new(ScriptedLoader::new(&[("debugging", "# debugging")], Duration::from_millis(50)));
    let predictor = Arc::new(predictor(store(&dir), loader.clone(), EventBus::new(8)));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let predictor = Arc::clone(&predictor);
        handles.push(tokio::spawn(async move { predictor.load_on_demand("debugging").await }));
    }
    for handle in handles {
        let entry = handle.await??;
        assert_eq!(entry.as_text(), Some("# debugging"));
    }

    assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_shutdown_cancels_slow_preloads() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let loader = Arc::new(ScriptedLoader::new(
        &[("code-analysis", "# a"), ("refactoring-patterns", "# b")],
        Duration::from_secs(30),
    ));
    let predictor = predictor(store(&dir), loader, EventBus::new(8));

    let prediction = predictor.predict(&TaskAttributes::new().with_type("refactoring")).await;
    let plan = predictor.preload(&prediction);
    assert!(matches!(predictor.get_cached(&plan.core[0]), CacheLookup::Pending | CacheLookup::NotLoaded));

    tokio::time::timeout(Duration::from_secs(5), predictor.shutdown()).await?;

    assert_eq!(predictor.loader().in_flight(), 0);
    assert!(matches!(predictor.get_cached(&plan.core[0]), CacheLookup::NotLoaded));
    assert!(matches!(
        predictor.load_on_demand("code-analysis").await,
        Err(LoadError::Cancelled)
    ));
    Ok(())
}

#[tokio::test]
async fn test_abandoned_on_demand_load_can_be_retried() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let loader = Arc::new(ScriptedLoader::new(&[("debugging", "# debugging")], Duration::from_millis(100)));
    let predictor = predictor(store(&dir), loader.clone(), EventBus::new(8));

    let abandoned = tokio::time::timeout(Duration::from_millis(10), predictor.load_on_demand("debugging")).await;
    assert!(abandoned.is_err());
    assert!(matches!(predictor.get_cached("debugging"), CacheLookup::NotLoaded));

    let entry = predictor.load_on_demand("debugging").await?;
    assert_eq!(entry.as_text(), Some("# debugging"));
    assert_eq!(entry.confidence, None);
    assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn test_cancelled_preload_leaves_siblings_running() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let loader = Arc::new(ScriptedLoader::new(
        &[("code-analysis", "# a"), ("refactoring-patterns", "# b")],
        Duration::from_millis(100),
    ));
    let predictor = predictor(store(&dir), loader, EventBus::new(8));

    let prediction = predictor.predict(&TaskAttributes::new().with_type("refactoring")).await;
    let plan = predictor.preload(&prediction);
    assert_eq!(plan.core, vec!["code-analysis"]);
    assert_eq!(plan.probable, vec!["refactoring-patterns"]);
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(predictor.cancel_preload("code-analysis"));
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(matches!(predictor.get_cached("code-analysis"), CacheLookup::NotLoaded));
    let probable = predictor.get_cached("refactoring-patterns");
    assert_eq!(probable.entry().map(|e| e.confidence), Some(Some(0.80)));

    let entry = predictor.load_on_demand("code-analysis").await?;
    assert_eq!(entry.as_text(), Some("# a"));
    predictor.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_eviction_keeps_floor_and_most_recent() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let repository = store(&dir);

    let now = chrono::Utc::now();
    let mut records = Vec::new();
    for n in 0..12 {
        let fingerprint = Fingerprint::new("feature", [format!("k{n}")], "go", "gin", Complexity::Low);
        let mut record = PatternRecord::new(fingerprint, ["code-generation"], 70.0, true);
        record.updated_at = now - chrono::Duration::minutes(n);
        repository.append(&record).await?;
        records.push(record);
    }

    let mut config = PrescientConfig::default();
    config.eviction.max_records = 10;
    config.eviction.min_retained = 8;

    let events = EventBus::new(8);
    let predictor = predictor(repository.clone(), Arc::new(ScriptedLoader::new(&[], Duration::ZERO)), events.clone());
    let engine = EvictionEngine::from_config(&config, repository.clone(), Arc::clone(predictor.budget()), events);

    let report = engine.reclaim(1.0).await?;
    assert_eq!(report.evicted, 4);
    assert_eq!(repository.count().await?, 8);

    // the eight most recently updated survive
    for (n, record) in records.iter().enumerate() {
        let kept = repository.get(&record.id).await?.is_some();
        assert_eq!(kept, n < 8, "record {n}");
    }

    assert_eq!(engine.reclaim(1.0).await?.evicted, 0);
    assert_eq!(predictor.budget().snapshot().evictions, 4);
    Ok(())
}
