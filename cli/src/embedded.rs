// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Embedded services
//!
//! Builds the predictor and eviction engine in-process from configuration.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use prescient_cortex::{
    EventBus, EvictionEngine, FileSystemResourceLoader, JsonPatternRepository, PatternRepository,
    PrescientConfig, SkillPredictor,
};

pub struct EmbeddedPrescient {
    config: PrescientConfig,
    store: Arc<JsonPatternRepository>,
    predictor: SkillPredictor,
    engine: EvictionEngine,
}

impl EmbeddedPrescient {
    /// Loads configuration, then opens the first usable store root.
    pub fn new(config_path: Option<PathBuf>, store_override: Option<PathBuf>) -> Result<Self> {
        let mut config = PrescientConfig::load_or_default(config_path).context("Failed to load configuration")?;
        if let Some(root) = store_override {
            config.store.roots = vec![root];
        }
        config.validate().context("Configuration validation failed")?;

        Self::from_config(config)
    }

    pub fn from_config(config: PrescientConfig) -> Result<Self> {
        let store = Arc::new(
            JsonPatternRepository::discover(&config.candidate_roots(), config.lock_options())
                .context("Failed to open pattern store")?,
        );
        let repository: Arc<dyn PatternRepository> = store.clone();

        let events = EventBus::with_default_capacity();
        let resources = Arc::new(FileSystemResourceLoader::new(config.skills_dir()));
        let predictor = SkillPredictor::from_config(&config, Arc::clone(&repository), resources, events.clone());
        let engine = EvictionEngine::from_config(&config, repository, Arc::clone(predictor.budget()), events)
            .with_cache(predictor.loader().clone());

        Ok(Self {
            config,
            store,
            predictor,
            engine,
        })
    }

    pub fn config(&self) -> &PrescientConfig {
        &self.config
    }

    pub fn store(&self) -> &JsonPatternRepository {
        &self.store
    }

    pub fn predictor(&self) -> &SkillPredictor {
        &self.predictor
    }

    pub fn engine(&self) -> &EvictionEngine {
        &self.engine
    }

    pub async fn shutdown(&self) {
        self.predictor.shutdown().await;
    }
}
