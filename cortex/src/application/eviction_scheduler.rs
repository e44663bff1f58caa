// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Eviction Scheduler - Background task for periodic reclaim
//!
//! Runs the [`EvictionEngine`] on a fixed interval so long-lived processes keep
//! the pattern store under `max_records` without an explicit `reclaim` call.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Drives store and cache reclaim on a timer

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::{EvictionEngine, ReclaimReport};
use crate::config::EvictionConfig;
use crate::domain::RepositoryError;

/// Configuration for the eviction scheduler
#[derive(Debug, Clone)]
pub struct EvictionSchedulerConfig {
    /// Fraction of `max_records` to free on each cycle
    pub target_free_fraction: f64,

    /// How often to run a cycle
    pub interval: Duration,

    /// Whether the background task runs at all
    pub enabled: bool,
}

impl Default for EvictionSchedulerConfig {
    fn default() -> Self {
        Self {
            target_free_fraction: 0.2,
            interval: Duration::from_secs(3600),
            enabled: true,
        }
    }
}

impl From<&EvictionConfig> for EvictionSchedulerConfig {
    fn from(config: &EvictionConfig) -> Self {
        Self {
            target_free_fraction: config.target_free_fraction,
            interval: config.interval,
            enabled: config.enabled,
        }
    }
}

pub struct EvictionScheduler {
    engine: Arc<EvictionEngine>,
    config: EvictionSchedulerConfig,
    shutdown_token: CancellationToken,
}

impl EvictionScheduler {
    pub fn new(engine: Arc<EvictionEngine>, config: EvictionSchedulerConfig) -> Self {
        Self {
            engine,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Get a handle to trigger shutdown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Start the scheduler background task
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        if !self.config.enabled {
            info!("Eviction scheduler is disabled");
            return;
        }

        info!(
            interval = ?self.config.interval,
            target_free_fraction = self.config.target_free_fraction,
            "Starting eviction scheduler"
        );

        let mut tick = interval(self.config.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    debug!("Running eviction cycle");

                    match self.cycle().await {
                        Ok(report) => {
                            debug!(
                                policy = %report.policy,
                                evicted = report.evicted,
                                remaining = report.remaining,
                                "Eviction cycle completed"
                            );
                        }
                        Err(e) => {
                            warn!(error = %e, retryable = e.is_retryable(), "Eviction cycle failed");
                        }
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, stopping eviction scheduler");
                    break;
                }
            }
        }

        info!("Eviction scheduler stopped");
    }

    /// One store reclaim, plus a cache reclaim if the byte budget is exceeded.
    async fn cycle(&self) -> Result<ReclaimReport, RepositoryError> {
        let fraction = self.config.target_free_fraction;
        let report = self.engine.reclaim(fraction).await?;
        let relieved = self.engine.relieve_memory_pressure(fraction);
        if relieved > 0 {
            info!(evicted = relieved, "Resource cache reclaimed under memory pressure");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        BudgetTracker, EvictionPolicy, Fingerprint, HitRateWindow, PatternRecord, PatternRepository,
        PolicyKind,
    };
    use crate::infrastructure::{EventBus, InMemoryPatternRepository};

    fn engine(repository: Arc<InMemoryPatternRepository>, max_records: usize) -> Arc<EvictionEngine> {
        let window = Arc::new(HitRateWindow::new(10));
        let budget = Arc::new(BudgetTracker::new(Arc::clone(&window)));
        let policy = EvictionPolicy::new(PolicyKind::Recency, chrono::Duration::days(30), window);
        Arc::new(EvictionEngine::new(repository, policy, max_records, 0, budget, EventBus::new(16)))
    }

    fn filled(count: usize) -> Arc<InMemoryPatternRepository> {
        let records: Vec<PatternRecord> = (0..count)
            .map(|i| PatternRecord::new(Fingerprint::default(), [format!("r{i}")], 50.0, true))
            .collect();
        Arc::new(InMemoryPatternRepository::with_patterns(records))
    }

    #[test]
    fn test_scheduler_configuration() {
        let config = EvictionSchedulerConfig::default();
        assert_eq!(config.target_free_fraction, 0.2);
        assert_eq!(config.interval, Duration::from_secs(3600));
        assert!(config.enabled);

        let from_file = EvictionSchedulerConfig::from(&EvictionConfig::default());
        assert_eq!(from_file.interval, EvictionConfig::default().interval);
    }

    #[tokio::test]
    async fn test_cycle() {
        let repository = filled(10);
        let scheduler = EvictionScheduler::new(engine(repository.clone(), 10), EvictionSchedulerConfig::default());

        let report = scheduler.cycle().await.unwrap();
        assert_eq!(report.evicted, 2);
        assert_eq!(repository.count().await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_first_tick_runs_then_shutdown_stops() {
        let repository = filled(10);
        let config = EvictionSchedulerConfig {
            interval: Duration::from_secs(3600),
            ..Default::default()
        };
        let scheduler = Arc::new(EvictionScheduler::new(engine(repository.clone(), 10), config));
        let token = scheduler.shutdown_token();

        let handle = scheduler.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
        handle.await.unwrap();

        assert_eq!(repository.count().await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_scheduler_disabled() {
        let repository = filled(10);
        let config = EvictionSchedulerConfig {
            enabled: false,
            ..Default::default()
        };
        let scheduler = Arc::new(EvictionScheduler::new(engine(repository.clone(), 10), config));

        scheduler.start().await.unwrap();

        assert_eq!(repository.count().await.unwrap(), 10);
    }
}
