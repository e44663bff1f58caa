// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Tiered Cache Loader
//!
//! Turns a ranked prediction into background loads against the shared
//! [`ResourceCache`].
//!
//! | Tier | Behaviour |
//! |------|-----------|
//! | core | loaded immediately, all in parallel |
//! | probable | loaded in parallel, bounded by a semaphore |
//! | optional | deferred; loaded only through [`TieredCacheLoader::load_on_demand`] |
//!
//! Every load is its own task on a [`TaskTracker`]; a failure is logged,
//! published and counted, and never affects sibling loads. Each preload runs
//! under its own child of the shutdown token, so [`TieredCacheLoader::cancel_preload`]
//! stops one resource and [`TieredCacheLoader::shutdown`] stops them all. A load
//! abandoned by every caller leaves no pending slot behind.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Predictive preloading of skill resources

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::cache::{CacheEntry, CacheLookup, CacheReclaim, Loaded, ResourceCache};
use super::event_bus::EventBus;
use crate::domain::{BudgetTracker, EvictionTarget, PrescientEvent, ResourcePrediction, Tier};

pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_PARALLEL_PROBABLE: usize = 4;
pub const SKILL_FILE_NAME: &str = "SKILL.md";

/// Resource loading errors
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Timed out after {timeout:?} loading resource {resource_id}")]
    Timeout { resource_id: String, timeout: Duration },

    #[error("Failed to load resource {resource_id}: {reason}")]
    ResourceLoadFailed { resource_id: String, reason: String },

    #[error("Loader is shut down")]
    Cancelled,
}

impl LoadError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Fetches the content of one resource.
#[async_trait]
pub trait ResourceLoader: Send + Sync {
    async fn load(&self, resource_id: &str) -> Result<Bytes, LoadError>;
}

/// Loads skills from a directory: `<root>/<id>.md` or `<root>/<id>/SKILL.md`.
#[derive(Debug, Clone)]
pub struct FileSystemResourceLoader {
    root: PathBuf,
}

impl FileSystemResourceLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn candidates(&self, resource_id: &str) -> Vec<PathBuf> {
        vec![
            self.root.join(format!("{resource_id}.md")),
            self.root.join(resource_id).join(SKILL_FILE_NAME),
        ]
    }
}

/// Resource ids are single, plain path components.
fn is_plain_id(resource_id: &str) -> bool {
    let mut components = Path::new(resource_id).components();
    matches!(components.next(), Some(Component::Normal(_))) && components.next().is_none()
}

#[async_trait]
impl ResourceLoader for FileSystemResourceLoader {
    async fn load(&self, resource_id: &str) -> Result<Bytes, LoadError> {
        if !is_plain_id(resource_id) {
            return Err(LoadError::ResourceLoadFailed {
                resource_id: resource_id.to_string(),
                reason: "resource id must be a single path component".to_string(),
            });
        }

        for path in self.candidates(resource_id) {
            match tokio::fs::read(&path).await {
                Ok(content) => {
                    debug!(resource_id, path = %path.display(), "Read resource from disk");
                    return Ok(Bytes::from(content));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(LoadError::ResourceLoadFailed {
                        resource_id: resource_id.to_string(),
                        reason: format!("{}: {}", path.display(), e),
                    })
                }
            }
        }
        Err(LoadError::NotFound(resource_id.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderSettings {
    pub load_timeout: Duration,
    pub max_parallel_probable: usize,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            load_timeout: DEFAULT_LOAD_TIMEOUT,
            max_parallel_probable: DEFAULT_MAX_PARALLEL_PROBABLE,
        }
    }
}

/// What `preload` scheduled. Returned before any load completes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PreloadPlan {
    pub core: Vec<String>,
    pub probable: Vec<String>,
    pub deferred: Vec<String>,
}

impl PreloadPlan {
    pub fn is_empty(&self) -> bool {
        self.core.is_empty() && self.probable.is_empty() && self.deferred.is_empty()
    }
}

/// Core residency after [`TieredCacheLoader::wait_for_core`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoreReadiness {
    pub ready: Vec<String>,
    pub missing: Vec<String>,
}

impl CoreReadiness {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// A background preload that can be cancelled on its own.
struct ScheduledLoad {
    token: CancellationToken,
    generation: u64,
    confidence: f64,
}

struct LoaderInner {
    loader: Arc<dyn ResourceLoader>,
    cache: Arc<ResourceCache>,
    settings: LoaderSettings,
    probable_permits: Arc<Semaphore>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    preloads: DashMap<String, ScheduledLoad>,
    generations: AtomicU64,
    budget: Arc<BudgetTracker>,
    events: EventBus,
}

#[derive(Clone)]
pub struct TieredCacheLoader {
    inner: Arc<LoaderInner>,
}

impl TieredCacheLoader {
    pub fn new(
        loader: Arc<dyn ResourceLoader>,
        cache: Arc<ResourceCache>,
        settings: LoaderSettings,
        budget: Arc<BudgetTracker>,
        events: EventBus,
    ) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                loader,
                cache,
                probable_permits: Arc::new(Semaphore::new(settings.max_parallel_probable.max(1))),
                settings,
                tracker: TaskTracker::new(),
                shutdown: CancellationToken::new(),
                preloads: DashMap::new(),
                generations: AtomicU64::new(0),
                budget,
                events,
            }),
        }
    }

    pub fn cache(&self) -> &Arc<ResourceCache> {
        &self.inner.cache
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Loads still running
    pub fn in_flight(&self) -> usize {
        self.inner.tracker.len()
    }

    /// Schedules background loads and returns at once.
    pub fn preload(&self, predictions: &[ResourcePrediction]) -> PreloadPlan {
        let mut plan = PreloadPlan::default();
        let mut seen = HashSet::new();

        for prediction in predictions {
            if !seen.insert(prediction.resource_id.as_str()) {
                continue;
            }
            let id = prediction.resource_id.clone();
            match prediction.tier {
                Tier::Core => plan.core.push(id),
                Tier::Probable => plan.probable.push(id),
                Tier::Optional => plan.deferred.push(id),
            }
        }

        if self.is_shut_down() {
            warn!("Preload requested after shutdown; nothing scheduled");
            return plan;
        }

        // repeated ids hit the already-scheduled check
        for prediction in predictions.iter().filter(|p| p.tier != Tier::Optional) {
            self.spawn_load(prediction);
        }

        info!(
            core = plan.core.len(),
            probable = plan.probable.len(),
            deferred = plan.deferred.len(),
            "Preload scheduled"
        );
        self.inner.events.publish(PrescientEvent::PreloadStarted {
            core: plan.core.len(),
            probable: plan.probable.len(),
            deferred: plan.deferred.len(),
            timestamp: Utc::now(),
        });
        plan
    }

    fn spawn_load(&self, prediction: &ResourcePrediction) {
        let resource_id = prediction.resource_id.clone();
        let tier = prediction.tier;
        let confidence = prediction.confidence;
        if self.inner.cache.lookup(&resource_id).is_ready() {
            debug!(resource_id = %resource_id, %tier, "Already resident, skipping preload");
            return;
        }

        let token = self.inner.shutdown.child_token();
        let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed);
        match self.inner.preloads.entry(resource_id.clone()) {
            Entry::Occupied(_) => {
                debug!(resource_id = %resource_id, %tier, "Preload already scheduled");
                return;
            }
            Entry::Vacant(vacant) => {
                vacant.insert(ScheduledLoad {
                    token: token.clone(),
                    generation,
                    confidence,
                });
            }
        }

        let inner = Arc::clone(&self.inner);
        self.inner.tracker.spawn(async move {
            let work = async {
                let _permit = match tier {
                    Tier::Probable => match Arc::clone(&inner.probable_permits).acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(_) => return,
                    },
                    _ => None,
                };
                // failures are already logged and published
                let _ = inner.load(&resource_id, Some(tier), Some(confidence)).await;
            };

            tokio::select! {
                _ = work => {}
                _ = token.cancelled() => {
                    debug!(resource_id = %resource_id, %tier, "Preload cancelled");
                }
            }
            inner
                .preloads
                .remove_if(&resource_id, |_, scheduled| scheduled.generation == generation);
        });
    }

    /// Cancels the background preload of one resource.
    ///
    /// Its pending slot is released unless another caller is waiting on the
    /// same load. Returns `false` when no preload of `resource_id` is running.
    pub fn cancel_preload(&self, resource_id: &str) -> bool {
        match self.inner.preloads.remove(resource_id) {
            Some((_, scheduled)) => {
                scheduled.token.cancel();
                debug!(resource_id, "Preload cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Resident entry, pending marker, or not loaded. Never starts a load.
    pub fn get_cached(&self, resource_id: &str) -> CacheLookup {
        let lookup = self.inner.cache.lookup(resource_id);
        self.inner.budget.record_cache_lookup(lookup.is_ready());
        lookup
    }

    /// Returns the resident entry, joining an in-flight load or starting one.
    pub async fn load_on_demand(&self, resource_id: &str) -> Result<Arc<CacheEntry>, LoadError> {
        if let CacheLookup::Ready(entry) = self.get_cached(resource_id) {
            return Ok(entry);
        }
        if self.is_shut_down() {
            return Err(LoadError::Cancelled);
        }

        let token = self.inner.shutdown.clone();
        tokio::select! {
            result = self.inner.load(resource_id, None, None) => result.map(|loaded| loaded.entry),
            _ = token.cancelled() => Err(LoadError::Cancelled),
        }
    }

    /// Waits up to `timeout` for every core resource of `plan` to be resident.
    ///
    /// Joins in-flight loads; a core load that already failed is retried once.
    /// Loads still running at the deadline stay with their preload task.
    pub async fn wait_for_core(&self, plan: &PreloadPlan, timeout: Duration) -> CoreReadiness {
        if !self.is_shut_down() {
            let token = self.inner.shutdown.clone();
            let loads = join_all(plan.core.iter().map(|id| {
                let confidence = self.inner.preloads.get(id).map(|scheduled| scheduled.confidence);
                self.inner.load(id, Some(Tier::Core), confidence)
            }));
            tokio::select! {
                _ = tokio::time::timeout(timeout, loads) => {}
                _ = token.cancelled() => {}
            }
        }

        let mut readiness = CoreReadiness::default();
        for id in &plan.core {
            if self.inner.cache.lookup(id).is_ready() {
                readiness.ready.push(id.clone());
            } else {
                readiness.missing.push(id.clone());
            }
        }
        if !readiness.is_complete() {
            warn!(missing = ?readiness.missing, "Core resources not resident within wait");
        }
        readiness
    }

    /// Evicts resident entries until `target_free_fraction` of the capacity is free.
    pub fn reclaim(&self, target_free_fraction: f64, min_retained: usize) -> usize {
        let reclaim = self.inner.cache.reclaim(target_free_fraction, min_retained);
        let evicted = reclaim.evicted.len();
        self.inner.report_evictions(reclaim);
        evicted
    }

    /// Cancels outstanding loads and waits for their tasks to finish.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        info!("Tiered cache loader stopped");
    }
}

impl LoaderInner {
    async fn load(
        &self,
        resource_id: &str,
        tier: Option<Tier>,
        confidence: Option<f64>,
    ) -> Result<Loaded, LoadError> {
        let started = Instant::now();
        let timeout = self.settings.load_timeout;
        let loader = Arc::clone(&self.loader);

        let result = self
            .cache
            .get_or_load(resource_id, || async move {
                match tokio::time::timeout(timeout, loader.load(resource_id)).await {
                    Ok(Ok(content)) => Ok(CacheEntry::new(resource_id, content, tier).with_confidence(confidence)),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(LoadError::Timeout {
                        resource_id: resource_id.to_string(),
                        timeout,
                    }),
                }
            })
            .await;

        match &result {
            Ok(loaded) if loaded.fresh => {
                let bytes = loaded.entry.size();
                let duration_ms = started.elapsed().as_millis() as u64;
                self.budget.record_load(Some(bytes));
                debug!(resource_id, tier = ?tier, bytes, duration_ms, "Resource loaded");
                self.events.publish(PrescientEvent::ResourceLoaded {
                    resource_id: resource_id.to_string(),
                    tier,
                    bytes,
                    duration_ms,
                    timestamp: Utc::now(),
                });
                let reclaim = self.cache.enforce_capacity(resource_id);
                self.report_evictions(reclaim);
            }
            Ok(_) => {}
            Err(e) => {
                self.budget.record_load(None);
                warn!(resource_id, tier = ?tier, error = %e, "Resource load failed");
                self.events.publish(PrescientEvent::ResourceLoadFailed {
                    resource_id: resource_id.to_string(),
                    tier,
                    reason: e.to_string(),
                    timestamp: Utc::now(),
                });
            }
        }
        result
    }

    fn report_evictions(&self, reclaim: CacheReclaim) {
        let (Some(policy), false) = (reclaim.policy, reclaim.evicted.is_empty()) else {
            return;
        };
        self.budget
            .record_evictions(reclaim.evicted.len() as u64, reclaim.bytes_freed);
        self.events.publish(PrescientEvent::PatternsEvicted {
            target: EvictionTarget::ResourceCache,
            policy,
            count: reclaim.evicted.len(),
            remaining: self.cache.len(),
            timestamp: Utc::now(),
        });
    }
}
