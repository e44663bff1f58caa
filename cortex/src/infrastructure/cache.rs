// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Shared resource cache with single-flight loading.
//!
//! Each resource id owns a slot holding a `tokio::sync::OnceCell`. Concurrent
//! loads of the same id collapse into one: the first caller runs the loader,
//! the rest await its result. A failed or abandoned initialization leaves the
//! cell empty and hands it to the next waiter; the slot is discarded once no
//! caller is left waiting on it.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::domain::{Evictable, EvictionPlan, EvictionPolicy, PolicyKind, Tier};

pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// A loaded resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub resource_id: String,
    #[serde(skip)]
    pub content: Bytes,
    /// Tier the resource was predicted in, `None` for on-demand loads
    pub tier: Option<Tier>,
    /// Confidence of the prediction that scheduled the load
    pub confidence: Option<f64>,
    pub loaded_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(resource_id: impl Into<String>, content: Bytes, tier: Option<Tier>) -> Self {
        Self {
            resource_id: resource_id.into(),
            content,
            tier,
            confidence: None,
            loaded_at: Utc::now(),
        }
    }

    pub fn with_confidence(mut self, confidence: Option<f64>) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }
}

/// Answer to "is this resource resident?"
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Ready(Arc<CacheEntry>),
    /// A load is in flight
    Pending,
    NotLoaded,
}

impl CacheLookup {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn entry(&self) -> Option<&Arc<CacheEntry>> {
        match self {
            Self::Ready(entry) => Some(entry),
            _ => None,
        }
    }
}

/// Result of [`ResourceCache::get_or_load`].
#[derive(Debug, Clone)]
pub struct Loaded {
    pub entry: Arc<CacheEntry>,
    /// This call ran the loader (as opposed to joining or reusing another load)
    pub fresh: bool,
}

#[derive(Debug)]
struct Slot {
    cell: OnceCell<Arc<CacheEntry>>,
    hits: AtomicU64,
    last_used: Mutex<DateTime<Utc>>,
}

impl Slot {
    fn new() -> Self {
        Self {
            cell: OnceCell::new(),
            hits: AtomicU64::new(0),
            last_used: Mutex::new(Utc::now()),
        }
    }

    fn touch(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        *self.last_used.lock() = Utc::now();
    }
}

/// Releases an unfinished slot when its `get_or_load` fails or is dropped.
struct PendingGuard<'a> {
    cache: &'a ResourceCache,
    resource_id: &'a str,
    slot: &'a Arc<Slot>,
    armed: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed && self.cache.discard_abandoned(self.resource_id, self.slot) {
            debug!(resource_id = self.resource_id, "Discarded pending slot");
        }
    }
}

/// Eviction view of one resident entry.
#[derive(Debug, Clone)]
struct Resident {
    resource_id: String,
    last_used_at: DateTime<Utc>,
    hits: u64,
}

impl Evictable for Resident {
    type Key = String;

    fn eviction_key(&self) -> String {
        self.resource_id.clone()
    }

    fn last_used_at(&self) -> DateTime<Utc> {
        self.last_used_at
    }

    fn use_count(&self) -> u64 {
        self.hits
    }
}

/// Outcome of one cache eviction pass.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CacheReclaim {
    pub policy: Option<PolicyKind>,
    pub evicted: Vec<String>,
    pub bytes_freed: u64,
}

#[derive(Debug)]
pub struct ResourceCache {
    slots: DashMap<String, Arc<Slot>>,
    capacity: usize,
    policy: EvictionPolicy,
}

impl ResourceCache {
    pub fn new(capacity: usize, policy: EvictionPolicy) -> Self {
        Self {
            slots: DashMap::new(),
            capacity: capacity.max(1),
            policy,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> &EvictionPolicy {
        &self.policy
    }

    /// Non-blocking residency check. Counts as a use when ready.
    pub fn lookup(&self, resource_id: &str) -> CacheLookup {
        let Some(slot) = self.slots.get(resource_id) else {
            return CacheLookup::NotLoaded;
        };
        match slot.value().cell.get() {
            Some(entry) => {
                slot.value().touch();
                CacheLookup::Ready(Arc::clone(entry))
            }
            None => CacheLookup::Pending,
        }
    }

    /// Returns the resident entry or runs `load` exactly once across all
    /// concurrent callers for `resource_id`.
    ///
    /// Dropping the returned future before it resolves releases the slot the
    /// same way a failed load does.
    pub async fn get_or_load<F, Fut, E>(&self, resource_id: &str, load: F) -> Result<Loaded, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CacheEntry, E>>,
    {
        let slot = Arc::clone(
            self.slots
                .entry(resource_id.to_string())
                .or_insert_with(|| Arc::new(Slot::new()))
                .value(),
        );
        let mut guard = PendingGuard {
            cache: self,
            resource_id,
            slot: &slot,
            armed: true,
        };

        let ran_here = AtomicBool::new(false);
        let result = slot
            .cell
            .get_or_try_init(|| async {
                ran_here.store(true, Ordering::Relaxed);
                load().await.map(Arc::new)
            })
            .await
            .cloned();

        match result {
            Ok(entry) => {
                guard.armed = false;
                slot.touch();
                // the slot may have been removed while loading
                self.slots
                    .entry(resource_id.to_string())
                    .or_insert_with(|| Arc::clone(&slot));
                Ok(Loaded {
                    entry,
                    fresh: ran_here.load(Ordering::Relaxed),
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Removes `slot` if it is still the one mapped to `resource_id`, holds no
    /// entry, and no other caller is waiting on it. The map and the calling
    /// `get_or_load` account for two strong references.
    fn discard_abandoned(&self, resource_id: &str, slot: &Arc<Slot>) -> bool {
        self.slots
            .remove_if(resource_id, |_, current| {
                Arc::ptr_eq(current, slot) && !current.cell.initialized() && Arc::strong_count(current) <= 2
            })
            .is_some()
    }

    pub fn remove(&self, resource_id: &str) -> Option<Arc<CacheEntry>> {
        self.slots
            .remove(resource_id)
            .and_then(|(_, slot)| slot.cell.get().cloned())
    }

    /// Ready entries only.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.value().cell.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn resident_bytes(&self) -> u64 {
        self.slots
            .iter()
            .filter_map(|s| s.value().cell.get().map(|e| e.size()))
            .sum()
    }

    pub fn resident_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .slots
            .iter()
            .filter(|s| s.value().cell.initialized())
            .map(|s| s.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Evicts down to capacity, never touching `keep`.
    pub fn enforce_capacity(&self, keep: &str) -> CacheReclaim {
        let len = self.len();
        if len <= self.capacity {
            return CacheReclaim::default();
        }
        self.evict(len - self.capacity, 0, Some(keep))
    }

    /// Frees `capacity * target_free_fraction` slots with the configured policy.
    pub fn reclaim(&self, target_free_fraction: f64, min_retained: usize) -> CacheReclaim {
        let quota = EvictionPolicy::quota(self.len(), self.capacity, target_free_fraction);
        self.evict(quota, min_retained, None)
    }

    fn evict(&self, quota: usize, min_retained: usize, keep: Option<&str>) -> CacheReclaim {
        let residents: Vec<Resident> = self
            .slots
            .iter()
            .filter(|s| s.value().cell.initialized() && Some(s.key().as_str()) != keep)
            .map(|s| Resident {
                resource_id: s.key().clone(),
                last_used_at: *s.value().last_used.lock(),
                hits: s.value().hits.load(Ordering::Relaxed),
            })
            .collect();

        let retained = min_retained.saturating_sub(usize::from(keep.is_some()));
        let EvictionPlan { policy, victims } = self.policy.select(&residents, quota, retained, Utc::now());

        let mut reclaim = CacheReclaim {
            policy: Some(policy),
            ..CacheReclaim::default()
        };
        for resource_id in victims {
            if let Some(entry) = self.remove(&resource_id) {
                reclaim.bytes_freed += entry.size();
                reclaim.evicted.push(resource_id);
            }
        }

        if !reclaim.evicted.is_empty() {
            debug!(%policy, evicted = reclaim.evicted.len(), bytes_freed = reclaim.bytes_freed, "Evicted cached resources");
        }
        reclaim
    }
}
