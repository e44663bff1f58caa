// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Usage counters for reporting and adaptive eviction.
//!
//! The tracker sits outside the matching algorithm. Cache lookups feed the
//! shared [`HitRateWindow`] that the adaptive eviction policy reads.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

use super::eviction::HitRateWindow;

#[derive(Debug)]
pub struct BudgetTracker {
    predictions: AtomicU64,
    default_fallbacks: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    loads_succeeded: AtomicU64,
    loads_failed: AtomicU64,
    bytes_loaded: AtomicU64,
    evictions: AtomicU64,
    byte_budget: Option<u64>,
    over_budget: AtomicBool,
    window: Arc<HitRateWindow>,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetSnapshot {
    pub predictions: u64,
    pub default_fallbacks: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub loads_succeeded: u64,
    pub loads_failed: u64,
    pub bytes_loaded: u64,
    pub evictions: u64,
    pub byte_budget: Option<u64>,
    pub window_hit_rate: Option<f64>,
}

impl BudgetSnapshot {
    pub fn hit_rate(&self) -> Option<f64> {
        let total = self.cache_hits + self.cache_misses;
        (total > 0).then(|| self.cache_hits as f64 / total as f64)
    }
}

impl BudgetTracker {
    pub fn new(window: Arc<HitRateWindow>) -> Self {
        Self {
            predictions: AtomicU64::new(0),
            default_fallbacks: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            loads_succeeded: AtomicU64::new(0),
            loads_failed: AtomicU64::new(0),
            bytes_loaded: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            byte_budget: None,
            over_budget: AtomicBool::new(false),
            window,
        }
    }

    pub fn with_byte_budget(mut self, budget: Option<u64>) -> Self {
        self.byte_budget = budget;
        self
    }

    pub fn window(&self) -> &Arc<HitRateWindow> {
        &self.window
    }

    pub fn record_prediction(&self, used_defaults: bool) {
        self.predictions.fetch_add(1, Ordering::Relaxed);
        if used_defaults {
            self.default_fallbacks.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        let counter = if hit { &self.cache_hits } else { &self.cache_misses };
        counter.fetch_add(1, Ordering::Relaxed);
        self.window.record(hit);
    }

    pub fn record_load(&self, bytes: Option<u64>) {
        match bytes {
            Some(bytes) => {
                self.loads_succeeded.fetch_add(1, Ordering::Relaxed);
                let total = self.bytes_loaded.fetch_add(bytes, Ordering::Relaxed) + bytes;
                self.check_budget(total);
            }
            None => {
                self.loads_failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Bytes freed by cache eviction count back against the budget.
    pub fn record_evictions(&self, count: u64, bytes_freed: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
        if bytes_freed > 0 {
            let previous = self
                .bytes_loaded
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                    Some(current.saturating_sub(bytes_freed))
                })
                .unwrap_or(0);
            self.check_budget(previous.saturating_sub(bytes_freed));
        }
    }

    fn check_budget(&self, total: u64) {
        let Some(budget) = self.byte_budget else {
            return;
        };
        let over = total > budget;
        let was_over = self.over_budget.swap(over, Ordering::Relaxed);
        if over && !was_over {
            warn!(bytes_loaded = total, byte_budget = budget, "Resource cache exceeded its byte budget");
        }
    }

    pub fn is_over_budget(&self) -> bool {
        self.over_budget.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> BudgetSnapshot {
        BudgetSnapshot {
            predictions: self.predictions.load(Ordering::Relaxed),
            default_fallbacks: self.default_fallbacks.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            loads_succeeded: self.loads_succeeded.load(Ordering::Relaxed),
            loads_failed: self.loads_failed.load(Ordering::Relaxed),
            bytes_loaded: self.bytes_loaded.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            byte_budget: self.byte_budget,
            window_hit_rate: self.window.hit_rate(),
        }
    }
}

impl Default for BudgetTracker {
    fn default() -> Self {
        Self::new(Arc::new(HitRateWindow::new(100)))
    }
}
