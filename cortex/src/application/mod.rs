// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application services: prediction, learning and reclaim.

pub mod eviction_scheduler;
pub mod eviction_service;
pub mod prediction_service;

pub use eviction_scheduler::{EvictionScheduler, EvictionSchedulerConfig};
pub use eviction_service::{EvictionEngine, ReclaimReport};
pub use prediction_service::{PredictorStats, SkillPredictor};
