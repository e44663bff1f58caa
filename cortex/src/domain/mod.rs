// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Pure model of task fingerprints, learned patterns and predictions.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Matching pipeline, eviction policies and repository contract

pub mod aggregator;
pub mod budget;
pub mod events;
pub mod eviction;
pub mod fingerprint;
pub mod pattern;
pub mod prediction;
pub mod repository;
pub mod similarity;

pub use aggregator::*;
pub use budget::*;
pub use events::*;
pub use eviction::*;
pub use fingerprint::*;
pub use pattern::*;
pub use prediction::*;
pub use repository::*;
pub use similarity::*;
