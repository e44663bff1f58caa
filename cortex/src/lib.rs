// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Prescient Cortex
//!
//! Learns which skills and resources past tasks needed, predicts them for new
//! tasks, and preloads them in priority tiers.
//!
//! # Architecture
//!
//! - **Layer:** Learning & Memory Layer
//! - **Purpose:** Pattern learning and predictive resource loading

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use application::*;
pub use config::{ConfigError, PrescientConfig};
pub use domain::*;
pub use infrastructure::*;
