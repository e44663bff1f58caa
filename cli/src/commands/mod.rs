// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the prescient CLI

pub mod config;
pub mod store;
pub mod task;

pub use self::config::ConfigCommand;
pub use self::store::{ReclaimArgs, StatsArgs};
pub use self::task::{PredictArgs, RecordArgs, TaskArgs};
