// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Infrastructure
//!
//! Storage, locking, caching and loading adapters for the domain layer.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Implements repository and loader contracts

pub mod cache;
pub mod event_bus;
pub mod file_lock;
pub mod in_memory;
pub mod json_store;
pub mod loader;

pub use cache::{CacheEntry, CacheLookup, CacheReclaim, Loaded, ResourceCache, DEFAULT_CACHE_CAPACITY};
pub use event_bus::{EventBus, EventBusError, EventReceiver};
pub use file_lock::{LockMode, LockOptions, StoreLock};
pub use in_memory::InMemoryPatternRepository;
pub use json_store::{JsonPatternRepository, STORE_FILE_NAME};
pub use loader::{
    CoreReadiness, FileSystemResourceLoader, LoadError, LoaderSettings, PreloadPlan, ResourceLoader,
    TieredCacheLoader,
};
