// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Pattern Repository Interface
//!
//! Persistence contract for [`PatternRecord`]s. The interface lives in the
//! domain layer; implementations live in `crate::infrastructure`.
//!
//! | Implementation | Sharing |
//! |----------------|---------|
//! | `JsonPatternRepository` | one JSON document shared by cooperating processes |
//! | `InMemoryPatternRepository` | single process, tests and embedding |
//!
//! ## Failure semantics
//!
//! - [`RepositoryError::StoreLockTimeout`] is retryable.
//! - [`RepositoryError::StoreCorrupt`] is fatal for that operation; the store
//!   file is left exactly as found and is never reported as empty.

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::pattern::{PatternId, PatternRecord};

/// In-place change applied to one record under the writer lock.
pub type PatternMutation = Box<dyn FnOnce(&mut PatternRecord) + Send>;

/// Read-only predicate applied lazily to a scan snapshot.
#[derive(Clone)]
pub struct PatternFilter(Option<Arc<dyn Fn(&PatternRecord) -> bool + Send + Sync>>);

impl PatternFilter {
    pub fn all() -> Self {
        Self(None)
    }

    pub fn new(predicate: impl Fn(&PatternRecord) -> bool + Send + Sync + 'static) -> Self {
        Self(Some(Arc::new(predicate)))
    }

    pub fn task_type(task_type: impl Into<String>) -> Self {
        let task_type = task_type.into();
        Self::new(move |record| record.fingerprint.task_type == task_type)
    }

    pub fn matches(&self, record: &PatternRecord) -> bool {
        self.0.as_ref().map_or(true, |predicate| predicate(record))
    }
}

impl Default for PatternFilter {
    fn default() -> Self {
        Self::all()
    }
}

impl fmt::Debug for PatternFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.0.is_some() { "PatternFilter(custom)" } else { "PatternFilter(all)" })
    }
}

/// Lazy, restartable view over one consistent snapshot of the store.
///
/// The predicate runs on iteration, not on read; calling [`PatternScan::iter`]
/// again restarts from the first record of the same snapshot.
#[derive(Debug, Clone)]
pub struct PatternScan {
    snapshot: Arc<[PatternRecord]>,
    filter: PatternFilter,
}

impl PatternScan {
    pub fn new(snapshot: impl Into<Arc<[PatternRecord]>>, filter: PatternFilter) -> Self {
        Self {
            snapshot: snapshot.into(),
            filter,
        }
    }

    pub fn iter(&self) -> ScanIter<'_> {
        ScanIter {
            inner: self.snapshot.iter(),
            filter: &self.filter,
        }
    }

    /// Records in the underlying snapshot, ignoring the filter.
    pub fn snapshot_len(&self) -> usize {
        self.snapshot.len()
    }

    pub fn to_vec(&self) -> Vec<PatternRecord> {
        self.iter().cloned().collect()
    }
}

impl<'a> IntoIterator for &'a PatternScan {
    type Item = &'a PatternRecord;
    type IntoIter = ScanIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct ScanIter<'a> {
    inner: std::slice::Iter<'a, PatternRecord>,
    filter: &'a PatternFilter,
}

impl<'a> Iterator for ScanIter<'a> {
    type Item = &'a PatternRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let filter = self.filter;
        self.inner.by_ref().find(|record| filter.matches(record))
    }
}

/// Repository interface for pattern records.
#[async_trait]
pub trait PatternRepository: Send + Sync {
    /// Insert, or replace the record with the same id
    async fn append(&self, record: &PatternRecord) -> Result<(), RepositoryError>;

    /// Atomically mutate one record. `Ok(None)` when the id is unknown.
    async fn update(
        &self,
        id: &PatternId,
        mutation: PatternMutation,
    ) -> Result<Option<PatternRecord>, RepositoryError>;

    /// Read a snapshot; the filter is applied lazily
    async fn scan(&self, filter: PatternFilter) -> Result<PatternScan, RepositoryError>;

    async fn count(&self) -> Result<usize, RepositoryError>;

    /// Delete records by id, returning how many existed. Reserved for eviction.
    async fn remove(&self, ids: &[PatternId]) -> Result<usize, RepositoryError>;

    async fn get(&self, id: &PatternId) -> Result<Option<PatternRecord>, RepositoryError> {
        let id = id.clone();
        let scan = self.scan(PatternFilter::new(move |record| record.id == id)).await?;
        Ok(scan.iter().next().cloned())
    }

    /// Human-readable location for logs
    fn describe(&self) -> String;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Timed out after {waited:?} waiting for the store lock at {}", path.display())]
    StoreLockTimeout { path: PathBuf, waited: Duration },

    #[error("Store at {} is corrupt: {reason}", path.display())]
    StoreCorrupt { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl RepositoryError {
    /// Only lock timeouts are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreLockTimeout { .. })
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
