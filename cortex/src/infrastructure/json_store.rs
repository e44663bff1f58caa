// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! JSON Pattern Store
//!
//! File-backed [`PatternRepository`] shared by independent processes.
//!
//! # Layout
//!
//! ```text
//! <root>/patterns.json        { "patterns": [ ... ] }
//! <root>/patterns.json.lock   sidecar, content irrelevant
//! ```
//!
//! Every read takes the shared lock; every write takes the exclusive lock for
//! the whole read-modify-write and replaces the document atomically with a
//! temporary file persisted over the store file. Readers therefore see either
//! the old or the new document, never a partial one.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Durable, cross-process pattern storage

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::file_lock::{lock_path_for, LockMode, LockOptions, StoreLock};
use crate::domain::{
    PatternFilter, PatternId, PatternMutation, PatternRecord, PatternRepository, PatternScan,
    RepositoryError,
};

pub const STORE_FILE_NAME: &str = "patterns.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    patterns: Vec<PatternRecord>,
}

#[derive(Debug)]
struct StoreFiles {
    path: PathBuf,
    lock_path: PathBuf,
    options: LockOptions,
}

impl StoreFiles {
    fn new(root: &Path, options: LockOptions) -> Self {
        let path = root.join(STORE_FILE_NAME);
        Self {
            lock_path: lock_path_for(&path),
            path,
            options,
        }
    }

    fn lock(&self, mode: LockMode) -> Result<StoreLock, RepositoryError> {
        StoreLock::acquire(&self.lock_path, mode, self.options)
    }

    /// Caller holds a lock. A missing file is an empty store; anything
    /// unparseable is corrupt.
    fn read_unlocked(&self) -> Result<Vec<PatternRecord>, RepositoryError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        serde_json::from_str::<StoreDocument>(&raw)
            .map(|doc| doc.patterns)
            .map_err(|err| RepositoryError::StoreCorrupt {
                path: self.path.clone(),
                reason: err.to_string(),
            })
    }

    /// Caller holds the exclusive lock.
    fn write_unlocked(&self, patterns: Vec<PatternRecord>) -> Result<(), RepositoryError> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;

        let document = StoreDocument { patterns };
        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, &document)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|err| RepositoryError::Io(err.error))?;
        Ok(())
    }

    fn read(&self) -> Result<Vec<PatternRecord>, RepositoryError> {
        let _lock = self.lock(LockMode::Shared)?;
        self.read_unlocked()
    }

    /// Exclusive read-modify-write. `mutate` reports whether it changed
    /// anything; unchanged documents are not rewritten.
    fn modify<T>(
        &self,
        mutate: impl FnOnce(&mut Vec<PatternRecord>) -> (T, bool),
    ) -> Result<T, RepositoryError> {
        let _lock = self.lock(LockMode::Exclusive)?;
        let mut patterns = self.read_unlocked()?;
        let (value, changed) = mutate(&mut patterns);
        if changed {
            self.write_unlocked(patterns)?;
        }
        Ok(value)
    }
}

/// Pattern repository backed by one `patterns.json` per store root.
#[derive(Debug, Clone)]
pub struct JsonPatternRepository {
    root: PathBuf,
    files: Arc<StoreFiles>,
}

impl JsonPatternRepository {
    /// Repository rooted at `root`. The file is created on first write.
    pub fn open(root: impl Into<PathBuf>, options: LockOptions) -> Self {
        let root = root.into();
        let files = Arc::new(StoreFiles::new(&root, options));
        Self { root, files }
    }

    /// Picks the authoritative store among candidate roots.
    ///
    /// The first root holding a parseable store wins. A root whose store
    /// exists but does not parse stops discovery with `StoreCorrupt`. With no
    /// store anywhere, the first candidate becomes the root.
    ///
    /// Blocks on file locks; call it at startup or from a blocking thread.
    pub fn discover(candidates: &[PathBuf], options: LockOptions) -> Result<Self, RepositoryError> {
        let first = candidates.first().ok_or_else(|| {
            RepositoryError::Io(std::io::Error::new(
                ErrorKind::InvalidInput,
                "no candidate store roots configured",
            ))
        })?;

        for root in candidates {
            let files = StoreFiles::new(root, options);
            if !files.path.is_file() {
                debug!(root = %root.display(), "No pattern store at candidate root");
                continue;
            }

            let patterns = files.read()?;
            info!(
                path = %files.path.display(),
                patterns = patterns.len(),
                "Discovered pattern store"
            );
            return Ok(Self::open(root.clone(), options));
        }

        info!(root = %first.display(), "No existing pattern store found, using first candidate root");
        Ok(Self::open(first.clone(), options))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self) -> &Path {
        &self.files.path
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, RepositoryError>
    where
        T: Send + 'static,
        F: FnOnce(&StoreFiles) -> Result<T, RepositoryError> + Send + 'static,
    {
        let files = Arc::clone(&self.files);
        tokio::task::spawn_blocking(move || op(&files))
            .await
            .map_err(|e| RepositoryError::Task(e.to_string()))?
    }
}

#[async_trait]
impl PatternRepository for JsonPatternRepository {
    async fn append(&self, record: &PatternRecord) -> Result<(), RepositoryError> {
        let record = record.clone();
        let id = record.id.clone();
        let result = self
            .blocking(move |files| {
                files.modify(|patterns| {
                    match patterns.iter().position(|p| p.id == record.id) {
                        Some(index) => patterns[index] = record,
                        None => patterns.push(record),
                    }
                    ((), true)
                })
            })
            .await;

        match &result {
            Ok(()) => debug!(pattern_id = %id, path = %self.files.path.display(), "Appended pattern"),
            Err(e) => warn!(pattern_id = %id, path = %self.files.path.display(), error = %e, "Failed to append pattern"),
        }
        result
    }

    async fn update(
        &self,
        id: &PatternId,
        mutation: PatternMutation,
    ) -> Result<Option<PatternRecord>, RepositoryError> {
        let id = id.clone();
        self.blocking(move |files| {
            files.modify(|patterns| match patterns.iter_mut().find(|p| p.id == id) {
                Some(record) => {
                    mutation(record);
                    (Some(record.clone()), true)
                }
                None => (None, false),
            })
        })
        .await
    }

    async fn scan(&self, filter: PatternFilter) -> Result<PatternScan, RepositoryError> {
        let patterns = self.blocking(|files| files.read()).await?;
        Ok(PatternScan::new(patterns, filter))
    }

    async fn count(&self) -> Result<usize, RepositoryError> {
        self.blocking(|files| files.read().map(|p| p.len())).await
    }

    async fn remove(&self, ids: &[PatternId]) -> Result<usize, RepositoryError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids: HashSet<PatternId> = ids.iter().cloned().collect();
        let removed = self
            .blocking(move |files| {
                files.modify(|patterns| {
                    let before = patterns.len();
                    patterns.retain(|p| !ids.contains(&p.id));
                    let removed = before - patterns.len();
                    (removed, removed > 0)
                })
            })
            .await?;

        debug!(removed, path = %self.files.path.display(), "Removed patterns");
        Ok(removed)
    }

    fn describe(&self) -> String {
        self.files.path.display().to_string()
    }
}
