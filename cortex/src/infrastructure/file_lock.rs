// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Cross-process exclusive region over a sidecar lock file.
//!
//! `fs2` maps to `flock` on Unix and `LockFileEx` on Windows. Locks are
//! advisory and owned by the open file description, so two handles in the
//! same process contend exactly like two processes do.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::trace;

use crate::domain::RepositoryError;

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_LOCK_RETRY: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Many readers
    Shared,
    /// One writer, no readers
    Exclusive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    pub timeout: Duration,
    pub retry_interval: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_LOCK_TIMEOUT,
            retry_interval: DEFAULT_LOCK_RETRY,
        }
    }
}

/// Held lock; released on drop.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    mode: LockMode,
}

impl StoreLock {
    /// Blocks the calling thread until the lock is held or `options.timeout`
    /// elapses. Run it on a blocking thread.
    pub fn acquire(lock_path: &Path, mode: LockMode, options: LockOptions) -> Result<Self, RepositoryError> {
        if let Some(parent) = lock_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)?;

        let start = Instant::now();
        loop {
            let result = match mode {
                LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
                LockMode::Shared => FileExt::try_lock_shared(&file),
            };
            match result {
                Ok(()) => {
                    trace!(path = %lock_path.display(), ?mode, waited_ms = start.elapsed().as_millis() as u64, "Store lock acquired");
                    return Ok(Self { file, mode });
                }
                Err(err) if is_contended(&err) => {
                    let waited = start.elapsed();
                    if waited >= options.timeout {
                        return Err(RepositoryError::StoreLockTimeout {
                            path: lock_path.to_path_buf(),
                            waited,
                        });
                    }
                    std::thread::sleep(options.retry_interval.min(options.timeout - waited));
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// `patterns.json` → `patterns.json.lock`
pub fn lock_path_for(store_path: &Path) -> PathBuf {
    let mut name = store_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    store_path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick() -> LockOptions {
        LockOptions {
            timeout: Duration::from_millis(100),
            retry_interval: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_lock_path() {
        assert_eq!(
            lock_path_for(Path::new("/data/patterns.json")),
            PathBuf::from("/data/patterns.json.lock")
        );
    }

    #[test]
    fn test_shared_locks_coexist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.lock");

        let first = StoreLock::acquire(&path, LockMode::Shared, quick()).unwrap();
        let second = StoreLock::acquire(&path, LockMode::Shared, quick()).unwrap();
        assert_eq!(first.mode(), LockMode::Shared);
        assert_eq!(second.mode(), LockMode::Shared);
    }

    #[test]
    fn test_exclusive_times_out_then_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.lock");

        let held = StoreLock::acquire(&path, LockMode::Exclusive, quick()).unwrap();
        let err = StoreLock::acquire(&path, LockMode::Exclusive, quick()).unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, RepositoryError::StoreLockTimeout { .. }));

        let err = StoreLock::acquire(&path, LockMode::Shared, quick()).unwrap_err();
        assert!(err.is_retryable());

        drop(held);
        assert!(StoreLock::acquire(&path, LockMode::Exclusive, quick()).is_ok());
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("store.lock");

        let lock = StoreLock::acquire(&path, LockMode::Exclusive, quick()).unwrap();
        assert!(path.exists());
        drop(lock);
    }
}
