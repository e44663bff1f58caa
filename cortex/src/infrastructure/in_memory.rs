// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Process-local pattern repository with the same semantics as the JSON store.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::{
    PatternFilter, PatternId, PatternMutation, PatternRecord, PatternRepository, PatternScan,
    RepositoryError,
};

#[derive(Debug, Clone, Default)]
pub struct InMemoryPatternRepository {
    patterns: Arc<RwLock<Vec<PatternRecord>>>,
}

impl InMemoryPatternRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_patterns(patterns: impl IntoIterator<Item = PatternRecord>) -> Self {
        Self {
            patterns: Arc::new(RwLock::new(patterns.into_iter().collect())),
        }
    }
}

#[async_trait]
impl PatternRepository for InMemoryPatternRepository {
    async fn append(&self, record: &PatternRecord) -> Result<(), RepositoryError> {
        let mut patterns = self.patterns.write();
        match patterns.iter().position(|p| p.id == record.id) {
            Some(index) => patterns[index] = record.clone(),
            None => patterns.push(record.clone()),
        }
        Ok(())
    }

    async fn update(
        &self,
        id: &PatternId,
        mutation: PatternMutation,
    ) -> Result<Option<PatternRecord>, RepositoryError> {
        let mut patterns = self.patterns.write();
        Ok(patterns.iter_mut().find(|p| &p.id == id).map(|record| {
            mutation(record);
            record.clone()
        }))
    }

    async fn scan(&self, filter: PatternFilter) -> Result<PatternScan, RepositoryError> {
        let snapshot = self.patterns.read().clone();
        Ok(PatternScan::new(snapshot, filter))
    }

    async fn count(&self) -> Result<usize, RepositoryError> {
        Ok(self.patterns.read().len())
    }

    async fn remove(&self, ids: &[PatternId]) -> Result<usize, RepositoryError> {
        let ids: HashSet<&PatternId> = ids.iter().collect();
        let mut patterns = self.patterns.write();
        let before = patterns.len();
        patterns.retain(|p| !ids.contains(&p.id));
        Ok(before - patterns.len())
    }

    fn describe(&self) -> String {
        "in-memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Fingerprint;

    #[tokio::test]
    async fn test_snapshot_is_isolated_from_later_writes() {
        let repo = InMemoryPatternRepository::new();
        repo.append(&PatternRecord::new(Fingerprint::default(), ["a"], 50.0, true))
            .await
            .unwrap();

        let scan = repo.scan(PatternFilter::all()).await.unwrap();
        repo.append(&PatternRecord::new(Fingerprint::default(), ["b"], 50.0, true))
            .await
            .unwrap();

        assert_eq!(scan.iter().count(), 1);
        assert_eq!(repo.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_appends() {
        let repo = Arc::new(InMemoryPatternRepository::new());
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let repo = Arc::clone(&repo);
                tokio::spawn(async move {
                    repo.append(&PatternRecord::new(Fingerprint::default(), ["r"], 50.0, true))
                        .await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(repo.count().await.unwrap(), 32);
    }
}
