//! Shared table of operation records.
//!
//! The registry is an owned value injected into whoever needs it; clones share
//! the same table. Every read-modify-write of a record happens under the write
//! lock through [`OperationRegistry::update`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use depot_core::{Error, OperationRecord, OperationStatus, OperationType, Result};

#[derive(Debug, Clone)]
pub struct OperationRegistry {
    records: Arc<RwLock<HashMap<String, OperationRecord>>>,
    temp_dir: PathBuf,
}

impl OperationRegistry {
    pub fn new(temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            temp_dir: temp_dir.into(),
        }
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Directory holding the files of one operation.
    pub fn operation_dir(&self, operation_id: &str) -> PathBuf {
        self.temp_dir.join(operation_id)
    }

    /// Register a new operation under a fresh time-ordered id.
    pub async fn create(
        &self,
        operation_type: OperationType,
        status: OperationStatus,
    ) -> OperationRecord {
        let mut records = self.records.write().await;
        let mut operation_id = Uuid::now_v7().to_string();
        while records.contains_key(&operation_id) {
            operation_id = Uuid::now_v7().to_string();
        }
        let record = OperationRecord::new(operation_id.clone(), operation_type, status);
        records.insert(operation_id, record.clone());
        record
    }

    pub async fn get(&self, operation_id: &str) -> Option<OperationRecord> {
        self.records.read().await.get(operation_id).cloned()
    }

    /// Like [`get`](Self::get), but a missing record is `NotFound`.
    pub async fn require(&self, operation_id: &str) -> Result<OperationRecord> {
        self.get(operation_id)
            .await
            .ok_or_else(|| Error::NotFound(format!("Operation not found: {}", operation_id)))
    }

    /// Run `f` against the record while holding the write lock.
    pub async fn update<T, F>(&self, operation_id: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut OperationRecord) -> Result<T>,
    {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(operation_id)
            .ok_or_else(|| Error::NotFound(format!("Operation not found: {}", operation_id)))?;
        f(record)
    }

    pub async fn remove(&self, operation_id: &str) -> Option<OperationRecord> {
        self.records.write().await.remove(operation_id)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_assigns_unique_ids() {
        let registry = OperationRegistry::new("/tmp/ops");
        let mut ids = Vec::new();
        for _ in 0..50 {
            let record = registry
                .create(OperationType::Backup, OperationStatus::InProgress)
                .await;
            ids.push(record.operation_id);
        }
        let mut unique = ids.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 50);
        assert_eq!(registry.len().await, 50);
    }

    #[tokio::test]
    async fn test_ids_follow_submission_order() {
        let registry = OperationRegistry::new("/tmp/ops");
        let first = registry
            .create(OperationType::Backup, OperationStatus::InProgress)
            .await;
        let second = registry
            .create(OperationType::Restore, OperationStatus::InProgress)
            .await;
        assert!(first.operation_id < second.operation_id);
    }

    #[tokio::test]
    async fn test_update_and_require() {
        let registry = OperationRegistry::new("/tmp/ops");
        let record = registry
            .create(OperationType::Backup, OperationStatus::InProgress)
            .await;
        let id = record.operation_id;

        registry
            .update(&id, |r| r.transition(OperationStatus::Completed))
            .await
            .unwrap();
        let stored = registry.require(&id).await.unwrap();
        assert_eq!(stored.status, OperationStatus::Completed);
        assert!(stored.completed_at.is_some());

        let illegal = registry
            .update(&id, |r| r.transition(OperationStatus::Processing))
            .await;
        assert!(matches!(illegal, Err(Error::InvalidInput(_))));

        assert!(registry.remove(&id).await.is_some());
        assert!(matches!(
            registry.require(&id).await,
            Err(Error::NotFound(_))
        ));
        assert!(registry.is_empty().await);
    }

    #[test]
    fn test_operation_dir_is_namespaced() {
        let registry = OperationRegistry::new("/tmp/ops");
        assert_eq!(registry.operation_dir("abc"), PathBuf::from("/tmp/ops/abc"));
    }
}
