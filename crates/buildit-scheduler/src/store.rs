//! In-memory pipeline store.

use async_trait::async_trait;
use buildit_core::{Error, PipelineId, PipelineRecord, PipelineStore, Result};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Keeps records in a map. Suitable for a single process and for tests.
#[derive(Debug, Default)]
pub struct MemoryPipelineStore {
    records: RwLock<HashMap<PipelineId, PipelineRecord>>,
}

impl MemoryPipelineStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl PipelineStore for MemoryPipelineStore {
    async fn save(&self, record: &PipelineRecord) -> Result<()> {
        self.records
            .write()
            .await
            .insert(record.id, record.clone());
        Ok(())
    }

    async fn load(&self, id: PipelineId) -> Result<PipelineRecord> {
        self.records
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("pipeline {}", id)))
    }

    async fn list(&self) -> Result<Vec<PipelineId>> {
        let mut ids: Vec<PipelineId> = self.records.read().await.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_replaces_record() {
        let store = MemoryPipelineStore::new();
        let mut record = PipelineRecord::new("app", "main", "abc");
        store.save(&record).await.unwrap();
        record.sha = "def".to_string();
        store.save(&record).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.load(record.id).await.unwrap().sha, "def");
        assert_eq!(store.list().await.unwrap(), vec![record.id]);
    }

    #[tokio::test]
    async fn test_load_unknown_is_not_found() {
        let store = MemoryPipelineStore::new();
        assert!(store.is_empty().await);
        assert!(matches!(
            store.load(PipelineId::new()).await,
            Err(Error::NotFound(_))
        ));
    }
}
