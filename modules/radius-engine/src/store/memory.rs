use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use radius_common::{AnalysisRecord, RadiusError};

use super::AnalysisStore;

const DEFAULT_CAPACITY: usize = 200;

struct Inner {
    records: HashMap<String, AnalysisRecord>,
    order: VecDeque<String>,
}

/// Bounded in-memory store, used standalone in tests and as the fallback
/// when no database is configured. Oldest records are evicted first once the
/// cap is reached.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                records: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity,
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnalysisStore for MemoryStore {
    async fn put(&self, record: &AnalysisRecord) -> Result<(), RadiusError> {
        let mut inner = self.inner.lock().await;
        let id = record.analysis_id.clone();

        if !inner.records.contains_key(&id) {
            inner.order.push_back(id.clone());
        }
        inner.records.insert(id, record.clone());

        while inner.order.len() > self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                debug!(analysis_id = %evicted, "Evicting oldest cached analysis");
                inner.records.remove(&evicted);
            }
        }
        Ok(())
    }

    async fn get(&self, analysis_id: &str) -> Result<Option<AnalysisRecord>, RadiusError> {
        Ok(self.inner.lock().await.records.get(analysis_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::analysis_record_fixture;

    #[tokio::test]
    async fn round_trips_by_id() {
        let store = MemoryStore::new();
        let record = analysis_record_fixture("radius_20260101_000000_abcd1234");
        store.put(&record).await.unwrap();

        let loaded = store.get("radius_20260101_000000_abcd1234").await.unwrap();
        assert_eq!(loaded.unwrap().url, record.url);
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn evicts_oldest_beyond_capacity() {
        let store = MemoryStore::with_capacity(3);
        for i in 0..5 {
            store
                .put(&analysis_record_fixture(&format!("id_{i}")))
                .await
                .unwrap();
        }

        assert_eq!(store.len().await, 3);
        assert!(store.get("id_0").await.unwrap().is_none());
        assert!(store.get("id_1").await.unwrap().is_none());
        assert!(store.get("id_4").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn reinserting_same_id_does_not_duplicate() {
        let store = MemoryStore::with_capacity(2);
        let record = analysis_record_fixture("same");
        store.put(&record).await.unwrap();
        store.put(&record).await.unwrap();

        assert_eq!(store.len().await, 1);
    }
}
