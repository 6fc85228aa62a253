//! In-memory mapping store for single-process runs and tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{expiry_millis, now_millis, MappingResult, MappingStore};
use crate::target::TargetId;

#[derive(Debug, Clone, Copy)]
struct Entry {
    target: TargetId,
    expires_at: i64,
}

impl Entry {
    fn is_live(&self, now: i64) -> bool {
        self.expires_at > now
    }
}

/// Mapping entries in a shared hash map.
#[derive(Clone, Default)]
pub struct MemoryMappingStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryMappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl MappingStore for MemoryMappingStore {
    async fn put(&self, key: &str, target: TargetId, ttl: Duration) -> MappingResult<()> {
        self.entries.write().await.insert(
            key.to_string(),
            Entry {
                target,
                expires_at: expiry_millis(ttl),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> MappingResult<Option<TargetId>> {
        let now = now_millis();
        Ok(self
            .entries
            .read()
            .await
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.target))
    }

    async fn remove(&self, key: &str) -> MappingResult<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn remove_prefix(&self, prefix: &str) -> MappingResult<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }

    async fn count_prefix(&self, prefix: &str) -> MappingResult<u64> {
        let now = now_millis();
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && e.is_live(now))
            .count() as u64)
    }

    async fn purge_expired(&self) -> MappingResult<u64> {
        let now = now_millis();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        Ok((before - entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_purge_expired_keeps_live_entries() {
        let store = MemoryMappingStore::new();
        store.put("a", 1, Duration::from_millis(10)).await.unwrap();
        store.put("b", 2, Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("b").await.unwrap(), Some(2));
    }
}
