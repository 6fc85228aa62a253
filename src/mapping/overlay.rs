//! Dry-run mapping layer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{MappingResult, MappingStore, MemoryMappingStore};
use crate::target::TargetId;

/// Reads fall through to the base store; writes and removals stay here.
pub struct OverlayMappingStore {
    base: Arc<dyn MappingStore>,
    overlay: MemoryMappingStore,
    /// Keys and prefixes removed in the overlay, hiding base entries.
    hidden: RwLock<Vec<String>>,
}

impl OverlayMappingStore {
    pub fn new(base: Arc<dyn MappingStore>) -> Self {
        Self {
            base,
            overlay: MemoryMappingStore::new(),
            hidden: RwLock::new(Vec::new()),
        }
    }

    async fn is_hidden(&self, key: &str) -> bool {
        self.hidden
            .read()
            .await
            .iter()
            .any(|prefix| key.starts_with(prefix.as_str()))
    }
}

#[async_trait]
impl MappingStore for OverlayMappingStore {
    async fn put(&self, key: &str, target: TargetId, ttl: Duration) -> MappingResult<()> {
        self.overlay.put(key, target, ttl).await
    }

    async fn get(&self, key: &str) -> MappingResult<Option<TargetId>> {
        if let Some(target) = self.overlay.get(key).await? {
            return Ok(Some(target));
        }
        if self.is_hidden(key).await {
            return Ok(None);
        }
        self.base.get(key).await
    }

    async fn remove(&self, key: &str) -> MappingResult<bool> {
        let existed = self.get(key).await?.is_some();
        self.overlay.remove(key).await?;
        self.hidden.write().await.push(key.to_string());
        Ok(existed)
    }

    async fn remove_prefix(&self, prefix: &str) -> MappingResult<u64> {
        let visible = self.count_prefix(prefix).await?;
        self.overlay.remove_prefix(prefix).await?;
        self.hidden.write().await.push(prefix.to_string());
        Ok(visible)
    }

    /// Approximate when the overlay shadows base keys: entries present in
    /// both layers are counted twice.
    async fn count_prefix(&self, prefix: &str) -> MappingResult<u64> {
        let overlay = self.overlay.count_prefix(prefix).await?;
        if self.is_hidden(prefix).await {
            return Ok(overlay);
        }
        Ok(overlay + self.base.count_prefix(prefix).await?)
    }

    async fn purge_expired(&self) -> MappingResult<u64> {
        self.overlay.purge_expired().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_overlay_never_writes_through() {
        let base = Arc::new(MemoryMappingStore::new());
        base.put("k:1", 10, TTL).await.unwrap();

        let overlay = OverlayMappingStore::new(base.clone());
        overlay.put("k:2", 20, TTL).await.unwrap();
        overlay.put("k:1", 11, TTL).await.unwrap();

        assert_eq!(overlay.get("k:1").await.unwrap(), Some(11));
        assert_eq!(overlay.get("k:2").await.unwrap(), Some(20));
        assert_eq!(base.get("k:1").await.unwrap(), Some(10));
        assert_eq!(base.get("k:2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_removal_hides_base_entries() {
        let base = Arc::new(MemoryMappingStore::new());
        base.put("ns:1", 10, TTL).await.unwrap();
        base.put("ns:2", 20, TTL).await.unwrap();

        let overlay = OverlayMappingStore::new(base.clone());
        assert_eq!(overlay.remove_prefix("ns:").await.unwrap(), 2);
        assert_eq!(overlay.get("ns:1").await.unwrap(), None);
        assert_eq!(base.len().await, 2);

        overlay.put("ns:1", 99, TTL).await.unwrap();
        assert_eq!(overlay.get("ns:1").await.unwrap(), Some(99));
    }
}
