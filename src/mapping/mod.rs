//! Identifier mapping store: legacy id to target id, per entity namespace.
//!
//! Every cross-entity foreign key is resolved through here. Entries carry a
//! time-to-live; absence is always `None`, never a numeric sentinel.
//!
//! Backends:
//! - [`MemoryMappingStore`]: single process, used by tests
//! - [`crate::repository::DieselMappingStore`]: persisted next to the target data
//! - [`OverlayMappingStore`]: dry-run layer that never writes through

mod memory;
mod overlay;

pub use memory::MemoryMappingStore;
pub use overlay::OverlayMappingStore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::target::TargetId;

/// Default lifetime of a mapping entry.
pub const DEFAULT_MAPPING_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Result type for mapping operations.
pub type MappingResult<T> = Result<T, MappingError>;

/// Errors from mapping store backends.
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

impl From<diesel::result::Error> for MappingError {
    fn from(e: diesel::result::Error) -> Self {
        MappingError::Database(e.to_string())
    }
}

impl From<diesel::ConnectionError> for MappingError {
    fn from(e: diesel::ConnectionError) -> Self {
        MappingError::Unavailable(e.to_string())
    }
}

/// Current time in unix milliseconds, the unit expiries are stored in.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub(crate) fn expiry_millis(ttl: Duration) -> i64 {
    now_millis().saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
}

/// Pluggable key/value storage for mapping entries.
#[async_trait]
pub trait MappingStore: Send + Sync {
    async fn put(&self, key: &str, target: TargetId, ttl: Duration) -> MappingResult<()>;

    /// Live (unexpired) value for a key.
    async fn get(&self, key: &str) -> MappingResult<Option<TargetId>>;

    async fn remove(&self, key: &str) -> MappingResult<bool>;

    /// Remove every entry whose key starts with `prefix`; returns how many.
    async fn remove_prefix(&self, prefix: &str) -> MappingResult<u64>;

    /// Live entries whose key starts with `prefix`.
    async fn count_prefix(&self, prefix: &str) -> MappingResult<u64>;

    /// Drop expired entries; returns how many.
    async fn purge_expired(&self) -> MappingResult<u64>;

    /// Persist buffered writes.
    async fn flush(&self) -> MappingResult<()> {
        Ok(())
    }
}

/// Namespaced view over a [`MappingStore`].
///
/// Keys look like `migration:<source system>:<namespace>_map:<legacy id>`;
/// each namespace also has a `completed` sentinel and a resume `cursor`
/// under the same prefix.
#[derive(Clone)]
pub struct IdentifierMap {
    store: Arc<dyn MappingStore>,
    source_system: String,
    ttl: Duration,
}

impl IdentifierMap {
    pub fn new(store: Arc<dyn MappingStore>, source_system: &str, ttl: Duration) -> Self {
        Self {
            store,
            source_system: source_system.to_string(),
            ttl,
        }
    }

    /// Same namespacing over a different store.
    pub fn with_store(&self, store: Arc<dyn MappingStore>) -> Self {
        Self {
            store,
            source_system: self.source_system.clone(),
            ttl: self.ttl,
        }
    }

    pub fn store(&self) -> &Arc<dyn MappingStore> {
        &self.store
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn prefix(&self, namespace: &str) -> String {
        format!("migration:{}:{}_map:", self.source_system, namespace)
    }

    pub fn key(&self, namespace: &str, source_id: i64) -> String {
        format!("{}{}", self.prefix(namespace), source_id)
    }

    fn sentinel(&self, namespace: &str) -> String {
        format!("{}completed", self.prefix(namespace))
    }

    fn cursor_key(&self, namespace: &str) -> String {
        format!("{}cursor", self.prefix(namespace))
    }

    pub async fn put(&self, namespace: &str, source_id: i64, target: TargetId) -> MappingResult<()> {
        self.store
            .put(&self.key(namespace, source_id), target, self.ttl)
            .await
    }

    pub async fn get(&self, namespace: &str, source_id: i64) -> MappingResult<Option<TargetId>> {
        self.store.get(&self.key(namespace, source_id)).await
    }

    /// Resolve an optional legacy reference.
    pub async fn resolve(
        &self,
        namespace: &str,
        source_id: Option<i64>,
    ) -> MappingResult<Option<TargetId>> {
        match source_id {
            Some(id) => self.get(namespace, id).await,
            None => Ok(None),
        }
    }

    pub async fn mark_completed(&self, namespace: &str) -> MappingResult<()> {
        self.store.put(&self.sentinel(namespace), 1, self.ttl).await
    }

    pub async fn is_completed(&self, namespace: &str) -> MappingResult<bool> {
        Ok(self.store.get(&self.sentinel(namespace)).await?.is_some())
    }

    /// Forget completion and resume progress; id mappings stay.
    pub async fn clear_completed(&self, namespace: &str) -> MappingResult<()> {
        self.store.remove(&self.sentinel(namespace)).await?;
        self.store.remove(&self.cursor_key(namespace)).await?;
        Ok(())
    }

    /// Number of leading source rows already worked through, 0 when unknown.
    pub async fn cursor(&self, namespace: &str) -> MappingResult<u64> {
        let stored = self.store.get(&self.cursor_key(namespace)).await?;
        Ok(stored.and_then(|v| u64::try_from(v).ok()).unwrap_or(0))
    }

    /// Record that rows `[0, end)` have been worked through. The cursor
    /// never moves backwards.
    pub async fn advance_cursor(&self, namespace: &str, end: u64) -> MappingResult<()> {
        if end <= self.cursor(namespace).await? {
            return Ok(());
        }
        let value = i64::try_from(end).unwrap_or(i64::MAX);
        self.store.put(&self.cursor_key(namespace), value, self.ttl).await
    }

    /// Sentinel and cursor entries present under a namespace prefix.
    async fn bookkeeping_entries(&self, namespace: &str) -> MappingResult<u64> {
        let sentinel = self.store.get(&self.sentinel(namespace)).await?.is_some();
        let cursor = self.store.get(&self.cursor_key(namespace)).await?.is_some();
        Ok(u64::from(sentinel) + u64::from(cursor))
    }

    /// Drop every entry of a namespace, completion state included. Returns
    /// the number of id mappings dropped.
    pub async fn forget(&self, namespace: &str) -> MappingResult<u64> {
        let bookkeeping = self.bookkeeping_entries(namespace).await?;
        let removed = self.store.remove_prefix(&self.prefix(namespace)).await?;
        Ok(removed.saturating_sub(bookkeeping))
    }

    /// Live id mappings in a namespace, not counting sentinel or cursor.
    pub async fn count(&self, namespace: &str) -> MappingResult<u64> {
        let total = self.store.count_prefix(&self.prefix(namespace)).await?;
        Ok(total.saturating_sub(self.bookkeeping_entries(namespace).await?))
    }

    pub async fn flush(&self) -> MappingResult<()> {
        self.store.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(ttl: Duration) -> IdentifierMap {
        IdentifierMap::new(Arc::new(MemoryMappingStore::new()), "legacy", ttl)
    }

    #[test]
    fn test_key_layout() {
        let ids = map(DEFAULT_MAPPING_TTL);
        assert_eq!(ids.key("users", 42), "migration:legacy:users_map:42");
        assert_eq!(ids.sentinel("users"), "migration:legacy:users_map:completed");
        assert_eq!(ids.cursor_key("users"), "migration:legacy:users_map:cursor");
    }

    #[tokio::test]
    async fn test_round_trip_and_zero_is_a_real_id() {
        let ids = map(DEFAULT_MAPPING_TTL);
        assert_eq!(ids.get("users", 1).await.unwrap(), None);

        ids.put("users", 1, 0).await.unwrap();
        ids.put("users", 2, 77).await.unwrap();
        assert_eq!(ids.get("users", 1).await.unwrap(), Some(0));
        assert_eq!(ids.get("users", 2).await.unwrap(), Some(77));
        assert_eq!(ids.get("groups", 2).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entries_expire_after_ttl() {
        let ids = map(Duration::from_millis(40));
        ids.put("topics", 9, 900).await.unwrap();
        assert_eq!(ids.get("topics", 9).await.unwrap(), Some(900));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(ids.get("topics", 9).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cursor_only_moves_forward() {
        let ids = map(DEFAULT_MAPPING_TTL);
        assert_eq!(ids.cursor("users").await.unwrap(), 0);

        ids.put("users", 1, 10).await.unwrap();
        ids.advance_cursor("users", 5).await.unwrap();
        ids.advance_cursor("users", 3).await.unwrap();
        assert_eq!(ids.cursor("users").await.unwrap(), 5);
        assert_eq!(ids.count("users").await.unwrap(), 1);

        ids.mark_completed("users").await.unwrap();
        ids.clear_completed("users").await.unwrap();
        assert_eq!(ids.cursor("users").await.unwrap(), 0);
        assert_eq!(ids.count("users").await.unwrap(), 1);

        ids.advance_cursor("users", 2).await.unwrap();
        ids.mark_completed("users").await.unwrap();
        assert_eq!(ids.forget("users").await.unwrap(), 1);
        assert_eq!(ids.cursor("users").await.unwrap(), 0);
        assert!(!ids.is_completed("users").await.unwrap());
    }

    #[tokio::test]
    async fn test_completion_sentinel_and_forget() {
        let ids = map(DEFAULT_MAPPING_TTL);
        ids.put("forums", 1, 10).await.unwrap();
        ids.put("forums", 2, 20).await.unwrap();
        ids.put("forum_categories", 1, 30).await.unwrap();
        ids.mark_completed("forums").await.unwrap();

        assert!(ids.is_completed("forums").await.unwrap());
        assert_eq!(ids.count("forums").await.unwrap(), 2);

        ids.clear_completed("forums").await.unwrap();
        assert!(!ids.is_completed("forums").await.unwrap());

        assert_eq!(ids.forget("forums").await.unwrap(), 2);
        assert_eq!(ids.get("forums", 1).await.unwrap(), None);
        // Namespaces sharing a prefix stem are separate.
        assert_eq!(ids.get("forum_categories", 1).await.unwrap(), Some(30));
    }
}
