//! Diesel-backed mapping store.
//!
//! Writes are buffered and flushed in one transaction once the buffer
//! reaches its threshold, or when the run releases the store.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Text};
use diesel_async::RunQueryDsl;
use tokio::sync::Mutex;
use tracing::debug;

use super::models::NewMapping;
use super::pool::{SqliteConn, SqlitePool};
use crate::mapping::{expiry_millis, now_millis, MappingResult, MappingStore};
use crate::schema::migration_mappings;
use crate::target::TargetId;

/// Buffered entries written per transaction.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 500;

/// Mapping store persisted in the `migration_mappings` table.
pub struct DieselMappingStore {
    pool: SqlitePool,
    pending: Mutex<HashMap<String, NewMapping>>,
    flush_threshold: usize,
}

impl DieselMappingStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_flush_threshold(pool, DEFAULT_FLUSH_THRESHOLD)
    }

    pub fn with_flush_threshold(pool: SqlitePool, flush_threshold: usize) -> Self {
        Self {
            pool,
            pending: Mutex::new(HashMap::new()),
            flush_threshold: flush_threshold.max(1),
        }
    }

    async fn write_batch(conn: &mut SqliteConn, rows: &[NewMapping]) -> MappingResult<()> {
        diesel::sql_query("BEGIN").execute(conn).await?;
        for row in rows {
            if let Err(e) = diesel::replace_into(migration_mappings::table)
                .values(row)
                .execute(conn)
                .await
            {
                // Keep the original error; a failed rollback adds nothing.
                let _ = diesel::sql_query("ROLLBACK").execute(conn).await;
                return Err(e.into());
            }
        }
        diesel::sql_query("COMMIT").execute(conn).await?;
        Ok(())
    }

    /// Write out everything buffered. Entries stay buffered if the write fails.
    async fn flush_pending(&self, pending: &mut HashMap<String, NewMapping>) -> MappingResult<()> {
        if pending.is_empty() {
            return Ok(());
        }
        let rows: Vec<NewMapping> = pending.values().cloned().collect();
        let mut conn = self.pool.get().await?;
        Self::write_batch(&mut conn, &rows).await?;
        debug!("Flushed {} mapping entries", rows.len());
        pending.clear();
        Ok(())
    }
}

#[async_trait]
impl MappingStore for DieselMappingStore {
    async fn put(&self, key: &str, target: TargetId, ttl: Duration) -> MappingResult<()> {
        let mut pending = self.pending.lock().await;
        pending.insert(
            key.to_string(),
            NewMapping {
                key: key.to_string(),
                target_id: target,
                expires_at: expiry_millis(ttl),
            },
        );
        if pending.len() >= self.flush_threshold {
            self.flush_pending(&mut pending).await?;
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> MappingResult<Option<TargetId>> {
        let now = now_millis();
        {
            let pending = self.pending.lock().await;
            if let Some(row) = pending.get(key) {
                return Ok((row.expires_at > now).then_some(row.target_id));
            }
        }

        let mut conn = self.pool.get().await?;
        let target = migration_mappings::table
            .filter(migration_mappings::key.eq(key))
            .filter(migration_mappings::expires_at.gt(now))
            .select(migration_mappings::target_id)
            .first::<i64>(&mut conn)
            .await
            .optional()?;
        Ok(target)
    }

    async fn remove(&self, key: &str) -> MappingResult<bool> {
        let buffered = self.pending.lock().await.remove(key).is_some();
        let mut conn = self.pool.get().await?;
        let deleted = diesel::delete(migration_mappings::table.filter(migration_mappings::key.eq(key)))
            .execute(&mut conn)
            .await?;
        Ok(buffered || deleted > 0)
    }

    async fn remove_prefix(&self, prefix: &str) -> MappingResult<u64> {
        // Flush first so buffered and stored entries are counted once.
        let mut pending = self.pending.lock().await;
        self.flush_pending(&mut pending).await?;

        let mut conn = self.pool.get().await?;
        let deleted = diesel::sql_query("DELETE FROM migration_mappings WHERE substr(key, 1, ?) = ?")
            .bind::<BigInt, _>(prefix.chars().count() as i64)
            .bind::<Text, _>(prefix)
            .execute(&mut conn)
            .await?;
        Ok(deleted as u64)
    }

    async fn count_prefix(&self, prefix: &str) -> MappingResult<u64> {
        let mut pending = self.pending.lock().await;
        self.flush_pending(&mut pending).await?;

        #[derive(QueryableByName)]
        struct Count {
            #[diesel(sql_type = BigInt)]
            n: i64,
        }

        let mut conn = self.pool.get().await?;
        let row: Count = diesel::sql_query(
            "SELECT COUNT(*) AS n FROM migration_mappings WHERE substr(key, 1, ?) = ? AND expires_at > ?",
        )
        .bind::<BigInt, _>(prefix.chars().count() as i64)
        .bind::<Text, _>(prefix)
        .bind::<BigInt, _>(now_millis())
        .get_result(&mut conn)
        .await?;
        Ok(row.n.max(0) as u64)
    }

    async fn purge_expired(&self) -> MappingResult<u64> {
        let now = now_millis();
        self.pending.lock().await.retain(|_, row| row.expires_at > now);

        let mut conn = self.pool.get().await?;
        let deleted = diesel::delete(
            migration_mappings::table.filter(migration_mappings::expires_at.le(now)),
        )
        .execute(&mut conn)
        .await?;
        Ok(deleted as u64)
    }

    async fn flush(&self) -> MappingResult<()> {
        let mut pending = self.pending.lock().await;
        self.flush_pending(&mut pending).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::DbContext;
    use tempfile::tempdir;

    const TTL: Duration = Duration::from_secs(600);

    #[tokio::test]
    async fn test_buffered_writes_are_visible_and_persist_on_flush() {
        let dir = tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("target.db"));
        ctx.init_schema().await.unwrap();

        let store = DieselMappingStore::with_flush_threshold(ctx.pool().clone(), 100);
        store.put("migration:legacy:users_map:1", 10, TTL).await.unwrap();
        assert_eq!(
            store.get("migration:legacy:users_map:1").await.unwrap(),
            Some(10)
        );
        store.flush().await.unwrap();

        // A fresh store sees only what reached the database.
        let reopened = DieselMappingStore::new(ctx.pool().clone());
        assert_eq!(
            reopened.get("migration:legacy:users_map:1").await.unwrap(),
            Some(10)
        );
    }

    #[tokio::test]
    async fn test_threshold_flush_and_prefix_removal() {
        let dir = tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("target.db"));
        ctx.init_schema().await.unwrap();

        let store = DieselMappingStore::with_flush_threshold(ctx.pool().clone(), 2);
        store.put("migration:legacy:forums_map:1", 1, TTL).await.unwrap();
        store.put("migration:legacy:forums_map:2", 2, TTL).await.unwrap();
        store.put("migration:legacy:forum_categories_map:1", 3, TTL).await.unwrap();

        assert_eq!(
            store.count_prefix("migration:legacy:forums_map:").await.unwrap(),
            2
        );
        assert_eq!(
            store.remove_prefix("migration:legacy:forums_map:").await.unwrap(),
            2
        );
        assert_eq!(store.get("migration:legacy:forums_map:1").await.unwrap(), None);
        assert_eq!(
            store.get("migration:legacy:forum_categories_map:1").await.unwrap(),
            Some(3)
        );
    }

    #[tokio::test]
    async fn test_expired_entries_are_invisible_and_purged() {
        let dir = tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("target.db"));
        ctx.init_schema().await.unwrap();

        let store = DieselMappingStore::new(ctx.pool().clone());
        store.put("short", 1, Duration::from_millis(20)).await.unwrap();
        store.put("long", 2, TTL).await.unwrap();
        store.flush().await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.get("short").await.unwrap(), None);
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.get("long").await.unwrap(), Some(2));
    }
}
