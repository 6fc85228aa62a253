//! Database context for the target database.
//!
//! The DbContext is the entry point for target persistence: it owns the
//! connection pool, bootstraps the schema and hands out repositories.

use std::path::Path;

use diesel::prelude::*;
use diesel_async::{RunQueryDsl, SimpleAsyncConnection};
use tracing::debug;

use super::entities::DieselTargetRepository;
use super::mappings::DieselMappingStore;
use super::models::NewStorageMeta;
use super::pool::{DbError, SqlitePool};
use crate::schema::storage_meta;

/// Version of the target storage layout written to `storage_meta`.
pub const STORAGE_FORMAT_VERSION: &str = "1";

/// Database context that manages the connection pool and provides repository access.
#[derive(Debug, Clone)]
pub struct DbContext {
    pool: SqlitePool,
}

impl DbContext {
    /// Create a context from a database file path.
    pub fn new(db_path: &Path) -> Self {
        Self {
            pool: SqlitePool::from_path(db_path),
        }
    }

    /// Create a context from a database URL (`sqlite:` prefix optional).
    pub fn from_url(url: &str) -> Self {
        Self {
            pool: SqlitePool::new(url),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables and indexes if missing and record the format version.
    pub async fn init_schema(&self) -> Result<(), DbError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| DbError::QueryBuilderError(Box::new(e)))?;
        conn.batch_execute(include_str!("schema_sqlite.sql")).await?;

        diesel::replace_into(storage_meta::table)
            .values(NewStorageMeta {
                key: "format_version",
                value: STORAGE_FORMAT_VERSION,
            })
            .execute(&mut conn)
            .await?;
        debug!("Target schema ready at {}", self.pool.database_url());
        Ok(())
    }

    /// Storage format version, if the schema has been initialized.
    pub async fn format_version(&self) -> Result<Option<String>, DbError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| DbError::QueryBuilderError(Box::new(e)))?;
        storage_meta::table
            .filter(storage_meta::key.eq("format_version"))
            .select(storage_meta::value)
            .first::<String>(&mut conn)
            .await
            .optional()
    }

    /// Get the target entity repository.
    pub fn entities(&self) -> DieselTargetRepository {
        DieselTargetRepository::new(self.pool.clone())
    }

    /// Get the mapping store.
    pub fn mappings(&self) -> DieselMappingStore {
        DieselMappingStore::new(self.pool.clone())
    }
}
