//! SQLite connection handling for the target database.
//!
//! diesel-async drives SQLite through `SyncConnectionWrapper`. Connections
//! are cheap to open, so the pool simply establishes one per operation.

use std::path::Path;

use diesel::sqlite::SqliteConnection;
use diesel::ConnectionError;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::AsyncConnection;

/// Diesel error type alias.
pub type DbError = diesel::result::Error;

/// Async SQLite connection type.
pub type SqliteConn = SyncConnectionWrapper<SqliteConnection>;

/// SQLite connection pool (lightweight - creates connections on demand).
#[derive(Debug, Clone)]
pub struct SqlitePool {
    database_url: String,
}

impl SqlitePool {
    /// Create a new pool. A `sqlite:` prefix is accepted and stripped.
    pub fn new(database_url: &str) -> Self {
        let url = database_url.strip_prefix("sqlite:").unwrap_or(database_url);
        Self {
            database_url: url.to_string(),
        }
    }

    pub fn from_path(path: &Path) -> Self {
        Self::new(&path.display().to_string())
    }

    /// Get a connection.
    pub async fn get(&self) -> Result<SqliteConn, ConnectionError> {
        SqliteConn::establish(&self.database_url).await
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }
}
