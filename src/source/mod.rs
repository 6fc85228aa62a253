//! Read-only access to the legacy dataset.
//!
//! The migration core only needs a narrow slice of a database: scan one table
//! with a conjunction of simple predicates, ordered by its primary key, in
//! offset/limit windows. Two backends implement it:
//! - [`SqliteSource`] reads a copy of the legacy database directly
//! - [`MemorySource`] holds tables in memory (JSON dumps and tests)

mod memory;
mod record;
mod sqlite;

pub use memory::MemorySource;
pub use record::SourceRecord;
pub use sqlite::SqliteSource;

use async_trait::async_trait;
use serde_json::Value;

/// Result type for source operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// Errors from the legacy source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed dump: {0}")]
    Malformed(String),
    #[error("Invalid identifier '{0}'")]
    InvalidIdentifier(String),
    #[error("Column '{column}' is missing or not an integer")]
    MissingColumn { column: String },
}

impl From<rusqlite::Error> for SourceError {
    fn from(e: rusqlite::Error) -> Self {
        SourceError::Database(e.to_string())
    }
}

/// A single filter applied to a table scan.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(String, Value),
    NotEq(String, Value),
    In(String, Vec<Value>),
    IsNull(String),
    NotNull(String),
}

impl Predicate {
    pub fn column(&self) -> &str {
        match self {
            Predicate::Eq(c, _)
            | Predicate::NotEq(c, _)
            | Predicate::In(c, _)
            | Predicate::IsNull(c)
            | Predicate::NotNull(c) => c,
        }
    }

    /// Evaluate against an in-memory record.
    ///
    /// Comparison is loose in the way SQLite's is: `1`, `"1"` and `true`
    /// are equal, and `NotEq` never matches a NULL column.
    pub fn matches(&self, record: &SourceRecord) -> bool {
        match self {
            Predicate::Eq(col, expected) => record
                .get(col)
                .is_some_and(|actual| loose_eq(actual, expected)),
            Predicate::NotEq(col, expected) => record
                .get(col)
                .is_some_and(|actual| !loose_eq(actual, expected)),
            Predicate::In(col, options) => record
                .get(col)
                .is_some_and(|actual| options.iter().any(|o| loose_eq(actual, o))),
            Predicate::IsNull(col) => record.get(col).is_none(),
            Predicate::NotNull(col) => record.get(col).is_some(),
        }
    }
}

fn scalar_key(value: &Value) -> Option<String> {
    match value {
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        Value::Number(n) => Some(match n.as_i64() {
            Some(i) => i.to_string(),
            None => n.to_string(),
        }),
        Value::String(s) => Some(s.trim().to_string()),
        _ => None,
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (scalar_key(a), scalar_key(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// A deterministic scan of one legacy table.
///
/// Rows are always ordered by `id_column` ascending, which is what makes
/// offset/limit windows stable across runs.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceQuery {
    pub table: String,
    pub id_column: String,
    pub predicates: Vec<Predicate>,
}

impl SourceQuery {
    pub fn table(table: &str, id_column: &str) -> Self {
        Self {
            table: table.to_string(),
            id_column: id_column.to_string(),
            predicates: Vec::new(),
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Predicate::Eq(column.to_string(), value.into()))
    }

    pub fn not_null(self, column: &str) -> Self {
        self.filter(Predicate::NotNull(column.to_string()))
    }

    /// Add an equality filter only when a value is given.
    pub fn eq_opt(self, column: &str, value: Option<i64>) -> Self {
        match value {
            Some(v) => self.eq(column, v),
            None => self,
        }
    }

    pub fn matches(&self, record: &SourceRecord) -> bool {
        self.predicates.iter().all(|p| p.matches(record))
    }
}

/// Read-only, filterable, orderable, windowed access to the legacy schema.
#[async_trait]
pub trait SourceConnection: Send + Sync {
    /// Number of rows matching the query.
    async fn count(&self, query: &SourceQuery) -> SourceResult<u64>;

    /// Rows `[offset, offset + limit)` of the ordered query.
    async fn fetch(
        &self,
        query: &SourceQuery,
        offset: u64,
        limit: u64,
    ) -> SourceResult<Vec<SourceRecord>>;

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}
