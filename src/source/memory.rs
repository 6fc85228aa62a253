//! In-memory legacy source.
//!
//! Backs JSON dumps of the legacy database and the test fixtures.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{SourceConnection, SourceError, SourceQuery, SourceRecord, SourceResult};

/// Tables of rows held in memory.
#[derive(Clone, Default)]
pub struct MemorySource {
    tables: Arc<RwLock<HashMap<String, Vec<SourceRecord>>>>,
    label: String,
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            tables: Arc::default(),
            label: "memory".to_string(),
        }
    }

    /// Load a dump shaped as `{"table": [{"column": value, ...}, ...], ...}`.
    pub async fn from_json_file(path: &Path) -> SourceResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let mut source = Self::from_json_str(&content)?;
        source.label = format!("json dump {}", path.display());
        Ok(source)
    }

    pub fn from_json_str(content: &str) -> SourceResult<Self> {
        let root: Value =
            serde_json::from_str(content).map_err(|e| SourceError::Malformed(e.to_string()))?;
        let Value::Object(tables) = root else {
            return Err(SourceError::Malformed(
                "top level must be an object of tables".to_string(),
            ));
        };

        let mut loaded = HashMap::new();
        for (table, rows) in tables {
            let Value::Array(rows) = rows else {
                return Err(SourceError::Malformed(format!(
                    "table '{}' must be an array of rows",
                    table
                )));
            };
            let mut records = Vec::with_capacity(rows.len());
            for row in rows {
                match row {
                    Value::Object(columns) => records.push(SourceRecord::from_map(columns)),
                    _ => {
                        return Err(SourceError::Malformed(format!(
                            "rows in '{}' must be objects",
                            table
                        )))
                    }
                }
            }
            loaded.insert(table, records);
        }

        Ok(Self {
            tables: Arc::new(RwLock::new(loaded)),
            label: "json dump".to_string(),
        })
    }

    /// Append a row to a table, creating the table if needed.
    pub async fn insert(&self, table: &str, record: SourceRecord) {
        let mut tables = self.tables.write().await;
        tables.entry(table.to_string()).or_default().push(record);
    }

    pub async fn insert_all(&self, table: &str, records: impl IntoIterator<Item = SourceRecord>) {
        let mut tables = self.tables.write().await;
        tables.entry(table.to_string()).or_default().extend(records);
    }

    async fn matching(&self, query: &SourceQuery) -> SourceResult<Vec<SourceRecord>> {
        let tables = self.tables.read().await;
        let Some(rows) = tables.get(&query.table) else {
            return Ok(Vec::new());
        };

        // Rows without a usable id sort last; the batch driver fails them
        // one by one.
        let mut matched: Vec<SourceRecord> =
            rows.iter().filter(|r| query.matches(r)).cloned().collect();
        matched.sort_by_key(|r| r.get_i64(&query.id_column).map_or((1, 0), |id| (0, id)));
        Ok(matched)
    }
}

#[async_trait]
impl SourceConnection for MemorySource {
    async fn count(&self, query: &SourceQuery) -> SourceResult<u64> {
        Ok(self.matching(query).await?.len() as u64)
    }

    async fn fetch(
        &self,
        query: &SourceQuery,
        offset: u64,
        limit: u64,
    ) -> SourceResult<Vec<SourceRecord>> {
        Ok(self
            .matching(query)
            .await?
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}
