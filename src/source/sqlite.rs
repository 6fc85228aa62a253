//! Legacy source backed by a copy of the legacy database in SQLite.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OpenFlags};
use serde_json::{Map, Number, Value};

use super::{Predicate, SourceConnection, SourceError, SourceQuery, SourceRecord, SourceResult};

/// Read-only scans over a SQLite file.
///
/// rusqlite is synchronous, so each call opens its own read-only connection
/// on the blocking pool.
#[derive(Debug, Clone)]
pub struct SqliteSource {
    db_path: PathBuf,
}

impl SqliteSource {
    pub fn open(db_path: &Path) -> SourceResult<Self> {
        let source = Self {
            db_path: db_path.to_path_buf(),
        };
        // Fail early on a missing or unreadable file.
        source.connect()?;
        Ok(source)
    }

    fn connect(&self) -> SourceResult<Connection> {
        Ok(Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?)
    }

    async fn blocking<T, F>(&self, f: F) -> SourceResult<T>
    where
        T: Send + 'static,
        F: FnOnce(Connection) -> SourceResult<T> + Send + 'static,
    {
        let conn = self.connect()?;
        tokio::task::spawn_blocking(move || f(conn))
            .await
            .map_err(|e| SourceError::Database(format!("blocking task failed: {}", e)))?
    }
}

fn quote_ident(ident: &str) -> SourceResult<String> {
    let valid = ident
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && ident.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(format!("\"{}\"", ident))
    } else {
        Err(SourceError::InvalidIdentifier(ident.to_string()))
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i.into()),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t) | ValueRef::Blob(t) => {
            Value::String(String::from_utf8_lossy(t).into_owned())
        }
    }
}

/// Render the WHERE clause and its bound parameters.
fn where_clause(query: &SourceQuery) -> SourceResult<(String, Vec<SqlValue>)> {
    let mut clauses = Vec::new();
    let mut params = Vec::new();

    for predicate in &query.predicates {
        let column = quote_ident(predicate.column())?;
        match predicate {
            Predicate::Eq(_, v) => {
                clauses.push(format!("{} = ?", column));
                params.push(to_sql(v));
            }
            Predicate::NotEq(_, v) => {
                clauses.push(format!("{} != ?", column));
                params.push(to_sql(v));
            }
            Predicate::In(_, values) if values.is_empty() => clauses.push("0".to_string()),
            Predicate::In(_, values) => {
                let marks = vec!["?"; values.len()].join(", ");
                clauses.push(format!("{} IN ({})", column, marks));
                params.extend(values.iter().map(to_sql));
            }
            Predicate::IsNull(_) => clauses.push(format!("{} IS NULL", column)),
            Predicate::NotNull(_) => clauses.push(format!("{} IS NOT NULL", column)),
        }
    }

    if clauses.is_empty() {
        Ok((String::new(), params))
    } else {
        Ok((format!(" WHERE {}", clauses.join(" AND ")), params))
    }
}

#[async_trait]
impl SourceConnection for SqliteSource {
    async fn count(&self, query: &SourceQuery) -> SourceResult<u64> {
        let table = quote_ident(&query.table)?;
        let (filter, params) = where_clause(query)?;
        let sql = format!("SELECT COUNT(*) FROM {}{}", table, filter);

        self.blocking(move |conn| {
            let count: i64 = conn.query_row(&sql, params_from_iter(params.iter()), |row| {
                row.get(0)
            })?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    async fn fetch(
        &self,
        query: &SourceQuery,
        offset: u64,
        limit: u64,
    ) -> SourceResult<Vec<SourceRecord>> {
        let table = quote_ident(&query.table)?;
        let id_column = quote_ident(&query.id_column)?;
        let (filter, mut params) = where_clause(query)?;
        let sql = format!(
            "SELECT * FROM {}{} ORDER BY {} ASC LIMIT ? OFFSET ?",
            table, filter, id_column
        );
        params.push(SqlValue::Integer(limit.min(i64::MAX as u64) as i64));
        params.push(SqlValue::Integer(offset.min(i64::MAX as u64) as i64));

        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

            let rows = stmt
                .query_map(params_from_iter(params.iter()), |row| {
                    let mut columns = Map::with_capacity(names.len());
                    for (i, name) in names.iter().enumerate() {
                        columns.insert(name.clone(), from_sql(row.get_ref(i)?));
                    }
                    Ok(SourceRecord::from_map(columns))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
        .await
    }

    fn describe(&self) -> String {
        format!("sqlite {}", self.db_path.display())
    }
}
