//! Dynamic legacy rows.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use super::{SourceError, SourceResult};

/// An opaque, read-only row from the legacy schema.
///
/// Columns are kept as JSON values so SQLite rows and JSON dumps look the
/// same to importers. Getters are lenient about representation (numbers
/// stored as text, booleans stored as 0/1) because the legacy schema is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceRecord {
    columns: Map<String, Value>,
}

impl SourceRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(columns: Map<String, Value>) -> Self {
        Self { columns }
    }

    /// Builder used by tests and fixtures.
    pub fn with(mut self, column: &str, value: Value) -> Self {
        self.columns.insert(column.to_string(), value);
        self
    }

    pub fn insert(&mut self, column: &str, value: Value) {
        self.columns.insert(column.to_string(), value);
    }

    /// Raw value; SQL NULL and absent columns both read as `None`.
    pub fn get(&self, column: &str) -> Option<&Value> {
        match self.columns.get(column) {
            None | Some(Value::Null) => None,
            Some(v) => Some(v),
        }
    }

    /// The legacy primary key. Every scanned row must have one.
    pub fn id(&self, column: &str) -> SourceResult<i64> {
        self.get_i64(column).ok_or_else(|| SourceError::MissingColumn {
            column: column.to_string(),
        })
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        match self.get(column)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Foreign key columns: legacy rows use `0` for "none".
    pub fn get_ref(&self, column: &str) -> Option<i64> {
        self.get_i64(column).filter(|id| *id > 0)
    }

    pub fn get_f64(&self, column: &str) -> Option<f64> {
        match self.get(column)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_bool(&self, column: &str) -> Option<bool> {
        match self.get(column)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_i64().map(|i| i != 0),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => Some(true),
                "0" | "false" | "no" | "" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        match self.get(column)? {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Text content, trimmed, with blank strings treated as absent.
    pub fn get_text(&self, column: &str) -> Option<String> {
        let value = match self.get(column)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        (!value.is_empty()).then_some(value)
    }

    /// Timestamps: `YYYY-MM-DD HH:MM:SS` text (legacy UTC), RFC 3339, or
    /// unix seconds. The zero date some legacy rows carry reads as absent.
    pub fn get_datetime(&self, column: &str) -> Option<DateTime<Utc>> {
        match self.get(column)? {
            Value::Number(n) => n
                .as_i64()
                .filter(|secs| *secs > 0)
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
            Value::String(s) => {
                let s = s.trim();
                if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                    return Some(dt.with_timezone(&Utc));
                }
                NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                    .ok()
                    .filter(|dt| dt.and_utc().timestamp() > 0)
                    .map(|dt| dt.and_utc())
            }
            _ => None,
        }
    }

    /// Serialized blobs (JSON stored in a text column) or inline JSON.
    pub fn get_json(&self, column: &str) -> Result<Option<Value>, serde_json::Error> {
        match self.get(column) {
            None => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => serde_json::from_str(s).map(Some),
            Some(other) => Ok(Some(other.clone())),
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_getters_are_lenient_about_representation() {
        let record = SourceRecord::new()
            .with("user_id", json!("12"))
            .with("approved", json!(1))
            .with("title", json!("  Hello  "))
            .with("blank", json!("   "))
            .with("parent_id", json!(0))
            .with("cost", json!(r#"{"USD":{"amount":10}}"#));

        assert_eq!(record.id("user_id").unwrap(), 12);
        assert_eq!(record.get_bool("approved"), Some(true));
        assert_eq!(record.get_text("title").as_deref(), Some("Hello"));
        assert_eq!(record.get_text("blank"), None);
        assert_eq!(record.get_ref("parent_id"), None);
        assert_eq!(
            record.get_json("cost").unwrap(),
            Some(json!({"USD": {"amount": 10}}))
        );
    }

    #[test]
    fn test_datetime_formats() {
        let record = SourceRecord::new()
            .with("a", json!("2019-03-04 05:06:07"))
            .with("b", json!(1_551_675_967))
            .with("c", json!("0000-00-00 00:00:00"));

        assert_eq!(record.get_datetime("a"), record.get_datetime("b"));
        assert!(record.get_datetime("a").is_some());
        assert_eq!(record.get_datetime("c"), None);
    }

    #[test]
    fn test_missing_id_is_an_error() {
        let record = SourceRecord::new().with("user_id", Value::Null);
        assert!(matches!(
            record.id("user_id"),
            Err(SourceError::MissingColumn { .. })
        ));
    }
}
