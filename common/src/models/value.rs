//! Engine-neutral cell values.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};

/// A single decoded cell.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    /// Raw bytes as returned by the driver; converted to text before leaving
    /// the executor.
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

impl SqlValue {
    /// Replaces a byte sequence with its (lossy) UTF-8 text.
    pub fn into_text_bytes(self) -> Self {
        match self {
            SqlValue::Bytes(bytes) => SqlValue::Text(String::from_utf8_lossy(&bytes).into_owned()),
            other => other,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Reads the value as a signed integer, if it is one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(*v),
            SqlValue::UInt(v) => i64::try_from(*v).ok(),
            SqlValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Reads the value as text, decoding bytes when needed.
    pub fn as_text(&self) -> Option<String> {
        match self {
            SqlValue::Text(s) => Some(s.clone()),
            SqlValue::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            SqlValue::Json(v) => Some(v.to_string()),
            _ => None,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("<NULL>"),
            SqlValue::Bool(v) => write!(f, "{v}"),
            SqlValue::Int(v) => write!(f, "{v}"),
            SqlValue::UInt(v) => write!(f, "{v}"),
            SqlValue::Float(v) => write!(f, "{v}"),
            SqlValue::Text(v) => f.write_str(v),
            SqlValue::Bytes(v) => f.write_str(&String::from_utf8_lossy(v)),
            SqlValue::Json(v) => write!(f, "{v}"),
        }
    }
}

impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SqlValue::Null => serializer.serialize_none(),
            SqlValue::Bool(v) => serializer.serialize_bool(*v),
            SqlValue::Int(v) => serializer.serialize_i64(*v),
            SqlValue::UInt(v) => serializer.serialize_u64(*v),
            SqlValue::Float(v) => serializer.serialize_f64(*v),
            SqlValue::Text(v) => serializer.serialize_str(v),
            SqlValue::Bytes(v) => serializer.serialize_str(&String::from_utf8_lossy(v)),
            SqlValue::Json(v) => v.serialize(serializer),
        }
    }
}

impl From<&serde_json::Value> for SqlValue {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => SqlValue::Null,
            serde_json::Value::Bool(b) => SqlValue::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SqlValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    SqlValue::UInt(u)
                } else {
                    SqlValue::Float(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => SqlValue::Text(s.clone()),
            other => SqlValue::Json(other.clone()),
        }
    }
}

/// One result row keyed by column name.
pub type Record = BTreeMap<String, SqlValue>;

/// Rows returned by a row-returning engine call.
///
/// Column order is preserved separately because `Record` is keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl RowSet {
    /// Converts positional rows into name-keyed records, turning bytes into text.
    pub fn into_records(self) -> (Vec<String>, Vec<Record>) {
        let RowSet { columns, rows } = self;
        let records = rows
            .into_iter()
            .map(|row| {
                columns
                    .iter()
                    .cloned()
                    .zip(row.into_iter().map(SqlValue::into_text_bytes))
                    .collect()
            })
            .collect();
        (columns, records)
    }

    /// Returns the first cell of the first row.
    pub fn scalar(&self) -> Option<&SqlValue> {
        self.rows.first().and_then(|row| row.first())
    }
}

/// Outcome of a row-affecting engine call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    pub rows_affected: u64,
    /// Populated only when the engine reports one.
    pub last_insert_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serializes_to_natural_json() {
        let values = vec![
            SqlValue::Null,
            SqlValue::Int(-3),
            SqlValue::Text("a".into()),
            SqlValue::Bytes(b"raw".to_vec()),
            SqlValue::Json(json!({"k": 1})),
        ];
        assert_eq!(
            serde_json::to_value(&values).unwrap(),
            json!([null, -3, "a", "raw", {"k": 1}])
        );
    }

    #[test]
    fn test_into_records_converts_bytes() {
        let set = RowSet {
            columns: vec!["id".into(), "name".into(), "note".into()],
            rows: vec![vec![SqlValue::Int(1), SqlValue::Bytes(b"alice".to_vec()), SqlValue::Null]],
        };
        let (columns, records) = set.into_records();
        assert_eq!(columns, vec!["id", "name", "note"]);
        assert_eq!(records[0]["name"], SqlValue::Text("alice".into()));
        assert!(records[0]["note"].is_null());
    }

    #[test]
    fn test_from_json_argument() {
        assert_eq!(SqlValue::from(&json!(42)), SqlValue::Int(42));
        assert_eq!(SqlValue::from(&json!(1.5)), SqlValue::Float(1.5));
        assert_eq!(SqlValue::from(&json!("x")), SqlValue::Text("x".into()));
        assert!(matches!(SqlValue::from(&json!([1, 2])), SqlValue::Json(_)));
    }
}
