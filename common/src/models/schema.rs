//! Schema and table data models.
//!
//! Returned by the schema inspection endpoints.

use std::collections::BTreeMap;

use serde::Serialize;
use utoipa::ToSchema;

use super::value::Record;

/// Complete schema definition of a table.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TableSchema {
    /// Table name.
    pub table_name: String,

    /// Columns in declaration order.
    pub columns: Vec<ColumnInfo>,

    /// Indexes, one entry per index name.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<IndexInfo>,

    /// Free-form table metadata.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    #[schema(value_type = Object)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl TableSchema {
    /// Creates an empty schema for `table_name`.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            columns: Vec::new(),
            indexes: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }
}

/// Column definition.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,

    /// Declared data type.
    #[serde(rename = "type")]
    pub data_type: String,

    /// Whether the column accepts NULL.
    pub is_nullable: bool,

    /// Default value expression, if any.
    pub default_value: Option<String>,

    /// Whether the column is part of the primary key.
    pub is_primary_key: bool,

    /// Whether the column auto-increments.
    pub is_auto_increment: bool,

    /// Maximum length for character types.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<i64>,
}

/// Index definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct IndexInfo {
    /// Index name.
    pub name: String,

    /// Indexed columns in key order.
    pub columns: Vec<String>,

    /// Whether the index enforces uniqueness.
    pub is_unique: bool,

    /// Whether this is the primary key index.
    pub is_primary: bool,
}

/// Merges one row per (index, column) into one entry per index, keeping the
/// order in which index names first appear.
pub fn merge_index_rows<I>(rows: I) -> Vec<IndexInfo>
where
    I: IntoIterator<Item = IndexInfo>,
{
    let mut merged: Vec<IndexInfo> = Vec::new();
    for row in rows {
        match merged.iter_mut().find(|idx| idx.name == row.name) {
            Some(existing) => existing.columns.extend(row.columns),
            None => merged.push(row),
        }
    }
    merged
}

/// One page of table rows.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TableData {
    /// Table name.
    pub table_name: String,

    /// Column names in result order.
    pub columns: Vec<String>,

    /// Rows keyed by column name; NULL cells are explicit.
    #[schema(value_type = Vec<Object>)]
    pub rows: Vec<Record>,

    /// Total rows in the table, independent of the page.
    pub total: i64,

    /// Applied page size.
    pub limit: i64,

    /// Applied offset.
    pub offset: i64,
}

/// Result of listing tables.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TablesResult {
    pub tables: Vec<String>,
    pub count: usize,
}

/// Result of listing databases, already filtered by the access policy.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DatabasesResult {
    pub databases: Vec<String>,
    pub count: usize,
}

/// Execution plan for a statement.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ExplainResult {
    /// The statement as submitted.
    pub query: String,

    /// Plan as reported by the engine (JSON when the engine returns JSON).
    #[schema(value_type = Object)]
    pub plan: serde_json::Value,
}

/// Row count of a table.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TableStatistics {
    pub table_name: String,
    pub row_count: i64,
}

/// Liveness of the configured database connection.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConnectionStatus {
    /// Driver name (`mysql` or `postgres`).
    pub driver: String,
    pub connected: bool,
    /// Round-trip time of the ping, e.g. `1.42ms`.
    pub ping_time: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_row(name: &str, column: &str, unique: bool) -> IndexInfo {
        IndexInfo {
            name: name.into(),
            columns: vec![column.into()],
            is_unique: unique,
            is_primary: name == "PRIMARY",
        }
    }

    #[test]
    fn test_merge_index_rows() {
        let merged = merge_index_rows(vec![
            index_row("PRIMARY", "id", true),
            index_row("idx_name_email", "name", false),
            index_row("idx_name_email", "email", false),
        ]);
        assert_eq!(merged.len(), 2);
        assert!(merged[0].is_primary);
        assert_eq!(merged[1].columns, vec!["name", "email"]);
    }

    #[test]
    fn test_column_type_field_name() {
        let column = ColumnInfo {
            name: "id".into(),
            data_type: "int".into(),
            is_nullable: false,
            default_value: None,
            is_primary_key: true,
            is_auto_increment: true,
            max_length: None,
        };
        let json = serde_json::to_value(&column).unwrap();
        assert_eq!(json["type"], "int");
        assert!(json["default_value"].is_null());
        assert!(json.get("max_length").is_none());
    }
}
