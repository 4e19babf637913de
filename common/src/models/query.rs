//! SQL query models.
//!
//! Contains the request bodies and the uniform result of statement execution.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::value::Record;

/// Request body for executing a SQL statement.
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct QueryRequest {
    /// SQL statement to execute.
    #[validate(length(min = 1, message = "query cannot be empty"))]
    pub query: String,

    /// Positional arguments bound to the statement placeholders.
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub args: Vec<serde_json::Value>,

    /// Output format: `json` (default) or `table`.
    #[serde(default)]
    pub format: Option<String>,
}

/// Request body for explaining a SQL statement.
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct ExplainRequest {
    /// SQL statement to explain.
    #[validate(length(min = 1, message = "query cannot be empty"))]
    pub query: String,
}

/// Pagination parameters for table data.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TableDataQuery {
    /// Page size (0 = default 100, capped at 1000).
    #[serde(default)]
    pub limit: i64,

    /// Rows to skip.
    #[serde(default)]
    pub offset: i64,
}

/// Statement category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum QueryCategory {
    Select,
    Insert,
    Update,
    Delete,
    Ddl,
}

impl QueryCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryCategory::Select => "select",
            QueryCategory::Insert => "insert",
            QueryCategory::Update => "update",
            QueryCategory::Delete => "delete",
            QueryCategory::Ddl => "ddl",
        }
    }

    /// Whether the statement returns rows.
    pub fn is_select(&self) -> bool {
        matches!(self, QueryCategory::Select)
    }
}

impl fmt::Display for QueryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform result of a statement execution.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QueryResult {
    /// Statement category.
    #[serde(rename = "type")]
    pub category: QueryCategory,

    /// Column names (select only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,

    /// Rows keyed by column name (select only).
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Vec<Object>>)]
    pub rows: Option<Vec<Record>>,

    /// Rows returned (select) or affected (other categories).
    pub row_count: u64,

    /// Rows affected (non-select only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,

    /// Last insert id (insert only, when the engine reports a positive one).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_insert_id: Option<i64>,

    /// Wall-clock execution time, e.g. `3.21ms`.
    pub execution_time: String,

    /// Status message.
    pub message: String,
}

/// Formats a duration the way execution and ping times are reported.
pub fn format_millis(duration: std::time::Duration) -> String {
    format!("{:.2}ms", duration.as_secs_f64() * 1000.0)
}
