//! Shared data models.

pub mod connection;
pub mod query;
pub mod schema;
pub mod value;

// Re-export commonly used types
pub use connection::{
    AccessPolicy, DatabaseConfig, DbType, SslMode, DEFAULT_MAX_CONNS, DEFAULT_MAX_IDLE_CONNS,
};
pub use query::{
    format_millis, ExplainRequest, QueryCategory, QueryRequest, QueryResult, TableDataQuery,
};
pub use schema::{
    merge_index_rows, ColumnInfo, ConnectionStatus, DatabasesResult, ExplainResult, IndexInfo,
    TableData, TableSchema, TableStatistics, TablesResult,
};
pub use value::{ExecOutcome, Record, RowSet, SqlValue};
