//! PostgreSQL 引擎
//!
//! 所有语句都走扩展协议，参数以 `$1`、`$2` 占位并按位置绑定。

use std::time::Duration;

use async_trait::async_trait;
use common::errors::{AppError, AppResult};
use common::models::{
    ColumnInfo, DatabaseConfig, ExecOutcome, IndexInfo, RowSet, SqlValue, SslMode, TableData,
    TableSchema,
};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::postgres::{
    PgArguments, PgConnectOptions, PgPool, PgPoolOptions, PgRow, PgSslMode, Postgres,
};
use sqlx::query::Query;
use sqlx::{Column, Executor, Row, TypeInfo};
use tokio::sync::RwLock;

use super::{connection_error, execution_error, quote_with, DatabaseEngine, NOT_CONNECTED};
use crate::pool_manager::{CONN_MAX_IDLE_TIME, CONN_MAX_LIFETIME};

const LIST_TABLES_SQL: &str = "SELECT table_name::text \
    FROM information_schema.tables \
    WHERE table_schema = 'public' AND table_type = 'BASE TABLE' \
    ORDER BY table_name";

const LIST_DATABASES_SQL: &str = "SELECT datname::text \
    FROM pg_database \
    WHERE datistemplate = false \
    ORDER BY datname";

const DESCRIBE_COLUMNS_SQL: &str = "SELECT \
        c.column_name::text AS column_name, \
        c.data_type::text AS data_type, \
        c.is_nullable::text AS is_nullable, \
        c.column_default::text AS column_default, \
        c.character_maximum_length::int8 AS max_length, \
        (pk.column_name IS NOT NULL) AS is_primary_key, \
        COALESCE(c.column_default::text LIKE 'nextval%', false) AS is_auto_increment \
    FROM information_schema.columns c \
    LEFT JOIN ( \
        SELECT k.column_name \
        FROM information_schema.table_constraints t \
        JOIN information_schema.key_column_usage k ON t.constraint_name = k.constraint_name \
        WHERE t.constraint_type = 'PRIMARY KEY' \
            AND t.table_name = $1 AND k.table_name = $1 \
    ) pk ON c.column_name = pk.column_name \
    WHERE c.table_name = $1 AND c.table_schema = 'public' \
    ORDER BY c.ordinal_position";

const DESCRIBE_INDEXES_SQL: &str = "SELECT \
        i.relname::text AS index_name, \
        array_agg(a.attname::text ORDER BY a.attnum) AS column_names, \
        ix.indisunique AS is_unique, \
        ix.indisprimary AS is_primary \
    FROM pg_class t \
    JOIN pg_index ix ON t.oid = ix.indrelid \
    JOIN pg_class i ON i.oid = ix.indexrelid \
    JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey) \
    WHERE t.relname = $1 AND t.relkind = 'r' \
    GROUP BY i.relname, ix.indisunique, ix.indisprimary \
    ORDER BY i.relname";

/// PostgreSQL 引擎，持有连接池
pub struct PostgresEngine {
    config: DatabaseConfig,
    connect_timeout: Duration,
    pool: RwLock<Option<PgPool>>,
}

impl PostgresEngine {
    pub fn new(config: DatabaseConfig, connect_timeout: Duration) -> Self {
        Self {
            config,
            connect_timeout,
            pool: RwLock::new(None),
        }
    }

    fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.config.host)
            .port(self.config.port)
            .username(&self.config.username)
            .password(&self.config.password)
            .database(&self.config.database)
            .ssl_mode(ssl_mode(self.config.ssl_mode))
            .application_name(env!("CARGO_PKG_NAME"))
    }

    async fn pool(&self) -> AppResult<PgPool> {
        self.pool
            .read()
            .await
            .clone()
            .ok_or_else(|| AppError::Connection(NOT_CONNECTED.into()))
    }

    async fn column_names(&self, pool: &PgPool, sql: &str) -> Vec<String> {
        match pool.describe(sql).await {
            Ok(described) => described
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect(),
            Err(e) => {
                tracing::debug!(error = %e, "无法获取空结果集的列信息");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl DatabaseEngine for PostgresEngine {
    fn driver_name(&self) -> &'static str {
        "postgres"
    }

    fn quote_identifier(&self, name: &str) -> String {
        quote_with(name, '"')
    }

    async fn connect(&self) -> AppResult<()> {
        let pool = PgPoolOptions::new()
            .max_connections(self.config.max_conns)
            .min_connections(self.config.max_idle_conns)
            .max_lifetime(CONN_MAX_LIFETIME)
            .idle_timeout(CONN_MAX_IDLE_TIME)
            .acquire_timeout(self.connect_timeout)
            .connect_with(self.connect_options())
            .await
            .map_err(|e| connection_error(e).context("failed to open PostgreSQL connection"))?;

        if let Some(old) = self.pool.write().await.replace(pool) {
            old.close().await;
        }
        Ok(())
    }

    async fn close(&self) {
        if let Some(pool) = self.pool.write().await.take() {
            pool.close().await;
        }
    }

    async fn ping(&self) -> AppResult<()> {
        let pool = self.pool().await?;
        let mut conn = pool.acquire().await.map_err(connection_error)?;
        sqlx::Connection::ping(&mut *conn)
            .await
            .map_err(|e| connection_error(e).context("failed to ping PostgreSQL database"))
    }

    async fn query(&self, sql: &str, args: &[Value]) -> AppResult<RowSet> {
        let pool = self.pool().await?;
        let rows = bind_args(sqlx::query(sql), args)
            .fetch_all(&pool)
            .await
            .map_err(execution_error)?;
        let mut set = rows_to_set(&rows);
        if rows.is_empty() {
            set.columns = self.column_names(&pool, sql).await;
        }
        Ok(set)
    }

    async fn query_one(&self, sql: &str, args: &[Value]) -> AppResult<RowSet> {
        let pool = self.pool().await?;
        let row = bind_args(sqlx::query(sql), args)
            .fetch_optional(&pool)
            .await
            .map_err(execution_error)?;
        Ok(rows_to_set(row.as_slice()))
    }

    async fn exec(&self, sql: &str, args: &[Value]) -> AppResult<ExecOutcome> {
        let pool = self.pool().await?;
        let result = bind_args(sqlx::query(sql), args)
            .execute(&pool)
            .await
            .map_err(execution_error)?;
        // PostgreSQL 不提供 last insert id
        Ok(ExecOutcome {
            rows_affected: result.rows_affected(),
            last_insert_id: None,
        })
    }

    async fn list_tables(&self) -> AppResult<Vec<String>> {
        let pool = self.pool().await?;
        sqlx::query_scalar::<_, String>(LIST_TABLES_SQL)
            .fetch_all(&pool)
            .await
            .map_err(execution_error)
    }

    async fn list_databases(&self) -> AppResult<Vec<String>> {
        let pool = self.pool().await?;
        sqlx::query_scalar::<_, String>(LIST_DATABASES_SQL)
            .fetch_all(&pool)
            .await
            .map_err(execution_error)
    }

    async fn describe_table(&self, table: &str) -> AppResult<TableSchema> {
        let pool = self.pool().await?;

        let column_rows = sqlx::query(DESCRIBE_COLUMNS_SQL)
            .bind(table)
            .fetch_all(&pool)
            .await
            .map_err(|e| execution_error(e).context("failed to describe table"))?;

        let index_rows = sqlx::query(DESCRIBE_INDEXES_SQL)
            .bind(table)
            .fetch_all(&pool)
            .await
            .map_err(|e| execution_error(e).context("failed to get index info"))?;

        let mut schema = TableSchema::new(table);
        schema.columns = column_rows
            .iter()
            .map(column_from_row)
            .collect::<Result<_, _>>()
            .map_err(|e| execution_error(e).context("failed to scan column info"))?;
        schema.indexes = index_rows
            .iter()
            .map(index_from_row)
            .collect::<Result<_, _>>()
            .map_err(|e| execution_error(e).context("failed to scan index info"))?;
        schema
            .metadata
            .insert("schema".into(), Value::String("public".into()));
        Ok(schema)
    }

    async fn get_table_data(&self, table: &str, limit: i64, offset: i64) -> AppResult<TableData> {
        let quoted = self.quote_identifier(table);

        let count = self
            .query_one(&count_sql(&quoted), &[])
            .await
            .map_err(|e| e.context("failed to count rows"))?;
        let total = count.scalar().and_then(SqlValue::as_i64).unwrap_or(0);

        let page = self
            .query(
                &page_sql(&quoted),
                &[Value::from(limit), Value::from(offset)],
            )
            .await
            .map_err(|e| e.context("failed to query table data"))?;
        let (columns, rows) = page.into_records();

        Ok(TableData {
            table_name: table.to_string(),
            columns,
            rows,
            total,
            limit,
            offset,
        })
    }

    async fn explain_query(&self, sql: &str) -> AppResult<String> {
        let set = self
            .query_one(&explain_sql(sql), &[])
            .await
            .map_err(|e| e.context("failed to explain query"))?;
        set.scalar()
            .and_then(SqlValue::as_text)
            .ok_or_else(|| AppError::Execution("failed to explain query: empty plan".into()))
    }
}

/// 通用 SSL 模式映射为 PostgreSQL 驱动取值
pub fn ssl_mode(mode: SslMode) -> PgSslMode {
    match mode {
        SslMode::None => PgSslMode::Disable,
        SslMode::Prefer => PgSslMode::Prefer,
        SslMode::Require => PgSslMode::Require,
        SslMode::VerifyCa => PgSslMode::VerifyCa,
        SslMode::VerifyFull => PgSslMode::VerifyFull,
    }
}

fn count_sql(quoted: &str) -> String {
    format!("SELECT COUNT(*) FROM {quoted}")
}

fn page_sql(quoted: &str) -> String {
    format!("SELECT * FROM {quoted} LIMIT $1 OFFSET $2")
}

fn explain_sql(sql: &str) -> String {
    format!("EXPLAIN (FORMAT JSON) {sql}")
}

fn bind_args<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    args: &[Value],
) -> Query<'q, Postgres, PgArguments> {
    for arg in args {
        query = match arg {
            Value::Null => query.bind(Option::<String>::None),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => query.bind(i),
                None => query.bind(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => query.bind(s.clone()),
            other => query.bind(other.clone()),
        };
    }
    query
}

fn rows_to_set(rows: &[PgRow]) -> RowSet {
    let columns = rows
        .first()
        .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();
    let rows = rows
        .iter()
        .map(|row| (0..row.len()).map(|idx| decode_value(row, idx)).collect())
        .collect();
    RowSet { columns, rows }
}

/// 按列类型依次尝试解码，无法识别的类型以 `<类型名>` 文本占位
fn decode_value(row: &PgRow, idx: usize) -> SqlValue {
    if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
        return v.map(SqlValue::Bool).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
        return v.map(|n| SqlValue::Int(n.into())).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
        return v.map(|n| SqlValue::Int(n.into())).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map(SqlValue::Int).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
        return v.map(|f| SqlValue::Float(f.into())).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v.map(SqlValue::Float).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<Decimal>, _>(idx) {
        return v.map(|d| SqlValue::Text(d.to_string())).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map(SqlValue::Text).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<Value>, _>(idx) {
        return v.map(SqlValue::Json).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<uuid::Uuid>, _>(idx) {
        return v.map(|u| SqlValue::Text(u.to_string())).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
        return v.map(|t| SqlValue::Text(t.to_rfc3339())).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
        return v
            .map(|t| SqlValue::Text(t.format("%Y-%m-%d %H:%M:%S%.f").to_string()))
            .unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
        return v.map(|d| SqlValue::Text(d.to_string())).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveTime>, _>(idx) {
        return v.map(|t| SqlValue::Text(t.to_string())).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return v.map(SqlValue::Bytes).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<String>>, _>(idx) {
        return v
            .map(|items| SqlValue::Json(Value::from(items)))
            .unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<i64>>, _>(idx) {
        return v
            .map(|items| SqlValue::Json(Value::from(items)))
            .unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<i32>>, _>(idx) {
        return v
            .map(|items| SqlValue::Json(Value::from(items)))
            .unwrap_or(SqlValue::Null);
    }
    SqlValue::Text(format!("<{}>", row.columns()[idx].type_info().name()))
}

fn column_from_row(row: &PgRow) -> Result<ColumnInfo, sqlx::Error> {
    let nullable: String = row.try_get("is_nullable")?;
    Ok(ColumnInfo {
        name: row.try_get("column_name")?,
        data_type: row.try_get("data_type")?,
        is_nullable: nullable == "YES",
        default_value: row.try_get("column_default")?,
        is_primary_key: row.try_get("is_primary_key")?,
        is_auto_increment: row.try_get("is_auto_increment")?,
        max_length: row.try_get("max_length")?,
    })
}

fn index_from_row(row: &PgRow) -> Result<IndexInfo, sqlx::Error> {
    Ok(IndexInfo {
        name: row.try_get("index_name")?,
        columns: row.try_get("column_names")?,
        is_unique: row.try_get("is_unique")?,
        is_primary: row.try_get("is_primary")?,
    })
}
