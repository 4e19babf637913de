//! MySQL 引擎
//!
//! 所有语句都走预处理协议并按位置绑定，单次调用只执行一条语句。

use std::time::Duration;

use async_trait::async_trait;
use common::errors::{AppError, AppResult};
use common::models::{
    merge_index_rows, ColumnInfo, DatabaseConfig, ExecOutcome, IndexInfo, RowSet, SqlValue,
    SslMode, TableData, TableSchema,
};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::mysql::{
    MySql, MySqlArguments, MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow,
    MySqlSslMode,
};
use sqlx::query::Query;
use sqlx::{Column, Executor, Row, TypeInfo};
use tokio::sync::RwLock;

use super::{connection_error, execution_error, quote_with, DatabaseEngine, NOT_CONNECTED};
use crate::pool_manager::{CONN_MAX_IDLE_TIME, CONN_MAX_LIFETIME};

/// MySQL 引擎，持有连接池
pub struct MySqlEngine {
    config: DatabaseConfig,
    connect_timeout: Duration,
    pool: RwLock<Option<MySqlPool>>,
}

impl MySqlEngine {
    pub fn new(config: DatabaseConfig, connect_timeout: Duration) -> Self {
        Self {
            config,
            connect_timeout,
            pool: RwLock::new(None),
        }
    }

    fn connect_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.config.host)
            .port(self.config.port)
            .username(&self.config.username)
            .password(&self.config.password)
            .database(&self.config.database)
            .ssl_mode(ssl_mode(self.config.ssl_mode))
            .charset("utf8mb4")
    }

    async fn pool(&self) -> AppResult<MySqlPool> {
        self.pool
            .read()
            .await
            .clone()
            .ok_or_else(|| AppError::Connection(NOT_CONNECTED.into()))
    }

    async fn fetch_rows(&self, sql: &str, args: &[Value]) -> AppResult<Vec<MySqlRow>> {
        let pool = self.pool().await?;
        bind_args(sqlx::query(sql), args)
            .fetch_all(&pool)
            .await
            .map_err(execution_error)
    }

    /// 结果集为空时通过 describe 补齐列名
    async fn column_names(&self, sql: &str) -> Vec<String> {
        let Ok(pool) = self.pool().await else {
            return Vec::new();
        };
        match (&pool).describe(sql).await {
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
impl DatabaseEngine for MySqlEngine {
    fn driver_name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, name: &str) -> String {
        quote_with(name, '`')
    }

    async fn connect(&self) -> AppResult<()> {
        let pool = MySqlPoolOptions::new()
            .max_connections(self.config.max_conns)
            .min_connections(self.config.max_idle_conns)
            .max_lifetime(CONN_MAX_LIFETIME)
            .idle_timeout(CONN_MAX_IDLE_TIME)
            .acquire_timeout(self.connect_timeout)
            .connect_with(self.connect_options())
            .await
            .map_err(|e| connection_error(e).context("failed to open MySQL connection"))?;

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
            .map_err(|e| connection_error(e).context("failed to ping MySQL database"))
    }

    async fn query(&self, sql: &str, args: &[Value]) -> AppResult<RowSet> {
        let rows = self.fetch_rows(sql, args).await?;
        let mut set = rows_to_set(&rows);
        if rows.is_empty() {
            set.columns = self.column_names(sql).await;
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

        let last_insert_id = i64::try_from(result.last_insert_id())
            .ok()
            .filter(|id| *id > 0);
        Ok(ExecOutcome {
            rows_affected: result.rows_affected(),
            last_insert_id,
        })
    }

    async fn list_tables(&self) -> AppResult<Vec<String>> {
        let set = self.query("SHOW TABLES", &[]).await?;
        Ok(first_column_text(&set))
    }

    async fn list_databases(&self) -> AppResult<Vec<String>> {
        let set = self.query("SHOW DATABASES", &[]).await?;
        Ok(first_column_text(&set))
    }

    async fn describe_table(&self, table: &str) -> AppResult<TableSchema> {
        let keys = [
            Value::String(self.config.database.clone()),
            Value::String(table.to_string()),
        ];

        let columns = self
            .query(
                "SELECT COLUMN_NAME, DATA_TYPE, IS_NULLABLE, COLUMN_DEFAULT, COLUMN_KEY, EXTRA, \
                 CHARACTER_MAXIMUM_LENGTH \
                 FROM INFORMATION_SCHEMA.COLUMNS \
                 WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? \
                 ORDER BY ORDINAL_POSITION",
                &keys,
            )
            .await
            .map_err(|e| e.context("failed to describe table"))?;

        let indexes = self
            .query(
                "SELECT INDEX_NAME, COLUMN_NAME, NON_UNIQUE \
                 FROM INFORMATION_SCHEMA.STATISTICS \
                 WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? \
                 ORDER BY INDEX_NAME, SEQ_IN_INDEX",
                &keys,
            )
            .await
            .map_err(|e| e.context("failed to get index info"))?;

        let mut schema = TableSchema::new(table);
        schema.columns = columns.rows.iter().map(|r| column_from_row(r)).collect();
        schema.indexes = merge_index_rows(indexes.rows.iter().map(|r| index_from_row(r)));
        schema
            .metadata
            .insert("database".into(), Value::String(self.config.database.clone()));
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

/// 通用 SSL 模式映射为 MySQL 驱动取值
pub fn ssl_mode(mode: SslMode) -> MySqlSslMode {
    match mode {
        SslMode::None => MySqlSslMode::Disabled,
        SslMode::Prefer => MySqlSslMode::Preferred,
        SslMode::Require => MySqlSslMode::Required,
        SslMode::VerifyCa => MySqlSslMode::VerifyCa,
        SslMode::VerifyFull => MySqlSslMode::VerifyIdentity,
    }
}

fn count_sql(quoted: &str) -> String {
    format!("SELECT COUNT(*) FROM {quoted}")
}

fn page_sql(quoted: &str) -> String {
    format!("SELECT * FROM {quoted} LIMIT ? OFFSET ?")
}

fn explain_sql(sql: &str) -> String {
    format!("EXPLAIN FORMAT=JSON {sql}")
}

fn bind_args<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    args: &[Value],
) -> Query<'q, MySql, MySqlArguments> {
    for arg in args {
        query = match arg {
            Value::Null => query.bind(Option::<String>::None),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match (n.as_i64(), n.as_u64()) {
                (Some(i), _) => query.bind(i),
                (None, Some(u)) => query.bind(u),
                _ => query.bind(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => query.bind(s.clone()),
            other => query.bind(other.to_string()),
        };
    }
    query
}

fn rows_to_set(rows: &[MySqlRow]) -> RowSet {
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

/// 按列类型依次尝试解码
fn decode_value(row: &MySqlRow, idx: usize) -> SqlValue {
    if row.columns()[idx].type_info().name() == "JSON" {
        if let Ok(v) = row.try_get::<Option<Value>, _>(idx) {
            return v.map(SqlValue::Json).unwrap_or(SqlValue::Null);
        }
    }
    if let Ok(v) = row.try_get::<Option<u64>, _>(idx) {
        return v.map(SqlValue::UInt).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map(SqlValue::Int).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v.map(SqlValue::Float).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
        return v.map(|f| SqlValue::Float(f64::from(f))).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<Decimal>, _>(idx) {
        return v.map(|d| SqlValue::Text(d.to_string())).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
        return v
            .map(|t| SqlValue::Text(t.format("%Y-%m-%d %H:%M:%S%.f").to_string()))
            .unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
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
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map(SqlValue::Text).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return v.map(SqlValue::Bytes).unwrap_or(SqlValue::Null);
    }
    row.try_get_unchecked::<Option<Vec<u8>>, _>(idx)
        .ok()
        .flatten()
        .map(SqlValue::Bytes)
        .unwrap_or(SqlValue::Null)
}

fn first_column_text(set: &RowSet) -> Vec<String> {
    set.rows
        .iter()
        .filter_map(|row| row.first().and_then(SqlValue::as_text))
        .collect()
}

fn text_at(row: &[SqlValue], idx: usize) -> Option<String> {
    row.get(idx).and_then(SqlValue::as_text)
}

/// INFORMATION_SCHEMA.COLUMNS 行转列定义
fn column_from_row(row: &[SqlValue]) -> ColumnInfo {
    let extra = text_at(row, 5).unwrap_or_default();
    ColumnInfo {
        name: text_at(row, 0).unwrap_or_default(),
        data_type: text_at(row, 1).unwrap_or_default(),
        is_nullable: text_at(row, 2).as_deref() == Some("YES"),
        default_value: text_at(row, 3),
        is_primary_key: text_at(row, 4).as_deref() == Some("PRI"),
        is_auto_increment: extra.contains("auto_increment"),
        max_length: row.get(6).and_then(SqlValue::as_i64),
    }
}

/// INFORMATION_SCHEMA.STATISTICS 行转索引（单列）
fn index_from_row(row: &[SqlValue]) -> IndexInfo {
    let name = text_at(row, 0).unwrap_or_default();
    IndexInfo {
        is_primary: name == "PRIMARY",
        is_unique: row.get(2).and_then(SqlValue::as_i64) == Some(0),
        columns: text_at(row, 1).into_iter().collect(),
        name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssl_mode_mapping() {
        assert!(matches!(ssl_mode(SslMode::None), MySqlSslMode::Disabled));
        assert!(matches!(ssl_mode(SslMode::Prefer), MySqlSslMode::Preferred));
        assert!(matches!(ssl_mode(SslMode::Require), MySqlSslMode::Required));
    }

    #[test]
    fn test_table_statements_use_mysql_dialect() {
        let engine = MySqlEngine::new(sample_config(), Duration::from_secs(1));
        let quoted = engine.quote_identifier("order`items");
        assert_eq!(quoted, "`order``items`");
        assert_eq!(count_sql(&quoted), "SELECT COUNT(*) FROM `order``items`");
        assert_eq!(
            page_sql(&quoted),
            "SELECT * FROM `order``items` LIMIT ? OFFSET ?"
        );
        assert_eq!(
            explain_sql("SELECT * FROM users"),
            "EXPLAIN FORMAT=JSON SELECT * FROM users"
        );
    }

    #[test]
    fn test_column_from_row() {
        let row = vec![
            SqlValue::Text("id".into()),
            SqlValue::Text("int".into()),
            SqlValue::Text("NO".into()),
            SqlValue::Null,
            SqlValue::Text("PRI".into()),
            SqlValue::Text("auto_increment".into()),
            SqlValue::Null,
        ];
        let column = column_from_row(&row);
        assert_eq!(column.name, "id");
        assert!(!column.is_nullable);
        assert!(column.is_primary_key);
        assert!(column.is_auto_increment);
        assert_eq!(column.default_value, None);

        let row = vec![
            SqlValue::Bytes(b"email".to_vec()),
            SqlValue::Text("varchar".into()),
            SqlValue::Text("YES".into()),
            SqlValue::Text("none@example.com".into()),
            SqlValue::Text("".into()),
            SqlValue::Text("".into()),
            SqlValue::UInt(255),
        ];
        let column = column_from_row(&row);
        assert_eq!(column.name, "email");
        assert!(column.is_nullable);
        assert_eq!(column.max_length, Some(255));
        assert_eq!(column.default_value.as_deref(), Some("none@example.com"));
    }

    #[test]
    fn test_index_rows_merge_by_name() {
        let rows = [
            vec![SqlValue::Text("PRIMARY".into()), SqlValue::Text("id".into()), SqlValue::Int(0)],
            vec![SqlValue::Text("idx_ab".into()), SqlValue::Text("a".into()), SqlValue::Int(1)],
            vec![SqlValue::Text("idx_ab".into()), SqlValue::Text("b".into()), SqlValue::Int(1)],
            vec![SqlValue::Text("uniq_email".into()), SqlValue::Text("email".into()), SqlValue::Int(0)],
        ];
        let indexes = merge_index_rows(rows.iter().map(|r| index_from_row(r)));
        assert_eq!(indexes.len(), 3);
        assert!(indexes[0].is_primary && indexes[0].is_unique);
        assert_eq!(indexes[1].columns, vec!["a", "b"]);
        assert!(!indexes[1].is_unique);
        assert!(indexes[2].is_unique && !indexes[2].is_primary);
    }

    #[tokio::test]
    async fn test_calls_before_connect_fail() {
        let engine = MySqlEngine::new(sample_config(), Duration::from_secs(1));
        let err = engine.list_tables().await.unwrap_err();
        assert!(matches!(err, AppError::Connection(_)));
        assert!(engine.ping().await.is_err());
        engine.close().await;
    }

    fn sample_config() -> DatabaseConfig {
        DatabaseConfig {
            db_type: common::models::DbType::MySQL,
            host: "localhost".into(),
            port: 3306,
            database: "shop".into(),
            username: "root".into(),
            password: String::new(),
            max_conns: 5,
            max_idle_conns: 1,
            ssl_mode: SslMode::None,
            allowed_databases: vec![],
        }
    }
}
