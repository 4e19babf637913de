//! 数据库引擎抽象
//!
//! MySQL 与 PostgreSQL 在同一契约下工作：连接、探活、查询、执行以及
//! 库表结构查询。未连接时的任何调用都返回连接错误。

pub mod mysql;
pub mod postgres;

#[cfg(test)]
pub mod fake;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use common::errors::{AppError, AppResult};
use common::models::{ExecOutcome, RowSet, TableData, TableSchema};

pub use mysql::MySqlEngine;
pub use postgres::PostgresEngine;

/// 未建立连接时的错误信息
pub const NOT_CONNECTED: &str = "no database connection";

/// 数据库引擎统一契约
#[async_trait]
pub trait DatabaseEngine: Send + Sync {
    /// 驱动名称（`mysql` 或 `postgres`）
    fn driver_name(&self) -> &'static str;

    /// 按本引擎的规则给标识符加引号
    fn quote_identifier(&self, name: &str) -> String;

    /// 建立连接池
    async fn connect(&self) -> AppResult<()>;

    /// 关闭连接池，可重复调用
    async fn close(&self);

    /// 探活
    async fn ping(&self) -> AppResult<()>;

    /// 执行返回行的语句
    async fn query(&self, sql: &str, args: &[serde_json::Value]) -> AppResult<RowSet>;

    /// 执行最多返回一行的语句
    async fn query_one(&self, sql: &str, args: &[serde_json::Value]) -> AppResult<RowSet>;

    /// 执行影响行的语句
    async fn exec(&self, sql: &str, args: &[serde_json::Value]) -> AppResult<ExecOutcome>;

    /// 当前库的表名列表
    async fn list_tables(&self) -> AppResult<Vec<String>>;

    /// 服务器上的库名列表（未经访问策略过滤）
    async fn list_databases(&self) -> AppResult<Vec<String>>;

    /// 表结构：列与索引
    async fn describe_table(&self, table: &str) -> AppResult<TableSchema>;

    /// 分页读取表数据，`total` 独立于分页统计
    async fn get_table_data(&self, table: &str, limit: i64, offset: i64) -> AppResult<TableData>;

    /// 返回 JSON 格式的执行计划文本
    async fn explain_query(&self, sql: &str) -> AppResult<String>;
}

/// 用给定引号字符包裹标识符，内部引号加倍转义
pub fn quote_with(name: &str, quote: char) -> String {
    let doubled = format!("{quote}{quote}");
    format!("{quote}{}{quote}", name.replace(quote, &doubled))
}

/// 在截止时间内运行数据库调用，超时即放弃该调用
pub async fn with_deadline<T, F>(deadline: Duration, fut: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Execution(format!(
            "operation timed out after {:.1}s",
            deadline.as_secs_f64()
        ))),
    }
}

pub(crate) fn execution_error(err: sqlx::Error) -> AppError {
    AppError::Execution(err.to_string())
}

pub(crate) fn connection_error(err: sqlx::Error) -> AppError {
    AppError::Connection(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_with() {
        assert_eq!(quote_with("orders", '`'), "`orders`");
        assert_eq!(quote_with("we`ird", '`'), "`we``ird`");
        assert_eq!(quote_with("say \"hi\"", '"'), "\"say \"\"hi\"\"\"");
    }

    #[tokio::test]
    async fn test_deadline_expired() {
        let err = with_deadline(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, AppError>(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Execution(_)));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_deadline_passes_result_through() {
        let value = with_deadline(Duration::from_secs(1), async { Ok::<_, AppError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }
}
