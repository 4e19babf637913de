//! 库表结构查询服务模块

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::errors::{AppError, AppResult};
use common::models::{
    format_millis, ConnectionStatus, DatabasesResult, ExplainResult, SqlValue, TableData,
    TableSchema, TableStatistics, TablesResult,
};
use common::utils::SqlValidator;
use tracing::{debug, warn};

use crate::engine::with_deadline;
use crate::pool_manager::ConnectionManager;

/// 默认分页大小
pub const DEFAULT_PAGE_SIZE: i64 = 100;
/// 最大分页大小
pub const MAX_PAGE_SIZE: i64 = 1000;

/// 库表结构查询服务
pub struct SchemaService {
    manager: Arc<ConnectionManager>,
    validator: Arc<SqlValidator>,
    deadline: Duration,
}

impl SchemaService {
    /// 创建新的结构查询服务实例
    pub fn new(
        manager: Arc<ConnectionManager>,
        validator: Arc<SqlValidator>,
        deadline: Duration,
    ) -> Self {
        Self {
            manager,
            validator,
            deadline,
        }
    }

    /// 列出当前库的所有表
    pub async fn list_tables(&self) -> AppResult<TablesResult> {
        let engine = self.manager.engine().await?;
        let tables = with_deadline(self.deadline, engine.list_tables())
            .await
            .map_err(|e| self.fail(e, "failed to list tables"))?;
        Ok(TablesResult {
            count: tables.len(),
            tables,
        })
    }

    /// 列出访问策略允许的库
    pub async fn list_databases(&self) -> AppResult<DatabasesResult> {
        let engine = self.manager.engine().await?;
        let all = with_deadline(self.deadline, engine.list_databases())
            .await
            .map_err(|e| self.fail(e, "failed to list databases"))?;

        let policy = self.validator.policy();
        let databases: Vec<String> = all.into_iter().filter(|db| policy.is_allowed(db)).collect();
        Ok(DatabasesResult {
            count: databases.len(),
            databases,
        })
    }

    /// 获取表结构
    pub async fn describe_table(&self, table: &str) -> AppResult<TableSchema> {
        SqlValidator::validate_table_name(table)?;
        let engine = self.manager.engine().await?;
        with_deadline(self.deadline, engine.describe_table(table))
            .await
            .map_err(|e| self.fail(e, format!("failed to describe table {table}")))
    }

    /// 分页读取表数据
    ///
    /// `limit` 为 0 时取默认值，超过上限时截断；负数直接拒绝。
    pub async fn get_table_data(&self, table: &str, limit: i64, offset: i64) -> AppResult<TableData> {
        SqlValidator::validate_table_name(table)?;
        let limit = page_size(limit)?;
        if offset < 0 {
            return Err(AppError::Validation("offset cannot be negative".into()));
        }

        let engine = self.manager.engine().await?;
        debug!(table, limit, offset, "读取表数据");
        with_deadline(self.deadline, engine.get_table_data(table, limit, offset))
            .await
            .map_err(|e| self.fail(e, format!("failed to get table data for {table}")))
    }

    /// 获取语句的执行计划
    ///
    /// 语句与执行接口走同一套校验，拼接 EXPLAIN 前拒绝多语句与越权访问。
    pub async fn explain_query(&self, query: &str) -> AppResult<ExplainResult> {
        self.validator
            .validate(query)
            .map_err(|e| self.validator.sanitize_error(e))?;
        let engine = self.manager.engine().await?;
        let plan = with_deadline(self.deadline, engine.explain_query(query))
            .await
            .map_err(|e| self.fail(e, "failed to explain query"))?;

        let plan = serde_json::from_str(&plan).unwrap_or(serde_json::Value::String(plan));
        Ok(ExplainResult {
            query: query.to_string(),
            plan,
        })
    }

    /// 表的行数统计
    pub async fn table_statistics(&self, table: &str) -> AppResult<TableStatistics> {
        SqlValidator::validate_table_name(table)?;
        let engine = self.manager.engine().await?;
        let sql = format!("SELECT COUNT(*) FROM {}", engine.quote_identifier(table));

        let set = with_deadline(self.deadline, engine.query_one(&sql, &[]))
            .await
            .map_err(|e| self.fail(e, format!("failed to get table statistics for {table}")))?;
        let row_count = set.scalar().and_then(SqlValue::as_i64).ok_or_else(|| {
            AppError::Execution(format!(
                "failed to get table statistics for {table}: no row count returned"
            ))
        })?;

        Ok(TableStatistics {
            table_name: table.to_string(),
            row_count,
        })
    }

    /// 连接状态与探活耗时
    pub async fn connection_info(&self) -> ConnectionStatus {
        let driver = match self.manager.engine().await {
            Ok(engine) => engine.driver_name(),
            Err(_) => self.manager.config().db_type.as_str(),
        };

        let start = Instant::now();
        let result = with_deadline(self.deadline, self.manager.ping()).await;
        let ping_time = format_millis(start.elapsed());

        if let Err(e) = &result {
            warn!(error = %self.validator.sanitize(&e.to_string()), "数据库探活失败");
        }

        ConnectionStatus {
            driver: driver.to_string(),
            connected: result.is_ok(),
            ping_time,
        }
    }

    fn fail(&self, err: AppError, context: impl AsRef<str>) -> AppError {
        self.validator.sanitize_error(err.context(context))
    }
}

/// 校验并规整分页大小
pub fn page_size(limit: i64) -> AppResult<i64> {
    match limit {
        l if l < 0 => Err(AppError::Validation("limit cannot be negative".into())),
        0 => Ok(DEFAULT_PAGE_SIZE),
        l => Ok(l.min(MAX_PAGE_SIZE)),
    }
}
