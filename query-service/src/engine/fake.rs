//! 测试用的内存引擎

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use common::errors::{AppError, AppResult};
use common::models::{ColumnInfo, ExecOutcome, RowSet, SqlValue, TableData, TableSchema};
use serde_json::Value;

use super::{quote_with, DatabaseEngine};

/// 按预设数据应答的引擎，并记录收到的语句
#[derive(Default)]
pub struct FakeEngine {
    databases: Vec<String>,
    tables: BTreeMap<String, RowSet>,
    query_result: RowSet,
    exec_result: ExecOutcome,
    failure: Option<String>,
    unreachable: bool,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_databases(mut self, names: &[&str]) -> Self {
        self.databases = names.iter().map(|s| s.to_string()).collect();
        self
    }

    /// 注册一张表，`rows` 行内容为 `id` 递增的整数
    pub fn with_numbered_table(mut self, name: &str, rows: i64) -> Self {
        let set = RowSet {
            columns: vec!["id".into(), "note".into()],
            rows: (1..=rows)
                .map(|id| vec![SqlValue::Int(id), SqlValue::Null])
                .collect(),
        };
        self.tables.insert(name.to_string(), set);
        self
    }

    pub fn with_query_result(mut self, set: RowSet) -> Self {
        self.query_result = set;
        self
    }

    pub fn with_exec_result(mut self, outcome: ExecOutcome) -> Self {
        self.exec_result = outcome;
        self
    }

    /// 所有语句调用都以给定信息失败
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    /// 连接与探活失败
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 已收到的调用，按顺序
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn log(&self, call: impl Into<String>) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call.into());
        }
    }

    async fn record(&self, call: impl Into<String>) -> AppResult<()> {
        self.log(call);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.failure {
            Some(message) => Err(AppError::Execution(message.clone())),
            None => Ok(()),
        }
    }

    fn table(&self, name: &str) -> AppResult<&RowSet> {
        self.tables
            .get(name)
            .ok_or_else(|| AppError::Execution(format!("table '{name}' doesn't exist")))
    }
}

#[async_trait]
impl DatabaseEngine for FakeEngine {
    fn driver_name(&self) -> &'static str {
        "fake"
    }

    fn quote_identifier(&self, name: &str) -> String {
        quote_with(name, '"')
    }

    async fn connect(&self) -> AppResult<()> {
        self.log("connect");
        if self.unreachable {
            return Err(AppError::Connection("dial tcp db.internal:5432: refused".into()));
        }
        Ok(())
    }

    async fn close(&self) {
        self.log("close");
    }

    async fn ping(&self) -> AppResult<()> {
        if self.unreachable {
            return Err(AppError::Connection("ping to db.internal failed".into()));
        }
        Ok(())
    }

    async fn query(&self, sql: &str, _args: &[Value]) -> AppResult<RowSet> {
        self.record(sql).await?;
        Ok(self.query_result.clone())
    }

    async fn query_one(&self, sql: &str, _args: &[Value]) -> AppResult<RowSet> {
        self.record(sql).await?;
        let mut set = self.query_result.clone();
        set.rows.truncate(1);
        Ok(set)
    }

    async fn exec(&self, sql: &str, _args: &[Value]) -> AppResult<ExecOutcome> {
        self.record(sql).await?;
        Ok(self.exec_result)
    }

    async fn list_tables(&self) -> AppResult<Vec<String>> {
        self.record("list_tables").await?;
        Ok(self.tables.keys().cloned().collect())
    }

    async fn list_databases(&self) -> AppResult<Vec<String>> {
        self.record("list_databases").await?;
        Ok(self.databases.clone())
    }

    async fn describe_table(&self, table: &str) -> AppResult<TableSchema> {
        self.record(format!("describe {table}")).await?;
        let set = self.table(table)?;
        let mut schema = TableSchema::new(table);
        schema.columns = set
            .columns
            .iter()
            .map(|name| ColumnInfo {
                name: name.clone(),
                data_type: if name == "id" { "integer" } else { "text" }.into(),
                is_nullable: name != "id",
                default_value: None,
                is_primary_key: name == "id",
                is_auto_increment: false,
                max_length: None,
            })
            .collect();
        Ok(schema)
    }

    async fn get_table_data(&self, table: &str, limit: i64, offset: i64) -> AppResult<TableData> {
        self.record(format!("data {table} {limit} {offset}")).await?;
        let set = self.table(table)?;
        let page = RowSet {
            columns: set.columns.clone(),
            rows: set
                .rows
                .iter()
                .skip(offset.max(0) as usize)
                .take(limit.max(0) as usize)
                .cloned()
                .collect(),
        };
        let total = set.rows.len() as i64;
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
        self.record(format!("explain {sql}")).await?;
        Ok(r#"[{"Plan": {"Node Type": "Seq Scan"}}]"#.to_string())
    }
}
