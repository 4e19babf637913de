//! 查询执行服务模块

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::errors::AppResult;
use common::models::{format_millis, ExecOutcome, QueryCategory, QueryResult, RowSet};
use common::utils::{classify, SqlValidator};
use serde_json::Value;
use tracing::debug;

use crate::engine::with_deadline;
use crate::pool_manager::ConnectionManager;

/// SQL 查询执行服务
///
/// 校验、分类、分派到返回行或影响行的路径，并生成统一结果。
pub struct QueryService {
    manager: Arc<ConnectionManager>,
    validator: Arc<SqlValidator>,
    deadline: Duration,
}

impl QueryService {
    /// 创建新的查询服务实例
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

    /// 执行 SQL 语句
    pub async fn execute(&self, query: &str, args: &[Value]) -> AppResult<QueryResult> {
        self.validator
            .validate(query)
            .map_err(|e| self.validator.sanitize_error(e))?;

        let category = classify(query);
        let engine = self.manager.engine().await?;
        debug!(category = %category, args = args.len(), "执行 SQL 语句");

        let start = Instant::now();
        let result = if category.is_select() {
            with_deadline(self.deadline, engine.query(query, args))
                .await
                .map(select_result)
        } else {
            with_deadline(self.deadline, engine.exec(query, args))
                .await
                .map(|outcome| exec_result(category, outcome))
        };

        let mut result = result.map_err(|e| {
            self.validator
                .sanitize_error(e.context("query execution failed"))
        })?;
        result.execution_time = format_millis(start.elapsed());
        Ok(result)
    }
}

fn select_result(set: RowSet) -> QueryResult {
    let (columns, rows) = set.into_records();
    let count = rows.len() as u64;
    QueryResult {
        category: QueryCategory::Select,
        columns: Some(columns),
        rows: Some(rows),
        row_count: count,
        rows_affected: None,
        last_insert_id: None,
        execution_time: String::new(),
        message: format!("Query executed successfully. {count} rows returned."),
    }
}

fn exec_result(category: QueryCategory, outcome: ExecOutcome) -> QueryResult {
    let affected = outcome.rows_affected;
    let last_insert_id = match category {
        QueryCategory::Insert => outcome.last_insert_id.filter(|id| *id > 0),
        _ => None,
    };
    let message = match (category, last_insert_id) {
        (QueryCategory::Insert, Some(id)) => format!(
            "INSERT executed successfully. {affected} rows affected. Last insert ID: {id}"
        ),
        (QueryCategory::Insert, None) => {
            format!("INSERT executed successfully. {affected} rows affected.")
        }
        (QueryCategory::Update, _) => {
            format!("UPDATE executed successfully. {affected} rows affected.")
        }
        (QueryCategory::Delete, _) => {
            format!("DELETE executed successfully. {affected} rows affected.")
        }
        (QueryCategory::Ddl, _) => "DDL statement executed successfully.".to_string(),
        (QueryCategory::Select, _) => "Query executed successfully.".to_string(),
    };

    QueryResult {
        category,
        columns: None,
        rows: None,
        row_count: affected,
        rows_affected: Some(affected),
        last_insert_id,
        execution_time: String::new(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::FakeEngine;
    use common::errors::AppError;
    use common::models::{DatabaseConfig, DbType, SqlValue, SslMode};

    fn config() -> DatabaseConfig {
        DatabaseConfig {
            db_type: DbType::MySQL,
            host: "db.internal".into(),
            port: 3306,
            database: "testdb".into(),
            username: "app".into(),
            password: "s3cret".into(),
            max_conns: 25,
            max_idle_conns: 5,
            ssl_mode: SslMode::Prefer,
            allowed_databases: vec![],
        }
    }

    async fn service_with(engine: Arc<FakeEngine>) -> QueryService {
        let config = config();
        let validator = Arc::new(SqlValidator::new(&config));
        let manager = ConnectionManager::with_engine(config, engine).await.unwrap();
        QueryService::new(Arc::new(manager), validator, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_select_maps_rows_by_column() {
        let set = RowSet {
            columns: vec!["id".into(), "name".into(), "avatar".into()],
            rows: vec![
                vec![SqlValue::Int(1), SqlValue::Text("ann".into()), SqlValue::Null],
                vec![
                    SqlValue::Int(2),
                    SqlValue::Text("bob".into()),
                    SqlValue::Bytes(b"png".to_vec()),
                ],
            ],
        };
        let engine = Arc::new(FakeEngine::new().with_query_result(set));
        let service = service_with(engine.clone()).await;

        let result = service.execute("SELECT * FROM users", &[]).await.unwrap();
        assert_eq!(result.category, QueryCategory::Select);
        assert_eq!(result.row_count, 2);
        assert_eq!(result.message, "Query executed successfully. 2 rows returned.");
        assert!(result.execution_time.ends_with("ms"));

        let rows = result.rows.unwrap();
        assert_eq!(rows[0]["avatar"], SqlValue::Null);
        assert_eq!(rows[1]["avatar"], SqlValue::Text("png".into()));
        assert_eq!(engine.calls().last().unwrap(), "SELECT * FROM users");
    }

    #[tokio::test]
    async fn test_insert_reports_positive_last_id_only() {
        let engine = Arc::new(FakeEngine::new().with_exec_result(ExecOutcome {
            rows_affected: 1,
            last_insert_id: Some(42),
        }));
        let service = service_with(engine).await;
        let result = service
            .execute("INSERT INTO users (name) VALUES ('x')", &[])
            .await
            .unwrap();
        assert_eq!(result.last_insert_id, Some(42));
        assert_eq!(
            result.message,
            "INSERT executed successfully. 1 rows affected. Last insert ID: 42"
        );

        let engine = Arc::new(FakeEngine::new().with_exec_result(ExecOutcome {
            rows_affected: 3,
            last_insert_id: Some(0),
        }));
        let service = service_with(engine).await;
        let result = service
            .execute("insert into users (name) values ('x')", &[])
            .await
            .unwrap();
        assert_eq!(result.last_insert_id, None);
        assert_eq!(result.message, "INSERT executed successfully. 3 rows affected.");
    }

    #[tokio::test]
    async fn test_other_categories() {
        let engine = Arc::new(FakeEngine::new().with_exec_result(ExecOutcome {
            rows_affected: 4,
            last_insert_id: Some(9),
        }));
        let service = service_with(engine).await;

        let update = service.execute("UPDATE users SET a = 1", &[]).await.unwrap();
        assert_eq!(update.rows_affected, Some(4));
        assert_eq!(update.last_insert_id, None);
        assert_eq!(update.message, "UPDATE executed successfully. 4 rows affected.");

        let delete = service.execute("DELETE FROM users", &[]).await.unwrap();
        assert_eq!(delete.message, "DELETE executed successfully. 4 rows affected.");

        let ddl = service
            .execute("CREATE TABLE t9 (id INT)", &[])
            .await
            .unwrap();
        assert_eq!(ddl.category, QueryCategory::Ddl);
        assert_eq!(ddl.message, "DDL statement executed successfully.");
    }

    #[tokio::test]
    async fn test_rejected_before_engine_call() {
        let engine = Arc::new(FakeEngine::new());
        let service = service_with(engine.clone()).await;

        let err = service
            .execute("SELECT * FROM users; -- DROP TABLE users;", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(err.to_string().contains("potentially dangerous pattern detected"));

        let err = service
            .execute("SELECT * FROM production.users", &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("'production'"));
        assert_eq!(engine.calls(), vec!["connect"]);
    }

    #[tokio::test]
    async fn test_stacked_statement_never_reaches_engine() {
        let engine = Arc::new(FakeEngine::new());
        let service = service_with(engine.clone()).await;

        let err = service
            .execute("SELECT * FROM users; DROP TABLE users", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(
            err.to_string(),
            "potentially dangerous pattern detected (multiple statements): ;"
        );
        assert_eq!(engine.calls(), vec!["connect"]);

        service.execute("SELECT * FROM users;", &[]).await.unwrap();
        assert_eq!(engine.calls(), vec!["connect", "SELECT * FROM users;"]);
    }

    #[tokio::test]
    async fn test_engine_errors_are_wrapped_and_sanitized() {
        let engine = Arc::new(FakeEngine::new().failing("access denied for user app@db.internal"));
        let service = service_with(engine).await;
        let err = service.execute("SELECT 1", &[]).await.unwrap_err();
        assert!(matches!(err, AppError::Execution(_)));
        assert_eq!(
            err.to_string(),
            "query execution failed: access denied for user [REDACTED]@[REDACTED]"
        );
    }

    #[tokio::test]
    async fn test_deadline_expiry() {
        let engine = Arc::new(FakeEngine::new().with_delay(Duration::from_secs(5)));
        let config = config();
        let validator = Arc::new(SqlValidator::new(&config));
        let manager = ConnectionManager::with_engine(config, engine).await.unwrap();
        let service =
            QueryService::new(Arc::new(manager), validator, Duration::from_millis(20));

        let err = service.execute("SELECT 1", &[]).await.unwrap_err();
        assert!(err.to_string().starts_with("query execution failed: operation timed out"));
    }
}
