//! Handler模块

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use validator::Validate;

use common::errors::{AppError, AppResult};
use common::middleware::RequestId;
use common::models::{
    ConnectionStatus, DatabasesResult, ExplainRequest, ExplainResult, QueryRequest, QueryResult,
    TableData, TableDataQuery, TableSchema, TableStatistics, TablesResult,
};
use common::response::ApiResponse;
use crate::formatter::{self, OutputFormat};
use crate::state::AppState;

/// `POST /api/query` 的返回数据
#[derive(Debug, Serialize, ToSchema)]
pub struct QueryResponse {
    /// 统一查询结果
    pub result: QueryResult,
    /// 按请求格式渲染后的文本
    pub formatted: String,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

/// 执行 SQL 语句
#[utoipa::path(
    post,
    path = "/api/query",
    tag = "query",
    request_body = QueryRequest,
    responses(
        (status = 200, description = "语句执行成功", body = ApiResponse<QueryResponse>),
        (status = 400, description = "校验失败或输出格式不支持"),
        (status = 500, description = "执行失败或超时"),
        (status = 503, description = "数据库未连接")
    )
)]
pub async fn execute_query(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<QueryResponse>>> {
    let Json(req) = body.map_err(|e| AppError::Validation(e.body_text()))?;
    check(&req)?;
    let format = OutputFormat::parse(req.format.as_deref())?;

    let result = state.query_service().execute(&req.query, &req.args).await?;
    let formatted = formatter::render(&result, format)?;
    Ok(respond(QueryResponse { result, formatted }, &request_id))
}

/// 获取语句的执行计划
#[utoipa::path(
    post,
    path = "/api/explain",
    tag = "query",
    request_body = ExplainRequest,
    responses(
        (status = 200, description = "执行计划", body = ApiResponse<ExplainResult>),
        (status = 400, description = "语句为空")
    )
)]
pub async fn explain_query(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    body: Result<Json<ExplainRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<ExplainResult>>> {
    let Json(req) = body.map_err(|e| AppError::Validation(e.body_text()))?;
    check(&req)?;
    let data = state.schema_service().explain_query(&req.query).await?;
    Ok(respond(data, &request_id))
}

/// 列出当前库的表
#[utoipa::path(
    get,
    path = "/api/tables",
    tag = "schema",
    responses(
        (status = 200, description = "表列表", body = ApiResponse<TablesResult>),
        (status = 503, description = "数据库未连接")
    )
)]
pub async fn list_tables(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> AppResult<Json<ApiResponse<TablesResult>>> {
    let data = state.schema_service().list_tables().await?;
    Ok(respond(data, &request_id))
}

/// 列出允许访问的库
#[utoipa::path(
    get,
    path = "/api/databases",
    tag = "schema",
    responses(
        (status = 200, description = "库列表（已按访问策略过滤）", body = ApiResponse<DatabasesResult>)
    )
)]
pub async fn list_databases(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> AppResult<Json<ApiResponse<DatabasesResult>>> {
    let data = state.schema_service().list_databases().await?;
    Ok(respond(data, &request_id))
}

/// 获取表结构
#[utoipa::path(
    get,
    path = "/api/tables/{name}",
    tag = "schema",
    params(
        ("name" = String, Path, description = "表名")
    ),
    responses(
        (status = 200, description = "表结构", body = ApiResponse<TableSchema>),
        (status = 400, description = "表名无效")
    )
)]
pub async fn describe_table(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(name): Path<String>,
) -> AppResult<Json<ApiResponse<TableSchema>>> {
    let data = state.schema_service().describe_table(&name).await?;
    Ok(respond(data, &request_id))
}

/// 分页读取表数据
#[utoipa::path(
    get,
    path = "/api/tables/{name}/data",
    tag = "schema",
    params(
        ("name" = String, Path, description = "表名"),
        TableDataQuery
    ),
    responses(
        (status = 200, description = "表数据", body = ApiResponse<TableData>),
        (status = 400, description = "表名或分页参数无效")
    )
)]
pub async fn get_table_data(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(name): Path<String>,
    page: Result<Query<TableDataQuery>, QueryRejection>,
) -> AppResult<Json<ApiResponse<TableData>>> {
    let Query(page) = page.map_err(|e| AppError::Validation(e.body_text()))?;
    let data = state
        .schema_service()
        .get_table_data(&name, page.limit, page.offset)
        .await?;
    Ok(respond(data, &request_id))
}

/// 表的行数统计
#[utoipa::path(
    get,
    path = "/api/tables/{name}/stats",
    tag = "schema",
    params(
        ("name" = String, Path, description = "表名")
    ),
    responses(
        (status = 200, description = "行数统计", body = ApiResponse<TableStatistics>)
    )
)]
pub async fn table_statistics(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(name): Path<String>,
) -> AppResult<Json<ApiResponse<TableStatistics>>> {
    let data = state.schema_service().table_statistics(&name).await?;
    Ok(respond(data, &request_id))
}

/// 数据库连接状态
#[utoipa::path(
    get,
    path = "/api/connection",
    tag = "admin",
    responses(
        (status = 200, description = "连接状态", body = ApiResponse<ConnectionStatus>)
    )
)]
pub async fn connection_info(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> Json<ApiResponse<ConnectionStatus>> {
    let data = state.schema_service().connection_info().await;
    respond(data, &request_id)
}

/// 健康检查端点
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "服务运行正常", body = HealthResponse)
    )
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    })
}

fn respond<T: Serialize>(data: T, request_id: &RequestId) -> Json<ApiResponse<T>> {
    Json(ApiResponse::ok(data).with_request_id(request_id.as_str()))
}

/// 取第一条字段校验信息
fn check<T: Validate>(body: &T) -> AppResult<()> {
    body.validate().map_err(|errors| {
        let message = errors
            .field_errors()
            .values()
            .flat_map(|errs| errs.iter())
            .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
            .unwrap_or_else(|| errors.to_string());
        AppError::Validation(message)
    })
}
