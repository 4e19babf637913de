//! SQL 访问网关服务
//!
//! 接收查询文本、表名与分页参数，按安全与访问策略校验后路由到
//! MySQL 或 PostgreSQL，并返回统一格式的结果：
//! - 语句分类执行（返回行 / 影响行）
//! - 表与库列表、表结构、分页读取、执行计划
//! - 连接状态探活

mod engine;
mod formatter;
mod handlers;
mod pool_manager;
mod routes;
mod schema_service;
mod service;
mod state;

use std::sync::Arc;

use anyhow::Context;
use axum::{middleware, routing::get, Json, Router};
use common::config::AppConfig;
use common::middleware::request_id::request_id_middleware;
use pool_manager::ConnectionManager;
use state::AppState;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

const SERVICE_NAME: &str = "query-service";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "SQL 访问网关 API",
        version = "0.1.0",
        description = "受控的 MySQL / PostgreSQL 查询与库表结构服务"
    ),
    paths(
        handlers::execute_query,
        handlers::explain_query,
        handlers::list_tables,
        handlers::list_databases,
        handlers::describe_table,
        handlers::get_table_data,
        handlers::table_statistics,
        handlers::connection_info,
        handlers::health_check,
    ),
    components(schemas(
        common::models::QueryRequest,
        common::models::ExplainRequest,
        common::models::QueryResult,
        common::models::QueryCategory,
        common::models::TableSchema,
        common::models::ColumnInfo,
        common::models::IndexInfo,
        common::models::TableData,
        common::models::TablesResult,
        common::models::DatabasesResult,
        common::models::ExplainResult,
        common::models::TableStatistics,
        common::models::ConnectionStatus,
        handlers::QueryResponse,
        handlers::HealthResponse,
    )),
    tags(
        (name = "query", description = "语句执行端点"),
        (name = "schema", description = "库表结构端点"),
        (name = "admin", description = "连接状态端点"),
        (name = "health", description = "健康检查端点")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // 初始化日志追踪
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    if let Err(e) = run().await {
        error!(service = SERVICE_NAME, error = ?e, "服务启动失败");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    // 加载配置
    let config = AppConfig::load()?;
    info!(
        service = SERVICE_NAME,
        database = ?config.database,
        from_url = config.connection_string.is_some(),
        "配置已加载"
    );

    // 建立数据库连接
    let manager = Arc::new(ConnectionManager::new(
        config.database.clone(),
        config.connect_timeout,
    )?);
    manager.connect().await.map_err(|e| {
        let validator = common::utils::SqlValidator::new(manager.config());
        validator.sanitize_error(e)
    })?;

    // 创建应用状态与路由
    let addr = config.listen_addr();
    let state = AppState::new(config, Arc::clone(&manager));
    let app = create_router(state);

    // 启动服务
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("绑定地址失败: {addr}"))?;
    info!(service = SERVICE_NAME, address = %addr, "启动服务");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("服务运行失败");

    manager.close().await;
    info!(service = SERVICE_NAME, "服务已停止");
    served
}

fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::router())
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// 等待 Ctrl-C 或 SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "无法监听 Ctrl-C 信号");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "无法监听 SIGTERM 信号");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("收到停止信号，开始优雅关闭");
}
