//! 路由模块

use axum::{
    routing::{get, post},
    Router,
};
use crate::handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/query", post(handlers::execute_query))
        .route("/api/explain", post(handlers::explain_query))
        .route("/api/tables", get(handlers::list_tables))
        .route("/api/tables/{name}", get(handlers::describe_table))
        .route("/api/tables/{name}/data", get(handlers::get_table_data))
        .route("/api/tables/{name}/stats", get(handlers::table_statistics))
        .route("/api/databases", get(handlers::list_databases))
        .route("/api/connection", get(handlers::connection_info))
        .route("/api/health", get(handlers::health_check))
}
