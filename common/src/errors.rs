//! Application error types.
//!
//! Every failure leaving the gateway is one of five kinds. Each kind maps to
//! a stable error code and HTTP status at the transport boundary.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::response::ApiResponse;

/// Result alias used throughout the workspace.
pub type AppResult<T> = Result<T, AppError>;

/// Gateway error taxonomy.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or out-of-range configuration field, unsupported engine,
    /// invalid SSL mode or malformed connection URL.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Open, ping or "not connected" failure against the target engine.
    #[error("connection error: {0}")]
    Connection(String),

    /// Request rejected before any engine call.
    #[error("{0}")]
    Validation(String),

    /// Engine-reported failure during a call (or an expired deadline).
    #[error("{0}")]
    Execution(String),

    /// Unrecognized output rendering mode.
    #[error("{0}")]
    Format(String),
}

impl AppError {
    /// Stable error code for client handling.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Connection(_) => "CONNECTION_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Execution(_) => "EXECUTION_ERROR",
            AppError::Format(_) => "FORMAT_ERROR",
        }
    }

    /// HTTP status used when the error crosses the transport boundary.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Format(_) => StatusCode::BAD_REQUEST,
            AppError::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Configuration(_) | AppError::Execution(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Prefixes the message with operation context, keeping the error kind.
    pub fn context(self, context: impl AsRef<str>) -> Self {
        let context = context.as_ref();
        match self {
            AppError::Configuration(m) => AppError::Configuration(format!("{context}: {m}")),
            AppError::Connection(m) => AppError::Connection(format!("{context}: {m}")),
            AppError::Validation(m) => AppError::Validation(format!("{context}: {m}")),
            AppError::Execution(m) => AppError::Execution(format!("{context}: {m}")),
            AppError::Format(m) => AppError::Format(format!("{context}: {m}")),
        }
    }

    /// Rebuilds the error with a rewritten message, keeping the error kind.
    pub fn map_message(self, f: impl FnOnce(String) -> String) -> Self {
        match self {
            AppError::Configuration(m) => AppError::Configuration(f(m)),
            AppError::Connection(m) => AppError::Connection(f(m)),
            AppError::Validation(m) => AppError::Validation(f(m)),
            AppError::Execution(m) => AppError::Execution(f(m)),
            AppError::Format(m) => AppError::Format(f(m)),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        } else {
            tracing::warn!(code = self.code(), error = %self, "request rejected");
        }
        let body = ApiResponse::err(self.code(), self.to_string());
        (status, Json(body)).into_response()
    }
}
