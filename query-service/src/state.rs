//! Application state for the gateway.

use std::sync::Arc;

use common::config::AppConfig;
use common::utils::SqlValidator;

use crate::pool_manager::ConnectionManager;
use crate::schema_service::SchemaService;
use crate::service::QueryService;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub manager: Arc<ConnectionManager>,
    pub validator: Arc<SqlValidator>,
}

impl AppState {
    /// Creates a new application state around a connected manager.
    pub fn new(config: AppConfig, manager: Arc<ConnectionManager>) -> Self {
        let validator = Arc::new(SqlValidator::new(manager.config()));
        Self {
            config: Arc::new(config),
            manager,
            validator,
        }
    }

    /// Statement executor bound to this state.
    pub fn query_service(&self) -> QueryService {
        QueryService::new(
            Arc::clone(&self.manager),
            Arc::clone(&self.validator),
            self.config.query_timeout,
        )
    }

    /// Schema inspector bound to this state.
    pub fn schema_service(&self) -> SchemaService {
        SchemaService::new(
            Arc::clone(&self.manager),
            Arc::clone(&self.validator),
            self.config.query_timeout,
        )
    }
}
