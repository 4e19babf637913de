//! Database connection manager.
//!
//! Owns the single engine of the process. The engine variant is chosen from
//! the configured type tag here and nowhere else.

use std::sync::Arc;
use std::time::Duration;

use common::errors::{AppError, AppResult};
use common::models::{DatabaseConfig, DbType};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::engine::{DatabaseEngine, MySqlEngine, PostgresEngine};

/// Maximum lifetime of a pooled connection.
pub const CONN_MAX_LIFETIME: Duration = Duration::from_secs(5 * 60);
/// Idle pooled connections are closed after this long.
pub const CONN_MAX_IDLE_TIME: Duration = Duration::from_secs(30);

/// Manages the pooled connection to the configured database.
pub struct ConnectionManager {
    config: DatabaseConfig,
    connect_timeout: Duration,
    /// Written only by `connect` and `close`.
    engine: RwLock<Option<Arc<dyn DatabaseEngine>>>,
}

impl ConnectionManager {
    /// Creates a manager for a configuration, rejecting invalid ones.
    pub fn new(config: DatabaseConfig, connect_timeout: Duration) -> AppResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            connect_timeout,
            engine: RwLock::new(None),
        })
    }

    /// Creates a manager around an already built engine and connects it.
    #[cfg(test)]
    pub async fn with_engine(
        config: DatabaseConfig,
        engine: Arc<dyn DatabaseEngine>,
    ) -> AppResult<Self> {
        let manager = Self::new(config, Duration::from_secs(1))?;
        manager.install(engine).await?;
        Ok(manager)
    }

    /// The validated configuration.
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Opens the pool for the configured engine and verifies it with a ping.
    pub async fn connect(&self) -> AppResult<()> {
        let engine: Arc<dyn DatabaseEngine> = match self.config.db_type {
            DbType::MySQL => Arc::new(MySqlEngine::new(self.config.clone(), self.connect_timeout)),
            DbType::Postgres => Arc::new(PostgresEngine::new(
                self.config.clone(),
                self.connect_timeout,
            )),
        };
        self.install(engine).await
    }

    async fn install(&self, engine: Arc<dyn DatabaseEngine>) -> AppResult<()> {
        engine.connect().await?;
        if let Err(e) = engine.ping().await {
            engine.close().await;
            return Err(e.context("failed to ping database"));
        }

        let previous = self.engine.write().await.replace(Arc::clone(&engine));
        if let Some(old) = previous {
            old.close().await;
        }

        info!(
            driver = engine.driver_name(),
            max_conns = self.config.max_conns,
            max_idle_conns = self.config.max_idle_conns,
            ssl_mode = %self.config.ssl_mode,
            "Database connection established"
        );
        Ok(())
    }

    /// The live engine.
    pub async fn engine(&self) -> AppResult<Arc<dyn DatabaseEngine>> {
        self.engine
            .read()
            .await
            .clone()
            .ok_or_else(|| AppError::Connection(crate::engine::NOT_CONNECTED.into()))
    }

    /// Closes the pool. Safe to call repeatedly or before `connect`.
    pub async fn close(&self) {
        let engine = self.engine.write().await.take();
        match engine {
            Some(engine) => {
                engine.close().await;
                info!(driver = engine.driver_name(), "Database connection closed");
            }
            None => warn!("close called without an open database connection"),
        }
    }

    /// Checks that the connection is alive.
    pub async fn ping(&self) -> AppResult<()> {
        let engine = self.engine.read().await.clone().ok_or_else(|| {
            AppError::Connection("no database connection established".into())
        })?;
        engine.ping().await
    }
}
