//! Connection configuration models.
//!
//! Contains the validated database configuration, the SSL mode enumeration and
//! the access policy derived from them.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::{AppError, AppResult};

/// Default maximum number of open pooled connections.
pub const DEFAULT_MAX_CONNS: u32 = 25;
/// Default maximum number of idle pooled connections.
pub const DEFAULT_MAX_IDLE_CONNS: u32 = 5;

/// Database type enumeration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    /// MySQL database.
    MySQL,
    /// PostgreSQL database.
    Postgres,
}

impl DbType {
    /// Returns the default port for this database type.
    pub fn default_port(&self) -> u16 {
        match self {
            DbType::MySQL => 3306,
            DbType::Postgres => 5432,
        }
    }

    /// Parses the configuration type tag (`mysql` or `postgres`).
    pub fn parse(tag: &str) -> AppResult<Self> {
        match tag.trim() {
            "mysql" => Ok(DbType::MySQL),
            "postgres" => Ok(DbType::Postgres),
            "" => Err(AppError::Configuration("database type is required".into())),
            other => Err(AppError::Configuration(format!(
                "database type must be 'mysql' or 'postgres', got '{other}'"
            ))),
        }
    }

    /// Returns the configuration type tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            DbType::MySQL => "mysql",
            DbType::Postgres => "postgres",
        }
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine-independent SSL/TLS mode, mapped to driver settings by each engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    /// Plain connection.
    None,
    /// Use TLS when the server offers it.
    #[default]
    Prefer,
    /// Fail unless TLS is negotiated.
    Require,
    /// TLS with the server certificate checked against the CA.
    VerifyCa,
    /// Like `VerifyCa`, and the host name must match the certificate.
    VerifyFull,
}

impl SslMode {
    /// Parses an SSL mode for the given engine.
    ///
    /// The common names `none`, `prefer` and `require` work everywhere. The
    /// native spellings of each driver are accepted for that engine only:
    /// `disabled`/`preferred`/`required` for MySQL and `disable`,
    /// `verify-ca`/`verify-full` for PostgreSQL. An empty string yields the
    /// default (`prefer`).
    pub fn parse_for(db_type: DbType, mode: &str) -> AppResult<Self> {
        let mode = mode.trim();
        let parsed = match (db_type, mode) {
            (_, "") => Some(SslMode::default()),
            (_, "none") => Some(SslMode::None),
            (_, "prefer") => Some(SslMode::Prefer),
            (_, "require") => Some(SslMode::Require),
            (DbType::MySQL, "disabled") => Some(SslMode::None),
            (DbType::MySQL, "preferred") => Some(SslMode::Prefer),
            (DbType::MySQL, "required") => Some(SslMode::Require),
            (DbType::Postgres, "disable") => Some(SslMode::None),
            (DbType::Postgres, "verify-ca") => Some(SslMode::VerifyCa),
            (DbType::Postgres, "verify-full") => Some(SslMode::VerifyFull),
            _ => None,
        };
        parsed.ok_or_else(|| {
            AppError::Configuration(format!(
                "invalid SSL mode for {db_type}: '{mode}', valid options are: none, prefer, require"
            ))
        })
    }

    /// Returns the common name of this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::None => "none",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        }
    }
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated database configuration.
///
/// Created once at startup and never mutated afterwards.
#[derive(Clone, Serialize, ToSchema)]
pub struct DatabaseConfig {
    /// Database type.
    pub db_type: DbType,
    /// Database host.
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Primary database name.
    pub database: String,
    /// Database username.
    pub username: String,
    /// Database password (never serialized).
    #[serde(skip_serializing)]
    pub password: String,
    /// Maximum number of open connections.
    pub max_conns: u32,
    /// Maximum number of idle connections.
    pub max_idle_conns: u32,
    /// SSL/TLS mode.
    pub ssl_mode: SslMode,
    /// Databases allowed in addition to the primary one.
    pub allowed_databases: Vec<String>,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("db_type", &self.db_type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"***")
            .field("max_conns", &self.max_conns)
            .field("max_idle_conns", &self.max_idle_conns)
            .field("ssl_mode", &self.ssl_mode)
            .field("allowed_databases", &self.allowed_databases)
            .finish()
    }
}

impl DatabaseConfig {
    /// Checks every field and reports the first one that fails.
    pub fn validate(&self) -> AppResult<()> {
        if self.host.trim().is_empty() {
            return Err(AppError::Configuration("database host is required".into()));
        }
        if self.port == 0 {
            return Err(AppError::Configuration(
                "database port must be between 1 and 65535, got 0".into(),
            ));
        }
        if self.database.trim().is_empty() {
            return Err(AppError::Configuration("database name is required".into()));
        }
        if self.username.trim().is_empty() {
            return Err(AppError::Configuration("database username is required".into()));
        }
        if self.max_conns < 1 {
            return Err(AppError::Configuration(format!(
                "max connections must be at least 1, got {}",
                self.max_conns
            )));
        }
        if self.max_idle_conns > self.max_conns {
            return Err(AppError::Configuration(format!(
                "max idle connections ({}) cannot exceed max connections ({})",
                self.max_idle_conns, self.max_conns
            )));
        }
        Ok(())
    }

    /// Builds the access policy for this configuration.
    pub fn access_policy(&self) -> AccessPolicy {
        AccessPolicy::new(self.database.clone(), self.allowed_databases.clone())
    }

    /// Credentials and endpoint values that must never reach a caller.
    pub fn secrets(&self) -> [&str; 3] {
        [&self.password, &self.username, &self.host]
    }
}

/// Decides which database names a call may reference.
///
/// The primary database is always allowed. An empty allow-list allows the
/// primary database only. Matching is exact and case sensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    primary: String,
    allowed: Vec<String>,
}

impl AccessPolicy {
    /// Creates a policy from the primary database and the additional list.
    pub fn new(primary: impl Into<String>, allowed: Vec<String>) -> Self {
        Self {
            primary: primary.into(),
            allowed,
        }
    }

    /// Returns the primary database name.
    pub fn primary(&self) -> &str {
        &self.primary
    }

    /// Returns `true` when `database` may be touched.
    pub fn is_allowed(&self, database: &str) -> bool {
        database == self.primary || self.allowed.iter().any(|name| name == database)
    }
}
