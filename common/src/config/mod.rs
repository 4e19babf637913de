//! Process configuration.
//!
//! Configuration is read once at startup from the environment (after an
//! optional `.env` file) and never changes afterwards.

pub mod connection_url;
pub mod draft;

use std::path::Path;
use std::time::Duration;

use crate::errors::{AppError, AppResult};
use crate::models::DatabaseConfig;

pub use connection_url::{parse_connection_string, ConnectionInfo};
pub use draft::{merge, ConfigDraft};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP listen host.
    pub host: String,
    /// HTTP listen port.
    pub port: u16,
    /// Validated database configuration.
    pub database: DatabaseConfig,
    /// Connection URL the database configuration was merged from, if any.
    pub connection_string: Option<String>,
    /// Upper bound for opening the pool and acquiring a pooled connection.
    pub connect_timeout: Duration,
    /// Deadline applied to every database call.
    pub query_timeout: Duration,
}

impl AppConfig {
    /// Loads `.env` (if present) and then reads the process environment.
    pub fn load() -> AppResult<Self> {
        load_dotenv(Path::new(".env"));
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let connection_string = lookup("DB_CONNECTION_STRING").filter(|v| !v.trim().is_empty());
        let discrete = ConfigDraft::from_lookup(&lookup)?;
        let database = merge(connection_string.as_deref(), discrete)?;

        let host = lookup("SERVER_HOST")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = parse_or("SERVER_PORT", &lookup, DEFAULT_PORT)?;
        let connect_timeout =
            Duration::from_secs(parse_or("DB_CONNECT_TIMEOUT_SECS", &lookup, DEFAULT_TIMEOUT_SECS)?);
        let query_timeout =
            Duration::from_secs(parse_or("DB_QUERY_TIMEOUT_SECS", &lookup, DEFAULT_TIMEOUT_SECS)?);

        Ok(Self {
            host,
            port,
            database,
            connection_string,
            connect_timeout,
            query_timeout,
        })
    }

    /// Listen address in `host:port` form.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T, F>(key: &str, lookup: &F, default: T) -> AppResult<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| AppError::Configuration(format!("invalid value for {key}: '{v}'"))),
        None => Ok(default),
    }
}

/// Parses `.env` content into key/value pairs.
///
/// Blank lines and `#` comments are skipped; surrounding quotes are removed.
pub fn parse_dotenv(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Loads a `.env` file without overriding variables already set.
///
/// A missing or unreadable file is ignored.
pub fn load_dotenv(path: &Path) {
    let Ok(content) = std::fs::read_to_string(path) else {
        return;
    };
    for (key, value) in parse_dotenv(&content) {
        if std::env::var_os(&key).is_none() {
            std::env::set_var(key, value);
        }
    }
}
