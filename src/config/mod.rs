//! Process configuration from environment variables (a `.env` file is loaded first by the binary).

use crate::error::ConfigError;
use crate::registry::DEFAULT_API_PREFIX;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub name: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// Issue `CREATE TABLE IF NOT EXISTS` for registered models at startup.
    pub auto_create_tables: bool,
}

impl DatabaseConfig {
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .password(&self.password)
            .database(&self.name)
    }

    pub fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
    }

    /// Connection URL with the password masked, for logs.
    pub fn redacted_url(&self) -> String {
        format!(
            "postgres://{}:***@{}:{}/{}",
            self.username, self.host, self.port, self.name
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub project_name: String,
    pub host: String,
    pub port: u16,
    pub api_prefix: String,
    /// Directory of `*.json` model definitions registered after the built-in models.
    pub models_path: Option<PathBuf>,
    pub database: DatabaseConfig,
}

fn required(lookup: &impl Fn(&str) -> Option<String>, name: &'static str) -> Result<String, ConfigError> {
    lookup(name)
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::MissingEnv(name))
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name).filter(|v| !v.trim().is_empty()) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidEnv {
            name,
            message: format!("'{}': {}", raw, e),
        }),
    }
}

impl AppConfig {
    /// Read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; missing required variables and unparsable values fail.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let max_connections: u32 = parsed(&lookup, "DATABASE_MAX_CONNECTIONS", 5)?;
        if max_connections == 0 {
            return Err(ConfigError::InvalidEnv {
                name: "DATABASE_MAX_CONNECTIONS",
                message: "must be at least 1".into(),
            });
        }
        let database = DatabaseConfig {
            host: required(&lookup, "DATABASE_HOST_NAME")?,
            port: parsed(&lookup, "DATABASE_HOST_PORT", 5432)?,
            username: required(&lookup, "DATABASE_HOST_USERNAME")?,
            password: required(&lookup, "DATABASE_HOST_PASSWORD")?,
            name: required(&lookup, "DATABASE_NAME")?,
            max_connections,
            acquire_timeout: Duration::from_secs(parsed(&lookup, "DATABASE_ACQUIRE_TIMEOUT_SECS", 5)?),
            auto_create_tables: parsed(&lookup, "DATABASE_AUTO_CREATE_TABLES", true)?,
        };
        Ok(AppConfig {
            project_name: required(&lookup, "PROJECT_NAME")?,
            host: lookup("APP_HOST")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed(&lookup, "APP_PORT", 8000)?,
            api_prefix: lookup("API_PREFIX")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_API_PREFIX.into()),
            models_path: lookup("MODELS_PATH")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            database,
        })
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::InvalidEnv {
                name: "APP_HOST",
                message: e.to_string(),
            })
    }
}
