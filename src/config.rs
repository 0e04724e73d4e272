//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::time::Duration;

use crate::transfer::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Apply the bundled schema at startup
    pub auto_migrate: bool,

    /// Bound on whole-transaction attempts for a transfer
    pub transfer_max_attempts: u32,

    /// Base backoff between conflict retries
    pub transfer_retry_backoff: Duration,

    /// Per-transfer deadline; `None` disables it
    pub transfer_timeout: Option<Duration>,

    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url =
            lookup("DATABASE_URL").ok_or(ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?;

        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string());

        let port = parse_or(&lookup, "PORT", 3000)?;

        let environment = lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string());

        let auto_migrate = parse_or(&lookup, "AUTO_MIGRATE", false)?;

        let transfer_max_attempts: u32 =
            parse_or(&lookup, "TRANSFER_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?;
        if transfer_max_attempts == 0 {
            return Err(ConfigError::InvalidValue("TRANSFER_MAX_ATTEMPTS"));
        }

        let transfer_retry_backoff =
            Duration::from_millis(parse_or(&lookup, "TRANSFER_RETRY_BACKOFF_MS", 10)?);

        let transfer_timeout = match parse_or(&lookup, "TRANSFER_TIMEOUT_MS", 5000u64)? {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(_) => return Err(ConfigError::InvalidValue("LOG_FORMAT")),
        };

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            auto_migrate,
            transfer_max_attempts,
            transfer_retry_backoff,
            transfer_timeout,
            log_format,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.transfer_max_attempts, self.transfer_retry_backoff)
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue(key)),
        None => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
