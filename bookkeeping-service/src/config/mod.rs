//! Configuration module for bookkeeping-service.

use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BookkeepingConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub fx: FxConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct FxConfig {
    /// Base URL of a Frankfurter-compatible rates API.
    pub api_url: String,
    pub timeout: Duration,
    pub cache_ttl: Duration,
    /// Default target currency for line items.
    pub reporting_currency: String,
}

impl BookkeepingConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "bookkeeping-service".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 10),
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", 2),
            },
            fx: FxConfig {
                api_url: env::var("FX_API_URL")
                    .unwrap_or_else(|_| "https://api.frankfurter.app".to_string()),
                timeout: Duration::from_secs(parse_env("FX_TIMEOUT_SECS", 5)),
                cache_ttl: Duration::from_secs(parse_env("FX_CACHE_TTL_SECS", 3600)),
                reporting_currency: env::var("REPORTING_CURRENCY")
                    .unwrap_or_else(|_| "USD".to_string())
                    .to_ascii_uppercase(),
            },
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
