use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use tracing::info;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_CACHE_CAPACITY: usize = 1000;
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_MIN_CONNECTIONS: u32 = 1;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Read-cache configuration. The cache fronts the query interface only;
/// mutating commands invalidate affected keys on commit.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    /// TTL for cached stock lookups in seconds. Zero disables expiry.
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

/// Application configuration with validation.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL (postgres://… or sqlite:…).
    pub database_url: String,

    #[serde(default = "default_max_connections")]
    #[validate(range(min = 1, max = 200))]
    pub db_max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub db_min_connections: u32,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_environment")]
    pub environment: String,

    /// How many times a command is re-run after an optimistic-lock conflict
    /// before the conflict is surfaced to the caller.
    #[serde(default = "default_retry_attempts")]
    #[validate(range(min = 1, max = 10))]
    pub conflict_retry_attempts: u32,

    #[serde(default)]
    pub cache: CacheConfig,
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}
fn default_cache_ttl() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}
fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}
fn default_min_connections() -> u32 {
    DEFAULT_MIN_CONNECTIONS
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_retry_attempts() -> u32 {
    DEFAULT_RETRY_ATTEMPTS
}

impl AppConfig {
    /// Loads configuration from `config/default.toml`, an optional
    /// per-environment file (`config/{APP_ENV}.toml`), and `APP_`-prefixed
    /// environment variables, in increasing priority.
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("APP_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

        let mut builder = Config::builder();

        let default_path = Path::new(CONFIG_DIR).join("default.toml");
        if default_path.exists() {
            builder = builder.add_source(File::from(default_path));
        }
        let env_path = Path::new(CONFIG_DIR).join(format!("{environment}.toml"));
        if env_path.exists() {
            builder = builder.add_source(File::from(env_path));
        }

        builder = builder.add_source(Environment::with_prefix("APP").separator("__"));

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config
            .validate()
            .map_err(|e| ConfigError::Message(format!("invalid configuration: {e}")))?;

        info!(
            environment = %config.environment,
            max_connections = config.db_max_connections,
            "configuration loaded"
        );
        Ok(config)
    }

    /// Minimal configuration pointing at the given database. Used by tests
    /// and embedded callers that do not read configuration files.
    pub fn for_database(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            db_max_connections: DEFAULT_MAX_CONNECTIONS,
            db_min_connections: DEFAULT_MIN_CONNECTIONS,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            environment: "test".to_string(),
            conflict_retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            cache: CacheConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_database_uses_defaults() {
        let cfg = AppConfig::for_database("sqlite::memory:");
        assert_eq!(cfg.database_url, "sqlite::memory:");
        assert_eq!(cfg.conflict_retry_attempts, DEFAULT_RETRY_ATTEMPTS);
        assert_eq!(cfg.cache.capacity, DEFAULT_CACHE_CAPACITY);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn retry_budget_is_bounded() {
        let mut cfg = AppConfig::for_database("sqlite::memory:");
        cfg.conflict_retry_attempts = 0;
        assert!(cfg.validate().is_err());
    }
}
