//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub display_names: DisplayNameConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8003)
    pub port: u16,
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Presence cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// TTL for resolved records in seconds (default: 300)
    pub ttl_seconds: u64,
    /// TTL for "no such user" markers in seconds (default: 300)
    pub negative_ttl_seconds: u64,
    /// Maximum number of cached users (default: 10000)
    pub max_entries: usize,
    /// How often expired entries are swept in seconds (default: 60)
    pub prune_interval_seconds: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn negative_ttl(&self) -> Duration {
        Duration::from_secs(self.negative_ttl_seconds)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 300,
            negative_ttl_seconds: 300,
            max_entries: 10_000,
            prune_interval_seconds: 60,
        }
    }
}

/// Cross-grid display-name configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DisplayNameConfig {
    /// Contact remote grids for display names of visiting users
    pub fetch: bool,
    /// Age after which a cached remote display name is refreshed (default: 12)
    pub cache_expiration_hours: i64,
    /// Per-authority request timeout in seconds (default: 5)
    pub request_timeout_seconds: u64,
}

impl DisplayNameConfig {
    /// Largest expiration `chrono::Duration` can hold in hours
    pub const MAX_CACHE_EXPIRATION_HOURS: i64 = i64::MAX / 3600 / 1000;

    pub fn expiration(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cache_expiration_hours)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for DisplayNameConfig {
    fn default() -> Self {
        Self {
            fetch: false,
            cache_expiration_hours: 12,
            request_timeout_seconds: 5,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (GRIDPRESENCE__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8003)?
            .set_default("database.path", "data/gridpresence.db")?
            .set_default("cache.ttl_seconds", 300)?
            .set_default("cache.negative_ttl_seconds", 300)?
            .set_default("cache.max_entries", 10_000)?
            .set_default("cache.prune_interval_seconds", 60)?
            .set_default("display_names.fetch", false)?
            .set_default("display_names.cache_expiration_hours", 12)?
            .set_default("display_names.request_timeout_seconds", 5)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("GRIDPRESENCE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    fn validate(&self) -> Result<(), crate::error::AppError> {
        if self.cache.max_entries == 0 {
            return Err(crate::error::AppError::Config(
                "cache.max_entries must be greater than 0".to_string(),
            ));
        }

        if self.cache.ttl_seconds == 0 || self.cache.negative_ttl_seconds == 0 {
            return Err(crate::error::AppError::Config(
                "cache.ttl_seconds and cache.negative_ttl_seconds must be greater than 0"
                    .to_string(),
            ));
        }

        if self.display_names.request_timeout_seconds == 0 {
            return Err(crate::error::AppError::Config(
                "display_names.request_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        let hours = self.display_names.cache_expiration_hours;
        if hours <= 0 || hours > DisplayNameConfig::MAX_CACHE_EXPIRATION_HOURS {
            return Err(crate::error::AppError::Config(format!(
                "display_names.cache_expiration_hours must be between 1 and {}",
                DisplayNameConfig::MAX_CACHE_EXPIRATION_HOURS
            )));
        }

        if self.display_names.fetch {
            tracing::info!(
                hours = self.display_names.cache_expiration_hours,
                "Remote display-name fetching enabled"
            );
        }

        Ok(())
    }
}
