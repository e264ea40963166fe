//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::path::PathBuf;

/// Process-wide configuration. `celebrity_threshold`, `timeline_cache_size`
/// and `timeline_page_size` seed the engine's live-mutable runtime values
/// (see `engine::EngineContext`) but are not themselves re-read after boot.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub engine: StrategyConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// SQLite RelStore configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    /// Max pooled connections (spec.md §5: "process-wide, max 25").
    pub max_connections: u32,
}

/// Redis TimelineCache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub redis_url: String,
}

/// Initial values for the engine's live-mutable runtime knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    pub celebrity_threshold: i64,
    pub timeline_cache_size: i64,
    pub timeline_page_size: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl EngineConfig {
    /// Load configuration from file and environment.
    ///
    /// # Loading order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (`TIMELINE__*`)
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("database.path", "data/timeline.db")?
            .set_default("database.max_connections", 25)?
            .set_default("cache.redis_url", "redis://127.0.0.1:6379")?
            .set_default("engine.celebrity_threshold", 10_000)?
            .set_default("engine.timeline_cache_size", 800)?
            .set_default("engine.timeline_page_size", 50)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("TIMELINE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
