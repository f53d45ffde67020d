//! Application configuration loaded from environment variables.

use std::env;

use newsfeed_infra::auth::JwtConfig;
use newsfeed_infra::cache::{FileCacheConfig, TieredCacheConfig};
use newsfeed_infra::crawl::{CrawlerConfig, OrchestratorConfig};
use newsfeed_infra::database::DatabaseConfig;
use newsfeed_infra::rate_limit::RateLimitConfig;

#[cfg(feature = "redis")]
use newsfeed_infra::cache::RedisConfig;

/// Where rate-limit counters live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitBackend {
    Memory,
    Redis,
}

impl RateLimitBackend {
    fn from_env() -> Self {
        match env::var("RATE_LIMIT_BACKEND").as_deref() {
            Ok("redis") => Self::Redis,
            _ => Self::Memory,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub rate_limit: RateLimitConfig,
    pub rate_limit_backend: RateLimitBackend,
    pub cache: TieredCacheConfig,
    pub file_cache: FileCacheConfig,
    #[cfg(feature = "redis")]
    pub redis: RedisConfig,
    pub crawler: CrawlerConfig,
    pub orchestrator: OrchestratorConfig,
    pub database: Option<DatabaseConfig>,
    pub jwt: JwtConfig,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            rate_limit: RateLimitConfig::from_env(),
            rate_limit_backend: RateLimitBackend::from_env(),
            cache: TieredCacheConfig::from_env(),
            file_cache: FileCacheConfig::from_env(),
            #[cfg(feature = "redis")]
            redis: RedisConfig::from_env(),
            crawler: CrawlerConfig::from_env(),
            orchestrator: OrchestratorConfig::from_env(),
            database: DatabaseConfig::from_env(),
            jwt: JwtConfig::from_env(),
        }
    }
}
