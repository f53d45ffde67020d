//! Redis cache tier - the fast layer in front of the file cache.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use newsfeed_core::ports::{CacheError, CacheTier};

use super::InMemoryCache;

/// Redis connection configuration.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Whether to fall back to the in-memory tier if Redis is unavailable
    pub fallback_to_memory: bool,
    /// Prefix applied to every key written by this service
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connect_timeout: Duration::from_secs(5),
            fallback_to_memory: true,
            key_prefix: "newsfeed".to_string(),
        }
    }
}

impl RedisConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            connect_timeout: Duration::from_secs(
                std::env::var("REDIS_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            fallback_to_memory: std::env::var("REDIS_FALLBACK_TO_MEMORY")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
            key_prefix: std::env::var("REDIS_KEY_PREFIX")
                .unwrap_or_else(|_| "newsfeed".to_string()),
        }
    }

    /// Open a managed connection, bounded by `connect_timeout`.
    pub(crate) async fn connect(&self) -> Result<ConnectionManager, CacheError> {
        let client =
            Client::open(self.url.as_str()).map_err(|e| CacheError::Connection(e.to_string()))?;

        tokio::time::timeout(self.connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::Connection("Connection timed out".to_string()))?
            .map_err(|e| CacheError::Connection(e.to_string()))
    }
}

/// Redis-backed cache tier.
///
/// Uses a connection manager for automatic reconnection.
pub struct RedisCache {
    conn: ConnectionManager,
    config: RedisConfig,
}

impl RedisCache {
    pub async fn new(config: RedisConfig) -> Result<Self, CacheError> {
        let conn = config.connect().await?;
        tracing::info!(url = %config.url, "Connected to Redis cache");
        Ok(Self { conn, config })
    }

    /// Create from environment configuration.
    pub async fn from_env() -> Result<Self, CacheError> {
        Self::new(RedisConfig::from_env()).await
    }

    fn make_key(&self, key: &str) -> String {
        format!("{}:cache:{}", self.config.key_prefix, key)
    }
}

/// Build the fast tier: Redis when reachable, otherwise the in-memory tier if
/// the configuration allows falling back.
pub async fn connect_fast_tier(config: RedisConfig) -> Result<Arc<dyn CacheTier>, CacheError> {
    let fallback = config.fallback_to_memory;
    match RedisCache::new(config).await {
        Ok(cache) => Ok(Arc::new(cache)),
        Err(e) if fallback => {
            tracing::warn!(error = %e, "Redis unavailable, using in-memory fast tier");
            Ok(Arc::new(InMemoryCache::new()))
        }
        Err(e) => Err(e),
    }
}

#[async_trait]
impl CacheTier for RedisCache {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<String>>(self.make_key(key))
            .await
            .map_err(|e| CacheError::Operation(e.to_string()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let redis_key = self.make_key(key);

        match ttl {
            Some(duration) => {
                let millis = duration.as_millis().max(1) as u64;
                conn.pset_ex::<_, _, ()>(redis_key, value, millis)
                    .await
                    .map_err(|e| CacheError::Operation(e.to_string()))?;
            }
            None => {
                conn.set::<_, _, ()>(redis_key, value)
                    .await
                    .map_err(|e| CacheError::Operation(e.to_string()))?;
            }
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(self.make_key(key))
            .await
            .map_err(|e| CacheError::Operation(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> RedisConfig {
        RedisConfig {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6389".to_string()),
            connect_timeout: Duration::from_secs(1),
            fallback_to_memory: false,
            key_prefix: "newsfeed_test".to_string(),
        }
    }

    async fn get_test_cache() -> Option<RedisCache> {
        RedisCache::new(test_config()).await.ok()
    }

    #[tokio::test]
    async fn test_redis_cache_set_get() {
        let cache = match get_test_cache().await {
            Some(c) => c,
            None => {
                tracing::warn!("Redis not available, skipping test");
                return;
            }
        };

        let key = "test_key";
        let value = "test_value";

        cache.set(key, value, None).await.unwrap();
        assert_eq!(cache.get(key).await.unwrap(), Some(value.to_string()));

        cache.delete(key).await.unwrap();
        assert_eq!(cache.get(key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_redis_cache_ttl() {
        let cache = match get_test_cache().await {
            Some(c) => c,
            None => return,
        };

        let key = "test_ttl_key";
        cache
            .set(key, "short lived", Some(Duration::from_millis(200)))
            .await
            .unwrap();
        assert!(cache.get(key).await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(cache.get(key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fast_tier_falls_back_to_memory() {
        let config = RedisConfig {
            url: "redis://127.0.0.1:1".to_string(),
            connect_timeout: Duration::from_millis(200),
            fallback_to_memory: true,
            key_prefix: "newsfeed_test".to_string(),
        };

        let tier = connect_fast_tier(config).await.unwrap();
        assert_eq!(tier.name(), "memory");
    }

    #[tokio::test]
    async fn test_fast_tier_without_fallback_errors() {
        let config = RedisConfig {
            url: "redis://127.0.0.1:1".to_string(),
            connect_timeout: Duration::from_millis(200),
            fallback_to_memory: false,
            key_prefix: "newsfeed_test".to_string(),
        };

        assert!(connect_fast_tier(config).await.is_err());
    }
}
