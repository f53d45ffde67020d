//! Redis rate limiter - the same fixed window, shared across instances.

use async_trait::async_trait;
use redis::Script;
use redis::aio::ConnectionManager;

use newsfeed_core::ports::{RateLimitDecision, RateLimitError, RateLimiter};

use super::memory::RateLimitConfig;
use crate::cache::RedisConfig;

/// Redis-backed fixed-window rate limiter.
///
/// The first hit in a window sets the key's expiry to the window length;
/// the key's remaining TTL is the time until reset.
pub struct RedisRateLimiter {
    conn: ConnectionManager,
    config: RateLimitConfig,
    key_prefix: String,
    /// Lua script for atomic increment with expiry
    script: Script,
}

impl RedisRateLimiter {
    pub async fn new(redis: RedisConfig, config: RateLimitConfig) -> Result<Self, RateLimitError> {
        let conn = redis
            .connect()
            .await
            .map_err(|e| RateLimitError::Backend(e.to_string()))?;

        // Returns: [current_count, pttl_millis]
        let script = Script::new(
            r#"
            local key = KEYS[1]
            local window_ms = tonumber(ARGV[1])

            local current = redis.call('INCR', key)
            if current == 1 then
                redis.call('PEXPIRE', key, window_ms)
            end

            local ttl = redis.call('PTTL', key)
            if ttl < 0 then
                redis.call('PEXPIRE', key, window_ms)
                ttl = window_ms
            end
            return {current, ttl}
            "#,
        );

        tracing::info!(url = %redis.url, "Connected to Redis rate limiter");

        Ok(Self {
            conn,
            config,
            key_prefix: format!("{}:ratelimit", redis.key_prefix),
            script,
        })
    }

    /// Create from environment configuration.
    pub async fn from_env() -> Result<Self, RateLimitError> {
        Self::new(RedisConfig::from_env(), RateLimitConfig::from_env()).await
    }

    fn make_key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check(&self, key: &str) -> Result<RateLimitDecision, RateLimitError> {
        let redis_key = self.make_key(key);
        let mut conn = self.conn.clone();
        let window_ms = self.config.window.as_millis() as u64;

        let result: Vec<i64> = self
            .script
            .key(&redis_key)
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| RateLimitError::Backend(e.to_string()))?;

        let count = result.first().copied().unwrap_or(1).max(0) as u32;
        let ttl_ms = result.get(1).copied().unwrap_or(window_ms as i64).max(0) as u64;
        let limit = self.config.max_requests;

        if count > limit {
            Ok(RateLimitDecision::deny(ttl_ms.div_ceil(1000), limit))
        } else {
            Ok(RateLimitDecision::allow(limit - count, limit))
        }
    }

    fn message(&self) -> &str {
        &self.config.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn get_test_ratelimiter() -> Option<RedisRateLimiter> {
        let redis = RedisConfig {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6389".to_string()),
            connect_timeout: Duration::from_secs(1),
            fallback_to_memory: false,
            key_prefix: format!("newsfeed_test_{}", uuid::Uuid::new_v4()),
        };
        let config = RateLimitConfig {
            max_requests: 2,
            window: Duration::from_secs(1),
            ..RateLimitConfig::default()
        };

        RedisRateLimiter::new(redis, config).await.ok()
    }

    #[tokio::test]
    async fn test_redis_ratelimiter() {
        let limiter = match get_test_ratelimiter().await {
            Some(l) => l,
            None => return,
        };

        let key = "ip:127.0.0.1";

        let res = limiter.check(key).await.unwrap();
        assert!(res.allowed);
        assert_eq!(res.remaining, 1);

        let res = limiter.check(key).await.unwrap();
        assert!(res.allowed);
        assert_eq!(res.remaining, 0);

        let res = limiter.check(key).await.unwrap();
        assert!(!res.allowed);
        assert!(res.retry_after_secs <= 1);

        // Wait for the window to end
        tokio::time::sleep(Duration::from_millis(1500)).await;

        let res = limiter.check(key).await.unwrap();
        assert!(res.allowed);
    }
}
