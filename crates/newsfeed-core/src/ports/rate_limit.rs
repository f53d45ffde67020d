//! Rate limiting port.

use async_trait::async_trait;

/// Rate limiter trait - abstraction over rate limiting backends.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Count a request against `key` and decide whether it may proceed.
    ///
    /// Exceeding the limit is a normal outcome (`allowed == false`), not an error.
    async fn check(&self, key: &str) -> Result<RateLimitDecision, RateLimitError>;

    /// Message returned to throttled clients.
    fn message(&self) -> &str;
}

/// Result of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Whole seconds until the window resets; 0 when allowed.
    pub retry_after_secs: u64,
    pub remaining: u32,
    pub limit: u32,
}

impl RateLimitDecision {
    pub fn allow(remaining: u32, limit: u32) -> Self {
        Self {
            allowed: true,
            retry_after_secs: 0,
            remaining,
            limit,
        }
    }

    pub fn deny(retry_after_secs: u64, limit: u32) -> Self {
        Self {
            allowed: false,
            retry_after_secs,
            remaining: 0,
            limit,
        }
    }
}

/// Rate limit errors.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Backend error: {0}")]
    Backend(String),
}
