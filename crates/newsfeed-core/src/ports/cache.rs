use async_trait::async_trait;
use std::time::Duration;

/// One layer of a tiered cache (Redis, in-memory, file).
///
/// Values are opaque serialised strings; typing happens one level up.
#[async_trait]
pub trait CacheTier: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &'static str;

    /// Get a value from the tier. `Ok(None)` is a miss.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Set a value in the tier with optional TTL.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Delete a key from the tier. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Cache operation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}
