//! # Newsfeed Infrastructure
//!
//! Concrete implementations of the ports defined in `newsfeed-core`, plus the
//! engines that sit between the HTTP layer and the crawler: the tiered cache,
//! the per-client rate limiter and the bounded fetch pool.
//!
//! ## Feature Flags
//!
//! - `full` (default) - All features enabled
//! - `minimal` - No external services, in-memory only
//! - `postgres` - PostgreSQL article storage via SeaORM
//! - `auth` - JWT bearer tokens
//! - `rate-limit` - Fixed-window rate limiting (governor clocks)
//! - `redis` - Redis for the fast cache tier and the distributed rate limiter

pub mod cache;
pub mod concurrency;
pub mod crawl;
pub mod database;

#[cfg(feature = "auth")]
pub mod auth;

#[cfg(feature = "rate-limit")]
pub mod rate_limit;

// Re-exports - In-Memory / local
pub use cache::{CacheEntry, FileCache, FileCacheConfig, InMemoryCache, Tier, TieredCache, TieredCacheConfig};
pub use concurrency::{ConcurrencyLimiter, FetchTask, LimiterSnapshot, RunOptions, TaskError};
pub use crawl::{ArticleCache, CrawlOrchestrator, CrawlerConfig, HttpCrawler, OrchestratorConfig};
pub use database::{DatabaseConfig, InMemoryArticleRepository};

#[cfg(feature = "auth")]
pub use auth::{JwtConfig, JwtTokenService};

#[cfg(feature = "rate-limit")]
pub use rate_limit::{ExpiringCounterStore, InMemoryRateLimiter, RateLimitConfig, SweeperHandle};

// Re-exports - Redis
#[cfg(feature = "redis")]
pub use cache::{RedisCache, RedisConfig, connect_fast_tier};
#[cfg(all(feature = "redis", feature = "rate-limit"))]
pub use rate_limit::RedisRateLimiter;

#[cfg(feature = "postgres")]
pub use database::PostgresArticleRepository;
