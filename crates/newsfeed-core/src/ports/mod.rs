//! Ports - trait definitions for external dependencies.
//! These are the "interfaces" that infrastructure must implement.

mod auth;
mod cache;
mod crawler;
mod rate_limit;
mod repository;

pub use auth::{AuthError, TokenClaims, TokenService};
pub use cache::{CacheError, CacheTier};
pub use crawler::{CrawlError, Crawler};
pub use rate_limit::{RateLimitDecision, RateLimitError, RateLimiter};
pub use repository::ArticleRepository;
