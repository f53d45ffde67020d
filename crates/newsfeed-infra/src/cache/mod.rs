//! Cache tiers and the tiered fetch-or-compute cache built on them.

mod file;
mod memory;
mod tiered;

pub use file::{FileCache, FileCacheConfig};
pub use memory::InMemoryCache;
pub use tiered::{CacheEntry, Tier, TieredCache, TieredCacheConfig};

#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "redis")]
pub use self::redis::{RedisCache, RedisConfig, connect_fast_tier};
