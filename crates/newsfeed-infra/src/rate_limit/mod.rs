//! Rate limiting implementations.

mod memory;
mod store;

pub use memory::{DEFAULT_MESSAGE, InMemoryRateLimiter, RateLimitConfig};
pub use store::{CounterEntry, ExpiringCounterStore, Hit, SweeperHandle};

#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "redis")]
pub use self::redis::RedisRateLimiter;
