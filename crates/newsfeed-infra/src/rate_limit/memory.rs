//! In-memory fixed-window rate limiter.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::clock::{Clock, DefaultClock};

use newsfeed_core::ports::{RateLimitDecision, RateLimitError, RateLimiter};

use super::store::{ExpiringCounterStore, SweeperHandle};

pub const DEFAULT_MESSAGE: &str = "Too many requests, please try again later.";

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window.
    pub max_requests: u32,
    /// Window duration.
    pub window: Duration,
    /// Message sent to throttled clients.
    pub message: String,
    /// How often expired counters are swept.
    pub sweep_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_millis(900_000),
            message: DEFAULT_MESSAGE.to_string(),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_requests: std::env::var("RATE_LIMIT_MAX_REQUESTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&n: &u32| n > 0)
                .unwrap_or(defaults.max_requests),
            window: std::env::var("RATE_LIMIT_WINDOW_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&ms: &u64| ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.window),
            message: std::env::var("RATE_LIMIT_MESSAGE").unwrap_or(defaults.message),
            sweep_interval: std::env::var("RATE_LIMIT_SWEEP_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&s: &u64| s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
        }
    }
}

/// Per-key fixed-window rate limiter backed by [`ExpiringCounterStore`].
///
/// Limits are per-process, not shared across instances; use
/// `RedisRateLimiter` for that.
pub struct InMemoryRateLimiter<C: Clock = DefaultClock> {
    store: Arc<ExpiringCounterStore<C>>,
    config: RateLimitConfig,
    sweeper: Option<SweeperHandle>,
}

impl InMemoryRateLimiter<DefaultClock> {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, DefaultClock::default())
    }

    pub fn from_env() -> Self {
        Self::new(RateLimitConfig::from_env())
    }
}

impl<C: Clock> InMemoryRateLimiter<C> {
    pub fn with_clock(config: RateLimitConfig, clock: C) -> Self {
        Self {
            store: Arc::new(ExpiringCounterStore::with_clock(clock)),
            config,
            sweeper: None,
        }
    }

    /// Count a request for `key` and decide. Never blocks on I/O.
    pub fn decide(&self, key: &str) -> RateLimitDecision {
        let hit = self.store.hit(key, self.config.window);
        let limit = self.config.max_requests;

        if hit.count > limit {
            RateLimitDecision::deny(ceil_secs(hit.resets_in), limit)
        } else {
            RateLimitDecision::allow(limit - hit.count, limit)
        }
    }

    pub fn store(&self) -> &Arc<ExpiringCounterStore<C>> {
        &self.store
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}

impl<C> InMemoryRateLimiter<C>
where
    C: Clock + Send + Sync + 'static,
{
    /// Start sweeping expired counters every `sweep_interval`.
    ///
    /// Requires a Tokio runtime. The sweep lives as long as the limiter.
    pub fn with_sweeper(mut self) -> Self {
        self.sweeper = Some(self.store.spawn_sweeper(self.config.sweep_interval));
        tracing::info!(
            interval_secs = self.config.sweep_interval.as_secs(),
            "Rate limit sweeper started"
        );
        self
    }
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

#[async_trait]
impl<C> RateLimiter for InMemoryRateLimiter<C>
where
    C: Clock + Send + Sync + 'static,
{
    async fn check(&self, key: &str) -> Result<RateLimitDecision, RateLimitError> {
        Ok(self.decide(key))
    }

    fn message(&self) -> &str {
        &self.config.message
    }
}
