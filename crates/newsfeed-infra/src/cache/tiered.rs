//! Tiered fetch-or-compute cache.
//!
//! Lookups go fast tier, then durable tier, then the caller's compute
//! function. Concurrent misses for one key share a single compute
//! (single-flight): the first caller registers as leader, everyone else
//! subscribes to the leader's result.

use std::future::Future;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use newsfeed_core::ports::{CacheError, CacheTier};

/// Per-tier TTLs.
#[derive(Debug, Clone)]
pub struct TieredCacheConfig {
    pub fast_ttl: Option<Duration>,
    pub durable_ttl: Option<Duration>,
}

impl Default for TieredCacheConfig {
    fn default() -> Self {
        Self {
            fast_ttl: Some(Duration::from_secs(300)),
            durable_ttl: Some(Duration::from_secs(86_400)),
        }
    }
}

impl TieredCacheConfig {
    /// Load TTLs from the environment. A TTL of 0 means "never expires".
    pub fn from_env() -> Self {
        let ttl = |var: &str, default: u64| {
            let secs = std::env::var(var)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default);
            (secs > 0).then(|| Duration::from_secs(secs))
        };

        Self {
            fast_ttl: ttl("CACHE_FAST_TTL_SECS", 300),
            durable_ttl: ttl("CACHE_DURABLE_TTL_SECS", 86_400),
        }
    }
}

/// Which tier answered a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Fast,
    Durable,
}

/// A cached value together with where it came from and when it was computed.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub value: T,
    pub tier: Tier,
    pub fetched_at: DateTime<Utc>,
}

/// What the tiers actually store.
#[derive(Serialize, Deserialize)]
struct Stored<T> {
    value: T,
    fetched_at: DateTime<Utc>,
}

type Flight<T, E> = (u64, broadcast::Sender<Result<T, E>>);

const GENERATION_STRIPES: usize = 64;

/// Write counters, striped by key hash so memory stays bounded.
///
/// `put` and `invalidate` bump a key's stripe before touching any tier. A
/// background promotion that sees its stripe move may be carrying a value
/// older than the latest write and must not leave it in the fast tier.
/// Keys sharing a stripe only cost a spurious fast-tier miss.
struct Generations([AtomicU64; GENERATION_STRIPES]);

impl Generations {
    fn new() -> Self {
        Self(std::array::from_fn(|_| AtomicU64::new(0)))
    }

    fn stripe(&self, key: &str) -> &AtomicU64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.0[(hasher.finish() % GENERATION_STRIPES as u64) as usize]
    }

    fn current(&self, key: &str) -> u64 {
        self.stripe(key).load(Ordering::Acquire)
    }

    fn bump(&self, key: &str) {
        self.stripe(key).fetch_add(1, Ordering::AcqRel);
    }
}

enum Role<'a, T, E> {
    Leader(FlightGuard<'a, T, E>),
    Follower(broadcast::Receiver<Result<T, E>>),
}

/// Leader's registration. Dropping it without completing unregisters the
/// flight, which wakes followers with `Closed` so they can retry.
struct FlightGuard<'a, T, E> {
    key: String,
    id: u64,
    in_flight: &'a DashMap<String, Flight<T, E>>,
    sender: broadcast::Sender<Result<T, E>>,
}

impl<T, E> FlightGuard<'_, T, E> {
    fn release(&self) {
        self.in_flight.remove_if(&self.key, |_, (id, _)| *id == self.id);
    }

    /// Unregister, then hand the result to every subscribed follower.
    fn complete(self, result: Result<T, E>) {
        self.release();
        // No receivers is fine: nobody else was waiting.
        let _ = self.sender.send(result);
    }
}

impl<T, E> Drop for FlightGuard<'_, T, E> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Fast tier -> durable tier -> compute, with single-flight on misses.
///
/// `E` is the compute error type; it is cloned to every waiter when a
/// compute fails.
pub struct TieredCache<T, E> {
    fast: Arc<dyn CacheTier>,
    durable: Arc<dyn CacheTier>,
    config: TieredCacheConfig,
    in_flight: DashMap<String, Flight<T, E>>,
    next_flight: AtomicU64,
    generations: Arc<Generations>,
    _value: PhantomData<fn() -> T>,
}

impl<T, E> TieredCache<T, E>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    E: Clone + Send + 'static,
{
    pub fn new(
        fast: Arc<dyn CacheTier>,
        durable: Arc<dyn CacheTier>,
        config: TieredCacheConfig,
    ) -> Self {
        Self {
            fast,
            durable,
            config,
            in_flight: DashMap::new(),
            next_flight: AtomicU64::new(0),
            generations: Arc::new(Generations::new()),
            _value: PhantomData,
        }
    }

    /// Return the cached value for `key`, computing it at most once across
    /// concurrent callers when neither tier has it.
    ///
    /// A successful compute is written to the durable tier, then the fast tier.
    /// A failed compute writes nothing and its error is returned to every
    /// caller that waited on it.
    pub async fn get_or_compute<F, Fut>(&self, key: &str, compute: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let guard = loop {
            if let Some(entry) = self.peek(key).await {
                return Ok(entry.value);
            }

            match self.join_flight(key) {
                Role::Leader(guard) => break guard,
                Role::Follower(mut rx) => match rx.recv().await {
                    Ok(result) => return result,
                    // Leader went away without an answer; start over.
                    Err(_) => continue,
                },
            }
        };

        // A previous leader may have populated the tiers between our miss and
        // our registration.
        if let Some(entry) = self.peek(key).await {
            guard.complete(Ok(entry.value.clone()));
            return Ok(entry.value);
        }

        tracing::debug!(key = %key, "Cache miss, computing");
        let result = compute().await;

        match &result {
            Ok(value) => {
                if let Err(e) = self.put(key, value).await {
                    tracing::warn!(key = %key, error = %e, "Failed to populate cache tiers");
                }
            }
            Err(_) => tracing::debug!(key = %key, "Compute failed, nothing cached"),
        }

        guard.complete(result.clone());
        result
    }

    /// Recompute `key` unconditionally, then replace both tiers with the result.
    ///
    /// The key's flight is held for the whole recompute, so callers of
    /// [`get_or_compute`](Self::get_or_compute) that miss in the meantime
    /// receive this result instead of starting their own compute. A flight
    /// already running for the key is waited out first. On failure nothing
    /// is invalidated or written.
    pub async fn refresh<F, Fut>(&self, key: &str, compute: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let guard = loop {
            match self.join_flight(key) {
                Role::Leader(guard) => break guard,
                Role::Follower(mut rx) => {
                    let _ = rx.recv().await;
                }
            }
        };

        tracing::debug!(key = %key, "Refreshing cache entry");
        let result = compute().await;

        if let Ok(value) = &result {
            if let Err(e) = self.invalidate(key).await {
                tracing::warn!(key = %key, error = %e, "Failed to invalidate cache entry");
            }
            if let Err(e) = self.put(key, value).await {
                tracing::warn!(key = %key, error = %e, "Failed to populate cache tiers");
            }
        }

        guard.complete(result.clone());
        result
    }

    /// Look the key up in the fast tier, then the durable tier.
    ///
    /// A durable hit is copied into the fast tier in the background; the
    /// caller does not wait for that write. The copy is dropped if a `put` or
    /// `invalidate` for the key lands while it is in progress. Tier errors
    /// count as misses.
    pub async fn peek(&self, key: &str) -> Option<CacheEntry<T>> {
        if let Some((stored, _)) = self.read_tier(&self.fast, key).await {
            tracing::debug!(key = %key, tier = self.fast.name(), "Fast tier hit");
            return Some(CacheEntry {
                value: stored.value,
                tier: Tier::Fast,
                fetched_at: stored.fetched_at,
            });
        }

        let generation = self.generations.current(key);
        let (stored, raw) = self.read_tier(&self.durable, key).await?;
        tracing::debug!(key = %key, tier = self.durable.name(), "Durable tier hit, promoting");

        let fast = Arc::clone(&self.fast);
        let generations = Arc::clone(&self.generations);
        let ttl = self.config.fast_ttl;
        let owned_key = key.to_string();
        tokio::spawn(async move {
            if generations.current(&owned_key) != generation {
                tracing::debug!(key = %owned_key, "Promotion superseded before write");
                return;
            }
            if let Err(e) = fast.set(&owned_key, &raw, ttl).await {
                tracing::warn!(key = %owned_key, error = %e, "Fast tier promotion failed");
                return;
            }
            // A write raced ours and may now sit underneath it.
            if generations.current(&owned_key) != generation {
                tracing::debug!(key = %owned_key, "Promotion superseded, dropping fast copy");
                if let Err(e) = fast.delete(&owned_key).await {
                    tracing::warn!(key = %owned_key, error = %e, "Failed to drop superseded promotion");
                }
            }
        });

        Some(CacheEntry {
            value: stored.value,
            tier: Tier::Durable,
            fetched_at: stored.fetched_at,
        })
    }

    /// Write a freshly computed value to both tiers, durable first.
    ///
    /// Both writes are attempted; the first error is returned.
    pub async fn put(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let stored = Stored {
            value: value.clone(),
            fetched_at: Utc::now(),
        };
        let raw =
            serde_json::to_string(&stored).map_err(|e| CacheError::Serialization(e.to_string()))?;

        self.generations.bump(key);
        let durable = self.durable.set(key, &raw, self.config.durable_ttl).await;
        let fast = self.fast.set(key, &raw, self.config.fast_ttl).await;
        durable.and(fast)
    }

    /// Remove the key from both tiers, fast first.
    pub async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.generations.bump(key);
        let fast = self.fast.delete(key).await;
        let durable = self.durable.delete(key).await;
        tracing::debug!(key = %key, "Cache entry invalidated");
        fast.and(durable)
    }

    /// Number of keys with a compute currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn join_flight(&self, key: &str) -> Role<'_, T, E> {
        match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(flight) => Role::Follower(flight.get().1.subscribe()),
            Entry::Vacant(slot) => {
                let (sender, _) = broadcast::channel(1);
                let id = self.next_flight.fetch_add(1, Ordering::Relaxed);
                slot.insert((id, sender.clone()));
                Role::Leader(FlightGuard {
                    key: key.to_string(),
                    id,
                    in_flight: &self.in_flight,
                    sender,
                })
            }
        }
    }

    async fn read_tier(
        &self,
        tier: &Arc<dyn CacheTier>,
        key: &str,
    ) -> Option<(Stored<T>, String)> {
        let raw = match tier.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key = %key, tier = tier.name(), error = %e, "Cache tier read failed");
                return None;
            }
        };

        match serde_json::from_str::<Stored<T>>(&raw) {
            Ok(stored) => Some((stored, raw)),
            Err(e) => {
                tracing::warn!(key = %key, tier = tier.name(), error = %e, "Undecodable cache entry");
                None
            }
        }
    }
}
