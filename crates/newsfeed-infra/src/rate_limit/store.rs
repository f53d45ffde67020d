//! Expiring per-client counters backing the fixed-window rate limiter.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use governor::clock::{Clock, DefaultClock, Reference};
use governor::nanos::Nanos;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// One client's window: requests seen so far and when the window ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterEntry<I> {
    pub count: u32,
    pub reset_at: I,
}

impl<I: Reference> CounterEntry<I> {
    fn is_expired(&self, now: I) -> bool {
        now >= self.reset_at
    }
}

/// Outcome of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    /// Requests in the current window, this one included.
    pub count: u32,
    /// Time left until the window resets.
    pub resets_in: Duration,
}

/// Map from client key to its current window.
///
/// Each key's read-modify-write happens under that key's shard lock, and the
/// sweep takes the same locks, so a sweep can never drop an entry out from
/// under a check that is updating it.
///
/// Time comes from an injected [`Clock`]; tests use
/// `governor::clock::FakeRelativeClock` to move it by hand.
pub struct ExpiringCounterStore<C: Clock = DefaultClock> {
    entries: DashMap<String, CounterEntry<C::Instant>>,
    clock: C,
}

impl ExpiringCounterStore<DefaultClock> {
    pub fn new() -> Self {
        Self::with_clock(DefaultClock::default())
    }
}

impl Default for ExpiringCounterStore<DefaultClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> ExpiringCounterStore<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Count a request for `key`.
    ///
    /// Starts a fresh window of length `window` when the key is new or its
    /// previous window has ended; otherwise increments the existing count.
    pub fn hit(&self, key: &str, window: Duration) -> Hit {
        let now = self.clock.now();
        let mut entry = self.entries.entry(key.to_string()).or_insert(CounterEntry {
            count: 0,
            reset_at: now,
        });

        if entry.is_expired(now) {
            entry.count = 1;
            entry.reset_at = now + Nanos::from(window);
        } else {
            entry.count = entry.count.saturating_add(1);
        }

        Hit {
            count: entry.count,
            resets_in: entry.reset_at.duration_since(now).into(),
        }
    }

    /// Current entry for `key`, if any (expired entries included until swept).
    pub fn get(&self, key: &str) -> Option<CounterEntry<C::Instant>> {
        self.entries.get(key).map(|e| *e)
    }

    /// Remove every entry whose window has ended. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

impl<C> ExpiringCounterStore<C>
where
    C: Clock + Send + Sync + 'static,
{
    /// Start the background sweep, ticking every `interval`.
    ///
    /// Must be called from within a Tokio runtime. The sweep stops when the
    /// returned handle is shut down or dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let store = Arc::clone(self);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick fires immediately; the first sweep should wait a full period.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = store.sweep();
                        if removed > 0 {
                            tracing::debug!(removed, remaining = store.len(), "Swept expired rate limit counters");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::debug!("Rate limit sweeper stopped");
        });

        SweeperHandle {
            shutdown_tx,
            task: Some(task),
        }
    }
}

/// Owner of a running sweep task.
pub struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Signal the sweep to stop and wait for it to exit.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}
