//! Fixed-size worker pool over a queue of one-shot tasks.
//!
//! Results come back in the order the tasks were given, whatever order they
//! finished in. A failing, panicking or timed-out task only affects its own
//! slot.

use std::collections::VecDeque;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;

pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// A unit of work with an id used in logs.
pub struct FetchTask<F> {
    pub id: String,
    job: F,
}

impl<F> FetchTask<F> {
    pub fn new(id: impl Into<String>, job: F) -> Self {
        Self { id: id.into(), job }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Done,
    Failed,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("Task failed: {0}")]
    Failed(String),

    #[error("Task timed out")]
    TimedOut,

    #[error("Task panicked: {0}")]
    Panicked(String),

    #[error("Task aborted before it started")]
    Aborted,
}

/// Options for a single [`ConcurrencyLimiter::run_with`] call.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub max_concurrent: usize,
    /// Per-task deadline. `None` lets tasks run as long as they need.
    pub task_timeout: Option<Duration>,
    /// Stop starting new tasks after the first failure.
    pub abort_on_failure: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            task_timeout: None,
            abort_on_failure: false,
        }
    }
}

#[derive(Default)]
struct LimiterStats {
    pending: AtomicUsize,
    running: AtomicUsize,
    done: AtomicUsize,
    failed: AtomicUsize,
    peak_running: AtomicUsize,
}

/// Point-in-time view of a limiter's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LimiterSnapshot {
    pub pending: usize,
    pub running: usize,
    pub done: usize,
    pub failed: usize,
    pub peak_running: usize,
}

/// Runs batches of tasks with at most `max_concurrent` in flight.
///
/// Counters accumulate across runs; clone the limiter to share them.
#[derive(Clone, Default)]
pub struct ConcurrencyLimiter {
    stats: Arc<LimiterStats>,
}

type Queue<F> = Mutex<VecDeque<(usize, FetchTask<F>)>>;

impl ConcurrencyLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> LimiterSnapshot {
        LimiterSnapshot {
            pending: self.stats.pending.load(Ordering::Relaxed),
            running: self.stats.running.load(Ordering::Relaxed),
            done: self.stats.done.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            peak_running: self.stats.peak_running.load(Ordering::Relaxed),
        }
    }

    pub async fn run<F, Fut, T, E>(
        &self,
        tasks: Vec<FetchTask<F>>,
        max_concurrent: usize,
    ) -> Vec<Result<T, TaskError>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        let options = RunOptions {
            max_concurrent,
            ..RunOptions::default()
        };
        self.run_with(tasks, options).await
    }

    pub async fn run_with<F, Fut, T, E>(
        &self,
        tasks: Vec<FetchTask<F>>,
        options: RunOptions,
    ) -> Vec<Result<T, TaskError>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        let total = tasks.len();
        if total == 0 {
            return Vec::new();
        }

        let workers = options.max_concurrent.max(1).min(total);
        self.stats.pending.fetch_add(total, Ordering::Relaxed);
        tracing::debug!(tasks = total, workers, "Starting task batch");

        let queue: Queue<F> = Mutex::new(tasks.into_iter().enumerate().collect());
        let abort = AtomicBool::new(false);

        let finished = join_all(
            (0..workers).map(|worker| self.worker(worker, &queue, &abort, &options)),
        )
        .await;

        let mut slots: Vec<Option<Result<T, TaskError>>> = (0..total).map(|_| None).collect();
        for (index, result) in finished.into_iter().flatten() {
            slots[index] = Some(result);
        }

        // Tasks still queued when an abort was raised never started.
        let skipped = queue
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        if skipped > 0 {
            self.stats.pending.fetch_sub(skipped, Ordering::Relaxed);
            tracing::warn!(skipped, "Task batch aborted after a failure");
        }

        slots
            .into_iter()
            .map(|slot| slot.unwrap_or(Err(TaskError::Aborted)))
            .collect()
    }

    async fn worker<F, Fut, T, E>(
        &self,
        worker: usize,
        queue: &Queue<F>,
        abort: &AtomicBool,
        options: &RunOptions,
    ) -> Vec<(usize, Result<T, TaskError>)>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        let mut results = Vec::new();

        loop {
            if abort.load(Ordering::Acquire) {
                break;
            }
            let next = {
                let mut queue = queue.lock().unwrap_or_else(PoisonError::into_inner);
                queue.pop_front()
            };
            let Some((index, task)) = next else {
                break;
            };

            self.stats.pending.fetch_sub(1, Ordering::Relaxed);
            let running = self.stats.running.fetch_add(1, Ordering::Relaxed) + 1;
            self.stats.peak_running.fetch_max(running, Ordering::Relaxed);
            tracing::trace!(worker, task_id = %task.id, status = ?TaskStatus::Running, "Task started");

            let result = execute(task.job, options.task_timeout).await;

            self.stats.running.fetch_sub(1, Ordering::Relaxed);
            match &result {
                Ok(_) => {
                    self.stats.done.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(worker, task_id = %task.id, status = ?TaskStatus::Done, "Task finished");
                }
                Err(e) => {
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(worker, task_id = %task.id, status = ?TaskStatus::Failed, error = %e, "Task failed");
                    if options.abort_on_failure {
                        abort.store(true, Ordering::Release);
                    }
                }
            }

            results.push((index, result));
        }

        results
    }
}

/// Run one job on its own Tokio task so a panic stays contained.
async fn execute<F, Fut, T, E>(job: F, deadline: Option<Duration>) -> Result<T, TaskError>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Display + Send + 'static,
{
    let mut handle = tokio::spawn(async move { job().await.map_err(|e| e.to_string()) });

    let joined = match deadline {
        Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                handle.abort();
                return Err(TaskError::TimedOut);
            }
        },
        None => handle.await,
    };

    match joined {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(message)) => Err(TaskError::Failed(message)),
        Err(e) if e.is_panic() => {
            let payload = e.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(TaskError::Panicked(message))
        }
        Err(_) => Err(TaskError::Aborted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;

    type BoxJob = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = Result<usize, String>> + Send>> + Send>;

    fn sleepy(value: usize, ms: u64, live: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) -> FetchTask<BoxJob> {
        FetchTask::new(
            format!("task-{value}"),
            Box::new(move || {
                Box::pin(async move {
                    let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    live.fetch_sub(1, Ordering::SeqCst);
                    Ok(value)
                }) as Pin<Box<dyn Future<Output = Result<usize, String>> + Send>>
            }) as BoxJob,
        )
    }

    fn job(f: impl Future<Output = Result<usize, String>> + Send + 'static) -> BoxJob {
        let fut: Pin<Box<dyn Future<Output = Result<usize, String>> + Send>> = Box::pin(f);
        Box::new(move || fut)
    }

    #[tokio::test]
    async fn test_output_in_input_order_with_bounded_concurrency() {
        let limiter = ConcurrencyLimiter::new();
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        // Later tasks finish first.
        let tasks: Vec<_> = (0..12)
            .map(|i| sleepy(i, 10 + (12 - i as u64) * 5, live.clone(), peak.clone()))
            .collect();

        let results = limiter.run(tasks, 5).await;

        let values: Vec<usize> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, (0..12).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= 5);

        let stats = limiter.snapshot();
        assert_eq!(stats.peak_running, 5);
        assert_eq!(stats.done, 12);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.running, 0);
    }

    #[tokio::test]
    async fn test_limit_of_one_runs_serially() {
        let limiter = ConcurrencyLimiter::new();
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..4)
            .map(|i| sleepy(i, 5, live.clone(), peak.clone()))
            .collect();
        let results = limiter.run(tasks, 1).await;

        assert_eq!(results.len(), 4);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let limiter = ConcurrencyLimiter::new();
        let tasks = vec![
            FetchTask::new("ok-0", job(async { Ok(0) })),
            FetchTask::new("bad", job(async { Err("image host returned 404".to_string()) })),
            FetchTask::new("ok-2", job(async { Ok(2) })),
        ];

        let results = limiter.run(tasks, 2).await;

        assert_eq!(results[0], Ok(0));
        assert_eq!(
            results[1],
            Err(TaskError::Failed("image host returned 404".to_string()))
        );
        assert_eq!(results[2], Ok(2));
        assert_eq!(limiter.snapshot().failed, 1);
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let limiter = ConcurrencyLimiter::new();
        let tasks = vec![
            FetchTask::new(
                "boom",
                job(async {
                    let broken = true;
                    if broken {
                        panic!("decoder exploded");
                    }
                    Ok(0)
                }),
            ),
            FetchTask::new("ok", job(async { Ok(7) })),
        ];

        let results = limiter.run(tasks, 2).await;

        assert_eq!(
            results[0],
            Err(TaskError::Panicked("decoder exploded".to_string()))
        );
        assert_eq!(results[1], Ok(7));
    }

    #[tokio::test]
    async fn test_task_timeout() {
        let limiter = ConcurrencyLimiter::new();
        let tasks = vec![
            FetchTask::new(
                "slow",
                job(async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(1)
                }),
            ),
            FetchTask::new("fast", job(async { Ok(2) })),
        ];

        let options = RunOptions {
            max_concurrent: 2,
            task_timeout: Some(Duration::from_millis(20)),
            abort_on_failure: false,
        };
        let results = limiter.run_with(tasks, options).await;

        assert_eq!(results[0], Err(TaskError::TimedOut));
        assert_eq!(results[1], Ok(2));
    }

    #[tokio::test]
    async fn test_abort_on_failure_skips_unstarted_tasks() {
        let limiter = ConcurrencyLimiter::new();
        let tasks = vec![
            FetchTask::new("ok", job(async { Ok(0) })),
            FetchTask::new("bad", job(async { Err("nope".to_string()) })),
            FetchTask::new("never-0", job(async { Ok(2) })),
            FetchTask::new("never-1", job(async { Ok(3) })),
        ];

        let options = RunOptions {
            max_concurrent: 1,
            abort_on_failure: true,
            ..RunOptions::default()
        };
        let results = limiter.run_with(tasks, options).await;

        assert_eq!(results[0], Ok(0));
        assert!(matches!(results[1], Err(TaskError::Failed(_))));
        assert_eq!(results[2], Err(TaskError::Aborted));
        assert_eq!(results[3], Err(TaskError::Aborted));
        assert_eq!(limiter.snapshot().pending, 0);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let limiter = ConcurrencyLimiter::new();
        let results = limiter.run(Vec::<FetchTask<BoxJob>>::new(), 5).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_zero_limit_still_makes_progress() {
        let limiter = ConcurrencyLimiter::new();
        let tasks = vec![FetchTask::new("only", job(async { Ok(9) }))];
        assert_eq!(limiter.run(tasks, 0).await, vec![Ok(9)]);
    }
}
