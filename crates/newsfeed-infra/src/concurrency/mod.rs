//! Bounded fan-out for fetch tasks.

mod limiter;

pub use limiter::{
    ConcurrencyLimiter, DEFAULT_MAX_CONCURRENT, FetchTask, LimiterSnapshot, RunOptions, TaskError,
    TaskStatus,
};
