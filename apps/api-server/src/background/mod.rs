//! Background jobs.

mod scheduler;

pub use scheduler::{RefreshScheduler, SchedulerConfig};
