//! Durable queue substrate: named queues with at-least-once delivery,
//! exponential-backoff retries, dead-lettering, completion-hook chaining,
//! and cron-driven repeatable jobs.

pub mod scheduler;
pub mod store;
pub mod types;
pub mod worker;

pub use scheduler::{next_fire, SchedulerLoop};
pub use store::QueueStore;
pub use types::{queues, EnqueueOpts, Job, JobOutcome, JobState};
pub use worker::{JobHandler, Worker, DEFAULT_CONCURRENCY};
