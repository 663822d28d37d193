//! Repeatable jobs: a persisted cron schedule per named trigger.
//!
//! The loop owns fire-time bookkeeping; `queue_schedulers.next_run_at`
//! survives restarts, so a missed window fires once on resume
//! (at-least-once, like everything else in the substrate).

use chrono::{DateTime, Utc};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info};

use crate::error::Result;

use super::store::QueueStore;
use super::types::EnqueueOpts;

const TICK_INTERVAL: Duration = Duration::from_secs(30);

/// Next fire time of a cron pattern strictly after `after`.
pub fn next_fire(pattern: &str, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let schedule = cron::Schedule::from_str(pattern).ok()?;
    schedule.after(&after).next()
}

/// Drives all persisted schedulers and requeues stale active jobs.
pub struct SchedulerLoop {
    store: QueueStore,
}

impl SchedulerLoop {
    pub fn new(store: QueueStore) -> Self {
        Self { store }
    }

    /// Fire every due scheduler once. Returns the number of jobs enqueued.
    pub fn tick(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut fired = 0;
        for (name, queue, pattern, payload, next_run_at) in self.store.schedulers()? {
            match next_run_at {
                None => {
                    // Newly registered: arm without firing immediately.
                    if let Some(next) = next_fire(&pattern, now) {
                        self.store.set_scheduler_next_run(&name, next)?;
                    }
                }
                Some(due) if due <= now => {
                    self.store.enqueue(&queue, payload, EnqueueOpts::default())?;
                    info!(scheduler = %name, queue = %queue, "scheduled job fired");
                    fired += 1;
                    if let Some(next) = next_fire(&pattern, now) {
                        self.store.set_scheduler_next_run(&name, next)?;
                    }
                }
                Some(_) => {}
            }
        }

        let requeued = self.store.requeue_stale()?;
        if requeued > 0 {
            info!(requeued, "requeued stale active jobs");
        }
        Ok(fired)
    }

    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                if *shutdown.borrow() {
                    break;
                }
                if let Err(e) = self.tick(Utc::now()) {
                    error!(error = %e, "scheduler tick failed");
                }
                tokio::select! {
                    _ = sleep(TICK_INTERVAL) => {}
                    _ = shutdown.changed() => {}
                }
            }
        })
    }
}
