//! Worker pool: claims jobs from a named queue with bounded concurrency,
//! reports outcomes, and fires completion hooks for cross-queue chaining.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::sleep;
use tracing::{debug, error, warn};

use super::store::QueueStore;
use super::types::{Job, JobOutcome};

/// Default worker pool concurrency.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// How long a draining pool waits for in-flight handlers before aborting.
const DRAIN_DEADLINE: Duration = Duration::from_secs(30);

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A queue job handler. Implementations must never panic across this
/// boundary; failures are returned as [`JobOutcome::Failed`].
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> JobOutcome;
}

/// Completion hook: given the job and its result, name the next-step jobs.
/// The substrate commits job completion and the returned enqueues in one
/// transaction, so a crash can never drop a chain link.
pub type CompletionHook =
    Arc<dyn Fn(&Job, &serde_json::Value) -> Vec<(String, serde_json::Value)> + Send + Sync>;

/// A named-queue worker pool.
pub struct Worker {
    store: QueueStore,
    queue: String,
    handler: Arc<dyn JobHandler>,
    concurrency: usize,
    on_completed: Option<CompletionHook>,
}

impl Worker {
    pub fn new(store: QueueStore, queue: impl Into<String>, handler: Arc<dyn JobHandler>) -> Self {
        Self {
            store,
            queue: queue.into(),
            handler,
            concurrency: DEFAULT_CONCURRENCY,
            on_completed: None,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn on_completed(
        mut self,
        hook: impl Fn(&Job, &serde_json::Value) -> Vec<(String, serde_json::Value)>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.on_completed = Some(Arc::new(hook));
        self
    }

    /// Run the claim loop until shutdown, then drain in-flight handlers.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let semaphore = Arc::new(Semaphore::new(self.concurrency));
            let mut tasks: JoinSet<()> = JoinSet::new();

            loop {
                if *shutdown.borrow() {
                    break;
                }
                while tasks.try_join_next().is_some() {}

                let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                    tokio::select! {
                        _ = sleep(POLL_INTERVAL) => {}
                        _ = shutdown.changed() => {}
                    }
                    continue;
                };

                match self.store.claim(&self.queue) {
                    Ok(Some(job)) => {
                        let handler = self.handler.clone();
                        let store = self.store.clone();
                        let hook = self.on_completed.clone();
                        tasks.spawn(async move {
                            let _permit = permit;
                            run_job(&store, handler.as_ref(), hook, job).await;
                        });
                    }
                    Ok(None) => {
                        drop(permit);
                        tokio::select! {
                            _ = sleep(POLL_INTERVAL) => {}
                            _ = shutdown.changed() => {}
                        }
                    }
                    Err(e) => {
                        drop(permit);
                        error!(queue = %self.queue, error = %e, "job claim failed");
                        sleep(POLL_INTERVAL * 4).await;
                    }
                }
            }

            // Graceful drain: await in-flight handlers up to a hard deadline.
            let drain = async {
                while tasks.join_next().await.is_some() {}
            };
            if tokio::time::timeout(DRAIN_DEADLINE, drain).await.is_err() {
                warn!(queue = %self.queue, "drain deadline hit, aborting in-flight jobs");
            }
        })
    }
}

async fn run_job(
    store: &QueueStore,
    handler: &dyn JobHandler,
    hook: Option<CompletionHook>,
    job: Job,
) {
    let outcome = handler.handle(&job).await;
    match outcome {
        JobOutcome::Completed(result) => {
            let next = hook
                .map(|hook| hook(&job, &result))
                .unwrap_or_default();
            if let Err(e) = store.complete_with_next(&job.id, &next) {
                error!(job = %job.id, error = %e, "failed to commit job completion");
            }
        }
        JobOutcome::Skipped(reason) => {
            debug!(job = %job.id, queue = %job.queue, %reason, "job skipped");
            if let Err(e) = store.complete(&job.id) {
                error!(job = %job.id, error = %e, "failed to mark skipped job completed");
            }
        }
        JobOutcome::Failed(err) => {
            warn!(job = %job.id, queue = %job.queue, attempt = job.attempt, error = %err, "job failed");
            if let Err(e) = store.fail(&job, &err) {
                error!(job = %job.id, error = %e, "failed to record job failure");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::types::EnqueueOpts;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        calls: Arc<AtomicUsize>,
        outcome: fn(&Job) -> JobOutcome,
    }

    #[async_trait]
    impl JobHandler for CountingHandler {
        async fn handle(&self, job: &Job) -> JobOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.outcome)(job)
        }
    }

    async fn wait_until(mut predicate: impl FnMut() -> bool) {
        for _ in 0..200 {
            if predicate() {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_worker_processes_jobs_and_fires_hook() {
        let store = QueueStore::in_memory().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let hooked = Arc::new(AtomicUsize::new(0));

        store.enqueue("q", json!({"n": 1}), EnqueueOpts::default()).unwrap();
        store.enqueue("q", json!({"n": 2}), EnqueueOpts::default()).unwrap();

        let handler = Arc::new(CountingHandler {
            calls: calls.clone(),
            outcome: |job| JobOutcome::Completed(json!({"echo": job.payload["n"]})),
        });
        let hooked_in = hooked.clone();
        let (tx, rx) = watch::channel(false);
        let handle = Worker::new(store.clone(), "q", handler)
            .with_concurrency(2)
            .on_completed(move |_job, result| {
                assert!(result["echo"].is_number());
                hooked_in.fetch_add(1, Ordering::SeqCst);
                vec![("downstream".to_string(), result.clone())]
            })
            .spawn(rx);

        wait_until(|| hooked.load(Ordering::SeqCst) == 2).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.queued_count("q").unwrap(), 0);
        // Next-step jobs were committed with the completions
        wait_until(|| store.queued_count("downstream").unwrap() == 2).await;

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_job_is_rescheduled_not_hooked() {
        let store = QueueStore::in_memory().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let hooked = Arc::new(AtomicUsize::new(0));

        store.enqueue("q", json!({}), EnqueueOpts::default()).unwrap();

        let handler = Arc::new(CountingHandler {
            calls: calls.clone(),
            outcome: |_| JobOutcome::Failed("boom".into()),
        });
        let hooked_in = hooked.clone();
        let (tx, rx) = watch::channel(false);
        let handle = Worker::new(store.clone(), "q", handler)
            .on_completed(move |_, _| {
                hooked_in.fetch_add(1, Ordering::SeqCst);
                Vec::new()
            })
            .spawn(rx);

        wait_until(|| calls.load(Ordering::SeqCst) >= 1).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(hooked.load(Ordering::SeqCst), 0);
        // Still owned by the queue (retrying), not dead yet
        assert_eq!(store.queued_count("q").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_skipped_job_completes_without_hook() {
        let store = QueueStore::in_memory().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let hooked = Arc::new(AtomicUsize::new(0));

        let job = store.enqueue("q", json!({}), EnqueueOpts::default()).unwrap();

        let handler = Arc::new(CountingHandler {
            calls: calls.clone(),
            outcome: |_| JobOutcome::Skipped("already linked".into()),
        });
        let hooked_in = hooked.clone();
        let (tx, rx) = watch::channel(false);
        let handle = Worker::new(store.clone(), "q", handler)
            .on_completed(move |_, _| {
                hooked_in.fetch_add(1, Ordering::SeqCst);
                Vec::new()
            })
            .spawn(rx);

        wait_until(|| calls.load(Ordering::SeqCst) >= 1).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(hooked.load(Ordering::SeqCst), 0);
        use crate::queue::types::JobState;
        wait_until(|| store.job_state(&job.id).unwrap() == Some(JobState::Completed)).await;
    }
}
