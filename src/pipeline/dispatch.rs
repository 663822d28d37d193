//! Ingest dispatcher: runs every adapter sequentially (respecting the global
//! rate budget) and enqueues one snapshot job per collected item.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::feeds::FeedAdapter;
use crate::queue::{queues, EnqueueOpts, Job, JobHandler, JobOutcome, QueueStore};

pub struct IngestHandler {
    adapters: Vec<Arc<dyn FeedAdapter>>,
    queue: QueueStore,
}

impl IngestHandler {
    pub fn new(adapters: Vec<Arc<dyn FeedAdapter>>, queue: QueueStore) -> Self {
        Self { adapters, queue }
    }

    /// One full dispatcher pass. Also callable outside the queue (CLI).
    pub async fn run_once(&self) -> serde_json::Value {
        let mut enqueued = 0usize;
        let mut warnings = 0usize;

        for adapter in &self.adapters {
            let source = adapter.source_type();
            let outcome = adapter.fetch().await;
            for warning in &outcome.warnings {
                warn!(%source, %warning, "adapter degraded");
                warnings += 1;
            }

            let count = outcome.items.len();
            for item in outcome.items {
                match serde_json::to_value(&item) {
                    Ok(payload) => {
                        if let Err(e) =
                            self.queue
                                .enqueue(queues::SNAPSHOT, payload, EnqueueOpts::default())
                        {
                            warn!(%source, error = %e, "failed to enqueue snapshot job");
                            warnings += 1;
                            continue;
                        }
                        enqueued += 1;
                    }
                    Err(e) => {
                        warn!(%source, error = %e, "item serialization failed");
                        warnings += 1;
                    }
                }
            }
            info!(%source, items = count, "adapter fetch complete");
        }

        json!({ "enqueued": enqueued, "warnings": warnings })
    }
}

#[async_trait]
impl JobHandler for IngestHandler {
    async fn handle(&self, _job: &Job) -> JobOutcome {
        JobOutcome::Completed(self.run_once().await)
    }
}
