//! Fan-in coordination for the enrichment fork.
//!
//! Entity-extract and topic-assign run in parallel; relationship-extract
//! starts only after both complete. The coordinator is process-local and
//! intentionally non-durable; the sweeper re-enqueues relationship-extract
//! for events whose parent artifacts exist but whose child never ran.

use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info};

use crate::error::{Error, Result};
use crate::queue::{queues, EnqueueOpts, QueueStore};
use crate::store::SqliteStore;

#[derive(Debug, Default, Clone, Copy)]
struct FanInState {
    entity_done: bool,
    topic_done: bool,
}

/// Tracks `(event → {entity_done, topic_done})` and enqueues
/// relationship-extract exactly once per completed pair.
pub struct FanInCoordinator {
    state: Mutex<HashMap<i64, FanInState>>,
    queue: QueueStore,
}

impl FanInCoordinator {
    pub fn new(queue: QueueStore) -> Self {
        Self {
            state: Mutex::new(HashMap::new()),
            queue,
        }
    }

    pub fn mark_entity_done(&self, event_id: i64) -> Result<bool> {
        self.mark(event_id, |state| state.entity_done = true)
    }

    pub fn mark_topic_done(&self, event_id: i64) -> Result<bool> {
        self.mark(event_id, |state| state.topic_done = true)
    }

    /// Flip one flag; when both are set the entry is removed and the child
    /// job enqueued, all under the lock, so concurrent completions for the
    /// same event fire at most once.
    fn mark(&self, event_id: i64, update: impl FnOnce(&mut FanInState)) -> Result<bool> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| Error::Internal(format!("fan-in lock poisoned: {e}")))?;
        let entry = state.entry(event_id).or_default();
        update(entry);

        if entry.entity_done && entry.topic_done {
            state.remove(&event_id);
            self.queue.enqueue(
                queues::RELATIONSHIP_EXTRACT,
                json!({ "event_id": event_id }),
                EnqueueOpts::default(),
            )?;
            info!(event_id, "fan-in complete, relationship-extract enqueued");
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Entries currently waiting (observability).
    pub fn pending(&self) -> usize {
        self.state.lock().map(|s| s.len()).unwrap_or(0)
    }
}

/// Periodic crash-recovery sweep: events holding both parent artifacts but
/// no relationship artifact get relationship-extract re-enqueued.
pub struct SweeperLoop {
    store: SqliteStore,
    queue: QueueStore,
    interval: Duration,
}

impl SweeperLoop {
    pub fn new(store: SqliteStore, queue: QueueStore) -> Self {
        Self {
            store,
            queue,
            interval: Duration::from_secs(600),
        }
    }

    #[cfg(test)]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// One sweep pass; returns the number of events re-enqueued.
    pub fn sweep(&self) -> Result<usize> {
        let event_ids = self.store.events_missing_relationship_sweep()?;
        let mut enqueued = 0;
        for event_id in event_ids {
            self.queue.enqueue(
                queues::RELATIONSHIP_EXTRACT,
                json!({ "event_id": event_id }),
                EnqueueOpts::default(),
            )?;
            enqueued += 1;
        }
        if enqueued > 0 {
            info!(enqueued, "sweeper re-enqueued relationship-extract");
        }
        Ok(enqueued)
    }

    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                if *shutdown.borrow() {
                    break;
                }
                if let Err(e) = self.sweep() {
                    error!(error = %e, "sweep failed");
                }
                tokio::select! {
                    _ = sleep(self.interval) => {}
                    _ = shutdown.changed() => {}
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_fan_in_fires_once_in_either_order() {
        let queue = QueueStore::in_memory().unwrap();
        let coordinator = FanInCoordinator::new(queue.clone());

        assert!(!coordinator.mark_entity_done(1).unwrap());
        assert!(coordinator.mark_topic_done(1).unwrap());
        assert_eq!(queue.queued_count(queues::RELATIONSHIP_EXTRACT).unwrap(), 1);
        assert_eq!(coordinator.pending(), 0);

        // Reverse order for a second event
        assert!(!coordinator.mark_topic_done(2).unwrap());
        assert!(coordinator.mark_entity_done(2).unwrap());
        assert_eq!(queue.queued_count(queues::RELATIONSHIP_EXTRACT).unwrap(), 2);
    }

    #[test]
    fn test_repeated_completions_do_not_double_fire() {
        let queue = QueueStore::in_memory().unwrap();
        let coordinator = FanInCoordinator::new(queue.clone());

        coordinator.mark_entity_done(1).unwrap();
        coordinator.mark_entity_done(1).unwrap();
        coordinator.mark_topic_done(1).unwrap();
        assert_eq!(queue.queued_count(queues::RELATIONSHIP_EXTRACT).unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_completions_fire_exactly_once() {
        let queue = QueueStore::in_memory().unwrap();
        let coordinator = Arc::new(FanInCoordinator::new(queue.clone()));

        for event_id in 0..50i64 {
            let a = coordinator.clone();
            let b = coordinator.clone();
            let entity = tokio::spawn(async move { a.mark_entity_done(event_id).unwrap() });
            let topic = tokio::spawn(async move { b.mark_topic_done(event_id).unwrap() });
            let (entity_fired, topic_fired) = (entity.await.unwrap(), topic.await.unwrap());
            // Exactly one of the two completions fires the child
            assert!(entity_fired ^ topic_fired);
        }
        assert_eq!(queue.queued_count(queues::RELATIONSHIP_EXTRACT).unwrap(), 50);
    }

    #[test]
    fn test_sweeper_reenqueues_orphaned_events() {
        use crate::store::ArtifactKind;
        use chrono::Utc;

        let store = SqliteStore::in_memory().unwrap();
        let queue = QueueStore::in_memory().unwrap();

        let source = store
            .upsert_source("https://a.com/1", "https://a.com/1", "a.com", crate::store::TrustTier::Low)
            .unwrap();
        let snapshot = store
            .insert_snapshot(source.id, "t", None, Some(Utc::now()), "h", None, 200)
            .unwrap();
        let (event, _) = store
            .create_event_with_primary("fp", "t", Utc::now(), snapshot.id)
            .unwrap();
        store
            .insert_artifact(event.id, ArtifactKind::EntityExtract, &serde_json::json!({}), "m")
            .unwrap();
        store
            .insert_artifact(event.id, ArtifactKind::TopicAssign, &serde_json::json!({}), "m")
            .unwrap();

        let sweeper = SweeperLoop::new(store.clone(), queue.clone());
        assert_eq!(sweeper.sweep().unwrap(), 1);
        assert_eq!(queue.queued_count(queues::RELATIONSHIP_EXTRACT).unwrap(), 1);

        store
            .insert_artifact(event.id, ArtifactKind::RelationshipExtract, &serde_json::json!({}), "m")
            .unwrap();
        assert_eq!(sweeper.sweep().unwrap(), 0);
    }
}
