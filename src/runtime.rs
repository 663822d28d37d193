//! Runtime wiring: owns the store, queue substrate, LLM router, adapter
//! registry, and fan-in coordinator; registers workers and schedulers; and
//! handles graceful shutdown.

use chrono::NaiveDate;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::feeds;
use crate::llm::{LlmClient, LlmRouter, LoggedLlm};
use crate::pipeline::{
    BriefingHandler, BroadcastClient, ClusterHandler, EnrichHandler, EntityExtractHandler,
    FanInCoordinator, IngestHandler, MaterializeHandler, RelationshipExtractHandler, ScoreHandler,
    SnapshotHandler, SweeperLoop, TopicAssignHandler, WatchlistMatchHandler,
};
use crate::queue::{queues, EnqueueOpts, QueueStore, SchedulerLoop, Worker};
use crate::store::SqliteStore;

/// The long-lived application object. Everything that used to be module
/// state (token caches, the fan-in map, clients) hangs off this and is
/// passed by reference.
pub struct Runtime {
    config: Config,
    store: SqliteStore,
    queue: QueueStore,
    llm: Arc<LoggedLlm>,
    broadcast: Arc<BroadcastClient>,
    fanin: Arc<FanInCoordinator>,
}

impl Runtime {
    /// Build the runtime from configuration, opening the shared database.
    pub fn new(config: Config) -> Result<Self> {
        let store = SqliteStore::open(&config.db_path)?;
        let queue = QueueStore::open(&config.db_path)?;
        let router: Arc<dyn LlmClient> = Arc::new(LlmRouter::from_config(&config.llm)?);
        Ok(Self::with_components(config, store, queue, router))
    }

    /// Assemble from explicit components (tests inject in-memory stores and
    /// scripted clients here).
    pub fn with_components(
        config: Config,
        store: SqliteStore,
        queue: QueueStore,
        client: Arc<dyn LlmClient>,
    ) -> Self {
        let llm = Arc::new(LoggedLlm::new(client, store.clone()));
        let broadcast = Arc::new(BroadcastClient::new(config.broadcast_url.clone()));
        let fanin = Arc::new(FanInCoordinator::new(queue.clone()));
        Self {
            config,
            store,
            queue,
            llm,
            broadcast,
            fanin,
        }
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub fn queue(&self) -> &QueueStore {
        &self.queue
    }

    /// Register the cron-driven triggers.
    fn register_schedulers(&self) -> Result<()> {
        self.queue.upsert_scheduler(
            "feed-ingest",
            queues::INGEST,
            &self.config.ingest_cron,
            json!({ "trigger": "cron" }),
        )?;
        self.queue.upsert_scheduler(
            "daily-briefing",
            queues::BRIEFING,
            &self.config.briefing_cron,
            json!({ "trigger": "cron" }),
        )?;
        Ok(())
    }

    /// Spawn every worker pool plus the scheduler and sweeper loops. The
    /// completion hooks are the pipeline's chaining edges: a downstream job
    /// is enqueued only after the upstream handler's side effects committed.
    pub fn spawn_all(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let concurrency = self.config.worker_concurrency;
        let mut handles = Vec::new();

        let adapters = feeds::registry(&self.config);
        handles.push(
            Worker::new(
                self.queue.clone(),
                queues::INGEST,
                Arc::new(IngestHandler::new(adapters, self.queue.clone())),
            )
            // Feed ingest runs sequentially inside one job
            .with_concurrency(1)
            .spawn(shutdown.clone()),
        );

        fn chain_to(
            target: &'static str,
        ) -> impl Fn(&crate::queue::Job, &serde_json::Value) -> Vec<(String, serde_json::Value)>
        {
            move |_job, result| vec![(target.to_string(), result.clone())]
        }

        handles.push(
            Worker::new(
                self.queue.clone(),
                queues::SNAPSHOT,
                Arc::new(SnapshotHandler::new(
                    self.store.clone(),
                    self.config.fetch_timeout_secs,
                )),
            )
            .with_concurrency(concurrency)
            .on_completed(chain_to(queues::CLUSTER))
            .spawn(shutdown.clone()),
        );

        handles.push(
            Worker::new(
                self.queue.clone(),
                queues::CLUSTER,
                Arc::new(ClusterHandler::new(self.store.clone(), self.llm.clone())),
            )
            .with_concurrency(concurrency)
            .on_completed(|_job, result| {
                // Skipped decisions (already-linked snapshots) end the chain
                let decision = result["decision"].as_str().unwrap_or("");
                if decision == "match" || decision == "new" {
                    vec![(queues::MATERIALIZE.to_string(), result.clone())]
                } else {
                    Vec::new()
                }
            })
            .spawn(shutdown.clone()),
        );

        handles.push(
            Worker::new(
                self.queue.clone(),
                queues::MATERIALIZE,
                Arc::new(MaterializeHandler::new(self.store.clone())),
            )
            .with_concurrency(concurrency)
            .on_completed(chain_to(queues::SCORE))
            .spawn(shutdown.clone()),
        );

        handles.push(
            Worker::new(
                self.queue.clone(),
                queues::SCORE,
                Arc::new(ScoreHandler::new(self.store.clone(), self.broadcast.clone())),
            )
            .with_concurrency(concurrency)
            .on_completed(|_job, result| {
                if result["status"] == "PUBLISHED" {
                    vec![(queues::ENRICH.to_string(), result.clone())]
                } else {
                    Vec::new()
                }
            })
            .spawn(shutdown.clone()),
        );

        handles.push(
            Worker::new(
                self.queue.clone(),
                queues::ENRICH,
                Arc::new(EnrichHandler::new(
                    self.store.clone(),
                    self.llm.clone(),
                    self.broadcast.clone(),
                )),
            )
            .with_concurrency(concurrency)
            .on_completed(|_job, result| {
                // Fan-out: both extraction branches start in parallel
                if result["enriched"] == true {
                    vec![
                        (queues::ENTITY_EXTRACT.to_string(), result.clone()),
                        (queues::TOPIC_ASSIGN.to_string(), result.clone()),
                    ]
                } else {
                    Vec::new()
                }
            })
            .spawn(shutdown.clone()),
        );

        handles.push(
            Worker::new(
                self.queue.clone(),
                queues::ENTITY_EXTRACT,
                Arc::new(EntityExtractHandler::new(
                    self.store.clone(),
                    self.llm.clone(),
                    self.fanin.clone(),
                )),
            )
            .with_concurrency(concurrency)
            .spawn(shutdown.clone()),
        );

        handles.push(
            Worker::new(
                self.queue.clone(),
                queues::TOPIC_ASSIGN,
                Arc::new(TopicAssignHandler::new(
                    self.store.clone(),
                    self.llm.clone(),
                    self.fanin.clone(),
                )),
            )
            .with_concurrency(concurrency)
            .spawn(shutdown.clone()),
        );

        handles.push(
            Worker::new(
                self.queue.clone(),
                queues::RELATIONSHIP_EXTRACT,
                Arc::new(RelationshipExtractHandler::new(
                    self.store.clone(),
                    self.llm.clone(),
                )),
            )
            .with_concurrency(concurrency)
            .on_completed(|_job, result| {
                // A quarantined stage halts the chain for that event
                if result["quarantined"] != true {
                    vec![(queues::WATCHLIST_MATCH.to_string(), result.clone())]
                } else {
                    Vec::new()
                }
            })
            .spawn(shutdown.clone()),
        );

        handles.push(
            Worker::new(
                self.queue.clone(),
                queues::WATCHLIST_MATCH,
                Arc::new(WatchlistMatchHandler::new(self.store.clone())),
            )
            .with_concurrency(concurrency)
            .spawn(shutdown.clone()),
        );

        handles.push(
            Worker::new(
                self.queue.clone(),
                queues::BRIEFING,
                Arc::new(BriefingHandler::new(self.store.clone(), self.llm.clone())),
            )
            .with_concurrency(1)
            .spawn(shutdown.clone()),
        );

        handles.push(SchedulerLoop::new(self.queue.clone()).spawn(shutdown.clone()));
        handles.push(SweeperLoop::new(self.store.clone(), self.queue.clone()).spawn(shutdown));

        handles
    }

    /// Run the full service until SIGTERM/SIGINT.
    pub async fn run(&self) -> Result<()> {
        self.register_schedulers()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handles = self.spawn_all(shutdown_rx);
        info!(workers = handles.len(), "observatory pipeline running");

        wait_for_shutdown_signal().await;
        info!("shutdown signal received, draining workers");
        let _ = shutdown_tx.send(true);
        futures::future::join_all(handles).await;
        info!("shutdown complete");
        Ok(())
    }

    /// One dispatcher pass (CLI `ingest`). Enqueued snapshot jobs are worked
    /// off by the running service.
    pub async fn ingest_once(&self) -> Result<serde_json::Value> {
        let adapters = feeds::registry(&self.config);
        let handler = IngestHandler::new(adapters, self.queue.clone());
        Ok(handler.run_once().await)
    }

    /// Enqueue a briefing job for the given date (CLI `trigger-briefing`).
    pub fn trigger_briefing(&self, date: Option<NaiveDate>) -> Result<()> {
        let payload = match date {
            Some(date) => json!({ "date": date.to_string() }),
            None => json!({}),
        };
        self.queue
            .enqueue(queues::BRIEFING, payload, EnqueueOpts::default())?;
        info!(?date, "briefing job enqueued");
        Ok(())
    }

    /// Route unmigrated legacy rows through the snapshot pipeline (CLI
    /// `backfill`). Downstream dedup makes re-runs safe.
    pub fn backfill(&self) -> Result<usize> {
        let items = self.store.unmigrated_legacy_items()?;
        let mut migrated = 0;
        for (id, url, title, source_type, published_at) in items {
            self.queue.enqueue(
                queues::SNAPSHOT,
                json!({
                    "url": url,
                    "title": title,
                    "source_type": source_type,
                    "published_at": published_at,
                }),
                EnqueueOpts::default(),
            )?;
            self.store.mark_legacy_migrated(id)?;
            migrated += 1;
        }
        info!(migrated, "legacy items enqueued for backfill");
        Ok(migrated)
    }
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::llm::types::{CompletionRequest, CompletionResponse, Provider, TokenUsage};
    use crate::store::{ArtifactKind, Confidence, EventStatus, EvidenceRole};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::time::Duration;
    use tokio::time::sleep;

    /// Routes responses by prompt content so parallel workers can share one
    /// fake regardless of call order. Judge prompts answer with the first
    /// candidate id found in the prompt.
    struct PromptRoutedLlm;

    #[async_trait]
    impl LlmClient for PromptRoutedLlm {
        async fn complete(&self, request: CompletionRequest) -> crate::error::Result<CompletionResponse> {
            let prompt = request
                .messages
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n");

            let content = if prompt.contains("deduplicate AI-news events") {
                let id = regex::Regex::new(r#""id":\s*(\d+)"#)
                    .unwrap()
                    .captures(&prompt)
                    .and_then(|c| c[1].parse::<i64>().ok())
                    .ok_or_else(|| Error::llm_api("fake", "no candidate id in prompt"))?;
                format!(r#"{{"matchedEventId": {id}, "confidence": 0.93, "reason": "same launch"}}"#)
            } else if prompt.contains("newsroom headline") {
                r#"{"headline": "OpenAI ships GPT-5", "impact_level": "BREAKING"}"#.into()
            } else if prompt.contains("Summarize this AI-news event") {
                r#"{"what_happened": "OpenAI released GPT-5."}"#.into()
            } else if prompt.contains("general manager") {
                r#"{"take": "The frontier moved."}"#.into()
            } else if prompt.contains("why this event matters") {
                r#"{"points": ["Capability jump"]}"#.into()
            } else if prompt.contains("Extract named entities") {
                r#"{"entities": [
                    {"name": "OpenAI", "entity_type": "COMPANY", "role": "SUBJECT", "confidence": 0.99},
                    {"name": "GPT-5", "entity_type": "MODEL", "role": "OBJECT", "confidence": 0.98}
                ]}"#
                .into()
            } else if prompt.contains("Assign topics") {
                r#"{"topics": [{"slug": "model-release", "confidence": 0.95}]}"#.into()
            } else if prompt.contains("Extract relationships") {
                r#"{"relationships": [{"source": "openai", "target": "gpt-5",
                    "relationship_type": "RELEASED", "confidence": 0.97}]}"#
                    .into()
            } else {
                return Err(Error::llm_api("fake", format!("unrouted prompt: {prompt}")));
            };

            Ok(CompletionResponse {
                provider: Provider::Ollama,
                model: "routed-fake".into(),
                content,
                usage: TokenUsage {
                    input_tokens: 20,
                    output_tokens: 10,
                },
                latency_ms: 1,
                cost_usd: 0.0,
                timestamp: Utc::now(),
            })
        }

        fn provider(&self) -> Provider {
            Provider::Ollama
        }
    }

    fn test_runtime() -> Runtime {
        let config = Config::for_tests(":memory:");
        Runtime::with_components(
            config,
            SqliteStore::in_memory().unwrap(),
            QueueStore::in_memory().unwrap(),
            Arc::new(PromptRoutedLlm),
        )
    }

    fn snapshot_payload(url: &str, title: &str) -> serde_json::Value {
        json!({
            "url": url,
            "source_type": "newsapi",
            "title": title,
            "published_at": Utc::now(),
        })
    }

    async fn wait_until(mut predicate: impl FnMut() -> bool, what: &str) {
        for _ in 0..600 {
            if predicate() {
                return;
            }
            sleep(Duration::from_millis(25)).await;
        }
        panic!("timed out waiting for {what}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_single_authoritative_source_publishes_and_enriches() {
        let runtime = test_runtime();
        let (tx, rx) = watch::channel(false);
        let handles = runtime.spawn_all(rx);

        // openai.com is unreachable from tests; the snapshot records the
        // failed fetch and the pipeline proceeds on the title alone.
        runtime
            .queue
            .enqueue(
                queues::SNAPSHOT,
                snapshot_payload("https://openai.com/index/gpt-5", "OpenAI releases GPT-5"),
                EnqueueOpts::default(),
            )
            .unwrap();

        let store = runtime.store.clone();
        wait_until(
            || {
                store
                    .latest_artifact(1, ArtifactKind::RelationshipExtract)
                    .ok()
                    .flatten()
                    .is_some()
            },
            "pipeline to reach relationship-extract",
        )
        .await;

        let event = store.event_by_id(1).unwrap().unwrap();
        assert_eq!(event.status, EventStatus::Published);
        assert_eq!(event.confidence, Some(Confidence::High));
        assert_eq!(event.source_count, 1);
        assert!(store.has_required_artifacts(event.id).unwrap());
        assert!(!store.relationships_for_event(event.id).unwrap().is_empty());

        // Exactly one PRIMARY evidence row
        let evidence = store.evidence_for_event(event.id).unwrap();
        assert_eq!(
            evidence.iter().filter(|e| e.role == EvidenceRole::Primary).count(),
            1
        );

        tx.send(true).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_second_source_merges_into_existing_event() {
        let runtime = test_runtime();
        let (tx, rx) = watch::channel(false);
        let handles = runtime.spawn_all(rx);

        runtime
            .queue
            .enqueue(
                queues::SNAPSHOT,
                snapshot_payload("https://openai.com/index/gpt-5", "OpenAI releases GPT-5"),
                EnqueueOpts::default(),
            )
            .unwrap();

        let store = runtime.store.clone();
        wait_until(
            || {
                store
                    .event_by_id(1)
                    .ok()
                    .flatten()
                    .is_some_and(|e| e.status == EventStatus::Published)
            },
            "first event to publish",
        )
        .await;

        runtime
            .queue
            .enqueue(
                queues::SNAPSHOT,
                snapshot_payload(
                    "https://techcrunch.com/2026/02/01/openai-gpt5",
                    "OpenAI launches GPT-5 model",
                ),
                EnqueueOpts::default(),
            )
            .unwrap();

        wait_until(
            || {
                store
                    .event_by_id(1)
                    .ok()
                    .flatten()
                    .is_some_and(|e| e.source_count == 2)
            },
            "second source to merge",
        )
        .await;

        let event = store.event_by_id(1).unwrap().unwrap();
        // No duplicate event was created
        assert!(store.event_by_id(2).unwrap().is_none());
        assert_eq!(event.confidence, Some(Confidence::High));

        let evidence = store.evidence_for_event(event.id).unwrap();
        assert_eq!(evidence.len(), 2);
        assert_eq!(
            evidence.iter().filter(|e| e.role == EvidenceRole::Primary).count(),
            1
        );
        assert_eq!(
            evidence.iter().filter(|e| e.role == EvidenceRole::Supporting).count(),
            1
        );

        tx.send(true).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_backfill_enqueues_snapshot_jobs() {
        let runtime = test_runtime();
        runtime
            .store
            .insert_legacy_item("https://example.com/old", "Old story", "newsapi", None)
            .unwrap();

        assert_eq!(runtime.backfill().unwrap(), 1);
        assert_eq!(runtime.queue.queued_count(queues::SNAPSHOT).unwrap(), 1);
        // Second run has nothing left
        assert_eq!(runtime.backfill().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_trigger_briefing_enqueues_job() {
        let runtime = test_runtime();
        runtime
            .trigger_briefing(Some(NaiveDate::from_ymd_opt(2026, 2, 1).unwrap()))
            .unwrap();
        assert_eq!(runtime.queue.queued_count(queues::BRIEFING).unwrap(), 1);
    }

    #[test]
    fn test_register_schedulers_is_idempotent() {
        let runtime = test_runtime();
        runtime.register_schedulers().unwrap();
        runtime.register_schedulers().unwrap();
        assert_eq!(runtime.queue.schedulers().unwrap().len(), 2);
    }
}
