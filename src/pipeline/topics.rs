//! Topic assignment worker.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::artifacts::ArtifactPayload;
use crate::llm::{ChatMessage, CompletionRequest, LoggedLlm};
use crate::queue::{Job, JobHandler, JobOutcome};
use crate::store::{ArtifactKind, EventStatus, SqliteStore};

use super::entities::slugify;
use super::fanin::FanInCoordinator;

const PROCESSOR: &str = "topic-assign";
const ATTEMPTS: usize = 2;

/// The canonical topic vocabulary offered to the model. Unknown slugs are
/// still accepted (the taxonomy grows with the corpus) but get normalized.
const TOPIC_HINTS: [&str; 10] = [
    "model-release",
    "research",
    "funding",
    "regulation",
    "open-source",
    "infrastructure",
    "benchmarks",
    "safety",
    "products",
    "industry",
];

pub struct TopicAssignHandler {
    store: SqliteStore,
    llm: Arc<LoggedLlm>,
    fanin: Arc<FanInCoordinator>,
}

impl TopicAssignHandler {
    pub fn new(store: SqliteStore, llm: Arc<LoggedLlm>, fanin: Arc<FanInCoordinator>) -> Self {
        Self { store, llm, fanin }
    }

    fn prompt(title: &str) -> String {
        format!(
            "Assign topics to this AI-news event.\n\
             Event: {title}\n\
             Preferred slugs: {}\n\n\
             Respond with JSON only: {{\"topics\": [{{\"slug\": \"...\", \"confidence\": 0.0}}]}}",
            TOPIC_HINTS.join(", ")
        )
    }

    async fn process(&self, event_id: i64) -> JobOutcome {
        let event = match self.store.event_by_id(event_id) {
            Ok(Some(event)) => event,
            Ok(None) => return JobOutcome::Skipped(format!("event {event_id} not found")),
            Err(e) => return JobOutcome::Failed(e.to_string()),
        };

        // At-least-once safety: a requeued job whose writes already landed
        // must not re-bill the LLM or re-report to the fan-in coordinator
        if let Ok(Some(_)) = self
            .store
            .latest_artifact(event_id, ArtifactKind::TopicAssign)
        {
            return JobOutcome::Skipped(format!("event {event_id} already has topics"));
        }

        let mut assigned = None;
        let mut last_error = String::new();
        for _ in 0..ATTEMPTS {
            let request =
                CompletionRequest::new(vec![ChatMessage::user(Self::prompt(&event.title))])
                    .with_temperature(0.0);
            let input_key = format!("{event_id}|{}", event.title);
            match self
                .llm
                .complete_logged(request, PROCESSOR, Some(event_id), &input_key)
                .await
            {
                Ok(response) => {
                    match ArtifactPayload::from_llm_json(ArtifactKind::TopicAssign, &response.content) {
                        Ok(ArtifactPayload::TopicAssign(payload)) => {
                            assigned = Some((payload, response.model));
                            break;
                        }
                        Ok(_) => unreachable!("kind is fixed"),
                        Err(e) => last_error = e.to_string(),
                    }
                }
                Err(e) => last_error = e.to_string(),
            }
        }

        let Some((payload, model)) = assigned else {
            warn!(event_id, reason = %last_error, "topic assignment failed");
            let reason = format!("topic assignment failed: {last_error}");
            if let Err(e) = self
                .store
                .set_event_status(event_id, EventStatus::Quarantined, &reason)
            {
                return JobOutcome::Failed(e.to_string());
            }
            return JobOutcome::Completed(json!({ "event_id": event_id, "quarantined": true }));
        };

        if let Err(e) = self.store.insert_artifact(
            event_id,
            ArtifactKind::TopicAssign,
            &serde_json::to_value(&payload).unwrap_or_default(),
            &model,
        ) {
            return JobOutcome::Failed(e.to_string());
        }

        let mut linked = 0;
        for topic in &payload.topics {
            let slug = slugify(&topic.slug);
            if slug.is_empty() {
                continue;
            }
            let stored = match self.store.upsert_topic(&slug) {
                Ok(stored) => stored,
                Err(e) => return JobOutcome::Failed(e.to_string()),
            };
            if let Err(e) = self
                .store
                .link_event_topic(event_id, stored.id, topic.confidence)
            {
                return JobOutcome::Failed(e.to_string());
            }
            linked += 1;
        }
        info!(event_id, topics = linked, "topics assigned");

        if let Err(e) = self.fanin.mark_topic_done(event_id) {
            return JobOutcome::Failed(e.to_string());
        }
        JobOutcome::Completed(json!({ "event_id": event_id, "topics": linked }))
    }
}

#[async_trait]
impl JobHandler for TopicAssignHandler {
    async fn handle(&self, job: &Job) -> JobOutcome {
        let Some(event_id) = job.payload["event_id"].as_i64() else {
            return JobOutcome::Failed("topic-assign payload missing event_id".into());
        };
        self.process(event_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedLlm;
    use crate::llm::Provider;
    use crate::queue::{queues, QueueStore};
    use crate::store::TrustTier;
    use chrono::Utc;

    fn seed_event(store: &SqliteStore) -> i64 {
        let source = store
            .upsert_source("https://a.com/1", "https://a.com/1", "a.com", TrustTier::Standard)
            .unwrap();
        let snapshot = store
            .insert_snapshot(source.id, "OpenAI releases GPT-5", None, Some(Utc::now()), "h", None, 200)
            .unwrap();
        store
            .create_event_with_primary("fp", "OpenAI releases GPT-5", Utc::now(), snapshot.id)
            .unwrap()
            .0
            .id
    }

    #[tokio::test]
    async fn test_topics_assigned_and_fanin_fires_after_both_sides() {
        let store = SqliteStore::in_memory().unwrap();
        let queue = QueueStore::in_memory().unwrap();
        let event_id = seed_event(&store);
        let llm = Arc::new(LoggedLlm::new(
            Arc::new(ScriptedLlm::new(
                Provider::Ollama,
                vec![r#"{"topics": [{"slug": "Model Release", "confidence": 0.9},
                                    {"slug": "benchmarks", "confidence": 0.4}]}"#.into()],
            )),
            store.clone(),
        ));
        let fanin = Arc::new(FanInCoordinator::new(queue.clone()));
        // Entity side already done: topic completion must fire the child
        fanin.mark_entity_done(event_id).unwrap();

        let handler = TopicAssignHandler::new(store.clone(), llm, fanin);
        let outcome = handler.process(event_id).await;
        let JobOutcome::Completed(result) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(result["topics"], 2);

        // Slug got normalized
        assert!(store.upsert_topic("model-release").unwrap().id > 0);
        assert_eq!(queue.queued_count(queues::RELATIONSHIP_EXTRACT).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_second_run_is_skipped() {
        let store = SqliteStore::in_memory().unwrap();
        let queue = QueueStore::in_memory().unwrap();
        let event_id = seed_event(&store);
        let response = r#"{"topics": [{"slug": "model-release", "confidence": 0.9}]}"#.to_string();
        let llm = Arc::new(LoggedLlm::new(
            Arc::new(ScriptedLlm::new(
                Provider::Ollama,
                vec![response.clone(), response],
            )),
            store.clone(),
        ));
        let fanin = Arc::new(FanInCoordinator::new(queue.clone()));
        let handler = TopicAssignHandler::new(store.clone(), llm, fanin.clone());

        let first = handler.process(event_id).await;
        assert!(matches!(first, JobOutcome::Completed(_)));
        assert_eq!(fanin.pending(), 1);

        // A requeued duplicate neither calls the LLM again nor re-reports
        let second = handler.process(event_id).await;
        assert!(matches!(second, JobOutcome::Skipped(_)));
        assert_eq!(store.llm_runs_for_processor(PROCESSOR).unwrap().len(), 1);
        assert_eq!(fanin.pending(), 1);
    }

    #[tokio::test]
    async fn test_failure_quarantines_without_fanin_report() {
        let store = SqliteStore::in_memory().unwrap();
        let queue = QueueStore::in_memory().unwrap();
        let event_id = seed_event(&store);
        let llm = Arc::new(LoggedLlm::new(
            Arc::new(ScriptedLlm::new(
                Provider::Ollama,
                vec!["nope".into(), "still nope".into()],
            )),
            store.clone(),
        ));
        let fanin = Arc::new(FanInCoordinator::new(queue.clone()));
        fanin.mark_entity_done(event_id).unwrap();

        let handler = TopicAssignHandler::new(store.clone(), llm, fanin);
        let outcome = handler.process(event_id).await;
        let JobOutcome::Completed(result) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(result["quarantined"], true);
        assert_eq!(queue.queued_count(queues::RELATIONSHIP_EXTRACT).unwrap(), 0);
    }
}
