//! Entity extraction worker: pull named entities out of an event and persist
//! canonical entities plus mentions.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::artifacts::ArtifactPayload;
use crate::llm::{ChatMessage, CompletionRequest, LoggedLlm};
use crate::queue::{Job, JobHandler, JobOutcome};
use crate::store::{ArtifactKind, EventStatus, SqliteStore};

use super::fanin::FanInCoordinator;

const PROCESSOR: &str = "entity-extract";
const ATTEMPTS: usize = 2;

/// Canonical slug for an entity name: lowercase, alphanumerics with single
/// hyphens.
pub fn slugify(name: &str) -> String {
    let mut slug = String::new();
    let mut last_was_hyphen = true;
    for c in name.to_lowercase().chars() {
        if c.is_alphanumeric() {
            slug.push(c);
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}

pub struct EntityExtractHandler {
    store: SqliteStore,
    llm: Arc<LoggedLlm>,
    fanin: Arc<FanInCoordinator>,
}

impl EntityExtractHandler {
    pub fn new(store: SqliteStore, llm: Arc<LoggedLlm>, fanin: Arc<FanInCoordinator>) -> Self {
        Self { store, llm, fanin }
    }

    fn prompt(title: &str) -> String {
        format!(
            "Extract named entities from this AI-news event.\n\
             Event: {title}\n\n\
             Respond with JSON only:\n\
             {{\"entities\": [{{\"name\": \"...\", \
             \"entity_type\": \"COMPANY|LAB|MODEL|PRODUCT|PERSON|REGULATION|DATASET|BENCHMARK\", \
             \"role\": \"SUBJECT|OBJECT|MENTIONED\", \"confidence\": 0.0, \
             \"aliases\": []}}]}}"
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
            .latest_artifact(event_id, ArtifactKind::EntityExtract)
        {
            return JobOutcome::Skipped(format!("event {event_id} already has entities"));
        }

        let mut extracted = None;
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
                    match ArtifactPayload::from_llm_json(ArtifactKind::EntityExtract, &response.content)
                    {
                        Ok(ArtifactPayload::EntityExtract(payload)) => {
                            extracted = Some((payload, response.model));
                            break;
                        }
                        Ok(_) => unreachable!("kind is fixed"),
                        Err(e) => last_error = e.to_string(),
                    }
                }
                Err(e) => last_error = e.to_string(),
            }
        }

        let Some((payload, model)) = extracted else {
            warn!(event_id, reason = %last_error, "entity extraction failed");
            let reason = format!("entity extraction failed: {last_error}");
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
            ArtifactKind::EntityExtract,
            &serde_json::to_value(&payload).unwrap_or_default(),
            &model,
        ) {
            return JobOutcome::Failed(e.to_string());
        }

        let mut mentions = 0;
        for entity in &payload.entities {
            let slug = slugify(&entity.name);
            if slug.is_empty() {
                continue;
            }
            let stored = match self
                .store
                .upsert_entity(&slug, &entity.name, entity.entity_type, &entity.aliases)
            {
                Ok(stored) => stored,
                Err(e) => return JobOutcome::Failed(e.to_string()),
            };
            if let Err(e) =
                self.store
                    .insert_mention(event_id, stored.id, entity.role, entity.confidence)
            {
                return JobOutcome::Failed(e.to_string());
            }
            mentions += 1;
        }
        info!(event_id, mentions, "entities extracted");

        if let Err(e) = self.fanin.mark_entity_done(event_id) {
            return JobOutcome::Failed(e.to_string());
        }
        JobOutcome::Completed(json!({ "event_id": event_id, "mentions": mentions }))
    }
}

#[async_trait]
impl JobHandler for EntityExtractHandler {
    async fn handle(&self, job: &Job) -> JobOutcome {
        let Some(event_id) = job.payload["event_id"].as_i64() else {
            return JobOutcome::Failed("entity-extract payload missing event_id".into());
        };
        self.process(event_id).await
    }
}
