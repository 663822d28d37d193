//! Enrichment orchestrator: produce the required artifacts for an event,
//! then fan out to entity-extract and topic-assign.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::artifacts::ArtifactPayload;
use crate::llm::{ChatMessage, CompletionRequest, LoggedLlm};
use crate::queue::{Job, JobHandler, JobOutcome};
use crate::store::{ArtifactKind, Event, EventStatus, SqliteStore};

use super::broadcast::BroadcastClient;

/// Attempts per artifact before the event is quarantined.
const ATTEMPTS_PER_ARTIFACT: usize = 2;

pub struct EnrichHandler {
    store: SqliteStore,
    llm: Arc<LoggedLlm>,
    broadcast: Arc<BroadcastClient>,
}

impl EnrichHandler {
    pub fn new(store: SqliteStore, llm: Arc<LoggedLlm>, broadcast: Arc<BroadcastClient>) -> Self {
        Self { store, llm, broadcast }
    }

    fn evidence_context(&self, event: &Event) -> String {
        let mut context = format!("Event title: {}\n", event.title);
        if let Ok(evidence) = self.store.evidence_for_event(event.id) {
            for link in evidence.iter().take(5) {
                if let Ok(Some(snapshot)) = self.store.snapshot_by_id(link.snapshot_id) {
                    context.push_str(&format!("Source headline: {}\n", snapshot.title));
                    if let Some(text) = &snapshot.full_text {
                        let excerpt: String = text.chars().take(600).collect();
                        context.push_str(&format!("Excerpt: {excerpt}\n"));
                    }
                }
            }
        }
        context
    }

    fn prompt_for(kind: ArtifactKind, context: &str) -> String {
        let instructions = match kind {
            ArtifactKind::Headline => {
                "Write a newsroom headline for this AI-news event. Respond with JSON only:\n\
                 {\"headline\": \"<= 200 chars\", \"headline_hr\": \"Croatian rendering, optional\",\n\
                  \"impact_level\": \"BREAKING|HIGH|MEDIUM|LOW\"}"
            }
            ArtifactKind::Summary => {
                "Summarize this AI-news event. Respond with JSON only:\n\
                 {\"what_happened\": \"<= 2000 chars\", \"context\": \"background, optional\"}"
            }
            ArtifactKind::GmTake => {
                "As the desk's general manager, give your analyst take on this event. \
                 Respond with JSON only: {\"take\": \"<= 2000 chars\"}"
            }
            ArtifactKind::WhyMatters => {
                "List why this event matters for practitioners. Respond with JSON only:\n\
                 {\"points\": [\"...\", \"...\"]} with 1 to 5 short points."
            }
            other => unreachable!("enrich does not produce {other}"),
        };
        format!("{context}\n{instructions}")
    }

    /// Generate one artifact with a bounded retry on parse/validation
    /// failure. Each attempt is a separate logged run.
    async fn generate_artifact(
        &self,
        event: &Event,
        kind: ArtifactKind,
        context: &str,
    ) -> Result<(ArtifactPayload, String), String> {
        let processor = format!("enrich-{}", kind.as_str().to_lowercase());
        let mut last_error = String::new();

        for _ in 0..ATTEMPTS_PER_ARTIFACT {
            let request =
                CompletionRequest::new(vec![ChatMessage::user(Self::prompt_for(kind, context))])
                    .with_temperature(0.3);
            let input_key = format!("{}|{}", event.id, kind);

            match self
                .llm
                .complete_logged(request, &processor, Some(event.id), &input_key)
                .await
            {
                Ok(response) => match ArtifactPayload::from_llm_json(kind, &response.content) {
                    Ok(payload) => return Ok((payload, response.model)),
                    Err(e) => last_error = e.to_string(),
                },
                Err(e) => last_error = e.to_string(),
            }
        }
        Err(last_error)
    }

    async fn process(&self, event_id: i64) -> JobOutcome {
        let event = match self.store.event_by_id(event_id) {
            Ok(Some(event)) => event,
            Ok(None) => return JobOutcome::Skipped(format!("event {event_id} not found")),
            Err(e) => return JobOutcome::Failed(e.to_string()),
        };

        match self.store.has_required_artifacts(event_id) {
            Ok(true) => {
                return JobOutcome::Skipped(format!("event {event_id} already enriched"));
            }
            Ok(false) => {}
            Err(e) => return JobOutcome::Failed(e.to_string()),
        }

        let context = self.evidence_context(&event);
        for kind in ArtifactKind::REQUIRED {
            // Individually re-runnable: kinds that already exist are kept
            if matches!(self.store.latest_artifact(event_id, kind), Ok(Some(_))) {
                continue;
            }

            let (payload, model) = match self.generate_artifact(&event, kind, &context).await {
                Ok(generated) => generated,
                Err(reason) => {
                    warn!(event_id, kind = kind.as_str(), %reason, "enrichment stage failed");
                    let reason = format!("enrichment failed at {kind}: {reason}");
                    if let Err(e) =
                        self.store
                            .set_event_status(event_id, EventStatus::Quarantined, &reason)
                    {
                        return JobOutcome::Failed(e.to_string());
                    }
                    return JobOutcome::Completed(json!({
                        "event_id": event_id,
                        "enriched": false,
                        "quarantined": true,
                    }));
                }
            };

            if let Err(e) =
                self.store
                    .insert_artifact(event_id, kind, &payload.to_value(), &model)
            {
                return JobOutcome::Failed(e.to_string());
            }

            // Headline side effects land on the event row
            if let ArtifactPayload::Headline(headline) = &payload {
                if let Err(e) = self.store.set_event_impact(event_id, headline.impact_level) {
                    return JobOutcome::Failed(e.to_string());
                }
                if let Some(title_hr) = &headline.headline_hr {
                    if let Err(e) = self.store.set_event_title_hr(event_id, title_hr) {
                        return JobOutcome::Failed(e.to_string());
                    }
                }
            }
        }

        info!(event_id, "event enriched");

        // Artifacts landing on a published event push a live update
        if event.status == EventStatus::Published {
            self.broadcast.notify_new_event(event_id).await;
        }

        JobOutcome::Completed(json!({
            "event_id": event_id,
            "enriched": true,
            "quarantined": false,
        }))
    }
}

#[async_trait]
impl JobHandler for EnrichHandler {
    async fn handle(&self, job: &Job) -> JobOutcome {
        let Some(event_id) = job.payload["event_id"].as_i64() else {
            return JobOutcome::Failed("enrich payload missing event_id".into());
        };
        self.process(event_id).await
    }
}
