//! Relationship extraction worker: propose entity-to-entity edges and pass
//! each through the safety gate.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::artifacts::ArtifactPayload;
use crate::llm::{ChatMessage, CompletionRequest, LoggedLlm};
use crate::queue::{Job, JobHandler, JobOutcome};
use crate::store::{ArtifactKind, EventStatus, RelationshipStatus, SqliteStore};

use super::entities::slugify;
use super::safety::{admit, GateEvidence};

const PROCESSOR: &str = "relationship-extract";
const ATTEMPTS: usize = 2;

pub struct RelationshipExtractHandler {
    store: SqliteStore,
    llm: Arc<LoggedLlm>,
}

impl RelationshipExtractHandler {
    pub fn new(store: SqliteStore, llm: Arc<LoggedLlm>) -> Self {
        Self { store, llm }
    }

    fn prompt(title: &str, entity_slugs: &[String]) -> String {
        format!(
            "Extract relationships between the known entities of this AI-news event.\n\
             Event: {title}\n\
             Entities: {}\n\n\
             Respond with JSON only:\n\
             {{\"relationships\": [{{\"source\": \"<entity slug>\", \"target\": \"<entity slug>\", \
             \"relationship_type\": \"RELEASED|ANNOUNCED|PUBLISHED|PARTNERED|INTEGRATED|FUNDED|ACQUIRED|BANNED|BEATS|CRITICIZED\", \
             \"confidence\": 0.0}}]}}",
            entity_slugs.join(", ")
        )
    }

    async fn process(&self, event_id: i64) -> JobOutcome {
        let event = match self.store.event_by_id(event_id) {
            Ok(Some(event)) => event,
            Ok(None) => return JobOutcome::Skipped(format!("event {event_id} not found")),
            Err(e) => return JobOutcome::Failed(e.to_string()),
        };

        // At-least-once safety: the sweeper may race a live fan-in enqueue
        if let Ok(Some(_)) = self
            .store
            .latest_artifact(event_id, ArtifactKind::RelationshipExtract)
        {
            return JobOutcome::Skipped(format!("event {event_id} already has relationships"));
        }

        let entities = match self.store.entities_for_event(event_id) {
            Ok(entities) => entities,
            Err(e) => return JobOutcome::Failed(e.to_string()),
        };
        let slugs: Vec<String> = entities.iter().map(|e| e.slug.clone()).collect();

        let mut extracted = None;
        let mut last_error = String::new();
        for _ in 0..ATTEMPTS {
            let request = CompletionRequest::new(vec![ChatMessage::user(Self::prompt(
                &event.title,
                &slugs,
            ))])
            .with_temperature(0.0);
            let input_key = format!("{event_id}|{}", slugs.join(","));
            match self
                .llm
                .complete_logged(request, PROCESSOR, Some(event_id), &input_key)
                .await
            {
                Ok(response) => {
                    match ArtifactPayload::from_llm_json(
                        ArtifactKind::RelationshipExtract,
                        &response.content,
                    ) {
                        Ok(ArtifactPayload::RelationshipExtract(payload)) => {
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
            warn!(event_id, reason = %last_error, "relationship extraction failed");
            let reason = format!("relationship extraction failed: {last_error}");
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
            ArtifactKind::RelationshipExtract,
            &serde_json::to_value(&payload).unwrap_or_default(),
            &model,
        ) {
            return JobOutcome::Failed(e.to_string());
        }

        // Gate evidence is shared by every proposal on this event
        let tiers = match self.store.evidence_tiers(event_id) {
            Ok(tiers) => tiers,
            Err(e) => return JobOutcome::Failed(e.to_string()),
        };
        let evidence = GateEvidence {
            tiers,
            source_count: event.source_count,
        };

        let mut approved = 0;
        let mut quarantined = 0;
        for proposal in &payload.relationships {
            let source_slug = slugify(&proposal.source);
            let target_slug = slugify(&proposal.target);
            let (source, target) = match (
                self.store.entity_by_slug(&source_slug),
                self.store.entity_by_slug(&target_slug),
            ) {
                (Ok(Some(source)), Ok(Some(target))) => (source, target),
                (Ok(_), Ok(_)) => {
                    warn!(
                        event_id,
                        source = %source_slug,
                        target = %target_slug,
                        "proposal references unknown entity, dropped"
                    );
                    continue;
                }
                (Err(e), _) | (_, Err(e)) => return JobOutcome::Failed(e.to_string()),
            };

            let relationship = match self.store.insert_relationship(
                source.id,
                target.id,
                proposal.relationship_type,
                event_id,
                proposal.confidence,
            ) {
                Ok(relationship) => relationship,
                Err(e) => return JobOutcome::Failed(e.to_string()),
            };

            let decision = admit(proposal.relationship_type, &evidence, proposal.confidence);
            if let Err(e) = self.store.set_relationship_status(relationship.id, decision) {
                return JobOutcome::Failed(e.to_string());
            }
            match decision {
                RelationshipStatus::Approved => approved += 1,
                _ => quarantined += 1,
            }
        }

        info!(event_id, approved, quarantined, "relationships gated");
        JobOutcome::Completed(json!({
            "event_id": event_id,
            "approved": approved,
            "quarantined_relationships": quarantined,
        }))
    }
}

#[async_trait]
impl JobHandler for RelationshipExtractHandler {
    async fn handle(&self, job: &Job) -> JobOutcome {
        let Some(event_id) = job.payload["event_id"].as_i64() else {
            return JobOutcome::Failed("relationship-extract payload missing event_id".into());
        };
        self.process(event_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedLlm;
    use crate::llm::Provider;
    use crate::store::{EntityType, MentionRole, RelationshipType, TrustTier};
    use chrono::Utc;

    fn seed_event(store: &SqliteStore, tier: TrustTier) -> i64 {
        let source = store
            .upsert_source("https://a.com/1", "https://a.com/1", "a.com", tier)
            .unwrap();
        let snapshot = store
            .insert_snapshot(source.id, "Acme acquires Globex", None, Some(Utc::now()), "h", None, 200)
            .unwrap();
        let event_id = store
            .create_event_with_primary("fp", "Acme acquires Globex", Utc::now(), snapshot.id)
            .unwrap()
            .0
            .id;
        for (slug, name) in [("acme", "Acme"), ("globex", "Globex")] {
            let entity = store
                .upsert_entity(slug, name, EntityType::Company, &[])
                .unwrap();
            store
                .insert_mention(event_id, entity.id, MentionRole::Subject, 0.9)
                .unwrap();
        }
        event_id
    }

    fn acquisition_response() -> String {
        r#"{"relationships": [{"source": "acme", "target": "globex",
            "relationship_type": "ACQUIRED", "confidence": 0.99}]}"#
            .to_string()
    }

    #[tokio::test]
    async fn test_high_risk_single_low_source_is_quarantined() {
        let store = SqliteStore::in_memory().unwrap();
        let event_id = seed_event(&store, TrustTier::Low);
        let llm = Arc::new(LoggedLlm::new(
            Arc::new(ScriptedLlm::new(Provider::Ollama, vec![acquisition_response()])),
            store.clone(),
        ));
        let handler = RelationshipExtractHandler::new(store.clone(), llm);

        let outcome = handler.process(event_id).await;
        let JobOutcome::Completed(result) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(result["quarantined_relationships"], 1);

        let relationships = store.relationships_for_event(event_id).unwrap();
        assert_eq!(relationships.len(), 1);
        assert_eq!(relationships[0].status, RelationshipStatus::Quarantined);
        // Model confidence is recorded even though the gate ignored it
        assert!((relationships[0].model_confidence - 0.99).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_high_risk_authoritative_source_is_approved() {
        let store = SqliteStore::in_memory().unwrap();
        let event_id = seed_event(&store, TrustTier::Authoritative);
        let llm = Arc::new(LoggedLlm::new(
            Arc::new(ScriptedLlm::new(Provider::Ollama, vec![acquisition_response()])),
            store.clone(),
        ));
        let handler = RelationshipExtractHandler::new(store.clone(), llm);

        let outcome = handler.process(event_id).await;
        let JobOutcome::Completed(result) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(result["approved"], 1);
        let relationships = store.relationships_for_event(event_id).unwrap();
        assert_eq!(relationships[0].status, RelationshipStatus::Approved);
    }

    #[tokio::test]
    async fn test_unknown_entity_proposal_is_dropped() {
        let store = SqliteStore::in_memory().unwrap();
        let event_id = seed_event(&store, TrustTier::Authoritative);
        let llm = Arc::new(LoggedLlm::new(
            Arc::new(ScriptedLlm::new(
                Provider::Ollama,
                vec![r#"{"relationships": [{"source": "acme", "target": "initech",
                    "relationship_type": "PARTNERED", "confidence": 0.8}]}"#
                    .into()],
            )),
            store.clone(),
        ));
        let handler = RelationshipExtractHandler::new(store.clone(), llm);

        let outcome = handler.process(event_id).await;
        assert!(matches!(outcome, JobOutcome::Completed(_)));
        assert!(store.relationships_for_event(event_id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_run_is_skipped() {
        let store = SqliteStore::in_memory().unwrap();
        let event_id = seed_event(&store, TrustTier::Authoritative);
        let llm = Arc::new(LoggedLlm::new(
            Arc::new(ScriptedLlm::new(
                Provider::Ollama,
                vec![acquisition_response(), acquisition_response()],
            )),
            store.clone(),
        ));
        let handler = RelationshipExtractHandler::new(store.clone(), llm);

        handler.process(event_id).await;
        let second = handler.process(event_id).await;
        assert!(matches!(second, JobOutcome::Skipped(_)));
        assert_eq!(store.relationships_for_event(event_id).unwrap().len(), 1);
    }
}
