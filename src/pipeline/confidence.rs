//! Confidence scoring: a deterministic rubric over trust tiers and source
//! count, and its mapping onto event status.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use crate::queue::{Job, JobHandler, JobOutcome};
use crate::store::{Confidence, EventStatus, SqliteStore, TrustTier};

use super::broadcast::BroadcastClient;

/// The evidence trust profile a score is computed from.
#[derive(Debug, Clone)]
pub struct TrustProfile {
    pub source_count: i64,
    pub tiers: Vec<TrustTier>,
}

/// Pure scoring rubric. Row order matters: the first matching condition wins.
pub fn score(profile: &TrustProfile) -> Confidence {
    let any_authoritative = profile.tiers.contains(&TrustTier::Authoritative);
    let any_standard = profile.tiers.contains(&TrustTier::Standard);

    if any_authoritative {
        Confidence::High
    } else if profile.source_count >= 3 && any_standard {
        Confidence::High
    } else if profile.source_count >= 2 {
        Confidence::Medium
    } else if profile.source_count == 1 && any_standard {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

/// LOW confidence quarantines; MEDIUM and HIGH publish.
pub fn status_for(confidence: Confidence) -> EventStatus {
    match confidence {
        Confidence::Low => EventStatus::Quarantined,
        Confidence::Medium | Confidence::High => EventStatus::Published,
    }
}

/// Worker for the score queue: computes confidence from the event's evidence
/// profile, writes the status transition, and fires the broadcast hook on
/// publish.
pub struct ScoreHandler {
    store: SqliteStore,
    broadcast: Arc<BroadcastClient>,
}

impl ScoreHandler {
    pub fn new(store: SqliteStore, broadcast: Arc<BroadcastClient>) -> Self {
        Self { store, broadcast }
    }

    pub(crate) async fn process(&self, event_id: i64) -> JobOutcome {
        let event = match self.store.event_by_id(event_id) {
            Ok(Some(event)) => event,
            Ok(None) => return JobOutcome::Skipped(format!("event {event_id} not found")),
            Err(e) => return JobOutcome::Failed(e.to_string()),
        };
        let tiers = match self.store.evidence_tiers(event_id) {
            Ok(tiers) => tiers,
            Err(e) => return JobOutcome::Failed(e.to_string()),
        };

        let profile = TrustProfile {
            source_count: event.source_count,
            tiers,
        };
        let confidence = score(&profile);
        let status = status_for(confidence);

        let changed = match self.store.set_event_confidence_status(
            event_id,
            confidence,
            status,
            &format!(
                "scored {} from {} sources",
                confidence.as_str(),
                profile.source_count
            ),
        ) {
            Ok(changed) => changed,
            Err(e) => return JobOutcome::Failed(e.to_string()),
        };

        if changed && status == EventStatus::Published {
            self.broadcast.notify_new_event(event_id).await;
        }

        JobOutcome::Completed(json!({
            "event_id": event_id,
            "confidence": confidence,
            "status": status,
            "changed": changed,
        }))
    }
}

#[async_trait]
impl JobHandler for ScoreHandler {
    async fn handle(&self, job: &Job) -> JobOutcome {
        let Some(event_id) = job.payload["event_id"].as_i64() else {
            return JobOutcome::Failed("score payload missing event_id".into());
        };
        self.process(event_id).await
    }
}
