//! Cluster judge: decide whether a snapshot matches an existing event or
//! starts a new one.
//!
//! A candidate window plus a bigram-similarity prefilter keeps the LLM out of
//! the loop for the common no-candidate case; every LLM path defaults to
//! `new` on failure.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use crate::artifacts::extract_json;
use crate::llm::{ChatMessage, CompletionRequest, LoggedLlm};
use crate::queue::{Job, JobHandler, JobOutcome};
use crate::store::{Event, SqliteStore};

use super::similarity::title_similarity;

/// Candidate window half-width around the snapshot's publish time.
const CANDIDATE_WINDOW_HOURS: i64 = 72;
/// Prefilter similarity floor.
const SIMILARITY_FLOOR: f64 = 0.15;
/// Candidates offered to the judge.
const MAX_CANDIDATES: usize = 10;

const PROCESSOR: &str = "cluster-judge";

#[derive(Debug, Deserialize)]
struct ClusterPayload {
    snapshot_id: i64,
    source_type: String,
    title: String,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
}

/// The judge's verdict as returned by the model.
#[derive(Debug, Deserialize)]
struct JudgeVerdict {
    #[serde(rename = "matchedEventId")]
    matched_event_id: Option<serde_json::Value>,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    reason: String,
}

pub struct ClusterHandler {
    store: SqliteStore,
    llm: Arc<LoggedLlm>,
}

impl ClusterHandler {
    pub fn new(store: SqliteStore, llm: Arc<LoggedLlm>) -> Self {
        Self { store, llm }
    }

    fn prefilter(&self, title: &str, candidates: Vec<Event>) -> Vec<(Event, f64)> {
        let mut scored: Vec<(Event, f64)> = candidates
            .into_iter()
            .map(|event| {
                let similarity = title_similarity(title, &event.title);
                (event, similarity)
            })
            .filter(|(_, similarity)| *similarity >= SIMILARITY_FLOOR)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(MAX_CANDIDATES);
        scored
    }

    fn judge_prompt(title: &str, candidates: &[(Event, f64)]) -> String {
        let mut prompt = String::from(
            "You deduplicate AI-news events. Given an incoming headline and candidate \
             events, decide whether the headline describes one of the candidates.\n\n",
        );
        prompt.push_str(&format!("Incoming headline: {title}\n\nCandidates:\n"));
        for (event, _) in candidates {
            prompt.push_str(&format!(
                "- {{\"id\": {}, \"title\": {:?}, \"sourceCount\": {}}}\n",
                event.id, event.title, event.source_count
            ));
        }
        prompt.push_str(
            "\nRespond with JSON only: {\"matchedEventId\": <id or null>, \
             \"confidence\": <0..1>, \"reason\": \"<= 200 chars\"}",
        );
        prompt
    }

    /// Parse the verdict and resolve it against the candidate list. Anything
    /// malformed resolves to `None` (decision `new`).
    fn resolve_verdict(raw: &str, candidates: &[(Event, f64)]) -> Option<(i64, f64, String)> {
        let json = extract_json(raw)?;
        let verdict: JudgeVerdict = serde_json::from_str(json).ok()?;
        let id = match verdict.matched_event_id? {
            serde_json::Value::Number(n) => n.as_i64()?,
            serde_json::Value::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        if !candidates.iter().any(|(event, _)| event.id == id) {
            return None;
        }
        let mut reason = verdict.reason;
        reason.truncate(200);
        Some((id, verdict.confidence, reason))
    }

    async fn process(&self, payload: ClusterPayload) -> JobOutcome {
        // Idempotency: a snapshot already linked to an event stays there.
        match self.store.snapshot_event(payload.snapshot_id) {
            Ok(Some(event_id)) => {
                return JobOutcome::Completed(json!({
                    "decision": "skipped",
                    "matched_event_id": event_id,
                    "snapshot_id": payload.snapshot_id,
                }));
            }
            Ok(None) => {}
            Err(e) => return JobOutcome::Failed(e.to_string()),
        }

        let published_at = payload.published_at.unwrap_or_else(Utc::now);
        let window = match self
            .store
            .events_in_window(published_at, Duration::hours(CANDIDATE_WINDOW_HOURS))
        {
            Ok(events) => events,
            Err(e) => return JobOutcome::Failed(e.to_string()),
        };
        let candidates = self.prefilter(&payload.title, window);

        let passthrough = json!({
            "snapshot_id": payload.snapshot_id,
            "source_type": payload.source_type,
            "title": payload.title,
            "published_at": published_at,
        });

        if candidates.is_empty() {
            debug!(snapshot_id = payload.snapshot_id, "no candidates, decision new");
            let mut result = passthrough;
            result["decision"] = json!("new");
            return JobOutcome::Completed(result);
        }

        let prompt = Self::judge_prompt(&payload.title, &candidates);
        let request =
            CompletionRequest::new(vec![ChatMessage::user(prompt)]).with_temperature(0.0);
        let input_key = format!("{}|{}", payload.snapshot_id, payload.title);

        let decision = match self
            .llm
            .complete_logged(request, PROCESSOR, None, &input_key)
            .await
        {
            Ok(response) => Self::resolve_verdict(&response.content, &candidates),
            // Network or provider failure: safe default, run already logged
            Err(e) => {
                debug!(error = %e, "judge call failed, decision new");
                None
            }
        };

        let mut result = passthrough;
        match decision {
            Some((event_id, confidence, reason)) => {
                info!(
                    snapshot_id = payload.snapshot_id,
                    matched_event_id = event_id,
                    confidence,
                    %reason,
                    "cluster decision: match"
                );
                result["decision"] = json!("match");
                result["matched_event_id"] = json!(event_id);
            }
            None => {
                info!(snapshot_id = payload.snapshot_id, "cluster decision: new");
                result["decision"] = json!("new");
            }
        }
        JobOutcome::Completed(result)
    }
}

#[async_trait]
impl JobHandler for ClusterHandler {
    async fn handle(&self, job: &Job) -> JobOutcome {
        let payload: ClusterPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(e) => return JobOutcome::Failed(format!("bad cluster payload: {e}")),
        };
        self.process(payload).await
    }
}
