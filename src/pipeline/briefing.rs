//! Daily roundtable briefing: select the day's top events, generate a
//! multi-persona dialogue, validate it, and persist one briefing per date.
//!
//! Validation failure falls back to a legacy single-turn prompt; if that
//! also fails nothing is persisted for the day.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::artifacts::extract_json;
use crate::llm::{ChatMessage, CompletionRequest, LoggedLlm};
use crate::queue::{Job, JobHandler, JobOutcome};
use crate::store::{ArtifactKind, Event, SqliteStore};

/// Events per briefing.
const TOP_N: usize = 5;

const ROUNDTABLE_PROCESSOR: &str = "briefing-roundtable";
const LEGACY_PROCESSOR: &str = "briefing-legacy";

/// The three roundtable personas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Persona {
    Gm,
    Engineer,
    Skeptic,
}

/// The seven move types a turn can make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MoveType {
    Setup,
    TechRead,
    RiskCheck,
    CrossExam,
    EvidenceCall,
    Takeaway,
    Cut,
}

/// One turn of the roundtable dialogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundtableTurn {
    pub persona: Persona,
    #[serde(rename = "move")]
    pub move_type: MoveType,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_ref: Option<u32>,
}

/// The model-facing roundtable shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundtablePayload {
    pub turns: Vec<RoundtableTurn>,
    pub prediction: String,
}

/// Check the structural rules of a roundtable payload against the number of
/// events it may reference. Returns every violation.
pub fn validate_roundtable(payload: &RoundtablePayload, event_count: usize) -> Vec<String> {
    let mut errors = Vec::new();
    let turns = &payload.turns;

    if !(4..=20).contains(&turns.len()) {
        errors.push(format!("{} turns, expected 4..=20", turns.len()));
    }
    match turns.first() {
        Some(first) if first.persona == Persona::Gm && first.move_type == MoveType::Setup => {}
        _ => errors.push("first turn must be GM/SETUP".into()),
    }
    match turns.last() {
        Some(last) if last.persona == Persona::Gm && last.move_type == MoveType::Takeaway => {}
        _ => errors.push("last turn must be GM/TAKEAWAY".into()),
    }
    if !turns
        .iter()
        .any(|t| t.persona == Persona::Engineer && t.move_type == MoveType::TechRead)
    {
        errors.push("missing Engineer/TECH_READ".into());
    }
    if !turns
        .iter()
        .any(|t| t.persona == Persona::Skeptic && t.move_type == MoveType::RiskCheck)
    {
        errors.push("missing Skeptic/RISK_CHECK".into());
    }
    for (i, turn) in turns.iter().enumerate() {
        if turn.text.trim().is_empty() {
            errors.push(format!("turn {i} has empty text"));
        }
        if let Some(event_ref) = turn.event_ref {
            if event_ref == 0 || event_ref as usize > event_count {
                errors.push(format!(
                    "turn {i} references event {event_ref}, valid range 1..={event_count}"
                ));
            }
        }
    }
    if payload.prediction.trim().is_empty() {
        errors.push("prediction is empty".into());
    }
    errors
}

pub struct BriefingHandler {
    store: SqliteStore,
    llm: Arc<LoggedLlm>,
}

impl BriefingHandler {
    pub fn new(store: SqliteStore, llm: Arc<LoggedLlm>) -> Self {
        Self { store, llm }
    }

    fn event_descriptors(&self, events: &[Event]) -> String {
        let mut descriptors = String::new();
        for (i, event) in events.iter().enumerate() {
            descriptors.push_str(&format!(
                "{}. {} (impact {}, {} sources)\n",
                i + 1,
                event.title,
                event.impact_level,
                event.source_count
            ));
            if let Ok(Some(summary)) = self.store.latest_artifact(event.id, ArtifactKind::Summary) {
                if let Some(what) = summary.payload["what_happened"].as_str() {
                    descriptors.push_str(&format!("   {what}\n"));
                }
            }
        }
        descriptors
    }

    fn roundtable_prompt(descriptors: &str, event_count: usize) -> String {
        format!(
            "Produce today's AI-news roundtable as JSON. Three personas discuss the \
             day's events: GM (moderator), ENGINEER (technical depth), SKEPTIC \
             (risk and hype control). Allowed move types: SETUP, TECH_READ, \
             RISK_CHECK, CROSS_EXAM, EVIDENCE_CALL, TAKEAWAY, CUT.\n\n\
             Today's events:\n{descriptors}\n\
             Rules:\n\
             - 4 to 20 turns\n\
             - first turn GM/SETUP, last turn GM/TAKEAWAY\n\
             - at least one ENGINEER/TECH_READ and one SKEPTIC/RISK_CHECK\n\
             - event_ref, when present, is an event number between 1 and {event_count}\n\n\
             Respond with JSON only:\n\
             {{\"turns\": [{{\"persona\": \"GM|ENGINEER|SKEPTIC\", \"move\": \"...\", \
             \"text\": \"...\", \"event_ref\": 1}}], \"prediction\": \"one-line prediction\"}}"
        )
    }

    fn legacy_prompt(descriptors: &str) -> String {
        format!(
            "Write a concise daily AI-news briefing (one paragraph, then one \
             prediction line) covering these events:\n{descriptors}\n\
             Respond with JSON only: {{\"text\": \"...\"}}"
        )
    }

    async fn try_roundtable(
        &self,
        descriptors: &str,
        event_count: usize,
        date: NaiveDate,
    ) -> Option<(serde_json::Value, String)> {
        let prompt = Self::roundtable_prompt(descriptors, event_count);
        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)]).with_temperature(0.7);
        let response = match self
            .llm
            .complete_logged(request, ROUNDTABLE_PROCESSOR, None, &date.to_string())
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "roundtable generation failed");
                return None;
            }
        };

        let payload: RoundtablePayload = match extract_json(&response.content)
            .and_then(|json| serde_json::from_str(json).ok())
        {
            Some(payload) => payload,
            None => {
                warn!("roundtable response did not parse");
                return None;
            }
        };

        let errors = validate_roundtable(&payload, event_count);
        if !errors.is_empty() {
            warn!(errors = %errors.join("; "), "roundtable failed validation");
            return None;
        }

        Some((
            json!({
                "format": "roundtable",
                "turns": payload.turns,
                "prediction": payload.prediction,
                "metadata": { "model": response.model, "generated_at": Utc::now() },
            }),
            response.model,
        ))
    }

    async fn try_legacy(
        &self,
        descriptors: &str,
        date: NaiveDate,
    ) -> Option<(serde_json::Value, String)> {
        let request =
            CompletionRequest::new(vec![ChatMessage::user(Self::legacy_prompt(descriptors))])
                .with_temperature(0.7);
        let response = match self
            .llm
            .complete_logged(request, LEGACY_PROCESSOR, None, &date.to_string())
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "legacy briefing generation failed");
                return None;
            }
        };

        let text = extract_json(&response.content)
            .and_then(|json| serde_json::from_str::<serde_json::Value>(json).ok())
            .and_then(|v| v["text"].as_str().map(str::to_string))
            .filter(|t| !t.trim().is_empty())?;

        Some((
            json!({
                "format": "legacy",
                "text": text,
                "metadata": { "model": response.model, "generated_at": Utc::now() },
            }),
            response.model,
        ))
    }

    pub(crate) async fn process(&self, date: NaiveDate) -> JobOutcome {
        let events = match self.store.top_events_for_day(date, TOP_N) {
            Ok(events) => events,
            Err(e) => return JobOutcome::Failed(e.to_string()),
        };
        if events.is_empty() {
            return JobOutcome::Skipped(format!("no published events on {date}"));
        }

        let descriptors = self.event_descriptors(&events);
        let top_event_ids: Vec<i64> = events.iter().map(|e| e.id).collect();

        let generated = match self.try_roundtable(&descriptors, events.len(), date).await {
            Some(generated) => Some(generated),
            None => self.try_legacy(&descriptors, date).await,
        };

        let Some((payload, model)) = generated else {
            warn!(%date, "briefing generation failed in both formats, nothing persisted");
            return JobOutcome::Completed(json!({ "date": date, "persisted": false }));
        };

        match self
            .store
            .upsert_daily_briefing(date, &payload, &top_event_ids)
        {
            Ok(briefing) => {
                info!(%date, %model, format = %payload["format"], "daily briefing persisted");
                JobOutcome::Completed(json!({
                    "date": date,
                    "persisted": true,
                    "briefing_id": briefing.id,
                    "format": payload["format"],
                }))
            }
            Err(e) => JobOutcome::Failed(e.to_string()),
        }
    }
}

#[async_trait]
impl JobHandler for BriefingHandler {
    async fn handle(&self, job: &Job) -> JobOutcome {
        let date = match job.payload["date"].as_str() {
            Some(raw) => match raw.parse() {
                Ok(date) => date,
                Err(e) => return JobOutcome::Failed(format!("bad briefing date {raw:?}: {e}")),
            },
            None => Utc::now().date_naive(),
        };
        self.process(date).await
    }
}
