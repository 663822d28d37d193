//! Event materializer: turn a cluster decision into event rows and evidence
//! links.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::error::Result;
use crate::feeds::SourceType;
use crate::queue::{Job, JobHandler, JobOutcome};
use crate::store::{EvidenceRole, SqliteStore};

use super::fingerprint::fingerprint;

/// An event with this many supporting sources takes further evidence as
/// CONTEXT.
const SUPPORTING_CAP: i64 = 3;

#[derive(Debug, Deserialize)]
struct MaterializePayload {
    decision: String,
    snapshot_id: i64,
    source_type: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    matched_event_id: Option<i64>,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
}

pub struct MaterializeHandler {
    store: SqliteStore,
}

impl MaterializeHandler {
    pub fn new(store: SqliteStore) -> Self {
        Self { store }
    }

    /// Attach the snapshot to an existing event. The role downgrades to
    /// CONTEXT once the event carries enough supporting evidence.
    fn attach(&self, event_id: i64, snapshot_id: i64) -> Result<serde_json::Value> {
        let role = if self.store.supporting_count(event_id)? >= SUPPORTING_CAP {
            EvidenceRole::Context
        } else {
            EvidenceRole::Supporting
        };
        let linked = self.store.link_evidence(event_id, snapshot_id, role)?;
        if linked {
            info!(event_id, snapshot_id, role = role.as_str(), "evidence attached");
        }
        Ok(json!({ "event_id": event_id, "created": false, "linked": linked }))
    }

    fn process(&self, payload: MaterializePayload) -> Result<JobOutcome> {
        match payload.decision.as_str() {
            "match" => {
                let Some(event_id) = payload.matched_event_id else {
                    return Ok(JobOutcome::Failed("match decision without event id".into()));
                };
                Ok(JobOutcome::Completed(self.attach(event_id, payload.snapshot_id)?))
            }
            "new" => {
                let Some(title) = payload.title.as_deref() else {
                    return Ok(JobOutcome::Failed("new decision without title".into()));
                };
                let source_type: SourceType = match payload.source_type.parse() {
                    Ok(source_type) => source_type,
                    Err(e) => return Ok(JobOutcome::Failed(e.to_string())),
                };
                let occurred_at = payload.published_at.unwrap_or_else(Utc::now);
                let fp = fingerprint(source_type, occurred_at.date_naive(), title);

                let (event, created) = self.store.create_event_with_primary(
                    &fp,
                    title,
                    occurred_at,
                    payload.snapshot_id,
                )?;
                if created {
                    info!(event_id = event.id, fingerprint = %fp, "event materialized");
                    Ok(JobOutcome::Completed(
                        json!({ "event_id": event.id, "created": true, "linked": true }),
                    ))
                } else {
                    // Lost the fingerprint race: treat as a match
                    Ok(JobOutcome::Completed(self.attach(event.id, payload.snapshot_id)?))
                }
            }
            other => Ok(JobOutcome::Skipped(format!("decision {other}, nothing to do"))),
        }
    }
}

#[async_trait]
impl JobHandler for MaterializeHandler {
    async fn handle(&self, job: &Job) -> JobOutcome {
        let payload: MaterializePayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(e) => return JobOutcome::Failed(format!("bad materialize payload: {e}")),
        };
        match self.process(payload) {
            Ok(outcome) => outcome,
            Err(e) => JobOutcome::Failed(e.to_string()),
        }
    }
}
