//! Snapshot processor: canonicalize the URL, fetch the body, and persist an
//! evidence snapshot. Idempotent on `(canonical_url, content_hash)` within a
//! short window.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::time::Duration as StdDuration;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::queue::{Job, JobHandler, JobOutcome};
use crate::store::{trust_tier_for_domain, SqliteStore};

/// Tracking parameters stripped during canonicalization.
const TRACKING_PARAMS: [&str; 4] = ["utm_source", "utm_medium", "utm_campaign", "ref"];

/// Window within which an identical-hash snapshot is reused.
const DEDUP_WINDOW_HOURS: i64 = 24;

/// Canonicalize a URL: force https, strip tracking parameters, drop the
/// fragment, and strip the trailing slash. Idempotent.
pub fn canonicalize_url(raw: &str) -> Result<String> {
    let mut url = url::Url::parse(raw.trim())
        .map_err(|e| Error::Internal(format!("unparseable URL {raw:?}: {e}")))?;

    match url.scheme() {
        "http" => {
            let _ = url.set_scheme("https");
        }
        "https" => {}
        other => {
            return Err(Error::Internal(format!("unsupported URL scheme: {other}")));
        }
    }

    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !TRACKING_PARAMS.contains(&key.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        let query: String = kept
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    urlencoding::encode(k).into_owned()
                } else {
                    format!("{}={}", urlencoding::encode(k), urlencoding::encode(v))
                }
            })
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(Some(&query));
    }

    let mut canonical = url.to_string();
    // Trailing slash carries no identity; query-less URLs also lose the
    // root-path slash.
    if let Some(stripped) = canonical.strip_suffix('/') {
        canonical = stripped.to_string();
    }
    Ok(canonical)
}

/// Host portion of a canonical URL.
pub fn domain_of(canonical: &str) -> String {
    url::Url::parse(canonical)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
struct SnapshotPayload {
    url: String,
    source_type: String,
    title: String,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
}

pub struct SnapshotHandler {
    store: SqliteStore,
    client: Client,
}

impl SnapshotHandler {
    pub fn new(store: SqliteStore, fetch_timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(StdDuration::from_secs(fetch_timeout_secs))
            .user_agent(crate::feeds::USER_AGENT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { store, client }
    }

    /// Fetch the body; failures still produce a snapshot row with the status
    /// code (0 when the request never completed) and an empty body.
    async fn fetch_body(&self, url: &str) -> (u16, String) {
        match self.client.get(url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                (status, body)
            }
            Err(e) => {
                warn!(url, error = %e, "snapshot fetch failed");
                (0, String::new())
            }
        }
    }

    async fn process(&self, payload: SnapshotPayload) -> Result<serde_json::Value> {
        let canonical = canonicalize_url(&payload.url)?;
        let domain = domain_of(&canonical);
        let trust_tier = trust_tier_for_domain(&domain);

        let source = self
            .store
            .upsert_source(&payload.url, &canonical, &domain, trust_tier)?;

        let (http_status, body) = self.fetch_body(&canonical).await;
        let content_hash = format!("{:x}", Sha256::digest(body.as_bytes()));

        let snapshot = match self.store.find_recent_snapshot(
            source.id,
            &content_hash,
            Duration::hours(DEDUP_WINDOW_HOURS),
        )? {
            Some(existing) => {
                debug!(snapshot_id = existing.id, "reusing identical snapshot");
                existing
            }
            None => self.store.insert_snapshot(
                source.id,
                &payload.title,
                payload.author.as_deref(),
                payload.published_at,
                &content_hash,
                if body.is_empty() { None } else { Some(&body) },
                http_status,
            )?,
        };

        Ok(json!({
            "snapshot_id": snapshot.id,
            "source_id": source.id,
            "source_type": payload.source_type,
            "title": payload.title,
            "published_at": payload.published_at,
        }))
    }
}

#[async_trait]
impl JobHandler for SnapshotHandler {
    async fn handle(&self, job: &Job) -> JobOutcome {
        let payload: SnapshotPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(e) => return JobOutcome::Failed(format!("bad snapshot payload: {e}")),
        };
        match self.process(payload).await {
            Ok(result) => JobOutcome::Completed(result),
            Err(e) => JobOutcome::Failed(e.to_string()),
        }
    }
}
