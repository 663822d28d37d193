//! LLM leaderboard adapter.
//!
//! The leaderboard endpoint is configurable; the default points at the Open
//! LLM Leaderboard rows API. Rows are tolerated loosely: anything with a
//! model name is kept, everything else becomes a warning.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::warn;

use crate::error::{Error, Result};

use super::types::{FetchOutcome, RawItem, SourceType};
use super::{http_client, FeedAdapter};

const DEFAULT_URL: &str = "https://datasets-server.huggingface.co/rows?dataset=open-llm-leaderboard%2Fcontents&config=default&split=train&length=25";

pub struct LeaderboardAdapter {
    client: Client,
    url: String,
}

impl LeaderboardAdapter {
    pub fn new(timeout_secs: u64) -> Self {
        let url = std::env::var("LEADERBOARD_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
        Self {
            client: http_client(timeout_secs),
            url,
        }
    }

    async fn fetch_inner(&self) -> Result<FetchOutcome> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::feed("leaderboard", e.to_string()))?
            .text()
            .await?;
        parse_rows(&body)
    }
}

/// Accepts either the datasets-server shape `{"rows": [{"row": {...}}]}` or
/// a bare JSON array of row objects.
fn parse_rows(body: &str) -> Result<FetchOutcome> {
    let value: Value = serde_json::from_str(body)?;
    let rows: Vec<Value> = match value {
        Value::Array(rows) => rows,
        Value::Object(ref map) => map
            .get("rows")
            .and_then(|r| r.as_array())
            .map(|rows| {
                rows.iter()
                    .map(|entry| entry.get("row").cloned().unwrap_or_else(|| entry.clone()))
                    .collect()
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    };

    let mut outcome = FetchOutcome::default();
    for row in rows {
        let Some(model) = row
            .get("fullname")
            .or_else(|| row.get("model"))
            .or_else(|| row.get("eval_name"))
            .and_then(|v| v.as_str())
        else {
            outcome.warnings.push("row without a model name".into());
            continue;
        };
        let score = row
            .get("Average ⬆️")
            .or_else(|| row.get("average"))
            .or_else(|| row.get("score"))
            .and_then(|v| v.as_f64());
        outcome.items.push(RawItem {
            source_type: SourceType::Leaderboard,
            external_id: model.to_string(),
            url: format!("https://huggingface.co/{model}"),
            title: format!("{model} climbs the LLM leaderboard"),
            author: None,
            published_at: None,
            score: score.map(|s| s.round() as i64),
            tags: Vec::new(),
        });
    }
    Ok(outcome)
}

#[async_trait]
impl FeedAdapter for LeaderboardAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::Leaderboard
    }

    async fn fetch(&self) -> FetchOutcome {
        match self.fetch_inner().await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(source = "leaderboard", error = %e, "feed fetch failed");
                FetchOutcome::failed(e.to_string())
            }
        }
    }
}
