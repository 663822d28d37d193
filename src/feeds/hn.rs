//! Hacker News adapter (Firebase JSON API).

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::error::{Error, Result};

use super::types::{FetchOutcome, RawItem, SourceType};
use super::{http_client, is_ai_relevant, FeedAdapter};

const API_BASE: &str = "https://hacker-news.firebaseio.com/v0";
const TOP_STORIES_LIMIT: usize = 30;

#[derive(Debug, Deserialize)]
struct HnItem {
    id: i64,
    title: Option<String>,
    url: Option<String>,
    by: Option<String>,
    time: Option<i64>,
    score: Option<i64>,
    #[serde(rename = "type")]
    item_type: Option<String>,
}

pub struct HackerNewsAdapter {
    client: Client,
}

impl HackerNewsAdapter {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            client: http_client(timeout_secs),
        }
    }

    async fn fetch_inner(&self) -> Result<FetchOutcome> {
        let ids: Vec<i64> = self
            .client
            .get(format!("{API_BASE}/topstories.json"))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::feed("hackernews", e.to_string()))?
            .json()
            .await?;

        let mut outcome = FetchOutcome::default();
        for id in ids.into_iter().take(TOP_STORIES_LIMIT) {
            let item: HnItem = match self
                .client
                .get(format!("{API_BASE}/item/{id}.json"))
                .send()
                .await
                .and_then(|r| r.error_for_status())
            {
                Ok(response) => match response.json().await {
                    Ok(item) => item,
                    Err(e) => {
                        outcome.warnings.push(format!("item {id} unparseable: {e}"));
                        continue;
                    }
                },
                Err(e) => {
                    outcome.warnings.push(format!("item {id} fetch failed: {e}"));
                    continue;
                }
            };
            if let Some(raw) = normalize(item) {
                outcome.items.push(raw);
            }
        }
        Ok(outcome)
    }
}

fn normalize(item: HnItem) -> Option<RawItem> {
    if item.item_type.as_deref() != Some("story") {
        return None;
    }
    let title = item.title?;
    if !is_ai_relevant(&title) {
        return None;
    }
    let url = item
        .url
        .unwrap_or_else(|| format!("https://news.ycombinator.com/item?id={}", item.id));
    Some(RawItem {
        source_type: SourceType::HackerNews,
        external_id: item.id.to_string(),
        url,
        title,
        author: item.by,
        published_at: item.time.and_then(|t| DateTime::from_timestamp(t, 0)),
        score: item.score,
        tags: Vec::new(),
    })
}

#[async_trait]
impl FeedAdapter for HackerNewsAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::HackerNews
    }

    async fn fetch(&self) -> FetchOutcome {
        match self.fetch_inner().await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(source = "hackernews", error = %e, "feed fetch failed");
                FetchOutcome::failed(e.to_string())
            }
        }
    }
}
