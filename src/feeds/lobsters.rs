//! Lobsters adapter (`hottest.json`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::error::{Error, Result};

use super::types::{FetchOutcome, RawItem, SourceType};
use super::{http_client, is_ai_relevant, FeedAdapter};

const API_URL: &str = "https://lobste.rs/hottest.json";

#[derive(Debug, Deserialize)]
struct Story {
    short_id: String,
    title: String,
    url: Option<String>,
    comments_url: String,
    created_at: Option<DateTime<Utc>>,
    score: Option<i64>,
    tags: Option<Vec<String>>,
    submitter_user: Option<serde_json::Value>,
}

pub struct LobstersAdapter {
    client: Client,
}

impl LobstersAdapter {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            client: http_client(timeout_secs),
        }
    }

    async fn fetch_inner(&self) -> Result<FetchOutcome> {
        let body = self
            .client
            .get(API_URL)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::feed("lobsters", e.to_string()))?
            .text()
            .await?;
        Ok(FetchOutcome::items(parse_stories(&body)?))
    }
}

fn parse_stories(body: &str) -> Result<Vec<RawItem>> {
    let stories: Vec<Story> = serde_json::from_str(body)?;
    Ok(stories
        .into_iter()
        .filter(|story| {
            let tagged_ai = story
                .tags
                .as_ref()
                .is_some_and(|tags| tags.iter().any(|t| t == "ai" || t == "ml"));
            tagged_ai || is_ai_relevant(&story.title)
        })
        .map(|story| {
            // The submitter moved from an object to a plain username string
            // across API versions; accept both.
            let author = match &story.submitter_user {
                Some(serde_json::Value::String(name)) => Some(name.clone()),
                Some(serde_json::Value::Object(map)) => map
                    .get("username")
                    .and_then(|v| v.as_str())
                    .map(String::from),
                _ => None,
            };
            let url = match &story.url {
                Some(url) if !url.is_empty() => url.clone(),
                _ => story.comments_url.clone(),
            };
            RawItem {
                source_type: SourceType::Lobsters,
                external_id: story.short_id,
                url,
                title: story.title,
                author,
                published_at: story.created_at,
                score: story.score,
                tags: story.tags.unwrap_or_default(),
            }
        })
        .collect())
}

#[async_trait]
impl FeedAdapter for LobstersAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::Lobsters
    }

    async fn fetch(&self) -> FetchOutcome {
        match self.fetch_inner().await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(source = "lobsters", error = %e, "feed fetch failed");
                FetchOutcome::failed(e.to_string())
            }
        }
    }
}
