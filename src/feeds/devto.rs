//! Dev.to adapter (public REST API).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::error::{Error, Result};

use super::types::{FetchOutcome, RawItem, SourceType};
use super::{http_client, FeedAdapter};

const API_URL: &str = "https://dev.to/api/articles?tag=ai&top=2&per_page=30";

#[derive(Debug, Deserialize)]
struct Article {
    id: i64,
    title: String,
    url: String,
    published_at: Option<DateTime<Utc>>,
    positive_reactions_count: Option<i64>,
    tag_list: Option<Vec<String>>,
    user: Option<Author>,
}

#[derive(Debug, Deserialize)]
struct Author {
    name: String,
}

pub struct DevtoAdapter {
    client: Client,
}

impl DevtoAdapter {
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
            .map_err(|e| Error::feed("devto", e.to_string()))?
            .text()
            .await?;
        Ok(FetchOutcome::items(parse_articles(&body)?))
    }
}

fn parse_articles(body: &str) -> Result<Vec<RawItem>> {
    let articles: Vec<Article> = serde_json::from_str(body)?;
    Ok(articles
        .into_iter()
        .map(|article| RawItem {
            source_type: SourceType::Devto,
            external_id: article.id.to_string(),
            url: article.url,
            title: article.title,
            author: article.user.map(|u| u.name),
            published_at: article.published_at,
            score: article.positive_reactions_count,
            tags: article.tag_list.unwrap_or_default(),
        })
        .collect())
}

#[async_trait]
impl FeedAdapter for DevtoAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::Devto
    }

    async fn fetch(&self) -> FetchOutcome {
        match self.fetch_inner().await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(source = "devto", error = %e, "feed fetch failed");
                FetchOutcome::failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_articles() {
        let body = r#"[{"id": 7, "title": "Shipping an agent in production",
            "url": "https://dev.to/a/agent", "published_at": "2026-01-10T08:00:00Z",
            "positive_reactions_count": 44, "tag_list": ["ai", "rust"],
            "user": {"name": "Dev Author"}}]"#;
        let items = parse_articles(body).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].external_id, "7");
        assert_eq!(items[0].author.as_deref(), Some("Dev Author"));
        assert_eq!(items[0].score, Some(44));
    }
}
