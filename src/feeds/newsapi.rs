//! NewsAPI adapter (`/v2/everything`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::error::{Error, Result};

use super::types::{FetchOutcome, RawItem, SourceType};
use super::{http_client, FeedAdapter, RateLimiter, RATE_LIMIT_INTERVAL};

const API_BASE: &str = "https://newsapi.org/v2/everything";

#[derive(Debug, Deserialize)]
struct NewsResponse {
    articles: Vec<NewsArticle>,
}

#[derive(Debug, Deserialize)]
struct NewsArticle {
    title: Option<String>,
    url: String,
    author: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: Option<DateTime<Utc>>,
}

pub struct NewsApiAdapter {
    client: Client,
    api_key: Option<String>,
    limiter: RateLimiter,
}

impl NewsApiAdapter {
    pub fn new(timeout_secs: u64, api_key: Option<String>) -> Self {
        Self {
            client: http_client(timeout_secs),
            api_key,
            limiter: RateLimiter::new(RATE_LIMIT_INTERVAL),
        }
    }

    async fn fetch_inner(&self) -> Result<FetchOutcome> {
        let Some(api_key) = &self.api_key else {
            warn!(source = "newsapi", "credentials missing, skipping fetch");
            return Ok(FetchOutcome::failed("NEWSAPI_KEY not configured"));
        };

        self.limiter.acquire().await;
        let query = "\"artificial intelligence\" OR LLM OR OpenAI OR Anthropic";
        let url = format!(
            "{API_BASE}?q={}&language=en&sortBy=publishedAt&pageSize=50",
            urlencoding::encode(query)
        );
        let body = self
            .client
            .get(&url)
            .header("X-Api-Key", api_key)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::feed("newsapi", e.to_string()))?
            .text()
            .await?;

        Ok(FetchOutcome::items(parse_articles(&body)?))
    }
}

fn parse_articles(body: &str) -> Result<Vec<RawItem>> {
    let response: NewsResponse = serde_json::from_str(body)?;
    Ok(response
        .articles
        .into_iter()
        .filter_map(|article| {
            let title = article.title.filter(|t| t != "[Removed]")?;
            Some(RawItem {
                source_type: SourceType::NewsApi,
                external_id: article.url.clone(),
                url: article.url,
                title,
                author: article.author,
                published_at: article.published_at,
                score: None,
                tags: Vec::new(),
            })
        })
        .collect())
}

#[async_trait]
impl FeedAdapter for NewsApiAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::NewsApi
    }

    async fn fetch(&self) -> FetchOutcome {
        match self.fetch_inner().await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(source = "newsapi", error = %e, "feed fetch failed");
                FetchOutcome::failed(e.to_string())
            }
        }
    }
}
