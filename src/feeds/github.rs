//! GitHub adapter: recently created AI repositories via the search API.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::error::{Error, Result};

use super::types::{FetchOutcome, RawItem, SourceType};
use super::{http_client, FeedAdapter};

const API_BASE: &str = "https://api.github.com";
const PAGE_SIZE: usize = 25;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    items: Vec<Repo>,
}

#[derive(Debug, Deserialize)]
struct Repo {
    id: i64,
    full_name: String,
    html_url: String,
    description: Option<String>,
    stargazers_count: i64,
    created_at: Option<DateTime<Utc>>,
    owner: Option<Owner>,
    topics: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct Owner {
    login: String,
}

pub struct GithubAdapter {
    client: Client,
    token: Option<String>,
}

impl GithubAdapter {
    pub fn new(timeout_secs: u64, token: Option<String>) -> Self {
        Self {
            client: http_client(timeout_secs),
            token,
        }
    }

    async fn fetch_inner(&self) -> Result<FetchOutcome> {
        let since = (Utc::now() - Duration::days(7)).format("%Y-%m-%d");
        let query = format!("topic:llm created:>{since}");
        let url = format!(
            "{API_BASE}/search/repositories?q={}&sort=stars&order=desc&per_page={PAGE_SIZE}",
            urlencoding::encode(&query)
        );

        let mut request = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let body = request
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::feed("github", e.to_string()))?
            .text()
            .await?;

        Ok(FetchOutcome::items(parse_search(&body)?))
    }
}

fn parse_search(body: &str) -> Result<Vec<RawItem>> {
    let response: SearchResponse = serde_json::from_str(body)?;
    Ok(response
        .items
        .into_iter()
        .map(|repo| {
            let title = match &repo.description {
                Some(desc) => format!("{}: {}", repo.full_name, desc),
                None => repo.full_name.clone(),
            };
            RawItem {
                source_type: SourceType::Github,
                external_id: repo.id.to_string(),
                url: repo.html_url,
                title,
                author: repo.owner.map(|o| o.login),
                published_at: repo.created_at,
                score: Some(repo.stargazers_count),
                tags: repo.topics.unwrap_or_default(),
            }
        })
        .collect())
}

#[async_trait]
impl FeedAdapter for GithubAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::Github
    }

    async fn fetch(&self) -> FetchOutcome {
        match self.fetch_inner().await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(source = "github", error = %e, "feed fetch failed");
                FetchOutcome::failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_response() {
        let body = r#"{"total_count": 1, "items": [{
            "id": 99, "full_name": "acme/llm-kit", "html_url": "https://github.com/acme/llm-kit",
            "description": "Toolkit for local inference", "stargazers_count": 1200,
            "created_at": "2026-01-20T12:00:00Z", "owner": {"login": "acme"},
            "topics": ["llm", "rust"]}]}"#;
        let items = parse_search(body).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "acme/llm-kit: Toolkit for local inference");
        assert_eq!(items[0].score, Some(1200));
        assert_eq!(items[0].tags, vec!["llm", "rust"]);
    }

    #[test]
    fn test_parse_rejects_malformed_body() {
        assert!(parse_search("<html>rate limited</html>").is_err());
    }
}
