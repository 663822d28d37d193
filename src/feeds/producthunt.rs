//! Product Hunt adapter: OAuth2 client-credentials plus the GraphQL API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::error::{Error, Result};

use super::oauth::TokenCache;
use super::types::{FetchOutcome, RawItem, SourceType};
use super::{http_client, FeedAdapter, RateLimiter, RATE_LIMIT_INTERVAL};

const TOKEN_URL: &str = "https://api.producthunt.com/v2/oauth/token";
const GRAPHQL_URL: &str = "https://api.producthunt.com/v2/api/graphql";

const POSTS_QUERY: &str = r#"
query {
  posts(topic: "artificial-intelligence", order: RANKING, first: 20) {
    edges {
      node { id name tagline url votesCount createdAt }
    }
  }
}"#;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    data: Option<PostsData>,
}

#[derive(Debug, Deserialize)]
struct PostsData {
    posts: PostsConnection,
}

#[derive(Debug, Deserialize)]
struct PostsConnection {
    edges: Vec<PostEdge>,
}

#[derive(Debug, Deserialize)]
struct PostEdge {
    node: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    id: String,
    name: String,
    tagline: Option<String>,
    url: String,
    #[serde(rename = "votesCount")]
    votes_count: Option<i64>,
    #[serde(rename = "createdAt")]
    created_at: Option<DateTime<Utc>>,
}

pub struct ProductHuntAdapter {
    client: Client,
    api_key: Option<String>,
    api_secret: Option<String>,
    tokens: TokenCache,
    limiter: RateLimiter,
}

impl ProductHuntAdapter {
    pub fn new(timeout_secs: u64, api_key: Option<String>, api_secret: Option<String>) -> Self {
        Self {
            client: http_client(timeout_secs),
            api_key,
            api_secret,
            tokens: TokenCache::new(),
            limiter: RateLimiter::new(RATE_LIMIT_INTERVAL),
        }
    }

    async fn access_token(&self, api_key: &str, api_secret: &str) -> Result<String> {
        self.tokens
            .get_or_fetch(|| async {
                self.limiter.acquire().await;
                let response: TokenResponse = self
                    .client
                    .post(TOKEN_URL)
                    .json(&json!({
                        "client_id": api_key,
                        "client_secret": api_secret,
                        "grant_type": "client_credentials",
                    }))
                    .send()
                    .await?
                    .error_for_status()
                    .map_err(|e| Error::feed("producthunt", format!("token request: {e}")))?
                    .json()
                    .await?;
                // Client-credentials tokens are long-lived; default to a day
                Ok((response.access_token, response.expires_in.unwrap_or(86_400)))
            })
            .await
    }

    async fn fetch_inner(&self) -> Result<FetchOutcome> {
        let (Some(api_key), Some(api_secret)) = (&self.api_key, &self.api_secret) else {
            warn!(source = "producthunt", "credentials missing, skipping fetch");
            return Ok(FetchOutcome::failed(
                "PRODUCTHUNT_API_KEY/SECRET not configured",
            ));
        };

        let token = self.access_token(api_key, api_secret).await?;

        self.limiter.acquire().await;
        let body = self
            .client
            .post(GRAPHQL_URL)
            .header("Authorization", format!("Bearer {token}"))
            .json(&json!({ "query": POSTS_QUERY }))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::feed("producthunt", e.to_string()))?
            .text()
            .await?;

        Ok(FetchOutcome::items(parse_posts(&body)?))
    }
}

fn parse_posts(body: &str) -> Result<Vec<RawItem>> {
    let response: GraphqlResponse = serde_json::from_str(body)?;
    let edges = response
        .data
        .map(|d| d.posts.edges)
        .ok_or_else(|| Error::feed("producthunt", "GraphQL response missing data"))?;

    Ok(edges
        .into_iter()
        .map(|edge| {
            let post = edge.node;
            let title = match &post.tagline {
                Some(tagline) => format!("{}: {}", post.name, tagline),
                None => post.name.clone(),
            };
            RawItem {
                source_type: SourceType::ProductHunt,
                external_id: post.id,
                url: post.url,
                title,
                author: None,
                published_at: post.created_at,
                score: post.votes_count,
                tags: Vec::new(),
            }
        })
        .collect())
}

#[async_trait]
impl FeedAdapter for ProductHuntAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::ProductHunt
    }

    async fn fetch(&self) -> FetchOutcome {
        match self.fetch_inner().await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(source = "producthunt", error = %e, "feed fetch failed");
                FetchOutcome::failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_posts() {
        let body = r#"{"data": {"posts": {"edges": [
            {"node": {"id": "p1", "name": "AgentKit", "tagline": "Ship agents fast",
             "url": "https://producthunt.com/posts/agentkit", "votesCount": 300,
             "createdAt": "2026-01-30T00:00:00Z"}}
        ]}}}"#;
        let items = parse_posts(body).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "AgentKit: Ship agents fast");
        assert_eq!(items[0].score, Some(300));
    }

    #[test]
    fn test_parse_rejects_missing_data() {
        assert!(parse_posts(r#"{"errors": [{"message": "unauthorized"}]}"#).is_err());
    }

    #[tokio::test]
    async fn test_missing_credentials_yield_empty_with_warning() {
        let adapter = ProductHuntAdapter::new(2, None, None);
        let outcome = adapter.fetch().await;
        assert!(outcome.items.is_empty());
        assert_eq!(outcome.warnings.len(), 1);
    }
}
