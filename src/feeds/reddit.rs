//! Reddit adapter: OAuth2 client-credentials grant plus JSON listings.

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::error::{Error, Result};

use super::oauth::TokenCache;
use super::types::{FetchOutcome, RawItem, SourceType};
use super::{http_client, FeedAdapter, RateLimiter, RATE_LIMIT_INTERVAL};

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const LISTING_URL: &str =
    "https://oauth.reddit.com/r/MachineLearning+LocalLLaMA+artificial/hot?limit=50";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
struct ListingChild {
    data: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    id: String,
    title: String,
    permalink: String,
    url: Option<String>,
    author: Option<String>,
    created_utc: Option<f64>,
    score: Option<i64>,
    is_self: Option<bool>,
    link_flair_text: Option<String>,
}

pub struct RedditAdapter {
    client: Client,
    client_id: Option<String>,
    client_secret: Option<String>,
    tokens: TokenCache,
    limiter: RateLimiter,
}

impl RedditAdapter {
    pub fn new(timeout_secs: u64, client_id: Option<String>, client_secret: Option<String>) -> Self {
        Self {
            client: http_client(timeout_secs),
            client_id,
            client_secret,
            tokens: TokenCache::new(),
            limiter: RateLimiter::new(RATE_LIMIT_INTERVAL),
        }
    }

    async fn access_token(&self, client_id: &str, client_secret: &str) -> Result<String> {
        self.tokens
            .get_or_fetch(|| async {
                self.limiter.acquire().await;
                let response: TokenResponse = self
                    .client
                    .post(TOKEN_URL)
                    .basic_auth(client_id, Some(client_secret))
                    .form(&[("grant_type", "client_credentials")])
                    .send()
                    .await?
                    .error_for_status()
                    .map_err(|e| Error::feed("reddit", format!("token request: {e}")))?
                    .json()
                    .await?;
                Ok((response.access_token, response.expires_in))
            })
            .await
    }

    async fn fetch_inner(&self) -> Result<FetchOutcome> {
        let (Some(client_id), Some(client_secret)) = (&self.client_id, &self.client_secret) else {
            warn!(source = "reddit", "credentials missing, skipping fetch");
            return Ok(FetchOutcome::failed("REDDIT_CLIENT_ID/SECRET not configured"));
        };

        let token = self.access_token(client_id, client_secret).await?;

        self.limiter.acquire().await;
        let body = self
            .client
            .get(LISTING_URL)
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::feed("reddit", e.to_string()))?
            .text()
            .await?;

        Ok(FetchOutcome::items(parse_listing(&body)?))
    }
}

fn parse_listing(body: &str) -> Result<Vec<RawItem>> {
    let listing: Listing = serde_json::from_str(body)?;
    Ok(listing
        .data
        .children
        .into_iter()
        .map(|child| {
            let post = child.data;
            // Self posts link back to the thread; link posts keep the target
            let url = match (post.is_self.unwrap_or(false), post.url) {
                (false, Some(url)) if !url.is_empty() => url,
                _ => format!("https://www.reddit.com{}", post.permalink),
            };
            RawItem {
                source_type: SourceType::Reddit,
                external_id: post.id,
                url,
                title: post.title,
                author: post.author,
                published_at: post
                    .created_utc
                    .and_then(|t| DateTime::from_timestamp(t as i64, 0)),
                score: post.score,
                tags: post.link_flair_text.into_iter().collect(),
            }
        })
        .collect())
}

#[async_trait]
impl FeedAdapter for RedditAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::Reddit
    }

    async fn fetch(&self) -> FetchOutcome {
        match self.fetch_inner().await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(source = "reddit", error = %e, "feed fetch failed");
                FetchOutcome::failed(e.to_string())
            }
        }
    }
}
