//! Feed adapters: one per external source, each normalizing into
//! [`RawItem`]s. Adapters are pure fetchers with no shared state; failures
//! never cross the adapter boundary.

pub mod arxiv;
pub mod devto;
pub mod github;
pub mod hn;
pub mod huggingface;
pub mod leaderboard;
pub mod lobsters;
pub mod newsapi;
pub mod oauth;
pub mod producthunt;
pub mod reddit;
pub mod types;
pub mod youtube;

pub use oauth::TokenCache;
pub use types::{FetchOutcome, RawItem, SourceType};

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::config::Config;

/// User agent sent on all feed requests; reddit in particular rejects
/// requests without one.
pub const USER_AGENT: &str = "observatory:ai-news:0.1 (by /u/observatory-bot)";

/// Minimum spacing between consecutive calls to a rate-limited source.
pub const RATE_LIMIT_INTERVAL: Duration = Duration::from_millis(1500);

/// A feed adapter. `fetch` returns whatever it collected plus warnings;
/// it MUST NOT error across this boundary.
#[async_trait]
pub trait FeedAdapter: Send + Sync {
    fn source_type(&self) -> SourceType;

    async fn fetch(&self) -> FetchOutcome;
}

/// Build the shared HTTP client for feed adapters.
pub(crate) fn http_client(timeout_secs: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Spaces consecutive calls to a rate-limited API.
pub(crate) struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval,
        }
    }

    pub async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(at) = *last {
            let elapsed = at.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Keyword filter for sources that are not AI-only.
pub(crate) fn is_ai_relevant(title: &str) -> bool {
    const KEYWORDS: [&str; 16] = [
        "ai", "llm", "gpt", "claude", "gemini", "model", "openai", "anthropic", "deepmind",
        "machine learning", "neural", "transformer", "agent", "inference", "diffusion", "rag",
    ];
    let lower = title.to_lowercase();
    KEYWORDS.iter().any(|k| {
        if k.len() <= 3 {
            // Short keywords must match whole words to avoid e.g. "paint"
            lower
                .split(|c: char| !c.is_alphanumeric())
                .any(|word| word == *k)
        } else {
            lower.contains(k)
        }
    })
}

/// Build the full adapter registry from configuration.
pub fn registry(config: &Config) -> Vec<Arc<dyn FeedAdapter>> {
    let timeout = config.fetch_timeout_secs;
    vec![
        Arc::new(hn::HackerNewsAdapter::new(timeout)),
        Arc::new(github::GithubAdapter::new(timeout, config.feeds.github_token.clone())),
        Arc::new(arxiv::ArxivAdapter::new(timeout)),
        Arc::new(reddit::RedditAdapter::new(
            timeout,
            config.feeds.reddit_client_id.clone(),
            config.feeds.reddit_client_secret.clone(),
        )),
        Arc::new(devto::DevtoAdapter::new(timeout)),
        Arc::new(lobsters::LobstersAdapter::new(timeout)),
        Arc::new(huggingface::HuggingFaceAdapter::new(timeout)),
        Arc::new(leaderboard::LeaderboardAdapter::new(timeout)),
        Arc::new(youtube::YoutubeAdapter::new(
            timeout,
            config.feeds.youtube_api_key.clone(),
        )),
        Arc::new(producthunt::ProductHuntAdapter::new(
            timeout,
            config.feeds.producthunt_api_key.clone(),
            config.feeds.producthunt_api_secret.clone(),
        )),
        Arc::new(newsapi::NewsApiAdapter::new(
            timeout,
            config.feeds.newsapi_key.clone(),
        )),
    ]
}
