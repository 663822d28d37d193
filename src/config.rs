//! Environment-driven configuration.
//!
//! Read once at startup (after `dotenv().ok()`) into an owned [`Config`]
//! that long-lived components borrow. Per-source credentials are optional;
//! adapters without credentials return empty fetches and log a warning.

use crate::error::{Error, Result};

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

/// LLM endpoint configuration. Primary is an OpenAI-compatible endpoint
/// (typically Ollama); DeepSeek serves as the hosted fallback.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Primary endpoint base URL (OpenAI chat-completions compatible)
    pub ollama_base_url: Option<String>,
    /// Primary endpoint API key, if the endpoint requires one
    pub ollama_api_key: Option<String>,
    /// DeepSeek API key (fallback provider)
    pub deepseek_api_key: Option<String>,
    /// Model used for high-volume pipeline calls
    pub model_fast: String,
    /// Model used when the primary provider is unavailable
    pub model_backup: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// Per-source feed credentials.
#[derive(Debug, Clone, Default)]
pub struct FeedCredentials {
    pub reddit_client_id: Option<String>,
    pub reddit_client_secret: Option<String>,
    pub youtube_api_key: Option<String>,
    pub producthunt_api_key: Option<String>,
    pub producthunt_api_secret: Option<String>,
    pub newsapi_key: Option<String>,
    pub github_token: Option<String>,
}

/// Top-level runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database path (store and queue substrate share it)
    pub db_path: String,
    /// Broadcast endpoint for new-event notifications
    pub broadcast_url: String,
    /// Cron pattern for the feed ingest trigger
    pub ingest_cron: String,
    /// Cron pattern for the daily briefing trigger
    pub briefing_cron: String,
    /// Per-queue worker concurrency
    pub worker_concurrency: usize,
    /// HTTP fetch timeout for snapshot retrieval, seconds
    pub fetch_timeout_secs: u64,
    pub llm: LlmConfig,
    pub feeds: FeedCredentials,
}

impl Config {
    /// Build configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        let llm = LlmConfig {
            ollama_base_url: env_opt("OLLAMA_BASE_URL"),
            ollama_api_key: env_opt("OLLAMA_API_KEY"),
            deepseek_api_key: env_opt("DEEPSEEK_API_KEY"),
            model_fast: env_or("LLM_MODEL_FAST", "qwen2.5:14b"),
            model_backup: env_or("LLM_MODEL_BACKUP", "deepseek-chat"),
            timeout_secs: env_or("LLM_TIMEOUT_SECS", "60")
                .parse()
                .map_err(|_| Error::Config("LLM_TIMEOUT_SECS must be an integer".into()))?,
        };

        if llm.ollama_base_url.is_none() && llm.deepseek_api_key.is_none() {
            return Err(Error::Config(
                "no LLM provider configured: set OLLAMA_BASE_URL or DEEPSEEK_API_KEY".into(),
            ));
        }

        let feeds = FeedCredentials {
            reddit_client_id: env_opt("REDDIT_CLIENT_ID"),
            reddit_client_secret: env_opt("REDDIT_CLIENT_SECRET"),
            youtube_api_key: env_opt("YOUTUBE_API_KEY"),
            producthunt_api_key: env_opt("PRODUCTHUNT_API_KEY"),
            producthunt_api_secret: env_opt("PRODUCTHUNT_API_SECRET"),
            newsapi_key: env_opt("NEWSAPI_KEY"),
            github_token: env_opt("GITHUB_TOKEN"),
        };

        Ok(Self {
            db_path: env_or("OBSERVATORY_DB", "observatory.db"),
            broadcast_url: env_or(
                "BROADCAST_URL",
                "http://127.0.0.1:3000/api/sse/broadcast",
            ),
            ingest_cron: env_or("INGEST_CRON", "0 0 */2 * * *"),
            briefing_cron: env_or("BRIEFING_CRON", "0 0 5 * * *"),
            worker_concurrency: env_or("WORKER_CONCURRENCY", "4")
                .parse()
                .map_err(|_| Error::Config("WORKER_CONCURRENCY must be an integer".into()))?,
            fetch_timeout_secs: env_or("FETCH_TIMEOUT_SECS", "15")
                .parse()
                .map_err(|_| Error::Config("FETCH_TIMEOUT_SECS must be an integer".into()))?,
            llm,
            feeds,
        })
    }

    /// A config suitable for tests: in-memory-ish paths, no credentials.
    #[cfg(test)]
    pub fn for_tests(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            broadcast_url: "http://127.0.0.1:0/api/sse/broadcast".into(),
            ingest_cron: "0 0 */2 * * *".into(),
            briefing_cron: "0 0 5 * * *".into(),
            worker_concurrency: 2,
            fetch_timeout_secs: 2,
            llm: LlmConfig {
                ollama_base_url: Some("http://127.0.0.1:0".into()),
                ollama_api_key: None,
                deepseek_api_key: None,
                model_fast: "test-fast".into(),
                model_backup: "test-backup".into(),
                timeout_secs: 2,
            },
            feeds: FeedCredentials::default(),
        }
    }
}
