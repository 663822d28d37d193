//! LLM client trait and the OpenAI-compatible provider implementation.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

use super::types::{
    ChatMessage, ChatRole, CompletionRequest, CompletionResponse, ModelPricing, Provider,
    TokenUsage,
};

/// LLM client trait for chat completions.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete a conversation.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Get the provider for this client.
    fn provider(&self) -> Provider;
}

/// Configuration for an OpenAI-compatible client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Endpoint base URL (e.g. `http://localhost:11434` or `https://api.deepseek.com`)
    pub base_url: String,
    /// API key, if the endpoint requires one
    pub api_key: Option<String>,
    /// Default model
    pub default_model: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            default_model: default_model.into(),
            timeout_secs: 60,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

// OpenAI-compatible API types
#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    model: Option<String>,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Client for any OpenAI-chat-completions-compatible endpoint (Ollama's
/// `/v1` surface, DeepSeek, ...).
pub struct OpenAiCompatClient {
    provider: Provider,
    config: ClientConfig,
    http: Client,
}

impl OpenAiCompatClient {
    pub fn new(provider: Provider, config: ClientConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            provider,
            config,
            http,
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let model = request
            .model
            .unwrap_or_else(|| self.config.default_model.clone());

        let messages: Vec<ApiMessage> = request
            .messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    ChatRole::System => "system".to_string(),
                    ChatRole::User => "user".to_string(),
                    ChatRole::Assistant => "assistant".to_string(),
                },
                content: m.content.clone(),
            })
            .collect();

        let api_request = ApiRequest {
            model: model.clone(),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let url = format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let started = Instant::now();
        let mut builder = self.http.post(&url).json(&api_request);
        if let Some(key) = &self.config.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::llm_api(self.provider.to_string(), format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::llm_api(self.provider.to_string(), format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ApiError>(&body) {
                return Err(Error::llm_api(
                    self.provider.to_string(),
                    format!("API error ({}): {}", status, error.error.message),
                ));
            }
            return Err(Error::llm_api(
                self.provider.to_string(),
                format!("API error ({}): {}", status, body),
            ));
        }

        let api_response: ApiResponse = serde_json::from_str(&body)
            .map_err(|e| Error::llm_api(self.provider.to_string(), format!("Failed to parse response: {}", e)))?;

        let choice = api_response
            .choices
            .first()
            .ok_or_else(|| Error::llm_api(self.provider.to_string(), "No choices in response"))?;

        let usage = api_response
            .usage
            .map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        let model = api_response.model.unwrap_or(model);
        let cost = ModelPricing::for_model(&model).calculate_cost(&usage);

        Ok(CompletionResponse {
            provider: self.provider,
            model,
            content: choice.message.content.clone(),
            usage,
            latency_ms: started.elapsed().as_millis() as u64,
            cost_usd: cost,
            timestamp: Utc::now(),
        })
    }

    fn provider(&self) -> Provider {
        self.provider
    }
}

/// Router over a primary and an optional backup provider. The primary is
/// tried first with the fast model; on failure the backup runs with the
/// backup model.
pub struct LlmRouter {
    primary: Arc<dyn LlmClient>,
    backup: Option<Arc<dyn LlmClient>>,
    model_fast: String,
    model_backup: String,
}

impl LlmRouter {
    pub fn new(primary: Arc<dyn LlmClient>, model_fast: impl Into<String>) -> Self {
        Self {
            primary,
            backup: None,
            model_fast: model_fast.into(),
            model_backup: String::new(),
        }
    }

    pub fn with_backup(mut self, backup: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        self.backup = Some(backup);
        self.model_backup = model.into();
        self
    }

    /// Build a router from the environment-derived LLM config.
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let mut primary: Option<Arc<dyn LlmClient>> = None;
        if let Some(base_url) = &cfg.ollama_base_url {
            let mut client_cfg =
                ClientConfig::new(base_url, &cfg.model_fast).with_timeout(cfg.timeout_secs);
            if let Some(key) = &cfg.ollama_api_key {
                client_cfg = client_cfg.with_api_key(key);
            }
            primary = Some(Arc::new(OpenAiCompatClient::new(Provider::Ollama, client_cfg)));
        }

        let deepseek: Option<Arc<dyn LlmClient>> = cfg.deepseek_api_key.as_ref().map(|key| {
            let client_cfg = ClientConfig::new("https://api.deepseek.com", &cfg.model_backup)
                .with_api_key(key)
                .with_timeout(cfg.timeout_secs);
            Arc::new(OpenAiCompatClient::new(Provider::DeepSeek, client_cfg)) as Arc<dyn LlmClient>
        });

        match (primary, deepseek) {
            (Some(primary), Some(backup)) => Ok(Self::new(primary, &cfg.model_fast)
                .with_backup(backup, &cfg.model_backup)),
            (Some(primary), None) => Ok(Self::new(primary, &cfg.model_fast)),
            (None, Some(backup)) => Ok(Self::new(backup, &cfg.model_backup)),
            (None, None) => Err(Error::Config(
                "no LLM provider configured".into(),
            )),
        }
    }
}

#[async_trait]
impl LlmClient for LlmRouter {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let mut primary_request = request.clone();
        if primary_request.model.is_none() {
            primary_request.model = Some(self.model_fast.clone());
        }

        match self.primary.complete(primary_request).await {
            Ok(response) => Ok(response),
            Err(primary_err) => {
                let Some(backup) = &self.backup else {
                    return Err(primary_err);
                };
                warn!(error = %primary_err, "primary LLM provider failed, trying backup");
                let mut backup_request = request;
                backup_request.model = Some(self.model_backup.clone());
                backup.complete(backup_request).await
            }
        }
    }

    fn provider(&self) -> Provider {
        self.primary.provider()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_builder() {
        let config = ClientConfig::new("http://localhost:11434", "qwen2.5:14b")
            .with_api_key("test-key")
            .with_timeout(30);

        assert_eq!(config.base_url, "http://localhost:11434");
        assert_eq!(config.api_key, Some("test-key".to_string()));
        assert_eq!(config.timeout_secs, 30);
    }

    #[tokio::test]
    async fn test_router_falls_back_to_backup() {
        use crate::llm::testing::ScriptedLlm;

        let primary = Arc::new(ScriptedLlm::failing(Provider::Ollama));
        let backup = Arc::new(ScriptedLlm::new(Provider::DeepSeek, vec!["ok".into()]));
        let router = LlmRouter::new(primary, "fast").with_backup(backup, "backup-model");

        let response = router
            .complete(CompletionRequest::new(vec![ChatMessage::user("hi")]))
            .await
            .unwrap();
        assert_eq!(response.content, "ok");
        assert_eq!(response.provider, Provider::DeepSeek);
    }

    #[tokio::test]
    async fn test_router_propagates_error_without_backup() {
        use crate::llm::testing::ScriptedLlm;

        let primary = Arc::new(ScriptedLlm::failing(Provider::Ollama));
        let router = LlmRouter::new(primary, "fast");

        let result = router
            .complete(CompletionRequest::new(vec![ChatMessage::user("hi")]))
            .await;
        assert!(result.is_err());
    }
}
