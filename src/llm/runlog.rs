//! LLM run logging: every call is recorded as an immutable audit row with
//! prompt/input hashes, token usage, cost, and latency.

use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::error::Result;
use crate::store::{NewLlmRun, SqliteStore};

use super::client::LlmClient;
use super::types::{CompletionRequest, CompletionResponse};

/// SHA-256 hex digest truncated to 32 characters.
pub fn hash32(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let hex = format!("{:x}", digest);
    hex[..32].to_string()
}

/// Wraps an [`LlmClient`] so every call, including failures, lands in the
/// `llm_runs` table.
pub struct LoggedLlm {
    client: Arc<dyn LlmClient>,
    store: SqliteStore,
}

impl LoggedLlm {
    pub fn new(client: Arc<dyn LlmClient>, store: SqliteStore) -> Self {
        Self { client, store }
    }

    /// Complete a request and record the run. `input_key` identifies the
    /// logical input (event id plus the fields the prompt was built from) so
    /// repeated calls over the same input share an `input_hash`.
    pub async fn complete_logged(
        &self,
        request: CompletionRequest,
        processor: &str,
        event_id: Option<i64>,
        input_key: &str,
    ) -> Result<CompletionResponse> {
        let prompt: String = request
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let prompt_hash = hash32(&prompt);
        let input_hash = hash32(input_key);
        let requested_model = request.model.clone().unwrap_or_default();

        let started = Instant::now();
        let result = self.client.complete(request).await;

        let run = match &result {
            Ok(response) => NewLlmRun {
                provider: response.provider.to_string(),
                model: response.model.clone(),
                input_tokens: response.usage.input_tokens as i64,
                output_tokens: response.usage.output_tokens as i64,
                cost_usd: response.cost_usd,
                latency_ms: response.latency_ms as i64,
                prompt_hash,
                input_hash,
                processor: processor.to_string(),
                event_id,
            },
            Err(_) => NewLlmRun {
                provider: self.client.provider().to_string(),
                model: requested_model,
                input_tokens: 0,
                output_tokens: 0,
                cost_usd: 0.0,
                latency_ms: started.elapsed().as_millis() as i64,
                prompt_hash,
                input_hash,
                processor: processor.to_string(),
                event_id,
            },
        };

        if let Err(e) = self.store.insert_llm_run(&run) {
            // The run log is an audit trail; a write failure must not mask
            // the completion result.
            debug!(error = %e, processor, "failed to record LLM run");
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedLlm;
    use crate::llm::types::{ChatMessage, Provider};

    #[test]
    fn test_hash32_is_stable_and_truncated() {
        let a = hash32("hello");
        let b = hash32("hello");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert_ne!(hash32("hello"), hash32("world"));
    }

    #[tokio::test]
    async fn test_successful_call_records_run() {
        let store = SqliteStore::in_memory().unwrap();
        let client = Arc::new(ScriptedLlm::new(Provider::Ollama, vec!["out".into()]));
        let logged = LoggedLlm::new(client, store.clone());

        let response = logged
            .complete_logged(
                CompletionRequest::new(vec![ChatMessage::user("prompt")]),
                "cluster-judge",
                None,
                "input-key",
            )
            .await
            .unwrap();
        assert_eq!(response.content, "out");

        let runs = store.llm_runs_for_processor("cluster-judge").unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].prompt_hash, hash32("prompt"));
        assert_eq!(runs[0].input_hash, hash32("input-key"));
        assert!(runs[0].input_tokens > 0);
    }

    #[tokio::test]
    async fn test_failed_call_still_records_run() {
        let store = SqliteStore::in_memory().unwrap();
        let client = Arc::new(ScriptedLlm::failing(Provider::Ollama));
        let logged = LoggedLlm::new(client, store.clone());

        let result = logged
            .complete_logged(
                CompletionRequest::new(vec![ChatMessage::user("prompt")]),
                "enrich",
                Some(7),
                "key",
            )
            .await;
        assert!(result.is_err());

        let runs = store.llm_runs_for_processor("enrich").unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].event_id, Some(7));
        assert_eq!(runs[0].input_tokens, 0);
    }
}
