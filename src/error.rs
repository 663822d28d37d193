//! Error types for observatory-core.

use thiserror::Error;

/// Result type alias using observatory-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the observatory pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// Feed adapter failure (never crosses the adapter boundary)
    #[error("Feed error: {source_type} - {message}")]
    Feed {
        source_type: String,
        message: String,
    },

    /// LLM API error
    #[error("LLM API error: {provider} - {message}")]
    LlmApi { provider: String, message: String },

    /// LLM returned output that failed parsing or schema validation
    #[error("LLM output invalid: {0}")]
    LlmOutput(String),

    /// Persistent store error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Queue substrate error
    #[error("Queue error: {0}")]
    Queue(String),

    /// Outbound HTTP failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// Timeout during operation
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a feed error.
    pub fn feed(source_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Feed {
            source_type: source_type.into(),
            message: message.into(),
        }
    }

    /// Create an LLM API error.
    pub fn llm_api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LlmApi {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create a queue error.
    pub fn queue(message: impl Into<String>) -> Self {
        Self::Queue(message.into())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout { duration_ms: 0 }
        } else {
            Self::Http(e.to_string())
        }
    }
}
