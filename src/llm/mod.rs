//! LLM client, router, and run logging.

pub mod client;
pub mod runlog;
pub mod types;

pub use client::{ClientConfig, LlmClient, LlmRouter, OpenAiCompatClient};
pub use runlog::{hash32, LoggedLlm};
pub use types::{
    ChatMessage, ChatRole, CompletionRequest, CompletionResponse, ModelPricing, Provider,
    TokenUsage,
};
