//! Outbound LLM access.
//!
//! Handlers only see the [`LlmClient`] trait: one prompt plus the document
//! text in, one answer out. The production implementation talks to an
//! OpenAI-compatible Chat Completions endpoint.
//!
//! # Example
//!
//! ```rust,ignore
//! use private_doc_analyzer::llm::{ChatCompletionsClient, LlmClient, LlmSettings};
//!
//! let client = ChatCompletionsClient::new(LlmSettings::new("sk-..."))?;
//! let answer = client.query("Summarize this.", &document_text).await?;
//! ```

pub mod chat_completions;

pub use chat_completions::ChatCompletionsClient;

use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.venice.ai/api/v1";
pub const DEFAULT_MODEL: &str = "llama-3.3-70b";
pub const DEFAULT_TEMPERATURE: f32 = 0.3;
pub const DEFAULT_MAX_TOKENS: u32 = 2048;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(55);

/// LLM connection and model settings.
#[derive(Clone)]
pub struct LlmSettings {
    /// Base URL of the API, without the `/chat/completions` suffix.
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Upper bound for a single completion call.
    pub request_timeout: Duration,
}

impl LlmSettings {
    /// Settings with the default endpoint and model.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Errors from an LLM call.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("failed to send request: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("LLM API returned non-success status: {0}")]
    Status(reqwest::StatusCode),

    #[error("LLM API error: {0}")]
    Api(String),

    #[error("no response choices from LLM API")]
    EmptyResponse,
}

/// Answers a prompt about a document.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync + std::fmt::Debug {
    async fn query(&self, prompt: &str, document: &str) -> Result<String, LlmError>;
}
