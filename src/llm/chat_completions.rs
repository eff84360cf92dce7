//! Chat Completions client.
//!
//! Sends one non-streaming request per query to `{base_url}/chat/completions`
//! with a fixed system prompt and the document inlined in the user message.

use serde::{Deserialize, Serialize};

use super::{LlmClient, LlmError, LlmSettings};

const SYSTEM_PROMPT: &str = "You are a private document analyzer. You are an expert at extracting information from documents. Never store or remember document contents beyond this conversation. Provide accurate, professional analysis in a clear, structured format.";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
    venice_parameters: VeniceParameters,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct VeniceParameters {
    include_venice_system_prompt: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// User message carrying the document and the request.
fn user_message(prompt: &str, document: &str) -> String {
    format!("Document Context:\n---\n{document}\n---\n\nUser Request: {prompt}")
}

/// [`LlmClient`] backed by an OpenAI-compatible Chat Completions API.
#[derive(Clone)]
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    settings: LlmSettings,
}

impl std::fmt::Debug for ChatCompletionsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsClient")
            .field("settings", &self.settings)
            .finish()
    }
}

impl ChatCompletionsClient {
    pub fn new(settings: LlmSettings) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()?;
        Ok(Self { http, settings })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait::async_trait]
impl LlmClient for ChatCompletionsClient {
    async fn query(&self, prompt: &str, document: &str) -> Result<String, LlmError> {
        let user = user_message(prompt, document);
        let body = ChatRequest {
            model: &self.settings.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &user,
                },
            ],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            stream: false,
            venice_parameters: VeniceParameters {
                include_venice_system_prompt: false,
            },
        };

        let started = std::time::Instant::now();
        let resp = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(LlmError::Status(status));
        }

        let parsed: ChatResponse = resp.json().await?;
        tracing::debug!(
            name: "llm.completed",
            model = %self.settings.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Completion received"
        );
        extract_answer(parsed)
    }
}

fn extract_answer(resp: ChatResponse) -> Result<String, LlmError> {
    if let Some(err) = resp.error {
        return Err(LlmError::Api(err.message));
    }
    resp.choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or(LlmError::EmptyResponse)
}
