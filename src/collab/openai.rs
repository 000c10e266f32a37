//! OpenAI-compatible chat completions client.
//!
//! Works against any endpoint that speaks the `/chat/completions` protocol
//! (OpenAI, OpenRouter, LM Studio, vLLM, ...). Attachments are flattened to
//! their text; summaries only ever need text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::model::{GenerationParams, ModelClient, ModelError};
use crate::types::Message;

/// Connection settings for [`OpenAiCompatClient`].
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API base, without the trailing `/chat/completions`.
    pub base_url: String,
    /// Bearer token, if the endpoint needs one.
    pub api_key: Option<String>,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            timeout: Duration::from_secs(60),
        }
    }
}

impl OpenAiConfig {
    /// Load from `OPENAI_BASE_URL`, `OPENAI_API_KEY` and `MODEL_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("OPENAI_BASE_URL").unwrap_or(defaults.base_url),
            api_key: std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            timeout: std::env::var("MODEL_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }
}

/// `ModelClient` over an OpenAI-compatible HTTP API.
#[derive(Clone)]
pub struct OpenAiCompatClient {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    /// Build a client.
    pub fn new(config: OpenAiConfig) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ModelClient for OpenAiCompatClient {
    async fn generate_non_streaming(
        &self,
        messages: &[Message],
        model: &str,
        params: &GenerationParams,
    ) -> Result<String, ModelError> {
        let body = ChatRequest {
            model,
            messages: messages
                .iter()
                .map(|m| ChatMessage {
                    role: m.role.as_str(),
                    content: m.text_content(),
                })
                .collect(),
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            stream: false,
        };

        let mut request = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ModelError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ModelError::InvalidResponse {
                message: "response has no choices".to_string(),
            })?;

        tracing::debug!(
            target: "context_kernel::metrics",
            model = model,
            reply_chars = content.len(),
            "Model call completed"
        );

        Ok(content)
    }
}
