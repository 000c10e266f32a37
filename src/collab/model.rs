//! Model invocation seam used for branch summaries.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::Message;

/// Errors from a model call.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The provider answered with an error status.
    #[error("API error {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error body.
        message: String,
    },
    /// The provider answered with something unreadable.
    #[error("Invalid response: {message}")]
    InvalidResponse {
        /// What was wrong with it.
        message: String,
    },
    /// No provider is reachable or configured.
    #[error("Model unavailable: {message}")]
    Unavailable {
        /// Why.
        message: String,
    },
    /// Transport failure.
    #[cfg(feature = "service")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Sampling parameters. Defaults leave everything to the provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Completion token cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// A chat model that returns a complete reply.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Generate a reply for `messages` with `model`.
    async fn generate_non_streaming(
        &self,
        messages: &[Message],
        model: &str,
        params: &GenerationParams,
    ) -> Result<String, ModelError>;
}
