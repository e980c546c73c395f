//! Answering provider trait and request/response types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by answering providers.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The server could not be reached or did not answer in time.
    #[error("{provider} is not reachable at {url}: {reason}")]
    Unavailable {
        provider: String,
        url: String,
        reason: String,
    },

    /// The server is up but the configured model is not installed.
    #[error("model '{model}' is not available on {provider}")]
    ModelNotFound { provider: String, model: String },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("invalid response format: {0}")]
    InvalidResponse(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl LlmError {
    /// Classifies a transport failure. Connection and timeout errors become
    /// [`LlmError::Unavailable`]; anything else stays an HTTP error.
    pub fn from_transport(provider: &str, url: &str, err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Self::Unavailable {
                provider: provider.to_string(),
                url: url.to_string(),
                reason: err.to_string(),
            }
        } else {
            Self::HttpError(err)
        }
    }

    /// Whether the failure means the backend is unreachable or unusable.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::ModelNotFound { .. })
    }
}

/// Result type for answering operations.
pub type LlmResult<T> = Result<T, LlmError>;

/// A single non-streaming generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    pub prompt: String,

    /// Sampling temperature; lower is more deterministic.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Upper bound on generated tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: None,
            prompt: prompt.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Generated answer text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub text: String,
}

/// A text-generation backend (Ollama, OpenAI-compatible servers).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short provider name used in logs and error messages.
    fn name(&self) -> &str;

    /// Model identifier requests are sent to.
    fn model(&self) -> &str;

    /// Generates a full response for `request`.
    async fn complete(&self, request: &CompletionRequest) -> LlmResult<CompletionResponse>;

    /// Checks that the backend is reachable and serves the configured model.
    async fn check_available(&self) -> LlmResult<()>;

    /// Maximum context length in tokens for the configured model.
    fn max_context_length(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder() {
        let request = CompletionRequest::new("Test")
            .with_system_prompt("Be helpful")
            .with_temperature(0.5)
            .with_max_tokens(100);

        assert_eq!(request.prompt, "Test");
        assert_eq!(request.system_prompt.as_deref(), Some("Be helpful"));
        assert_eq!(request.temperature, Some(0.5));
        assert_eq!(request.max_tokens, Some(100));
    }

    #[test]
    fn unset_options_are_not_serialized() {
        let json = serde_json::to_value(CompletionRequest::new("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"prompt": "hi"}));
    }

    #[test]
    fn unavailable_classification() {
        let err = LlmError::ModelNotFound {
            provider: "ollama".to_string(),
            model: "llama2".to_string(),
        };
        assert!(err.is_unavailable());
        assert!(!LlmError::InvalidResponse("x".to_string()).is_unavailable());
    }
}
