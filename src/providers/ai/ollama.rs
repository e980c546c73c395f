//! Ollama provider using the native generate API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::traits::{CompletionRequest, CompletionResponse, LlmError, LlmProvider, LlmResult};

/// Default Ollama server URL.
pub const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Default model name.
pub const OLLAMA_DEFAULT_MODEL: &str = "llama2";

const PROVIDER_NAME: &str = "ollama";

/// Context lengths for common Ollama models.
fn model_context_length(model: &str) -> usize {
    match model {
        m if m.starts_with("llama3.2") => 128_000,
        m if m.starts_with("llama3.1") => 128_000,
        m if m.starts_with("llama3") => 8_192,
        m if m.starts_with("llama2") => 4_096,
        m if m.starts_with("mistral") => 32_768,
        m if m.starts_with("mixtral") => 32_768,
        m if m.starts_with("phi") => 2_048,
        m if m.starts_with("gemma") => 8_192,
        m if m.starts_with("qwen2") => 32_768,
        _ => 4_096,
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    #[serde(skip_serializing_if = "GenerateOptions::is_empty")]
    options: GenerateOptions,
}

#[derive(Debug, Default, Serialize)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<usize>,
}

impl GenerateOptions {
    fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.num_predict.is_none()
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    done_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagList {
    #[serde(default)]
    models: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Matches `llama2` against installed tags such as `llama2:latest`.
fn tag_matches(installed: &str, wanted: &str) -> bool {
    installed == wanted
        || (!wanted.contains(':') && installed.strip_suffix(":latest") == Some(wanted))
}

/// Provider for a local Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    context_length: usize,
}

impl OllamaProvider {
    /// Creates a provider for `model` on the default localhost URL.
    pub fn new(model: impl Into<String>) -> Self {
        Self::with_url(OLLAMA_DEFAULT_URL, model)
    }

    pub fn with_url(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        let context_length = model_context_length(&model);

        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model,
            context_length,
        }
    }

    pub fn with_context_length(mut self, length: usize) -> Self {
        self.context_length = length;
        self
    }

    /// Overrides the HTTP client (timeouts, proxies).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_request<'a>(&'a self, request: &'a CompletionRequest) -> GenerateRequest<'a> {
        GenerateRequest {
            model: &self.model,
            prompt: &request.prompt,
            system: request.system_prompt.as_deref(),
            stream: false,
            options: GenerateOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        }
    }

    async fn error_from_response(response: reqwest::Response) -> LlmError {
        let status = response.status().as_u16();
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => format!("HTTP {}", status),
        };
        LlmError::ApiError { status, message }
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new(OLLAMA_DEFAULT_MODEL)
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> LlmResult<CompletionResponse> {
        let url = format!("{}/api/generate", self.base_url);
        debug!(model = %self.model, %url, "Sending generate request");

        let response = self
            .client
            .post(&url)
            .json(&self.build_request(request))
            .send()
            .await
            .map_err(|e| LlmError::from_transport(PROVIDER_NAME, &self.base_url, e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            // Ollama answers 404 for a model that has not been pulled.
            return Err(LlmError::ModelNotFound {
                provider: PROVIDER_NAME.to_string(),
                model: self.model.clone(),
            });
        }
        if !status.is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("failed to parse response: {}", e)))?;

        if body.done_reason.as_deref() == Some("length") {
            warn!(model = %self.model, "Answer hit the token limit and was cut short");
        }

        Ok(CompletionResponse {
            text: body.response,
        })
    }

    async fn check_available(&self) -> LlmResult<()> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LlmError::from_transport(PROVIDER_NAME, &self.base_url, e))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let tags: TagList = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("failed to parse tag list: {}", e)))?;

        if tags.models.iter().any(|t| tag_matches(&t.name, &self.model)) {
            Ok(())
        } else {
            Err(LlmError::ModelNotFound {
                provider: PROVIDER_NAME.to_string(),
                model: self.model.clone(),
            })
        }
    }

    fn max_context_length(&self) -> usize {
        self.context_length
    }
}
