//! OpenAI-compatible chat completions provider.
//!
//! Works with OpenAI, vLLM, LM Studio, llama.cpp server and Ollama's `/v1`
//! endpoint.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::traits::{CompletionRequest, CompletionResponse, LlmError, LlmProvider, LlmResult};

const PROVIDER_NAME: &str = "openai-compatible";

/// Context lengths for common hosted models.
fn model_context_length(model: &str) -> usize {
    match model {
        m if m.starts_with("gpt-4o") => 128_000,
        m if m.starts_with("gpt-4-turbo") => 128_000,
        m if m.starts_with("gpt-4") => 8_192,
        m if m.starts_with("gpt-3.5") => 16_384,
        _ => 4_096,
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Provider for servers speaking the OpenAI chat completions API.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    context_length: usize,
}

impl OpenAiCompatibleProvider {
    /// Creates a provider for `base_url` (e.g. `http://localhost:8080/v1`).
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        let context_length = model_context_length(&model);

        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
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

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(ref api_key) = self.api_key {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", api_key)) {
                headers.insert(AUTHORIZATION, value);
            }
        }

        headers
    }

    fn build_request<'a>(&'a self, request: &'a CompletionRequest) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(ref system) = request.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        ChatRequest {
            model: &self.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }

    async fn error_from_response(response: reqwest::Response) -> LlmError {
        let status = response.status().as_u16();
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error.message,
            Err(_) => format!("HTTP {}", status),
        };
        LlmError::ApiError { status, message }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> LlmResult<CompletionResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.model, %url, "Sending chat completion");

        let response = self
            .client
            .post(&url)
            .headers(self.headers())
            .json(&self.build_request(request))
            .send()
            .await
            .map_err(|e| LlmError::from_transport(PROVIDER_NAME, &self.base_url, e))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("failed to parse response: {}", e)))?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("no choices in response".to_string()))?;

        if choice.finish_reason.as_deref() == Some("length") {
            warn!(model = %self.model, "Answer hit the token limit and was cut short");
        }

        Ok(CompletionResponse {
            text: choice.message.content.unwrap_or_default(),
        })
    }

    async fn check_available(&self) -> LlmResult<()> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .headers(self.headers())
            .send()
            .await
            .map_err(|e| LlmError::from_transport(PROVIDER_NAME, &self.base_url, e))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let models: ModelList = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("failed to parse model list: {}", e)))?;

        // Some servers return an empty list and serve whatever is loaded.
        if models.data.is_empty() || models.data.iter().any(|m| m.id == self.model) {
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

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn context_lengths() {
        assert_eq!(model_context_length("gpt-4o-mini"), 128_000);
        assert_eq!(model_context_length("gpt-4"), 8_192);
        assert_eq!(model_context_length("local-model"), 4_096);
    }

    #[test]
    fn system_prompt_becomes_first_message() {
        let provider = OpenAiCompatibleProvider::new("http://localhost:8080/v1/", None, "m");
        assert_eq!(provider.base_url(), "http://localhost:8080/v1");

        let request = CompletionRequest::new("hi").with_system_prompt("be brief");
        let body = serde_json::to_value(provider.build_request(&request)).unwrap();

        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert!(body.get("temperature").is_none());
    }

    #[tokio::test]
    async fn complete_parses_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(serde_json::json!({"model": "local"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "Hello"}, "finish_reason": "stop"}]
            })))
            .mount(&server)
            .await;

        let provider =
            OpenAiCompatibleProvider::new(server.uri(), Some("secret".to_string()), "local");
        let response = provider
            .complete(&CompletionRequest::new("Hi"))
            .await
            .unwrap();

        assert_eq!(response.text, "Hello");
    }

    #[tokio::test]
    async fn api_error_carries_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"message": "bad request"}
            })))
            .mount(&server)
            .await;

        let provider = OpenAiCompatibleProvider::new(server.uri(), None, "local");
        let err = provider
            .complete(&CompletionRequest::new("Hi"))
            .await
            .unwrap_err();

        assert!(matches!(err, LlmError::ApiError { status: 400, message } if message == "bad request"));
    }

    #[tokio::test]
    async fn check_available_verifies_model() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"id": "local"}]
            })))
            .mount(&server)
            .await;

        let present = OpenAiCompatibleProvider::new(server.uri(), None, "local");
        assert!(present.check_available().await.is_ok());

        let missing = OpenAiCompatibleProvider::new(server.uri(), None, "other");
        assert!(matches!(
            missing.check_available().await,
            Err(LlmError::ModelNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn unreachable_server_is_unavailable() {
        let provider = OpenAiCompatibleProvider::new("http://127.0.0.1:1", None, "local");
        let err = provider.check_available().await.unwrap_err();
        assert!(err.is_unavailable());
    }
}
