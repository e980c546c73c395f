//! Answering (LLM) providers.
//!
//! # Supported Providers
//!
//! - **Ollama**: local inference through the native `/api/generate` endpoint
//! - **OpenAI-compatible**: OpenAI, vLLM, LM Studio, llama.cpp server
//!
//! # Example
//!
//! ```rust,no_run
//! use mnemo::providers::ai::{CompletionRequest, LlmProvider, OllamaProvider};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ollama = OllamaProvider::new("llama2");
//! ollama.check_available().await?;
//!
//! let request = CompletionRequest::new("Hello!");
//! let response = ollama.complete(&request).await?;
//! println!("Response: {}", response.text);
//! # Ok(())
//! # }
//! ```

mod ollama;
mod openai;
mod traits;

use std::time::Duration;

pub use ollama::{OllamaProvider, OLLAMA_DEFAULT_MODEL, OLLAMA_DEFAULT_URL};
pub use openai::OpenAiCompatibleProvider;
pub use traits::{CompletionRequest, CompletionResponse, LlmError, LlmProvider, LlmResult};

/// Builds an HTTP client with a whole-request timeout.
pub fn http_client(timeout: Duration) -> LlmResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .build()?)
}
