//! External service providers.
//!
//! - [`ai`] - answering providers (Ollama, OpenAI-compatible)
//! - [`transcription`] - speech-to-text (whisper.cpp CLI)

pub mod ai;
pub mod transcription;
