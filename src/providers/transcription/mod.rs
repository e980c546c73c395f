//! Speech-to-text for voice notes.

mod whisper_cli;

pub use whisper_cli::WhisperCliTranscriber;

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while transcribing audio.
#[derive(Debug, Error)]
pub enum TranscriptionError {
    /// The transcription backend is missing or not configured.
    #[error("transcription unavailable: {0}")]
    Unavailable(String),

    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("transcription failed: {0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse transcription output: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result type for transcription operations.
pub type TranscriptionResult<T> = Result<T, TranscriptionError>;

/// Audio container formats accepted for voice notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Wav,
    Mp3,
    M4a,
    Ogg,
    Flac,
}

impl AudioFormat {
    /// File extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::M4a => "m4a",
            Self::Ogg => "ogg",
            Self::Flac => "flac",
        }
    }

    /// Detects the format from a file name's extension.
    pub fn from_filename(filename: &str) -> TranscriptionResult<Self> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "wav" => Ok(Self::Wav),
            "mp3" => Ok(Self::Mp3),
            "m4a" | "mp4" => Ok(Self::M4a),
            "ogg" | "oga" | "opus" => Ok(Self::Ogg),
            "flac" => Ok(Self::Flac),
            _ => Err(TranscriptionError::UnsupportedFormat(filename.to_string())),
        }
    }
}

/// Request to transcribe audio to text.
#[derive(Debug, Clone)]
pub struct TranscribeRequest {
    /// Raw audio data.
    pub audio: Bytes,
    pub format: AudioFormat,
    /// Language hint (ISO 639-1 code, e.g. "en").
    pub language: Option<String>,
}

impl TranscribeRequest {
    pub fn new(audio: impl Into<Bytes>, format: AudioFormat) -> Self {
        Self {
            audio: audio.into(),
            format,
            language: None,
        }
    }
}

/// Transcription result. Silent audio yields empty text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    /// Detected language, when the backend reports one.
    pub language: Option<String>,
}

/// Speech-to-text backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Human-readable backend name.
    fn name(&self) -> &'static str;

    /// Whether the backend has everything it needs to run.
    fn is_configured(&self) -> bool;

    async fn transcribe(&self, request: TranscribeRequest) -> TranscriptionResult<Transcript>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_filename() {
        assert_eq!(AudioFormat::from_filename("memo.WAV").unwrap(), AudioFormat::Wav);
        assert_eq!(AudioFormat::from_filename("a.b.mp3").unwrap(), AudioFormat::Mp3);
        assert_eq!(AudioFormat::from_filename("note.m4a").unwrap(), AudioFormat::M4a);
        assert!(matches!(
            AudioFormat::from_filename("notes.txt"),
            Err(TranscriptionError::UnsupportedFormat(_))
        ));
        assert!(AudioFormat::from_filename("noextension").is_err());
    }

    #[test]
    fn request_defaults() {
        let request = TranscribeRequest::new(vec![1u8, 2, 3], AudioFormat::Mp3);
        assert_eq!(request.audio.len(), 3);
        assert!(request.language.is_none());
    }
}
