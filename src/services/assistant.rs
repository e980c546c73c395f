//! Assistant service: adds sources to memory and answers questions from it.
//!
//! ```text
//! document bytes ──extract──┐
//!                           ├──> MemoryEngine::ingest
//! voice note ──transcribe───┘
//!
//! question ──> MemoryEngine::search ──> context prompt ──> LlmProvider
//! ```

use std::fmt::Write as _;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::extract::{extract_text, ExtractError};
use crate::domain::{ScoredMemory, SearchResult, SourceMetadata, SourceSummary};
use crate::memory::{IngestReport, MemoryEngine, MemoryError};
use crate::providers::ai::{CompletionRequest, LlmError, LlmProvider};
use crate::providers::transcription::{
    AudioFormat, TranscribeRequest, Transcriber, Transcript, TranscriptionError,
};

/// Errors surfaced by the assistant.
#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("invalid input: {0}")]
    Input(String),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    /// A backend (answering model, transcriber) cannot be reached or is not
    /// set up. Kept apart from other failures so callers can tell the user
    /// what to start or install.
    #[error("{service} is unavailable: {reason}")]
    ServiceUnavailable { service: String, reason: String },

    #[error("answering failed: {0}")]
    Llm(LlmError),

    #[error("transcription failed: {0}")]
    Transcription(TranscriptionError),

    #[error(transparent)]
    Extraction(#[from] ExtractError),
}

impl From<LlmError> for AssistantError {
    fn from(err: LlmError) -> Self {
        if err.is_unavailable() {
            Self::ServiceUnavailable {
                service: "answering model".to_string(),
                reason: err.to_string(),
            }
        } else {
            Self::Llm(err)
        }
    }
}

impl From<TranscriptionError> for AssistantError {
    fn from(err: TranscriptionError) -> Self {
        match err {
            TranscriptionError::Unavailable(reason) => Self::ServiceUnavailable {
                service: "transcription".to_string(),
                reason,
            },
            other => Self::Transcription(other),
        }
    }
}

/// Result type for assistant operations.
pub type AssistantResult<T> = Result<T, AssistantError>;

/// Generation parameters for answers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnswerOptions {
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
}

/// An answer with the passages it was based on.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<ScoredMemory>,
    /// Model that produced the answer.
    pub model: String,
}

/// A transcribed and stored voice note.
#[derive(Debug, Clone)]
pub struct VoiceNoteReport {
    pub transcript: Transcript,
    pub ingest: IngestReport,
}

/// Readiness of one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    pub name: String,
    pub ready: bool,
    pub detail: Option<String>,
}

/// Snapshot reported by `status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantStatus {
    pub memories: usize,
    /// Stored files, most recently added first.
    pub sources: Vec<SourceSummary>,
    pub answering: ServiceStatus,
    pub transcription: ServiceStatus,
}

/// Rough characters-per-token ratio used to size the context block.
const CHARS_PER_TOKEN: usize = 4;

/// Tokens kept free for the answer when `max_tokens` is unset.
const DEFAULT_ANSWER_RESERVE: usize = 512;

/// Formats retrieved passages as `[filename]: text` blocks.
pub fn build_context(results: &SearchResult) -> String {
    let mut context = String::new();
    for hit in results {
        let _ = write!(
            context,
            "[{}]: {}\n\n",
            hit.item.metadata.filename, hit.item.text
        );
    }
    context
}

/// Characters one hit adds to [`build_context`]'s output.
fn context_entry_len(hit: &ScoredMemory) -> usize {
    // "[" + "]: " + "\n\n"
    hit.item.metadata.filename.chars().count() + hit.item.text.chars().count() + 6
}

/// Keeps the best-ranked hits whose formatted context fits in `budget_chars`.
///
/// Stops at the first hit that does not fit so the kept passages are always a
/// prefix of the ranking.
pub fn fit_to_budget(results: SearchResult, budget_chars: usize) -> SearchResult {
    let mut used = 0;
    let kept = results
        .into_iter()
        .take_while(|hit| {
            used += context_entry_len(hit);
            used <= budget_chars
        })
        .collect::<Vec<_>>();
    SearchResult::new(kept)
}

/// Wraps a question and its retrieved context into the answering prompt.
pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "Context from your memory:\n{context}\n\nQuestion: {question}\n\n\
         Based on the context above, provide a helpful answer. \
         If the context doesn't contain relevant information, say so."
    )
}

/// Orchestrates memory, transcription and answering.
#[derive(Clone)]
pub struct AssistantService {
    memory: MemoryEngine,
    llm: Arc<dyn LlmProvider>,
    transcriber: Arc<dyn Transcriber>,
    options: AnswerOptions,
}

impl AssistantService {
    pub fn new(
        memory: MemoryEngine,
        llm: Arc<dyn LlmProvider>,
        transcriber: Arc<dyn Transcriber>,
        options: AnswerOptions,
    ) -> Self {
        Self {
            memory,
            llm,
            transcriber,
            options,
        }
    }

    pub fn memory(&self) -> &MemoryEngine {
        &self.memory
    }

    /// Extracts text from a document and stores it as kind `document`.
    pub async fn add_document(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> AssistantResult<IngestReport> {
        let name = filename.to_string();
        let text = tokio::task::spawn_blocking(move || extract_text(&name, &bytes))
            .await
            .map_err(|e| ExtractError::Task(e.to_string()))??;

        let report = self
            .memory
            .ingest(&text, SourceMetadata::document(filename))
            .await?;
        info!(filename, chunks = report.chunks_stored, "Added document");
        Ok(report)
    }

    /// Transcribes a voice note and stores the transcript as kind `voice_note`.
    pub async fn add_voice_note(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> AssistantResult<VoiceNoteReport> {
        let format = AudioFormat::from_filename(filename)?;
        if !self.transcriber.is_configured() {
            return Err(AssistantError::ServiceUnavailable {
                service: "transcription".to_string(),
                reason: format!("{} is not installed or has no model", self.transcriber.name()),
            });
        }

        let transcript = self
            .transcriber
            .transcribe(TranscribeRequest::new(bytes, format))
            .await?;
        if transcript.text.trim().is_empty() {
            warn!(filename, "Voice note transcribed to empty text");
        }

        let ingest = self
            .memory
            .ingest(&transcript.text, SourceMetadata::voice_note(filename))
            .await?;
        info!(filename, chunks = ingest.chunks_stored, "Added voice note");
        Ok(VoiceNoteReport { transcript, ingest })
    }

    /// Retrieves passages for `query` without asking the model.
    pub async fn search(&self, query: &str, limit: Option<usize>) -> AssistantResult<SearchResult> {
        let results = match limit {
            Some(limit) => self.memory.search(query, limit).await?,
            None => self.memory.search_default(query).await?,
        };
        Ok(results)
    }

    /// Answers a question from the stored memories.
    pub async fn ask(&self, question: &str) -> AssistantResult<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AssistantError::Input("question must not be empty".to_string()));
        }

        let retrieved = self.memory.search_default(question).await?;
        let retrieved_count = retrieved.len();
        let results = fit_to_budget(retrieved, self.context_budget(question));
        if results.len() < retrieved_count {
            debug!(
                kept = results.len(),
                dropped = retrieved_count - results.len(),
                context_length = self.llm.max_context_length(),
                "Trimmed context to fit the model"
            );
        }
        debug!(passages = results.len(), "Retrieved context for question");
        let prompt = build_prompt(question, &build_context(&results));

        let mut request = CompletionRequest::new(prompt);
        if let Some(ref system) = self.options.system_prompt {
            request = request.with_system_prompt(system.clone());
        }
        if let Some(temperature) = self.options.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.options.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        let response = self.llm.complete(&request).await.map_err(|e| {
            warn!(provider = self.llm.name(), error = %e, "Answering request failed");
            AssistantError::from(e)
        })?;

        Ok(Answer {
            text: response.text.trim().to_string(),
            sources: results.into_iter().collect(),
            model: self.llm.model().to_string(),
        })
    }

    /// Characters available for retrieved passages once the prompt frame,
    /// system prompt and answer are accounted for.
    fn context_budget(&self, question: &str) -> usize {
        let frame_chars = build_prompt(question, "").chars().count()
            + self
                .options
                .system_prompt
                .as_deref()
                .map_or(0, |s| s.chars().count());
        let frame_tokens = frame_chars.div_ceil(CHARS_PER_TOKEN);
        let reserve = self.options.max_tokens.unwrap_or(DEFAULT_ANSWER_RESERVE);

        self.llm
            .max_context_length()
            .saturating_sub(reserve + frame_tokens)
            * CHARS_PER_TOKEN
    }

    /// Reports stored memory count, stored files and backend readiness.
    pub async fn status(&self) -> AssistantResult<AssistantStatus> {
        let memories = self.memory.count().await?;
        let sources = self.memory.sources().await?;

        let answering = match self.llm.check_available().await {
            Ok(()) => ServiceStatus {
                name: format!("{} ({})", self.llm.name(), self.llm.model()),
                ready: true,
                detail: None,
            },
            Err(e) => ServiceStatus {
                name: format!("{} ({})", self.llm.name(), self.llm.model()),
                ready: false,
                detail: Some(e.to_string()),
            },
        };

        let ready = self.transcriber.is_configured();
        let transcription = ServiceStatus {
            name: self.transcriber.name().to_string(),
            ready,
            detail: (!ready).then(|| "binary or model not found".to_string()),
        };

        Ok(AssistantStatus {
            memories,
            sources,
            answering,
            transcription,
        })
    }
}

impl std::fmt::Debug for AssistantService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistantService")
            .field("memory", &self.memory)
            .field("llm", &self.llm.name())
            .field("transcriber", &self.transcriber.name())
            .finish_non_exhaustive()
    }
}
