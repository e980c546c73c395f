//! Application wiring.
//!
//! [`App::from_settings`] builds every service once, explicitly, and hands
//! them to the assistant. Nothing is created lazily behind a global.

pub mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::config::{AnsweringProvider, AnsweringSettings, Settings, StorageBackend};
use crate::embedding::{build_provider, EmbeddingProvider, InMemoryVectorStore, VectorStore};
use crate::memory::MemoryEngine;
use crate::providers::ai::{http_client, LlmProvider, LlmResult, OllamaProvider, OpenAiCompatibleProvider};
use crate::providers::transcription::{Transcriber, WhisperCliTranscriber};
use crate::services::{AnswerOptions, AssistantService};
use crate::storage::{Database, SqliteVectorStore};

/// Builds the answering provider selected in settings.
pub fn build_llm(settings: &AnsweringSettings) -> LlmResult<Arc<dyn LlmProvider>> {
    let client = http_client(Duration::from_secs(settings.timeout_secs))?;
    let base_url = settings.resolved_base_url();

    Ok(match settings.provider {
        AnsweringProvider::Ollama => {
            let mut provider =
                OllamaProvider::with_url(base_url, settings.model.clone()).with_client(client);
            if let Some(length) = settings.context_length {
                provider = provider.with_context_length(length);
            }
            Arc::new(provider)
        }
        AnsweringProvider::OpenaiCompatible => {
            let mut provider = OpenAiCompatibleProvider::new(
                base_url,
                settings.api_key.clone(),
                settings.model.clone(),
            )
            .with_client(client);
            if let Some(length) = settings.context_length {
                provider = provider.with_context_length(length);
            }
            Arc::new(provider)
        }
    })
}

/// Opens the configured vector store, checking that stored vectors match
/// the embedding model's dimension.
async fn open_store(
    settings: &Settings,
    data_dir: &Path,
    embedder: &dyn EmbeddingProvider,
) -> Result<Arc<dyn VectorStore>> {
    match settings.storage.backend {
        StorageBackend::Memory => {
            let mut store = InMemoryVectorStore::new();
            if let Some(min) = settings.memory.min_similarity {
                store = store.with_min_similarity(min);
            }
            Ok(Arc::new(store))
        }
        StorageBackend::Sqlite => {
            let path = settings.database_path(data_dir);
            let db = Database::open(&path)
                .await
                .with_context(|| format!("failed to open database at {}", path.display()))?;
            info!(path = %path.display(), "Opened memory database");

            let mut store = SqliteVectorStore::new(db);
            if let Some(min) = settings.memory.min_similarity {
                store = store.with_min_similarity(min);
            }

            if let Some(stored) = store.dimension().await? {
                if stored != embedder.dimension() {
                    bail!(
                        "database at {} holds {}-dimensional embeddings but the configured model \
                         produces {}; use the original embedding settings or a new database",
                        path.display(),
                        stored,
                        embedder.dimension()
                    );
                }
            }
            Ok(Arc::new(store))
        }
    }
}

/// A fully wired application.
#[derive(Debug)]
pub struct App {
    settings: Settings,
    data_dir: PathBuf,
    assistant: AssistantService,
}

impl App {
    /// Validates `settings` and constructs every service.
    ///
    /// Loading the embedding model may download it on first use.
    pub async fn from_settings(settings: Settings, data_dir: PathBuf) -> Result<Self> {
        settings.validate()?;

        let embedding_config = settings.embedding.clone();
        info!(backend = ?embedding_config.backend, model = ?embedding_config.model_type, "Loading embedding model");
        let embedder = tokio::task::spawn_blocking(move || build_provider(&embedding_config))
            .await
            .context("embedding model loader failed")?
            .context("failed to load embedding model")?;

        let store = open_store(&settings, &data_dir, embedder.as_ref()).await?;
        let memory = MemoryEngine::new(embedder, store, settings.memory.clone())?;

        let llm = build_llm(&settings.answering)?;
        let transcriber: Arc<dyn Transcriber> = Arc::new(WhisperCliTranscriber::new(
            settings.transcription.binary_path.clone(),
            settings.transcription.model_path.clone(),
            settings.transcription.language.clone(),
        ));

        let options = AnswerOptions {
            system_prompt: settings.answering.system_prompt.clone(),
            temperature: settings.answering.temperature,
            max_tokens: settings.answering.max_tokens,
        };
        let assistant = AssistantService::new(memory, llm, transcriber, options);

        Ok(Self {
            settings,
            data_dir,
            assistant,
        })
    }

    pub fn assistant(&self) -> &AssistantService {
        &self.assistant
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}
