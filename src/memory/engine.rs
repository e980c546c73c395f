//! Ingest and search over the vector store.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::chunker::{self, Boundary, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use super::error::MemoryError;
use crate::domain::{MemoryId, MemoryItem, SearchResult, SourceMetadata, SourceSummary};
use crate::embedding::{Embedding, EmbeddingError, EmbeddingProvider, VectorRecord, VectorStore};

/// Default number of passages returned by a search.
pub const DEFAULT_SEARCH_LIMIT: usize = 5;

/// Chunking and retrieval parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub boundary: Boundary,
    pub search_limit: usize,
    /// Hits scoring below this cosine similarity are dropped by the store.
    pub min_similarity: Option<f32>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            boundary: Boundary::default(),
            search_limit: DEFAULT_SEARCH_LIMIT,
            min_similarity: None,
        }
    }
}

/// Outcome of a successful ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub source: String,
    pub chunks_stored: usize,
    pub ids: Vec<MemoryId>,
}

/// Composes the chunker, an embedding provider and a vector store.
///
/// The engine holds no mutable state of its own; concurrency guarantees are
/// those of the store it wraps.
#[derive(Clone)]
pub struct MemoryEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    config: MemoryConfig,
}

impl MemoryEngine {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        config: MemoryConfig,
    ) -> Result<Self, MemoryError> {
        chunker::validate(config.chunk_size, config.chunk_overlap)?;
        if config.search_limit == 0 {
            return Err(MemoryError::Input(
                "search limit must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            embedder,
            store,
            config,
        })
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Number of chunks in the underlying store.
    pub async fn count(&self) -> Result<usize, MemoryError> {
        self.store.count().await.map_err(MemoryError::search)
    }

    /// Stored files with their chunk counts, most recently added first.
    pub async fn sources(&self) -> Result<Vec<SourceSummary>, MemoryError> {
        self.store.sources().await.map_err(MemoryError::search)
    }

    /// Splits `text` into chunks, embeds each one and stores it.
    ///
    /// Every chunk is written with its own `add` call, so a failure part way
    /// through leaves the earlier chunks searchable.
    pub async fn ingest(
        &self,
        text: &str,
        metadata: SourceMetadata,
    ) -> Result<IngestReport, MemoryError> {
        if metadata.filename.trim().is_empty() {
            return Err(MemoryError::Input("source filename is required".to_string()));
        }

        let now = Utc::now();
        let metadata = metadata.resolve(now);
        let mut report = IngestReport {
            source: metadata.filename.clone(),
            chunks_stored: 0,
            ids: Vec::new(),
        };

        let chunks = chunker::split_with(
            text,
            self.config.chunk_size,
            self.config.chunk_overlap,
            self.config.boundary,
        )?;

        for chunk in chunks {
            if chunk.text.trim().is_empty() {
                debug!(source = %report.source, index = chunk.index, "Skipping blank chunk");
                continue;
            }

            let embedding = self
                .embed(chunk.text.to_string(), false)
                .await
                .map_err(|e| MemoryError::ingest(chunk.index, e))?;

            let id = MemoryId::derive(&metadata.filename, chunk.index, now);
            let record = VectorRecord {
                item: MemoryItem {
                    id: id.clone(),
                    text: chunk.text.to_string(),
                    metadata: metadata.clone(),
                },
                embedding,
            };

            self.store
                .add(vec![record])
                .await
                .map_err(|e| MemoryError::ingest(chunk.index, e))?;

            debug!(%id, chars = chunk.char_len(), "Stored chunk");
            report.ids.push(id);
            report.chunks_stored += 1;
        }

        info!(
            source = %report.source,
            kind = %metadata.kind,
            chunks = report.chunks_stored,
            "Ingested source"
        );
        Ok(report)
    }

    /// Returns up to `limit` stored passages most similar to `query`.
    pub async fn search(&self, query: &str, limit: usize) -> Result<SearchResult, MemoryError> {
        if query.trim().is_empty() {
            return Err(MemoryError::Input("query must not be empty".to_string()));
        }
        if limit == 0 {
            return Err(MemoryError::Input(
                "limit must be greater than zero".to_string(),
            ));
        }

        let embedding = self
            .embed(query.to_string(), true)
            .await
            .map_err(MemoryError::search)?;

        let hits = self
            .store
            .query(&embedding, limit)
            .await
            .map_err(MemoryError::search)?;

        debug!(limit, hits = hits.len(), "Search complete");
        Ok(SearchResult::new(hits))
    }

    /// Searches with the configured default limit.
    pub async fn search_default(&self, query: &str) -> Result<SearchResult, MemoryError> {
        self.search(query, self.config.search_limit).await
    }

    async fn embed(&self, text: String, is_query: bool) -> Result<Embedding, EmbeddingError> {
        let embedder = self.embedder.clone();
        tokio::task::spawn_blocking(move || {
            if is_query {
                embedder.embed_query(&text)
            } else {
                embedder.embed_document(&text)
            }
        })
        .await
        .map_err(|e| EmbeddingError::Task(e.to_string()))?
    }
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
