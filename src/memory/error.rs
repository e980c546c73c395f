//! Memory engine errors.

use thiserror::Error;

use super::chunker::ChunkError;
use crate::embedding::{EmbeddingError, StoreError};

/// A failure in one of the engine's collaborators.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store failed: {0}")]
    Store(#[from] StoreError),
}

/// Errors surfaced by [`super::MemoryEngine`].
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Empty or otherwise invalid arguments.
    #[error("invalid input: {0}")]
    Input(String),

    /// Embedding or storage failed while ingesting chunk `chunk_index`.
    /// Chunks before it are already stored.
    #[error("ingest failed at chunk {chunk_index}: {source}")]
    Ingest {
        chunk_index: usize,
        #[source]
        source: BackendError,
    },

    /// Embedding or storage failed while searching.
    #[error("search failed: {0}")]
    Search(#[source] BackendError),
}

impl From<ChunkError> for MemoryError {
    fn from(err: ChunkError) -> Self {
        Self::Input(err.to_string())
    }
}

impl MemoryError {
    pub(crate) fn ingest(chunk_index: usize, source: impl Into<BackendError>) -> Self {
        Self::Ingest {
            chunk_index,
            source: source.into(),
        }
    }

    pub(crate) fn search(source: impl Into<BackendError>) -> Self {
        Self::Search(source.into())
    }
}
