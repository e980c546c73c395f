//! Vector embedding and semantic search.
//!
//! This module provides local text embeddings and the vector store boundary
//! used by the memory engine.
//!
//! # Architecture
//!
//! - [`EmbeddingProvider`] - Maps text to vectors; [`CandleEmbedder`] runs a
//!   sentence-transformer locally, [`HashingEmbedder`] needs no model
//! - [`VectorStore`] - Stores embeddings and searches them by similarity
//! - [`Embedding`] - A vector representation of text semantics
//!
//! # Example
//!
//! ```ignore
//! use mnemo::embedding::{EmbeddingProvider, HashingEmbedder, InMemoryVectorStore, VectorStore};
//!
//! let embedder = HashingEmbedder::default();
//! let store = InMemoryVectorStore::new();
//!
//! let query = embedder.embed_query("project deadline")?;
//! let hits = store.query(&query, 5).await?;
//! ```

mod engine;
mod hashing;
mod models;
mod vector_store;

pub use engine::{
    CandleEmbedder, Embedding, EmbeddingBackend, EmbeddingConfig, EmbeddingError,
    EmbeddingProvider,
};
#[cfg(test)]
pub use engine::MockEmbeddingProvider;
pub use hashing::HashingEmbedder;
pub use models::ModelType;
pub use vector_store::{InMemoryVectorStore, StoreError, StoreResult, VectorRecord, VectorStore};
pub(crate) use vector_store::{rank_by_similarity, sort_sources, validate_batch};

use std::sync::Arc;

/// Builds the embedding provider selected by `config`.
///
/// Loading the Candle backend may download model files; run it off the
/// async runtime.
pub fn build_provider(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    Ok(match config.backend {
        EmbeddingBackend::Candle => Arc::new(CandleEmbedder::load(config)?),
        EmbeddingBackend::Hashing => Arc::new(HashingEmbedder::new(config.hashing_dimension)),
    })
}
