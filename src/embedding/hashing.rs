//! Feature-hashing embeddings.
//!
//! Maps lowercase word tokens into a fixed number of signed buckets. There
//! is no model to download, so this backend works offline and in tests, but
//! it only captures lexical overlap, not meaning.

use super::engine::{Embedding, EmbeddingError, EmbeddingProvider};

/// Deterministic bag-of-words embedder.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    /// Creates an embedder producing vectors of `dimension` values.
    ///
    /// A zero dimension is bumped to one.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// djb2 over the token bytes.
    fn hash(token: &str) -> u64 {
        token.bytes().fold(5381u64, |hash, byte| {
            hash.wrapping_mul(33).wrapping_add(byte as u64)
        })
    }

    fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

impl EmbeddingProvider for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let mut values = vec![0.0f32; self.dimension];

        for token in Self::tokens(text) {
            let hash = Self::hash(&token);
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            values[bucket] += sign;
        }

        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            values.iter_mut().for_each(|v| *v /= norm);
        }

        Ok(Embedding::new(values))
    }
}
