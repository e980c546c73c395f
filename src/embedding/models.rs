//! Supported sentence-transformer models.

use serde::{Deserialize, Serialize};

/// Available embedding model types.
///
/// All are BERT-architecture models published with safetensors weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// All-MiniLM-L6-v2 - balanced speed and quality.
    #[default]
    AllMiniLmL6V2,
    /// Paraphrase-MiniLM-L6-v2 - tuned on paraphrase pairs.
    ParaphraseMiniLm,
    /// BGE-Small - optimized for retrieval tasks.
    BgeSmall,
    /// E5-Small - asymmetric search with query/passage prefixes.
    E5Small,
}

impl ModelType {
    /// Returns the Hugging Face model ID.
    pub fn hf_model_id(&self) -> &'static str {
        match self {
            Self::AllMiniLmL6V2 => "sentence-transformers/all-MiniLM-L6-v2",
            Self::ParaphraseMiniLm => "sentence-transformers/paraphrase-MiniLM-L6-v2",
            Self::BgeSmall => "BAAI/bge-small-en-v1.5",
            Self::E5Small => "intfloat/e5-small-v2",
        }
    }

    /// Returns the expected embedding dimension.
    pub fn embedding_dim(&self) -> usize {
        384
    }

    /// Returns the maximum sequence length in tokens.
    pub fn max_seq_length(&self) -> usize {
        match self {
            Self::AllMiniLmL6V2 | Self::ParaphraseMiniLm => 256,
            Self::BgeSmall | Self::E5Small => 512,
        }
    }

    /// Prefix prepended to search queries, if the model expects one.
    pub fn query_prefix(&self) -> Option<&'static str> {
        match self {
            Self::E5Small => Some("query: "),
            Self::BgeSmall => Some("Represent this sentence for searching relevant passages: "),
            _ => None,
        }
    }

    /// Prefix prepended to stored passages, if the model expects one.
    pub fn document_prefix(&self) -> Option<&'static str> {
        match self {
            Self::E5Small => Some("passage: "),
            _ => None,
        }
    }
}
