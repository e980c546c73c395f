//! Embedding providers for semantic search.
//!
//! Uses Candle to run sentence-transformer models locally so document
//! content never leaves the machine.

use std::path::{Path, PathBuf};

use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokenizers::{Tokenizer, TruncationParams};

use crate::embedding::ModelType;

/// A vector embedding representing text semantics.
///
/// The embedding dimensionality depends on the model used
/// (e.g., 384 for MiniLM, 768 for BERT base).
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    /// The embedding vector.
    pub values: Vec<f32>,
}

impl Embedding {
    /// Creates a new embedding from a vector of values.
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Returns the dimensionality of this embedding.
    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Computes cosine similarity with another embedding.
    ///
    /// Returns a value between -1.0 and 1.0, where 1.0 means identical.
    /// Mismatched dimensions and zero vectors score 0.0.
    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return 0.0;
        }

        let (dot, norm_a, norm_b) = self.values.iter().zip(other.values.iter()).fold(
            (0.0f32, 0.0f32, 0.0f32),
            |(dot, na, nb), (a, b)| (dot + a * b, na + a * a, nb + b * b),
        );

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        dot / (norm_a.sqrt() * norm_b.sqrt())
    }

    /// Encodes the vector as little-endian `f32` bytes for BLOB storage.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// Decodes a vector stored with [`Embedding::to_bytes`].
    ///
    /// Returns `None` if the byte length is not a multiple of four.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() % 4 != 0 {
            return None;
        }
        let values = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        Some(Self::new(values))
    }
}

/// Errors produced while loading a model or embedding text.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("model error: {0}")]
    Model(#[from] candle_core::Error),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("failed to fetch model files: {0}")]
    Download(String),

    #[error("invalid model config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("embedding task failed: {0}")]
    Task(String),
}

/// Maps text to a fixed-length vector.
///
/// Implementations must be deterministic for a fixed model version.
#[cfg_attr(test, mockall::automock)]
pub trait EmbeddingProvider: Send + Sync {
    /// Dimensionality of the vectors this provider produces.
    fn dimension(&self) -> usize;

    /// Embeds raw text.
    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError>;

    /// Embeds a search query. Models trained for asymmetric search override this.
    fn embed_query(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        self.embed(text)
    }

    /// Embeds a stored passage.
    fn embed_document(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        self.embed(text)
    }
}

/// Which embedding implementation to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// Sentence-transformer model run with Candle.
    #[default]
    Candle,
    /// Feature hashing; no model download, lexical matching only.
    Hashing,
}

/// Configuration for embedding providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    /// Model to download from Hugging Face.
    pub model_type: ModelType,
    /// Directory holding `config.json`, `tokenizer.json` and
    /// `model.safetensors`. Skips the download when set.
    pub model_path: Option<PathBuf>,
    /// Hugging Face cache directory override.
    pub cache_dir: Option<PathBuf>,
    /// Maximum sequence length for tokenization. Defaults to the model's limit.
    pub max_seq_length: Option<usize>,
    /// Whether to use GPU acceleration if available.
    pub use_gpu: bool,
    /// Vector size for the hashing backend.
    pub hashing_dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Candle,
            model_type: ModelType::default(),
            model_path: None,
            cache_dir: None,
            max_seq_length: None,
            use_gpu: false,
            hashing_dimension: 384,
        }
    }
}

impl EmbeddingConfig {
    /// Effective maximum sequence length.
    pub fn seq_length(&self) -> usize {
        self.max_seq_length
            .unwrap_or_else(|| self.model_type.max_seq_length())
    }
}

/// Reads a safetensors file into memory and wraps it for model loading.
fn load_weights(path: &Path, device: &Device) -> Result<VarBuilder<'static>, EmbeddingError> {
    let weights = std::fs::read(path)?;
    Ok(VarBuilder::from_buffered_safetensors(weights, DTYPE, device)?)
}

/// Resolved on-disk locations of a model's files.
struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: PathBuf,
}

impl ModelFiles {
    fn in_dir(dir: &Path) -> Self {
        Self {
            config: dir.join("config.json"),
            tokenizer: dir.join("tokenizer.json"),
            weights: dir.join("model.safetensors"),
        }
    }

    fn fetch(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        use hf_hub::api::sync::ApiBuilder;

        let mut builder = ApiBuilder::new().with_progress(false);
        if let Some(dir) = &config.cache_dir {
            builder = builder.with_cache_dir(dir.clone());
        }
        let api = builder
            .build()
            .map_err(|e| EmbeddingError::Download(e.to_string()))?;
        let repo = api.model(config.model_type.hf_model_id().to_string());

        let get = |name: &str| {
            repo.get(name)
                .map_err(|e| EmbeddingError::Download(format!("{name}: {e}")))
        };

        Ok(Self {
            config: get("config.json")?,
            tokenizer: get("tokenizer.json")?,
            weights: get("model.safetensors")?,
        })
    }
}

/// Sentence-transformer embeddings computed locally with Candle.
///
/// Token embeddings are mean-pooled and L2-normalized, so cosine similarity
/// between outputs equals their dot product.
pub struct CandleEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    model_type: ModelType,
    dimension: usize,
}

impl CandleEmbedder {
    /// Loads model weights and tokenizer, downloading them if needed.
    ///
    /// This blocks on network and disk IO; call it once at startup.
    pub fn load(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let device = if config.use_gpu {
            Device::cuda_if_available(0)?
        } else {
            Device::Cpu
        };

        let files = match &config.model_path {
            Some(dir) => ModelFiles::in_dir(dir),
            None => ModelFiles::fetch(config)?,
        };

        let bert_config: BertConfig =
            serde_json::from_str(&std::fs::read_to_string(&files.config)?)?;
        let dimension = bert_config.hidden_size;

        let mut tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.seq_length(),
                ..Default::default()
            }))
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;

        let vb = load_weights(&files.weights, &device)?;
        let model = BertModel::load(vb, &bert_config)?;

        tracing::info!(
            model_id = config.model_type.hf_model_id(),
            dimension,
            ?device,
            "Loaded embedding model"
        );

        Ok(Self {
            model,
            tokenizer,
            device,
            model_type: config.model_type,
            dimension,
        })
    }

    fn forward(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;

        let input_ids = Tensor::new(encoding.get_ids(), &self.device)?.unsqueeze(0)?;
        let token_type_ids = input_ids.zeros_like()?;
        let attention_mask = Tensor::new(encoding.get_attention_mask(), &self.device)?.unsqueeze(0)?;

        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;

        // Mean pooling over tokens, then L2 normalization.
        let (_batch, n_tokens, _hidden) = hidden.dims3()?;
        let pooled = (hidden.sum(1)? / n_tokens as f64)?;
        let norm = pooled.sqr()?.sum_keepdim(1)?.sqrt()?;
        let normalized = pooled.broadcast_div(&norm)?;

        Ok(Embedding::new(normalized.squeeze(0)?.to_vec1::<f32>()?))
    }
}

impl EmbeddingProvider for CandleEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        self.forward(text)
    }

    fn embed_query(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        match self.model_type.query_prefix() {
            Some(prefix) => self.forward(&format!("{prefix}{text}")),
            None => self.forward(text),
        }
    }

    fn embed_document(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        match self.model_type.document_prefix() {
            Some(prefix) => self.forward(&format!("{prefix}{text}")),
            None => self.forward(text),
        }
    }
}

impl std::fmt::Debug for CandleEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandleEmbedder")
            .field("model_type", &self.model_type)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}
