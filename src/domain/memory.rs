//! Memory domain types.
//!
//! A memory is one chunk of an ingested source, stored alongside the
//! metadata of the source it came from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{MemoryId, SourceKind};

/// Metadata persisted with every chunk.
///
/// Serializes as `{"filename": .., "type": "document"|"voice_note", "timestamp": ISO-8601}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Name of the source file.
    pub filename: String,
    /// Kind of source.
    #[serde(rename = "type")]
    pub kind: SourceKind,
    /// When the source was added.
    pub timestamp: DateTime<Utc>,
}

/// Metadata supplied by the caller when ingesting a source.
///
/// The timestamp is optional; the memory engine fills it with the
/// ingestion time when absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMetadata {
    pub filename: String,
    pub kind: SourceKind,
    pub timestamp: Option<DateTime<Utc>>,
}

impl SourceMetadata {
    /// Metadata for an uploaded document.
    pub fn document(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            kind: SourceKind::Document,
            timestamp: None,
        }
    }

    /// Metadata for a transcribed voice note.
    pub fn voice_note(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            kind: SourceKind::VoiceNote,
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Produces the persisted metadata, defaulting the timestamp to `now`.
    pub fn resolve(self, now: DateTime<Utc>) -> Metadata {
        Metadata {
            filename: self.filename,
            kind: self.kind,
            timestamp: self.timestamp.unwrap_or(now),
        }
    }
}

/// A stored chunk of text with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: MemoryId,
    pub text: String,
    pub metadata: Metadata,
}

/// A memory paired with its relevance to a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMemory {
    pub item: MemoryItem,
    /// Similarity as reported by the vector store; higher is more relevant.
    pub score: f32,
}

/// One stored file as listed by `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSummary {
    pub filename: String,
    pub kind: SourceKind,
    /// Number of stored chunks.
    pub chunks: usize,
    /// Latest timestamp among the file's chunks.
    pub last_added: DateTime<Utc>,
}

/// Ranked search hits, most relevant first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    hits: Vec<ScoredMemory>,
}

impl SearchResult {
    /// Wraps hits that are already ordered by descending score.
    pub fn new(hits: Vec<ScoredMemory>) -> Self {
        Self { hits }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn hits(&self) -> &[ScoredMemory] {
        &self.hits
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScoredMemory> {
        self.hits.iter()
    }

    /// Returns the highest-scoring hit, if any.
    pub fn top(&self) -> Option<&ScoredMemory> {
        self.hits.first()
    }
}

impl IntoIterator for SearchResult {
    type Item = ScoredMemory;
    type IntoIter = std::vec::IntoIter<ScoredMemory>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.into_iter()
    }
}

impl<'a> IntoIterator for &'a SearchResult {
    type Item = &'a ScoredMemory;
    type IntoIter = std::slice::Iter<'a, ScoredMemory>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.iter()
    }
}
