//! Vector storage for semantic search.
//!
//! The [`VectorStore`] trait is the boundary between the memory engine and
//! whatever persists embeddings. [`InMemoryVectorStore`] keeps everything in
//! a map; the SQLite-backed store lives in [`crate::storage`].

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::domain::{MemoryId, MemoryItem, ScoredMemory, SourceKind, SourceSummary};
use crate::embedding::Embedding;
use crate::storage::DatabaseError;

/// A memory item together with its embedding, ready to be stored.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub item: MemoryItem,
    pub embedding: Embedding,
}

/// Errors that can occur in a vector store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("memory id already stored: {0}")]
    DuplicateId(MemoryId),

    #[error("memory {0} has an empty text body")]
    EmptyText(MemoryId),

    #[error("embedding dimension mismatch: store holds {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(DatabaseError::from(err))
    }
}

/// Result type for vector store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Persists memory records and answers nearest-neighbour queries.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Stores a batch of records. The batch is rejected as a whole if any
    /// record is invalid or its id is already present.
    async fn add(&self, records: Vec<VectorRecord>) -> StoreResult<()>;

    /// Returns up to `n_results` stored items most similar to `embedding`,
    /// ordered by descending similarity.
    async fn query(&self, embedding: &Embedding, n_results: usize)
        -> StoreResult<Vec<ScoredMemory>>;

    /// Number of stored records.
    async fn count(&self) -> StoreResult<usize>;

    /// Stored files with their chunk counts, most recently added first.
    async fn sources(&self) -> StoreResult<Vec<SourceSummary>>;
}

/// Orders source listings newest first, then by filename.
pub(crate) fn sort_sources(sources: &mut [SourceSummary]) {
    sources.sort_by(|a, b| {
        b.last_added
            .cmp(&a.last_added)
            .then_with(|| a.filename.cmp(&b.filename))
    });
}

/// Checks a batch against the store invariants before anything is written.
///
/// `existing_dimension` is the dimension of vectors already in the store, if any.
pub(crate) fn validate_batch(
    records: &[VectorRecord],
    existing_dimension: Option<usize>,
) -> StoreResult<()> {
    let mut expected = existing_dimension;
    let mut seen = std::collections::HashSet::new();

    for record in records {
        if record.item.text.trim().is_empty() {
            return Err(StoreError::EmptyText(record.item.id.clone()));
        }
        if !seen.insert(&record.item.id) {
            return Err(StoreError::DuplicateId(record.item.id.clone()));
        }

        let actual = record.embedding.dimension();
        match expected {
            Some(expected) if expected != actual => {
                return Err(StoreError::DimensionMismatch { expected, actual });
            }
            _ => expected = Some(actual),
        }
    }
    Ok(())
}

/// Scores candidates against `query` and keeps the best `limit`.
///
/// Ties are broken by id so results are stable across runs.
pub(crate) fn rank_by_similarity<I>(
    candidates: I,
    query: &Embedding,
    limit: usize,
    min_similarity: Option<f32>,
) -> Vec<ScoredMemory>
where
    I: IntoIterator<Item = (MemoryItem, Embedding)>,
{
    let mut scored: Vec<ScoredMemory> = candidates
        .into_iter()
        .map(|(item, embedding)| ScoredMemory {
            score: query.cosine_similarity(&embedding),
            item,
        })
        .filter(|hit| min_similarity.map_or(true, |min| hit.score >= min))
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.item.id.0.cmp(&b.item.id.0))
    });
    scored.truncate(limit);
    scored
}

/// In-memory vector store with cosine similarity search.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    records: RwLock<HashMap<MemoryId, VectorRecord>>,
    min_similarity: Option<f32>,
}

impl InMemoryVectorStore {
    /// Creates a new empty vector store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops hits scoring below `min_similarity` from query results.
    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = Some(min_similarity);
        self
    }

    /// Retrieves a stored item by id.
    pub async fn get(&self, id: &MemoryId) -> Option<MemoryItem> {
        self.records.read().await.get(id).map(|r| r.item.clone())
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn add(&self, records: Vec<VectorRecord>) -> StoreResult<()> {
        let mut stored = self.records.write().await;

        let existing_dimension = stored.values().next().map(|r| r.embedding.dimension());
        validate_batch(&records, existing_dimension)?;
        if let Some(dup) = records.iter().find(|r| stored.contains_key(&r.item.id)) {
            return Err(StoreError::DuplicateId(dup.item.id.clone()));
        }

        for record in records {
            stored.insert(record.item.id.clone(), record);
        }
        Ok(())
    }

    async fn query(
        &self,
        embedding: &Embedding,
        n_results: usize,
    ) -> StoreResult<Vec<ScoredMemory>> {
        let stored = self.records.read().await;
        let candidates = stored
            .values()
            .map(|r| (r.item.clone(), r.embedding.clone()));
        Ok(rank_by_similarity(
            candidates,
            embedding,
            n_results,
            self.min_similarity,
        ))
    }

    async fn count(&self) -> StoreResult<usize> {
        Ok(self.records.read().await.len())
    }

    async fn sources(&self) -> StoreResult<Vec<SourceSummary>> {
        let stored = self.records.read().await;
        let mut grouped: HashMap<(&str, SourceKind), SourceSummary> = HashMap::new();
        for record in stored.values() {
            let metadata = &record.item.metadata;
            grouped
                .entry((metadata.filename.as_str(), metadata.kind))
                .and_modify(|summary| {
                    summary.chunks += 1;
                    summary.last_added = summary.last_added.max(metadata.timestamp);
                })
                .or_insert_with(|| SourceSummary {
                    filename: metadata.filename.clone(),
                    kind: metadata.kind,
                    chunks: 1,
                    last_added: metadata.timestamp,
                });
        }

        let mut sources: Vec<_> = grouped.into_values().collect();
        sort_sources(&mut sources);
        Ok(sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Metadata;
    use chrono::{Duration, Utc};

    fn record(id: &str, values: &[f32]) -> VectorRecord {
        VectorRecord {
            item: MemoryItem {
                id: MemoryId::from(id),
                text: format!("text of {id}"),
                metadata: Metadata {
                    filename: "test.txt".to_string(),
                    kind: SourceKind::Document,
                    timestamp: Utc::now(),
                },
            },
            embedding: Embedding::new(values.to_vec()),
        }
    }

    #[tokio::test]
    async fn add_and_get() {
        let store = InMemoryVectorStore::new();
        store.add(vec![record("a", &[1.0, 0.0])]).await.unwrap();

        let item = store.get(&MemoryId::from("a")).await.unwrap();
        assert_eq!(item.text, "text of a");
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn add_rejects_existing_id() {
        let store = InMemoryVectorStore::new();
        store.add(vec![record("a", &[1.0])]).await.unwrap();

        let err = store.add(vec![record("a", &[0.5])]).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId(id) if id.0 == "a"));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn add_rejects_duplicate_within_batch() {
        let store = InMemoryVectorStore::new();
        let err = store
            .add(vec![record("a", &[1.0]), record("a", &[1.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId(_)));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn add_rejects_empty_text() {
        let store = InMemoryVectorStore::new();
        let mut blank = record("blank", &[1.0]);
        blank.item.text = "  \n".to_string();

        let err = store.add(vec![blank]).await.unwrap_err();
        assert!(matches!(err, StoreError::EmptyText(_)));
    }

    #[tokio::test]
    async fn add_rejects_dimension_mismatch() {
        let store = InMemoryVectorStore::new();
        store.add(vec![record("a", &[1.0, 0.0])]).await.unwrap();

        let err = store
            .add(vec![record("b", &[1.0, 0.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[tokio::test]
    async fn query_returns_sorted_results() {
        let store = InMemoryVectorStore::new();
        store
            .add(vec![
                record("different", &[0.0, 1.0]),
                record("exact", &[1.0, 0.0]),
                record("similar", &[0.9, 0.1]),
            ])
            .await
            .unwrap();

        let results = store
            .query(&Embedding::new(vec![1.0, 0.0]), 10)
            .await
            .unwrap();

        let ids: Vec<_> = results.iter().map(|r| r.item.id.0.as_str()).collect();
        assert_eq!(ids, vec!["exact", "similar", "different"]);
        assert!((results[0].score - 1.0).abs() < 0.0001);
    }

    #[tokio::test]
    async fn query_respects_limit() {
        let store = InMemoryVectorStore::new();
        let records = (0..10)
            .map(|i| record(&format!("memory-{i}"), &[1.0]))
            .collect();
        store.add(records).await.unwrap();

        let results = store.query(&Embedding::new(vec![1.0]), 3).await.unwrap();
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn query_breaks_ties_by_id() {
        let store = InMemoryVectorStore::new();
        store
            .add(vec![record("b", &[1.0]), record("a", &[1.0]), record("c", &[1.0])])
            .await
            .unwrap();

        let results = store.query(&Embedding::new(vec![1.0]), 3).await.unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.item.id.0.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn query_with_threshold() {
        let store = InMemoryVectorStore::new().with_min_similarity(0.8);
        store
            .add(vec![
                record("high", &[1.0, 0.0]),
                record("medium", &[0.7, 0.7]),
                record("low", &[0.0, 1.0]),
            ])
            .await
            .unwrap();

        let results = store
            .query(&Embedding::new(vec![1.0, 0.0]), 10)
            .await
            .unwrap();

        // "medium" scores ~0.707
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].item.id, MemoryId::from("high"));
    }

    #[tokio::test]
    async fn sources_group_chunks_by_file() {
        let now = Utc::now();
        let mut older = record("old-0", &[1.0]);
        older.item.metadata.filename = "old.txt".to_string();
        older.item.metadata.timestamp = now - Duration::days(1);

        let mut memo = record("memo-0", &[1.0]);
        memo.item.metadata.filename = "memo.wav".to_string();
        memo.item.metadata.kind = SourceKind::VoiceNote;
        memo.item.metadata.timestamp = now;

        let mut first = record("test-0", &[1.0]);
        first.item.metadata.timestamp = now - Duration::hours(1);
        let mut second = record("test-1", &[1.0]);
        second.item.metadata.timestamp = now;

        let store = InMemoryVectorStore::new();
        store.add(vec![older, memo, first, second]).await.unwrap();

        let sources = store.sources().await.unwrap();
        let listed: Vec<_> = sources
            .iter()
            .map(|s| (s.filename.as_str(), s.kind, s.chunks))
            .collect();
        assert_eq!(
            listed,
            vec![
                ("memo.wav", SourceKind::VoiceNote, 1),
                ("test.txt", SourceKind::Document, 2),
                ("old.txt", SourceKind::Document, 1),
            ]
        );
        assert_eq!(sources[1].last_added, now);
    }

    #[tokio::test]
    async fn query_empty_store() {
        let store = InMemoryVectorStore::new();
        let results = store
            .query(&Embedding::new(vec![1.0, 0.0]), 5)
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
