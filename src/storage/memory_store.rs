//! SQLite-backed vector store.
//!
//! Embeddings are stored as BLOBs next to the chunk text and metadata.
//! Queries scan every row and rank by cosine similarity in memory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::queries::memories::{self, MemoryRow, SourceRow};
use super::Database;
use crate::domain::{MemoryId, MemoryItem, Metadata, ScoredMemory, SourceSummary};
use crate::embedding::{
    rank_by_similarity, sort_sources, validate_batch, Embedding, StoreError, StoreResult,
    VectorRecord, VectorStore,
};

/// Persistent vector store over the `memories` table.
#[derive(Debug, Clone)]
pub struct SqliteVectorStore {
    db: Database,
    min_similarity: Option<f32>,
}

impl SqliteVectorStore {
    /// Creates a store over an opened database.
    pub fn new(db: Database) -> Self {
        Self {
            db,
            min_similarity: None,
        }
    }

    /// Drops hits scoring below `min_similarity` from query results.
    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = Some(min_similarity);
        self
    }

    /// Retrieves a stored item by id.
    pub async fn get(&self, id: &MemoryId) -> StoreResult<Option<MemoryItem>> {
        let id = id.0.clone();
        let row = self
            .db
            .with_conn(move |conn| Ok(memories::get_by_id(conn, &id)?))
            .await?;
        row.map(|row| decode(row).map(|(item, _)| item)).transpose()
    }

    /// Dimension of the stored vectors, or `None` while the store is empty.
    pub async fn dimension(&self) -> StoreResult<Option<usize>> {
        Ok(self
            .db
            .with_conn(|conn| Ok(memories::dimension(conn)?))
            .await?)
    }
}

fn decode_source(row: SourceRow) -> StoreResult<SourceSummary> {
    let corrupt = |reason: String| StoreError::Corrupt {
        id: row.filename.clone(),
        reason,
    };
    let kind = row.kind.parse().map_err(corrupt)?;
    let last_added = DateTime::parse_from_rfc3339(&row.last_timestamp)
        .map_err(|e| corrupt(e.to_string()))?
        .with_timezone(&Utc);

    Ok(SourceSummary {
        filename: row.filename,
        kind,
        chunks: row.chunks,
        last_added,
    })
}

fn encode(record: &VectorRecord) -> StoreResult<MemoryRow> {
    let metadata = serde_json::to_string(&record.item.metadata).map_err(|e| StoreError::Corrupt {
        id: record.item.id.0.clone(),
        reason: e.to_string(),
    })?;

    Ok(MemoryRow {
        id: record.item.id.0.clone(),
        text: record.item.text.clone(),
        metadata,
        embedding: record.embedding.to_bytes(),
        dimension: record.embedding.dimension(),
        created_at: Utc::now().to_rfc3339(),
    })
}

fn decode(row: MemoryRow) -> StoreResult<(MemoryItem, Embedding)> {
    let corrupt = |reason: String| StoreError::Corrupt {
        id: row.id.clone(),
        reason,
    };

    let metadata: Metadata =
        serde_json::from_str(&row.metadata).map_err(|e| corrupt(format!("metadata: {e}")))?;
    let embedding = Embedding::from_bytes(&row.embedding)
        .filter(|e| e.dimension() == row.dimension)
        .ok_or_else(|| corrupt("embedding blob does not match its dimension".to_string()))?;

    Ok((
        MemoryItem {
            id: MemoryId::from(row.id.clone()),
            text: row.text,
            metadata,
        },
        embedding,
    ))
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn add(&self, records: Vec<VectorRecord>) -> StoreResult<()> {
        let rows = records.iter().map(encode).collect::<StoreResult<Vec<_>>>()?;

        self.db
            .transaction(move |tx| -> StoreResult<()> {
                validate_batch(&records, memories::dimension(tx)?)?;
                for row in &rows {
                    if memories::exists(tx, &row.id)? {
                        return Err(StoreError::DuplicateId(MemoryId::from(row.id.as_str())));
                    }
                    memories::insert(tx, row)?;
                }
                Ok(())
            })
            .await
    }

    async fn query(
        &self,
        embedding: &Embedding,
        n_results: usize,
    ) -> StoreResult<Vec<ScoredMemory>> {
        let rows = self
            .db
            .with_conn(|conn| Ok(memories::get_all(conn)?))
            .await?;

        let candidates = rows.into_iter().map(decode).collect::<StoreResult<Vec<_>>>()?;
        Ok(rank_by_similarity(
            candidates,
            embedding,
            n_results,
            self.min_similarity,
        ))
    }

    async fn count(&self) -> StoreResult<usize> {
        Ok(self.db.with_conn(|conn| Ok(memories::count(conn)?)).await?)
    }

    async fn sources(&self) -> StoreResult<Vec<SourceSummary>> {
        let rows = self
            .db
            .with_conn(|conn| Ok(memories::sources(conn)?))
            .await?;
        let mut sources = rows
            .into_iter()
            .map(decode_source)
            .collect::<StoreResult<Vec<_>>>()?;
        sort_sources(&mut sources);
        Ok(sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SourceKind;
    use chrono::TimeZone;

    fn record(id: &str, filename: &str, values: &[f32]) -> VectorRecord {
        VectorRecord {
            item: MemoryItem {
                id: MemoryId::from(id),
                text: format!("text of {id}"),
                metadata: Metadata {
                    filename: filename.to_string(),
                    kind: SourceKind::VoiceNote,
                    timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
                },
            },
            embedding: Embedding::new(values.to_vec()),
        }
    }

    async fn store() -> SqliteVectorStore {
        SqliteVectorStore::new(Database::open_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn add_and_get_preserves_item() {
        let store = store().await;
        let original = record("m1", "memo.wav", &[0.5, 0.5]);
        store.add(vec![original.clone()]).await.unwrap();

        let item = store.get(&MemoryId::from("m1")).await.unwrap().unwrap();
        assert_eq!(item, original.item);
    }

    #[tokio::test]
    async fn duplicate_id_rejects_whole_batch() {
        let store = store().await;
        store.add(vec![record("m1", "a", &[1.0])]).await.unwrap();

        let err = store
            .add(vec![record("m2", "a", &[1.0]), record("m1", "a", &[1.0])])
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::DuplicateId(id) if id.0 == "m1"));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let store = store().await;
        assert_eq!(store.dimension().await.unwrap(), None);
        store.add(vec![record("m1", "a", &[1.0, 0.0])]).await.unwrap();
        assert_eq!(store.dimension().await.unwrap(), Some(2));

        let err = store
            .add(vec![record("m2", "a", &[1.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn query_ranks_by_similarity() {
        let store = store().await;
        store
            .add(vec![
                record("far", "a", &[0.0, 1.0]),
                record("near", "a", &[1.0, 0.1]),
                record("exact", "a", &[1.0, 0.0]),
            ])
            .await
            .unwrap();

        let hits = store
            .query(&Embedding::new(vec![1.0, 0.0]), 2)
            .await
            .unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.item.id.0.as_str()).collect();
        assert_eq!(ids, vec!["exact", "near"]);
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn query_applies_threshold() {
        let store = store().await.with_min_similarity(0.9);
        store
            .add(vec![record("a", "f", &[1.0, 0.0]), record("b", "f", &[0.0, 1.0])])
            .await
            .unwrap();

        let hits = store
            .query(&Embedding::new(vec![0.0, -1.0]), 5)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn query_empty_store() {
        let store = store().await;
        let hits = store.query(&Embedding::new(vec![1.0]), 5).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.db");

        {
            let store = SqliteVectorStore::new(Database::open(&path).await.unwrap());
            store.add(vec![record("m1", "a", &[1.0])]).await.unwrap();
        }

        let store = SqliteVectorStore::new(Database::open(&path).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 1);
        let hits = store.query(&Embedding::new(vec![1.0]), 5).await.unwrap();
        assert_eq!(hits[0].item.metadata.filename, "a");
    }

    #[tokio::test]
    async fn sources_lists_files() {
        let store = store().await;
        store
            .add(vec![record("a0", "a.txt", &[1.0]), record("a1", "a.txt", &[1.0])])
            .await
            .unwrap();

        let sources = store.sources().await.unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].chunks, 2);
        assert_eq!(sources[0].filename, "a.txt");
        assert_eq!(sources[0].kind, SourceKind::VoiceNote);
        assert_eq!(
            sources[0].last_added,
            Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn corrupt_metadata_is_reported() {
        let db = Database::open_in_memory().await.unwrap();
        db.with_conn(|conn| {
            memories::insert(
                conn,
                &MemoryRow {
                    id: "bad".to_string(),
                    text: "text".to_string(),
                    metadata: "not json".to_string(),
                    embedding: Embedding::new(vec![1.0]).to_bytes(),
                    dimension: 1,
                    created_at: Utc::now().to_rfc3339(),
                },
            )?;
            Ok(())
        })
        .await
        .unwrap();

        let store = SqliteVectorStore::new(db);
        let err = store
            .query(&Embedding::new(vec![1.0]), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { id, .. } if id == "bad"));
    }
}
