//! Memory database queries.
//!
//! Rows are exchanged in their stored form; decoding metadata JSON and
//! embedding blobs is left to the vector store.

use rusqlite::{params, Connection, OptionalExtension, Result, Row};

/// A memory as stored in the `memories` table.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRow {
    pub id: String,
    pub text: String,
    /// JSON-encoded metadata object.
    pub metadata: String,
    /// Little-endian `f32` values.
    pub embedding: Vec<u8>,
    pub dimension: usize,
    /// RFC 3339 time the row was written.
    pub created_at: String,
}

/// Chunk counts for one ingested source, as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    pub filename: String,
    pub kind: String,
    pub chunks: usize,
    /// Most recent metadata timestamp among the source's chunks.
    pub last_timestamp: String,
}

fn row_to_memory(row: &Row<'_>) -> Result<MemoryRow> {
    Ok(MemoryRow {
        id: row.get(0)?,
        text: row.get(1)?,
        metadata: row.get(2)?,
        embedding: row.get(3)?,
        dimension: row.get::<_, i64>(4)? as usize,
        created_at: row.get(5)?,
    })
}

/// Inserts a new memory. Fails on a duplicate id.
pub fn insert(conn: &Connection, memory: &MemoryRow) -> Result<()> {
    conn.execute(
        "INSERT INTO memories (id, text, metadata, embedding, dimension, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            memory.id,
            memory.text,
            memory.metadata,
            memory.embedding,
            memory.dimension as i64,
            memory.created_at,
        ],
    )?;
    Ok(())
}

/// Gets a memory by ID.
pub fn get_by_id(conn: &Connection, id: &str) -> Result<Option<MemoryRow>> {
    conn.query_row(
        "SELECT id, text, metadata, embedding, dimension, created_at
         FROM memories WHERE id = ?1",
        params![id],
        row_to_memory,
    )
    .optional()
}

/// Returns whether a memory with this ID exists.
pub fn exists(conn: &Connection, id: &str) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM memories WHERE id = ?1)",
        params![id],
        |row| row.get(0),
    )
}

/// Gets every stored memory.
pub fn get_all(conn: &Connection) -> Result<Vec<MemoryRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, text, metadata, embedding, dimension, created_at
         FROM memories ORDER BY created_at",
    )?;

    let rows = stmt.query_map([], row_to_memory)?;
    rows.collect()
}

/// Counts stored memories.
pub fn count(conn: &Connection) -> Result<usize> {
    conn.query_row("SELECT COUNT(*) FROM memories", [], |row| {
        row.get::<_, i64>(0)
    })
    .map(|n| n as usize)
}

/// Returns the embedding dimension of stored memories, if any exist.
pub fn dimension(conn: &Connection) -> Result<Option<usize>> {
    conn.query_row("SELECT dimension FROM memories LIMIT 1", [], |row| {
        row.get::<_, i64>(0)
    })
    .optional()
    .map(|d| d.map(|d| d as usize))
}

/// Summarizes stored memories per source file, most recent first.
pub fn sources(conn: &Connection) -> Result<Vec<SourceRow>> {
    let mut stmt = conn.prepare(
        "SELECT json_extract(metadata, '$.filename') AS filename,
                json_extract(metadata, '$.type') AS kind,
                COUNT(*),
                MAX(json_extract(metadata, '$.timestamp')) AS last_timestamp
         FROM memories
         GROUP BY filename, kind
         ORDER BY last_timestamp DESC",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(SourceRow {
            filename: row.get(0)?,
            kind: row.get(1)?,
            chunks: row.get::<_, i64>(2)? as usize,
            last_timestamp: row.get(3)?,
        })
    })?;

    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        for migration in schema::all_migrations() {
            conn.execute_batch(migration).unwrap();
        }
        conn
    }

    fn row(id: &str, filename: &str, timestamp: &str) -> MemoryRow {
        MemoryRow {
            id: id.to_string(),
            text: format!("body of {id}"),
            metadata: format!(
                r#"{{"filename":"{filename}","type":"document","timestamp":"{timestamp}"}}"#
            ),
            embedding: vec![0, 0, 128, 63],
            dimension: 1,
            created_at: timestamp.to_string(),
        }
    }

    #[test]
    fn insert_and_get() {
        let conn = setup();
        let memory = row("m1", "a.txt", "2024-05-01T00:00:00Z");
        insert(&conn, &memory).unwrap();

        assert_eq!(get_by_id(&conn, "m1").unwrap(), Some(memory));
        assert_eq!(get_by_id(&conn, "missing").unwrap(), None);
    }

    #[test]
    fn insert_duplicate_fails() {
        let conn = setup();
        insert(&conn, &row("m1", "a.txt", "2024-05-01T00:00:00Z")).unwrap();
        assert!(insert(&conn, &row("m1", "a.txt", "2024-05-01T00:00:00Z")).is_err());
    }

    #[test]
    fn exists_and_count() {
        let conn = setup();
        assert_eq!(count(&conn).unwrap(), 0);
        assert!(!exists(&conn, "m1").unwrap());

        insert(&conn, &row("m1", "a.txt", "2024-05-01T00:00:00Z")).unwrap();
        assert!(exists(&conn, "m1").unwrap());
        assert_eq!(count(&conn).unwrap(), 1);
    }

    #[test]
    fn dimension_of_empty_table_is_none() {
        let conn = setup();
        assert_eq!(dimension(&conn).unwrap(), None);

        insert(&conn, &row("m1", "a.txt", "2024-05-01T00:00:00Z")).unwrap();
        assert_eq!(dimension(&conn).unwrap(), Some(1));
    }

    #[test]
    fn get_all_orders_by_creation_time() {
        let conn = setup();
        insert(&conn, &row("late", "a.txt", "2024-05-02T00:00:00Z")).unwrap();
        insert(&conn, &row("early", "a.txt", "2024-05-01T00:00:00Z")).unwrap();

        let ids: Vec<_> = get_all(&conn).unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[test]
    fn sources_groups_by_file() {
        let conn = setup();
        insert(&conn, &row("a0", "a.txt", "2024-05-01T00:00:00Z")).unwrap();
        insert(&conn, &row("a1", "a.txt", "2024-05-01T00:00:00Z")).unwrap();
        insert(&conn, &row("b0", "b.pdf", "2024-06-01T00:00:00Z")).unwrap();

        let summaries = sources(&conn).unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].filename, "b.pdf");
        assert_eq!(summaries[0].chunks, 1);
        assert_eq!(summaries[1].filename, "a.txt");
        assert_eq!(summaries[1].chunks, 2);
        assert_eq!(summaries[1].kind, "document");
    }
}
