//! SQL schema definitions as const strings.
//!
//! Migrations are applied in order and tracked with `PRAGMA user_version`,
//! so new statements must only ever be appended.

/// SQL to create the memories table.
///
/// `metadata` holds the JSON object `{"filename", "type", "timestamp"}`;
/// `embedding` holds little-endian `f32` values.
pub const CREATE_MEMORIES: &str = r#"
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    text TEXT NOT NULL CHECK (length(trim(text)) > 0),
    metadata TEXT NOT NULL,
    embedding BLOB NOT NULL,
    dimension INTEGER NOT NULL,
    created_at TEXT NOT NULL
)
"#;

/// SQL to create memory indexes.
pub const CREATE_MEMORY_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_memories_filename ON memories(json_extract(metadata, '$.filename'));
CREATE INDEX IF NOT EXISTS idx_memories_created ON memories(created_at DESC)
"#;

/// Returns all schema creation statements in order.
pub fn all_migrations() -> Vec<&'static str> {
    vec![CREATE_MEMORIES, CREATE_MEMORY_INDEXES]
}
