//! Domain layer types.
//!
//! Identifiers, source metadata and the memory items produced by ingestion
//! and returned by search.

mod memory;
mod types;

pub use memory::{
    MemoryItem, Metadata, ScoredMemory, SearchResult, SourceMetadata, SourceSummary,
};
pub use types::{MemoryId, SourceKind};
