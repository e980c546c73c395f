//! Memory engine: chunking, ingest and similarity search.

pub mod chunker;
mod engine;
mod error;

pub use chunker::{Boundary, Chunk, ChunkError, Chunks};
pub use engine::{IngestReport, MemoryConfig, MemoryEngine, DEFAULT_SEARCH_LIMIT};
pub use error::{BackendError, MemoryError};
