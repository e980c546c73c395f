//! Persistent storage.
//!
//! - SQLite database with schema migrations
//! - Memory row queries
//! - [`SqliteVectorStore`], the persistent [`crate::embedding::VectorStore`]
//!
//! All SQLite work runs via `tokio::task::spawn_blocking`.

mod database;
mod memory_store;
pub mod queries;
mod schema;

pub use database::{Database, DatabaseError, Result};
pub use memory_store::SqliteVectorStore;
