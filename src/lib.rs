//! mnemo - a personal knowledge-retrieval assistant
//!
//! Documents and voice notes are split into overlapping chunks, embedded
//! and stored in a vector index. Questions are answered by retrieving the
//! most similar passages and passing them, with the question, to a locally
//! hosted language model.

pub mod app;
pub mod config;
pub mod domain;
pub mod embedding;
pub mod memory;
pub mod providers;
pub mod services;
pub mod storage;

pub use app::App;
