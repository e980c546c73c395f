//! Core identifier and classification types.
//!
//! Newtype wrappers keep memory identifiers from being mixed up with
//! arbitrary strings such as filenames or chunk text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unique identifier for a stored memory chunk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryId(pub String);

impl MemoryId {
    /// Derives the id for chunk `index` of `source`, ingested at `ingested_at`.
    ///
    /// The same inputs always produce the same id. Including the ingestion
    /// instant (nanosecond precision) keeps re-ingests of a file with the same
    /// name from colliding with earlier copies.
    pub fn derive(source: &str, index: usize, ingested_at: DateTime<Utc>) -> Self {
        Self(format!(
            "{}_{}_{}",
            source,
            index,
            ingested_at.format("%Y%m%dT%H%M%S%.9fZ")
        ))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MemoryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MemoryId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// What kind of source a memory was ingested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// An uploaded text or PDF document.
    #[default]
    Document,
    /// A transcribed audio recording.
    VoiceNote,
}

impl SourceKind {
    /// Returns the persisted name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::VoiceNote => "voice_note",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document" => Ok(Self::Document),
            "voice_note" => Ok(Self::VoiceNote),
            other => Err(format!("unknown source kind: {other}")),
        }
    }
}
