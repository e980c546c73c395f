//! Application settings and configuration types.
//!
//! Settings are persisted to `settings.json` in the user's config directory
//! (`~/.config/mnemo/` or the platform equivalent) and loaded at startup.
//! Missing fields fall back to their defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::embedding::{EmbeddingBackend, EmbeddingConfig};
use crate::memory::{chunker, MemoryConfig};
use crate::providers::ai::OLLAMA_DEFAULT_URL;

/// Application name used for config and data directories.
pub const APP_NAME: &str = "mnemo";

/// Settings file name inside the config directory.
pub const SETTINGS_FILE: &str = "settings.json";

/// Database file name inside the data directory.
pub const DATABASE_FILE: &str = "memory.db";

const OPENAI_COMPATIBLE_DEFAULT_URL: &str = "http://localhost:8080/v1";

/// Errors that can occur while loading, saving or validating settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl SettingsError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Top-level application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Chunking and retrieval.
    pub memory: MemoryConfig,
    /// Embedding model.
    pub embedding: EmbeddingConfig,
    /// Where memories are kept.
    pub storage: StorageSettings,
    /// Answering model.
    pub answering: AnsweringSettings,
    /// Voice note transcription.
    pub transcription: TranscriptionSettings,
}

/// Vector store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// SQLite database in the data directory.
    #[default]
    Sqlite,
    /// Process memory only; nothing survives a restart.
    Memory,
}

/// Storage configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    /// Database file override. Defaults to `memory.db` in the data directory.
    pub database_path: Option<PathBuf>,
}

/// Answering backend kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnsweringProvider {
    #[default]
    Ollama,
    OpenaiCompatible,
}

/// Answering model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnsweringSettings {
    pub provider: AnsweringProvider,
    /// Server URL. Defaults to the provider's usual local address.
    pub base_url: Option<String>,
    /// Bearer token for OpenAI-compatible servers.
    pub api_key: Option<String>,
    pub model: String,
    /// Sampling temperature (0.0 to 2.0).
    pub temperature: Option<f32>,
    /// Maximum tokens in the answer.
    pub max_tokens: Option<usize>,
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
    pub system_prompt: Option<String>,
    /// Context window in tokens. Defaults to a per-model guess.
    pub context_length: Option<usize>,
}

impl Default for AnsweringSettings {
    fn default() -> Self {
        Self {
            provider: AnsweringProvider::Ollama,
            base_url: None,
            api_key: None,
            model: "llama2".to_string(),
            temperature: None,
            max_tokens: None,
            timeout_secs: 120,
            system_prompt: None,
            context_length: None,
        }
    }
}

impl AnsweringSettings {
    /// Configured URL, or the provider default.
    pub fn resolved_base_url(&self) -> &str {
        match (&self.base_url, self.provider) {
            (Some(url), _) => url.as_str(),
            (None, AnsweringProvider::Ollama) => OLLAMA_DEFAULT_URL,
            (None, AnsweringProvider::OpenaiCompatible) => OPENAI_COMPATIBLE_DEFAULT_URL,
        }
    }
}

/// whisper.cpp configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionSettings {
    /// `whisper-cli` location. Searched on `PATH` when unset.
    pub binary_path: Option<PathBuf>,
    /// ggml model file, e.g. `ggml-base.en.bin`.
    pub model_path: Option<PathBuf>,
    /// Language hint (ISO 639-1).
    pub language: Option<String>,
}

/// Platform config and data directories for the application.
pub fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", APP_NAME)
}

/// `settings.json` in the config directory, or in `.` if none can be determined.
pub fn default_config_path() -> PathBuf {
    project_dirs()
        .map(|d| d.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
        .join(SETTINGS_FILE)
}

/// The data directory, or `.` if none can be determined.
pub fn default_data_dir() -> PathBuf {
    project_dirs()
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

impl Settings {
    /// Loads settings from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No settings file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(SettingsError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let settings: Self = serde_json::from_str(&raw).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    /// Writes settings as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let io_err = |source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(io_err)?;
        debug!(path = %path.display(), "Saved settings");
        Ok(())
    }

    /// Checks values that would otherwise fail later at runtime.
    pub fn validate(&self) -> Result<(), SettingsError> {
        chunker::validate(self.memory.chunk_size, self.memory.chunk_overlap)
            .map_err(|e| SettingsError::invalid("memory.chunk_size", e.to_string()))?;

        if self.memory.search_limit == 0 {
            return Err(SettingsError::invalid(
                "memory.search_limit",
                "must be greater than zero",
            ));
        }
        if let Some(min) = self.memory.min_similarity {
            if !(-1.0..=1.0).contains(&min) {
                return Err(SettingsError::invalid(
                    "memory.min_similarity",
                    "must be between -1.0 and 1.0",
                ));
            }
        }

        if self.embedding.backend == EmbeddingBackend::Hashing && self.embedding.hashing_dimension == 0
        {
            return Err(SettingsError::invalid(
                "embedding.hashing_dimension",
                "must be greater than zero",
            ));
        }

        let base_url = self.answering.resolved_base_url();
        let parsed = Url::parse(base_url)
            .map_err(|e| SettingsError::invalid("answering.base_url", format!("{base_url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SettingsError::invalid(
                "answering.base_url",
                format!("unsupported scheme '{}'", parsed.scheme()),
            ));
        }

        if self.answering.model.trim().is_empty() {
            return Err(SettingsError::invalid("answering.model", "must not be empty"));
        }
        if self.answering.timeout_secs == 0 {
            return Err(SettingsError::invalid(
                "answering.timeout_secs",
                "must be greater than zero",
            ));
        }
        if let Some(t) = self.answering.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(SettingsError::invalid(
                    "answering.temperature",
                    "must be between 0.0 and 2.0",
                ));
            }
        }
        if self.answering.context_length == Some(0) {
            return Err(SettingsError::invalid(
                "answering.context_length",
                "must be greater than zero",
            ));
        }

        Ok(())
    }

    /// Database location: the configured override or `memory.db` in `data_dir`.
    pub fn database_path(&self, data_dir: &Path) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| data_dir.join(DATABASE_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Boundary;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.memory.chunk_size, 1000);
        assert_eq!(settings.memory.chunk_overlap, 200);
        assert_eq!(settings.memory.search_limit, 5);
        assert_eq!(settings.answering.model, "llama2");
        assert_eq!(settings.answering.resolved_base_url(), "http://localhost:11434");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let settings: Settings = serde_json::from_str(
            r#"{
                "memory": {"chunk_size": 500, "boundary": "natural"},
                "answering": {"provider": "openai_compatible", "model": "qwen2.5"}
            }"#,
        )
        .unwrap();

        assert_eq!(settings.memory.chunk_size, 500);
        assert_eq!(settings.memory.chunk_overlap, 200);
        assert_eq!(settings.memory.boundary, Boundary::Natural);
        assert_eq!(settings.answering.provider, AnsweringProvider::OpenaiCompatible);
        assert_eq!(settings.answering.resolved_base_url(), "http://localhost:8080/v1");
        assert_eq!(settings.storage.backend, StorageBackend::Sqlite);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings.answering, AnsweringSettings::default());
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE);

        let mut settings = Settings::default();
        settings.embedding.backend = EmbeddingBackend::Hashing;
        settings.storage.backend = StorageBackend::Memory;
        settings.transcription.model_path = Some(PathBuf::from("/models/ggml-base.bin"));
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.embedding.backend, EmbeddingBackend::Hashing);
        assert_eq!(loaded.storage.backend, StorageBackend::Memory);
        assert_eq!(loaded.transcription, settings.transcription);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            Settings::load(&path),
            Err(SettingsError::Parse { .. })
        ));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut settings = Settings::default();
        settings.memory.chunk_overlap = 1000;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::Invalid { field: "memory.chunk_size", .. })
        ));

        let mut settings = Settings::default();
        settings.answering.base_url = Some("not a url".to_string());
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::Invalid { field: "answering.base_url", .. })
        ));

        let mut settings = Settings::default();
        settings.answering.base_url = Some("ftp://localhost:11434".to_string());
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.answering.timeout_secs = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.memory.min_similarity = Some(1.5);
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.answering.context_length = Some(0);
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::Invalid { field: "answering.context_length", .. })
        ));
    }

    #[test]
    fn database_path_override() {
        let mut settings = Settings::default();
        assert_eq!(
            settings.database_path(Path::new("/data")),
            PathBuf::from("/data/memory.db")
        );

        settings.storage.database_path = Some(PathBuf::from("/elsewhere/m.db"));
        assert_eq!(
            settings.database_path(Path::new("/data")),
            PathBuf::from("/elsewhere/m.db")
        );
    }
}
