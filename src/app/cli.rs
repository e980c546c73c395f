//! Command-line interface.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;

use super::App;
use crate::config::{default_config_path, default_data_dir, AnsweringProvider, Settings};
use crate::services::{AssistantError, ServiceStatus};

/// Personal memory assistant: store documents and voice notes, then ask
/// questions about them.
#[derive(Parser, Debug)]
#[command(name = "mnemo", version)]
pub struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory holding the memory database
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add text or PDF documents to memory
    Add {
        /// Files to add
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Transcribe voice notes and add them to memory
    Voice {
        /// Audio files (wav, mp3, m4a, ogg, flac)
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Ask a question about your memories
    Ask {
        /// The question
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },

    /// Show the stored passages most similar to a query
    Search {
        /// Search text
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Maximum number of passages
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Show memory size and backend readiness
    Status,

    /// Write the current settings (defaults if none exist) to the settings file
    Init,
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(default_config_path)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }
}

/// First `max_chars` chars of `text`, with an ellipsis when cut.
fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.char_indices();
    match chars.nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn file_name(path: &std::path::Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .with_context(|| format!("{} has no usable file name", path.display()))
}

fn hint_for(settings: &Settings, err: &AssistantError) -> Option<String> {
    let AssistantError::ServiceUnavailable { service, .. } = err else {
        return None;
    };

    if service == "transcription" {
        return Some(
            "Install whisper.cpp (`whisper-cli`) and set transcription.model_path \
             to a ggml model file."
                .to_string(),
        );
    }

    Some(match settings.answering.provider {
        AnsweringProvider::Ollama => format!(
            "Make sure Ollama is running (`ollama serve`) and the model is pulled \
             (`ollama pull {}`).",
            settings.answering.model
        ),
        AnsweringProvider::OpenaiCompatible => format!(
            "Make sure the server at {} is running and serves model '{}'.",
            settings.answering.resolved_base_url(),
            settings.answering.model
        ),
    })
}

fn describe(err: AssistantError, settings: &Settings) -> anyhow::Error {
    match hint_for(settings, &err) {
        Some(hint) => anyhow::anyhow!("{err}\nhint: {hint}"),
        None => err.into(),
    }
}

fn print_service(label: &str, status: &ServiceStatus) {
    let state = if status.ready { "ready" } else { "unavailable" };
    match &status.detail {
        Some(detail) => println!("{label}: {} - {state} ({detail})", status.name),
        None => println!("{label}: {} - {state}", status.name),
    }
}

/// Runs a parsed command line.
pub async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config_path();
    let settings = Settings::load(&config_path)?;

    if let Command::Init = cli.command {
        settings.save(&config_path)?;
        println!("Wrote settings to {}", config_path.display());
        return Ok(());
    }

    let app = App::from_settings(settings, cli.data_dir()).await?;
    let assistant = app.assistant();

    match cli.command {
        Command::Add { files } => {
            for path in files {
                let name = file_name(&path)?;
                let bytes = tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?;
                let report = assistant.add_document(&name, bytes).await?;
                println!("Added {} to memory ({} chunks)", name, report.chunks_stored);
            }
        }
        Command::Voice { files } => {
            for path in files {
                let name = file_name(&path)?;
                let bytes = tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?;
                let report = assistant
                    .add_voice_note(&name, bytes)
                    .await
                    .map_err(|e| describe(e, app.settings()))?;
                println!(
                    "Transcribed and added {} ({} chunks)",
                    name, report.ingest.chunks_stored
                );
                println!("Transcription: {}", preview(&report.transcript.text, 200));
            }
        }
        Command::Ask { question } => {
            let question = question.join(" ");
            let answer = assistant
                .ask(&question)
                .await
                .map_err(|e| describe(e, app.settings()))?;

            println!("{}", answer.text);
            if !answer.sources.is_empty() {
                println!("\nSources:");
                for (i, hit) in answer.sources.iter().enumerate() {
                    println!(
                        "  {}. {} (score {:.3})\n     {}",
                        i + 1,
                        hit.item.metadata.filename,
                        hit.score,
                        preview(&hit.item.text, 300).replace('\n', " ")
                    );
                }
            }
        }
        Command::Search { query, limit } => {
            let query = query.join(" ");
            let results = assistant.search(&query, limit).await?;
            if results.is_empty() {
                println!("No matching memories.");
            }
            for hit in &results {
                println!(
                    "[{:.3}] {} ({}, {})\n  {}",
                    hit.score,
                    hit.item.metadata.filename,
                    hit.item.metadata.kind,
                    hit.item.metadata.timestamp.to_rfc3339(),
                    preview(&hit.item.text, 300).replace('\n', " ")
                );
            }
        }
        Command::Status => {
            let status = assistant.status().await?;
            println!("Memories: {}", status.memories);
            if !status.sources.is_empty() {
                println!("Sources:");
                for source in &status.sources {
                    println!(
                        "  {} ({}, {} chunks, added {})",
                        source.filename,
                        source.kind,
                        source.chunks,
                        source.last_added.to_rfc3339()
                    );
                }
            }
            println!("Data directory: {}", app.data_dir().display());
            print_service("Answering", &status.answering);
            print_service("Transcription", &status.transcription);
            if !status.answering.ready {
                warn!("Answering backend is not ready; `ask` will fail until it is");
            }
        }
        Command::Init => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "mnemo",
            "ask",
            "when",
            "did",
            "I",
            "meet",
            "Bob?",
            "--data-dir",
            "/tmp/mnemo",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.data_dir(), PathBuf::from("/tmp/mnemo"));
        match cli.command {
            Command::Ask { question } => assert_eq!(question.join(" "), "when did I meet Bob?"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn search_limit_flag() {
        let cli = Cli::try_parse_from(["mnemo", "search", "Project", "X", "-n", "3"]).unwrap();
        match cli.command {
            Command::Search { query, limit } => {
                assert_eq!(query, vec!["Project", "X"]);
                assert_eq!(limit, Some(3));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn add_requires_files() {
        assert!(Cli::try_parse_from(["mnemo", "add"]).is_err());
    }

    #[test]
    fn preview_is_char_safe() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("héllo wörld", 5), "héllo...");
    }

    #[test]
    fn unavailable_errors_get_a_hint() {
        let settings = Settings::default();
        let err = AssistantError::ServiceUnavailable {
            service: "answering model".to_string(),
            reason: "connection refused".to_string(),
        };
        let hint = hint_for(&settings, &err).unwrap();
        assert!(hint.contains("ollama pull llama2"));

        assert!(hint_for(&settings, &AssistantError::Input("x".to_string())).is_none());
    }

    #[tokio::test]
    async fn init_writes_settings() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("settings.json");
        let cli = Cli::try_parse_from([
            "mnemo",
            "--config",
            config.to_str().unwrap(),
            "init",
        ])
        .unwrap();

        run(cli).await.unwrap();
        assert!(Settings::load(&config).is_ok());
        assert!(config.exists());
    }
}
