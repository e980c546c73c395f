//! whisper.cpp command-line transcriber.
//!
//! Audio is written to a scratch directory, `whisper-cli` is run against it
//! with JSON output, and the segment texts are joined. The scratch directory
//! is removed when the call returns, whether it succeeded or not.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use super::{TranscribeRequest, Transcriber, Transcript, TranscriptionError, TranscriptionResult};

/// Binary name for the whisper.cpp CLI.
const BINARY_NAME: &str = "whisper-cli";

/// Older whisper.cpp builds install the binary under this name.
const ALT_BINARY_NAME: &str = "whisper-cpp";

#[derive(Debug, Deserialize)]
struct WhisperOutput {
    #[serde(default)]
    result: WhisperResult,
    #[serde(default)]
    transcription: Vec<WhisperSegment>,
}

#[derive(Debug, Default, Deserialize)]
struct WhisperResult {
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    #[serde(default)]
    text: String,
}

/// Expands a leading `~/` to the home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(dirs) = directories::BaseDirs::new() {
            return dirs.home_dir().join(stripped);
        }
    }
    path.to_path_buf()
}

fn join_segments(output: &WhisperOutput) -> String {
    output
        .transcription
        .iter()
        .map(|seg| seg.text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Transcriber backed by the whisper.cpp CLI.
#[derive(Debug, Clone, Default)]
pub struct WhisperCliTranscriber {
    binary_path: Option<PathBuf>,
    model_path: Option<PathBuf>,
    language: Option<String>,
}

impl WhisperCliTranscriber {
    pub fn new(
        binary_path: Option<PathBuf>,
        model_path: Option<PathBuf>,
        language: Option<String>,
    ) -> Self {
        Self {
            binary_path,
            model_path,
            language,
        }
    }

    /// Configured binary if it exists, otherwise the first match on `PATH`.
    fn find_binary(&self) -> Option<PathBuf> {
        if let Some(path) = self.binary_path.as_deref().map(expand_tilde) {
            if path.is_file() {
                return Some(path);
            }
        }
        which::which(BINARY_NAME)
            .or_else(|_| which::which(ALT_BINARY_NAME))
            .ok()
    }

    fn model(&self) -> TranscriptionResult<PathBuf> {
        self.model_path
            .as_deref()
            .map(expand_tilde)
            .filter(|p| p.exists())
            .ok_or_else(|| {
                TranscriptionError::Unavailable(
                    "whisper model path not configured or file not found".to_string(),
                )
            })
    }
}

#[async_trait]
impl Transcriber for WhisperCliTranscriber {
    fn name(&self) -> &'static str {
        "whisper.cpp"
    }

    fn is_configured(&self) -> bool {
        self.find_binary().is_some() && self.model().is_ok()
    }

    async fn transcribe(&self, request: TranscribeRequest) -> TranscriptionResult<Transcript> {
        let binary = self.find_binary().ok_or_else(|| {
            TranscriptionError::Unavailable(format!("{} binary not found in PATH", BINARY_NAME))
        })?;
        let model = self.model()?;

        let scratch = tempfile::Builder::new().prefix("mnemo-stt-").tempdir()?;
        let audio_path = scratch
            .path()
            .join(format!("input.{}", request.format.extension()));
        let output_prefix = scratch.path().join("transcript");
        tokio::fs::write(&audio_path, &request.audio).await?;

        let mut cmd = Command::new(&binary);
        cmd.arg("-m").arg(&model);
        cmd.arg("-f").arg(&audio_path);
        cmd.arg("-oj").arg("-of").arg(&output_prefix);
        cmd.arg("--no-prints");
        if let Some(lang) = request.language.as_ref().or(self.language.as_ref()) {
            cmd.arg("-l").arg(lang);
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        debug!(binary = %binary.display(), bytes = request.audio.len(), "Running whisper-cli");
        let output = cmd
            .output()
            .await
            .map_err(|e| TranscriptionError::Failed(format!("failed to execute whisper-cli: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TranscriptionError::Failed(format!(
                "whisper-cli exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let json = tokio::fs::read(output_prefix.with_extension("json")).await?;
        let parsed: WhisperOutput = serde_json::from_slice(&json)?;
        let transcript = Transcript {
            text: join_segments(&parsed),
            language: parsed.result.language,
        };

        info!(chars = transcript.text.len(), "Transcribed voice note");
        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::transcription::AudioFormat;

    #[test]
    fn segments_are_trimmed_and_joined() {
        let output: WhisperOutput = serde_json::from_str(
            r#"{
                "result": {"language": "en"},
                "transcription": [
                    {"text": " Alice met Bob."},
                    {"text": "   "},
                    {"text": " They discussed Project X. "}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(
            join_segments(&output),
            "Alice met Bob. They discussed Project X."
        );
        assert_eq!(output.result.language.as_deref(), Some("en"));
    }

    #[test]
    fn silent_audio_is_empty_text() {
        let output: WhisperOutput = serde_json::from_str(r#"{"transcription": []}"#).unwrap();
        assert_eq!(join_segments(&output), "");
    }

    #[test]
    fn tilde_paths_expand() {
        assert_eq!(
            expand_tilde(Path::new("/usr/bin/whisper")),
            PathBuf::from("/usr/bin/whisper")
        );
        if let Some(dirs) = directories::BaseDirs::new() {
            assert_eq!(
                expand_tilde(Path::new("~/models/base.bin")),
                dirs.home_dir().join("models/base.bin")
            );
        }
    }

    #[tokio::test]
    async fn missing_model_is_unavailable() {
        let transcriber = WhisperCliTranscriber::new(
            Some(PathBuf::from("/bin/sh")),
            Some(PathBuf::from("/definitely/not/a/model.bin")),
            None,
        );
        assert!(!transcriber.is_configured());

        let err = transcriber
            .transcribe(TranscribeRequest::new(vec![0u8; 4], AudioFormat::Wav))
            .await
            .unwrap_err();
        assert!(matches!(err, TranscriptionError::Unavailable(_)));
    }

    #[cfg(unix)]
    fn fake_whisper(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("whisper-cli");
        std::fs::write(&script, format!("#!/bin/sh\n{}", body)).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_binary_and_reads_json_output() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("ggml-base.bin");
        std::fs::write(&model, b"model").unwrap();

        // Writes a fixed transcript to the path given after -of.
        let script = fake_whisper(
            dir.path(),
            r#"while [ $# -gt 0 ]; do
  if [ "$1" = "-of" ]; then out="$2"; fi
  shift
done
printf '{"result":{"language":"en"},"transcription":[{"text":" Remember the milk."}]}' > "$out.json"
"#,
        );

        let transcriber = WhisperCliTranscriber::new(Some(script), Some(model), None);
        assert!(transcriber.is_configured());

        let transcript = transcriber
            .transcribe(TranscribeRequest::new(vec![0u8; 16], AudioFormat::Wav))
            .await
            .unwrap();
        assert_eq!(transcript.text, "Remember the milk.");
        assert_eq!(transcript.language.as_deref(), Some("en"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("ggml-base.bin");
        std::fs::write(&model, b"model").unwrap();
        let marker = dir.path().join("scratch-dir");

        // Records the scratch directory it was handed, then fails.
        let script = fake_whisper(
            dir.path(),
            &format!(
                r#"while [ $# -gt 0 ]; do
  if [ "$1" = "-of" ]; then out="$2"; fi
  shift
done
dirname "$out" > '{}'
echo 'bad audio' >&2
exit 3
"#,
                marker.display()
            ),
        );

        let transcriber = WhisperCliTranscriber::new(Some(script), Some(model), None);
        let err = transcriber
            .transcribe(TranscribeRequest::new(vec![0u8; 16], AudioFormat::Mp3))
            .await
            .unwrap_err();
        assert!(matches!(err, TranscriptionError::Failed(msg) if msg.contains("bad audio")));

        let scratch = std::fs::read_to_string(&marker).unwrap();
        let scratch = Path::new(scratch.trim());
        assert!(scratch
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("mnemo-stt-"));
        assert!(!scratch.exists());
    }
}
