//! Text extraction for uploaded documents.

use std::path::Path;

use thiserror::Error;
use tracing::warn;

/// Errors that can occur while extracting document text.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to extract PDF text from {filename}: {reason}")]
    Pdf { filename: String, reason: String },

    #[error("extraction task failed: {0}")]
    Task(String),
}

/// How a document's bytes are turned into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    /// Anything else is decoded as UTF-8.
    Text,
}

impl DocumentKind {
    pub fn from_filename(filename: &str) -> Self {
        let is_pdf = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            Self::Pdf
        } else {
            Self::Text
        }
    }
}

/// Extracts plain text from a document.
///
/// PDF pages are concatenated. Other files are decoded as UTF-8, with invalid
/// sequences replaced. This is CPU-bound; call it off the async runtime.
pub fn extract_text(filename: &str, bytes: &[u8]) -> Result<String, ExtractError> {
    match DocumentKind::from_filename(filename) {
        DocumentKind::Pdf => {
            let text = pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf {
                filename: filename.to_string(),
                reason: e.to_string(),
            })?;
            if text.trim().is_empty() {
                warn!(filename, "PDF contains no extractable text");
            }
            Ok(text)
        }
        DocumentKind::Text => Ok(String::from_utf8_lossy(bytes).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_extension() {
        assert_eq!(DocumentKind::from_filename("report.pdf"), DocumentKind::Pdf);
        assert_eq!(DocumentKind::from_filename("REPORT.PDF"), DocumentKind::Pdf);
        assert_eq!(DocumentKind::from_filename("notes.txt"), DocumentKind::Text);
        assert_eq!(DocumentKind::from_filename("README"), DocumentKind::Text);
        assert_eq!(DocumentKind::from_filename("pdf"), DocumentKind::Text);
    }

    #[test]
    fn text_is_decoded() {
        let text = extract_text("note1.txt", "Alice met Bob.".as_bytes()).unwrap();
        assert_eq!(text, "Alice met Bob.");
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let text = extract_text("notes.md", &[b'h', b'i', 0xff]).unwrap();
        assert_eq!(text, "hi\u{fffd}");
    }
}
