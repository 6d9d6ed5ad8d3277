use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to open PDF: {0}")]
    OpenError(String),
    #[error("failed to extract text: {0}")]
    ExtractionError(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for PDF text extraction backends.
///
/// Implementors return the text of every page concatenated in page order,
/// with nothing inserted between pages. Mention detection runs on the
/// returned string as a whole.
pub trait PdfBackend: Send + Sync {
    /// Extract the full text content of a PDF file.
    fn extract_text(&self, path: &Path) -> Result<String, BackendError>;
}

/// Backend that treats every file as UTF-8 text.
///
/// Used by tests and by callers that already hold extracted text; it never
/// touches a PDF parser.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextBackend;

impl PdfBackend for PlainTextBackend {
    fn extract_text(&self, path: &Path) -> Result<String, BackendError> {
        let bytes = std::fs::read(path)?;
        String::from_utf8(bytes)
            .map_err(|e| BackendError::ExtractionError(format!("not valid UTF-8: {}", e)))
    }
}
