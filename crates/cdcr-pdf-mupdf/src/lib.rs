use std::io::Read;
use std::path::Path;

use mupdf::{Document, TextPageFlags};

use cdcr_core::{BackendError, PdfBackend};

const PDF_MAGIC: &[u8] = b"%PDF-";
/// Readers accept the header anywhere in the first kilobyte.
const HEADER_WINDOW: usize = 1024;

/// MuPDF-based implementation of [`PdfBackend`].
///
/// This crate is the sole AGPL island. It isolates the mupdf dependency
/// (which is AGPL-3.0) so that the core pipeline and its tests do not
/// transitively depend on it.
///
/// Every page is read in MuPDF's block/line order with a newline after each
/// line, and the pages are concatenated with nothing in between.
#[derive(Debug, Default, Clone, Copy)]
pub struct MupdfBackend;

impl MupdfBackend {
    pub fn new() -> Self {
        Self
    }
}

/// Reject files with no PDF header in their first kilobyte before MuPDF
/// sees them.
fn check_magic(path: &Path) -> Result<(), BackendError> {
    let mut head = Vec::with_capacity(HEADER_WINDOW);
    std::fs::File::open(path)?
        .take(HEADER_WINDOW as u64)
        .read_to_end(&mut head)?;
    if !head.windows(PDF_MAGIC.len()).any(|w| w == PDF_MAGIC) {
        return Err(BackendError::OpenError("missing %PDF- header".into()));
    }
    Ok(())
}

impl PdfBackend for MupdfBackend {
    fn extract_text(&self, path: &Path) -> Result<String, BackendError> {
        check_magic(path)?;

        let path_str = path
            .to_str()
            .ok_or_else(|| BackendError::OpenError("invalid path encoding".into()))?;

        let document =
            Document::open(path_str).map_err(|e| BackendError::OpenError(e.to_string()))?;

        let mut text = String::new();
        let mut page_count = 0usize;

        for page_result in document
            .pages()
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?
        {
            let page = page_result.map_err(|e| BackendError::ExtractionError(e.to_string()))?;
            let text_page = page
                .to_text_page(TextPageFlags::empty())
                .map_err(|e| BackendError::ExtractionError(e.to_string()))?;

            for block in text_page.blocks() {
                for line in block.lines() {
                    text.extend(line.chars().map(|c| c.char().unwrap_or('\u{FFFD}')));
                    text.push('\n');
                }
            }
            page_count += 1;
        }

        tracing::debug!(path = %path.display(), pages = page_count, chars = text.len(), "extracted PDF text");
        Ok(text)
    }
}
