//! PDF text extraction for the processor module
//!
//! The extractor needs file-backed access, so the uploaded bytes are written
//! to a uniquely named temporary file that is removed on every exit path.

use std::io::Write;

use tracing::{debug, instrument, warn};

use crate::processor::config::IngestOptions;
use crate::processor::error::ProcessError;

/// Text pulled out of a document, pages joined in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    /// Concatenated page texts, separated by newlines
    pub text: String,

    /// Number of pages in the document
    pub pages: usize,
}

/// Extract the text of every page of a PDF
///
/// # Arguments
///
/// * `bytes` - The raw PDF
/// * `options` - Size cap and scratch directory
///
/// # Returns
///
/// The page texts joined with `\n`, or `EmptyDocument` when nothing but whitespace came out
#[instrument(skip(bytes, options), fields(bytes = bytes.len()))]
pub async fn extract_pdf_text(
    bytes: &[u8],
    options: &IngestOptions,
) -> Result<ExtractedText, ProcessError> {
    if bytes.len() > options.max_bytes {
        return Err(ProcessError::TooLarge {
            size: bytes.len(),
            limit: options.max_bytes,
        });
    }

    let mut builder = tempfile::Builder::new();
    builder.prefix("intellidoc-").suffix(".pdf");
    let mut file = match &options.temp_dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    file.write_all(bytes)?;
    file.flush()?;
    debug!(path = %file.path().display(), "Wrote transient copy");

    // The guard moves into the worker so it is dropped there, even if the parser panics
    let pages = tokio::task::spawn_blocking(move || {
        let pages = pdf_extract::extract_text_by_pages(file.path());
        drop(file);
        pages
    })
    .await?
    .map_err(|e| ProcessError::Extraction(format!("{:?}", e)))?;

    let page_count = pages.len();
    let text = pages.join("\n");
    if text.trim().is_empty() {
        warn!(pages = page_count, "PDF contained no extractable text");
        return Err(ProcessError::EmptyDocument);
    }

    debug!(pages = page_count, chars = text.len(), "Extracted PDF text");
    Ok(ExtractedText {
        text,
        pages: page_count,
    })
}
