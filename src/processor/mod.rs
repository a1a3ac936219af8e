//! Content processor module for RAG
//!
//! This module turns an uploaded PDF into chunks ready for embedding:
//! text extraction through a transient file, then overlapping chunking.

mod chunking;
mod config;
mod error;
mod pdf;

pub use chunking::{TextChunk, chunk_text};
pub use config::{ChunkOptions, ChunkOptionsBuilder, IngestOptions};
pub use error::ProcessError;
pub use pdf::{ExtractedText, extract_pdf_text};

use tracing::{info, instrument};

/// A document that has been read and split, not yet embedded
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    /// Display name of the document, stored with every vector
    pub source: String,

    /// Number of pages read
    pub pages: usize,

    /// Chunks in document order
    pub chunks: Vec<TextChunk>,
}

/// Extract and chunk a PDF
///
/// # Arguments
///
/// * `bytes` - The raw PDF
/// * `source` - Display name of the document
/// * `ingest` - Extraction limits
/// * `chunk_options` - Chunking options
///
/// # Returns
///
/// The prepared document; no remote service has been contacted yet
#[instrument(skip(bytes, ingest, chunk_options))]
pub async fn prepare_document(
    bytes: &[u8],
    source: &str,
    ingest: &IngestOptions,
    chunk_options: &ChunkOptions,
) -> Result<PreparedDocument, ProcessError> {
    let extracted = extract_pdf_text(bytes, ingest).await?;
    info!("Read {} pages from {}", extracted.pages, source);

    let chunks = chunk_text(&extracted.text, chunk_options)?;
    info!("Created {} chunks from {}", chunks.len(), source);

    Ok(PreparedDocument {
        source: source.to_string(),
        pages: extracted.pages,
        chunks,
    })
}
