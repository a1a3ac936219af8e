//! Error types for the processor module

use thiserror::Error;

/// Error type for processor operations
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Extraction produced no usable text
    #[error("No text could be extracted from the PDF file")]
    EmptyDocument,

    /// The PDF could not be parsed
    #[error("PDF extraction error: {0}")]
    Extraction(String),

    /// The document exceeds the configured size cap
    #[error("Document is {size} bytes, larger than the {limit} byte limit")]
    TooLarge {
        /// Size of the rejected document
        size: usize,
        /// Configured maximum
        limit: usize,
    },

    /// Writing the transient copy failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Chunking error
    #[error("Chunking error: {0}")]
    Chunking(String),
}

impl From<tokio::task::JoinError> for ProcessError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            Self::Extraction("the PDF parser aborted on this document".to_string())
        } else {
            Self::Extraction(format!("extraction task failed: {}", err))
        }
    }
}
