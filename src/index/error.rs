//! # Index Error Types Module
//!
//! This module defines error types specific to the vector database side of the
//! RAG pipeline: talking to the index service, waiting for new indexes, and
//! writing embedded chunks.
//!
//! ## Key Components
//!
//! - `IndexError`: Enum representing different types of index operation failures
//!
//! Failures while writing a document are wrapped in `IndexError::Upload`, which
//! records how many vectors were committed before the failure so a partial
//! write is never silent.

use std::time::Duration;

use thiserror::Error;

use crate::model::ModelError;

/// Error type for index operations
#[derive(Debug, Error)]
pub enum IndexError {
    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API error
    #[error("API error ({status_code}): {message}")]
    Api {
        /// Status code
        status_code: u16,
        /// Error message
        message: String,
    },

    /// Authentication error
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimit,

    /// The index already exists
    #[error("Index already exists")]
    Conflict,

    /// The index does not exist
    #[error("Index '{0}' not found")]
    NotFound(String),

    /// The name breaks the service's naming rules
    #[error("'{0}' must be 1-45 lowercase letters, digits or hyphens, starting and ending with a letter or digit")]
    InvalidName(String),

    /// The index did not report ready within the bound
    #[error("Index '{index}' not ready after {waited:?}")]
    NotReady {
        /// Name of the index
        index: String,
        /// How long we waited
        waited: Duration,
    },

    /// A vector does not have the index's dimension
    #[error("Embedding has {actual} dimensions, index expects {expected}")]
    DimensionMismatch {
        /// Dimension of the index
        expected: usize,
        /// Dimension received
        actual: usize,
    },

    /// The embedding model failed
    #[error("Embedding error: {0}")]
    Embedding(#[from] ModelError),

    /// The service answered with something we could not use
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Writing a document failed part way through
    #[error("Upload to '{index}' stopped after {committed} vectors: {source}")]
    Upload {
        /// Name of the index
        index: String,
        /// Vectors upserted before the failure
        committed: usize,
        /// Underlying failure
        source: Box<IndexError>,
    },
}
