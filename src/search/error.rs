//! # Search Error Types Module
//!
//! This module defines error types specific to the retrieval and answering
//! side of the RAG pipeline.
//!
//! ## Key Components
//!
//! - `SearchError`: Enum representing different types of search failures
//!
//! The variants say which step failed: embedding the question, querying the
//! index, or the language model call itself.

use thiserror::Error;

use crate::index::IndexError;
use crate::model::ModelError;

/// Errors that can occur during search operations
#[derive(Debug, Error)]
pub enum SearchError {
    /// Error occurred while querying the index
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] IndexError),

    /// Error occurred during question embedding
    #[error("Embedding error: {0}")]
    Embedding(#[source] ModelError),

    /// Error occurred in the language model call
    #[error("Completion error: {0}")]
    Generation(#[source] ModelError),

    /// Grounded answering needs an index
    #[error("No index is connected")]
    MissingIndex,

    /// Invalid search parameters
    #[error("Invalid search parameters: {0}")]
    InvalidParameters(String),
}
