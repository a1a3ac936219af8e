//! Error types for the intellidoc crate

use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;
use crate::index::IndexError;
use crate::processor::ProcessError;
use crate::search::{AnswerMode, SearchError};

/// Result type for intellidoc operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for pipeline operations
///
/// Every module error is folded into one of these variants at the session boundary.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid settings; nothing can start until they are fixed
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// The document could not be read or contained no text
    #[error("Ingestion failed: {0}")]
    Ingestion(ProcessError),

    /// Splitting parameters were rejected
    #[error("Chunking failed: {0}")]
    Chunking(String),

    /// A remote service rejected the credentials or could not be reached
    #[error("Service initialization failed: {0}")]
    ServiceInitialization(String),

    /// Index creation did not finish within the readiness bound
    #[error("Index '{index}' was not ready after {waited:?}")]
    IndexNotReady {
        /// Name of the index
        index: String,
        /// How long we waited before giving up
        waited: Duration,
    },

    /// Embedding or upserting failed part way through a document
    #[error("Upload to index '{index}' failed after {committed} vectors were written: {source}")]
    Upload {
        /// Name of the index
        index: String,
        /// Vectors that were upserted before the failure
        committed: usize,
        /// Underlying failure
        #[source]
        source: IndexError,
    },

    /// The language model (or the retrieval feeding it) failed
    #[error("Answer generation failed in {mode} mode: {source}")]
    Generation {
        /// Mode the question was asked in
        mode: AnswerMode,
        /// Underlying failure
        #[source]
        source: SearchError,
    },

    /// Index names are restricted to the vector database's character set
    #[error("Invalid index name: {0}")]
    InvalidIndexName(String),

    /// A question was asked before any document was processed
    #[error("No document has been processed yet")]
    NoDocument,

    /// A document is already loaded in this session
    #[error("A document is already loaded; start a new document first")]
    DocumentAlreadyProcessed,
}

impl Error {
    /// Whether the user can retry the action without changing configuration
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Error::Configuration(_) | Error::Chunking(_) | Error::ServiceInitialization(_)
        )
    }

    /// Message suitable for showing to the user in place of a result
    pub fn user_message(&self) -> String {
        match self {
            Error::Ingestion(_)
            | Error::Chunking(_)
            | Error::IndexNotReady { .. }
            | Error::Upload { .. }
            | Error::InvalidIndexName(_) => format!("Error processing PDF: {self}"),
            Error::Generation { .. } => format!("Error generating response: {self}"),
            _ => self.to_string(),
        }
    }
}

impl From<ProcessError> for Error {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::Chunking(message) => Error::Chunking(message),
            other => Error::Ingestion(other),
        }
    }
}

impl From<IndexError> for Error {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::NotReady { index, waited } => Error::IndexNotReady { index, waited },
            IndexError::Upload {
                index,
                committed,
                source,
            } => Error::Upload {
                index,
                committed,
                source: *source,
            },
            IndexError::InvalidName(name) => Error::InvalidIndexName(name),
            other => Error::ServiceInitialization(other.to_string()),
        }
    }
}
