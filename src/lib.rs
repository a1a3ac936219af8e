//! # IntelliDoc - Question Answering over PDF Documents
//!
//! This crate turns a PDF into a searchable knowledge base and answers
//! questions about it with Retrieval-Augmented Generation (RAG). Answers can
//! be restricted to the document's content or come from the language model's
//! general knowledge, and the user switches between the two explicitly.
//!
//! ## Features
//!
//! - Environment-driven configuration with validation before any network call
//! - PDF text extraction and overlapping character-window chunking
//! - Embeddings and chat completions from Azure OpenAI deployments, rate limited
//! - Pinecone serverless indexes created on demand and polled until ready
//! - Deterministic chunk IDs, so re-processing a document overwrites its vectors
//! - A conversation session with an answer mode toggle and turn history
//! - Async API with Tokio
//!
//! ## Example
//!
//! ```rust,no_run
//! use intellidoc::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let settings = Settings::from_env()?;
//!     let mut assistant = Assistant::connect(&settings).await?;
//!
//!     let bytes = std::fs::read("florin.pdf").map_err(|e| Error::Ingestion(e.into()))?;
//!     assistant
//!         .process_document(&bytes, "florin.pdf", &settings.index_name, |_| {})
//!         .await?;
//!
//!     let answer = assistant.ask("What is the capital of Florin?").await?;
//!     println!("{}", answer.text);
//!     Ok(())
//! }
//! ```

pub mod config;
mod error;
mod markdown;
pub mod model;

// RAG pipeline modules
pub mod index;
pub mod processor;
pub mod search;
pub mod session;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
pub use markdown::{format_markdown, render_markdown};

/// Re-export of the types most callers need
pub mod prelude {
    pub use crate::config::Settings;
    pub use crate::error::Error;
    pub use crate::error::Result;
    pub use crate::search::{Answer, AnswerMode};
    pub use crate::session::{Assistant, ProcessingStage, Session};
}
