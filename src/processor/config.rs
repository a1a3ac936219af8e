//! # Processor Configuration Module
//!
//! Configuration structures and builders for the ingestion side of the RAG
//! pipeline: how large a PDF may be, where its transient copy is written,
//! and how its text is split into chunks.
//!
//! ## Key Components
//!
//! - `ChunkOptions`: window size and overlap, both in characters
//! - `ChunkOptionsBuilder`: builder pattern implementation for easier configuration
//! - `IngestOptions`: limits and scratch location for PDF extraction
//!
//! The chunk size trades retrieval precision against context: small windows
//! match questions tightly but carry little surrounding text into the prompt.

use std::path::PathBuf;

use crate::processor::error::ProcessError;

/// Configuration for chunking text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOptions {
    /// Maximum size of each chunk in characters
    pub max_chars: usize,

    /// Characters shared by consecutive chunks
    pub overlap: usize,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            max_chars: 1000,
            overlap: 20,
        }
    }
}

impl ChunkOptions {
    /// Create a new builder
    pub fn builder() -> ChunkOptionsBuilder {
        ChunkOptionsBuilder::new()
    }

    /// Check that the window is positive and the overlap leaves room to advance
    pub fn validate(&self) -> Result<(), ProcessError> {
        if self.max_chars == 0 {
            return Err(ProcessError::Chunking(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if self.overlap >= self.max_chars {
            return Err(ProcessError::Chunking(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.overlap, self.max_chars
            )));
        }
        Ok(())
    }
}

/// Builder for ChunkOptions
#[derive(Debug, Default)]
pub struct ChunkOptionsBuilder {
    options: ChunkOptions,
}

impl ChunkOptionsBuilder {
    /// Create a new builder with default options
    pub fn new() -> Self {
        Self {
            options: ChunkOptions::default(),
        }
    }

    /// Set the maximum chunk size
    pub fn max_chars(mut self, max_chars: usize) -> Self {
        self.options.max_chars = max_chars;
        self
    }

    /// Set the overlap size
    pub fn overlap(mut self, overlap: usize) -> Self {
        self.options.overlap = overlap;
        self
    }

    /// Build and validate the options
    pub fn build(self) -> Result<ChunkOptions, ProcessError> {
        self.options.validate()?;
        Ok(self.options)
    }
}

/// Options for reading a PDF
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Directory for the transient copy; the system temp dir when `None`
    pub temp_dir: Option<PathBuf>,

    /// Largest document accepted, in bytes
    pub max_bytes: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            temp_dir: None,
            max_bytes: 50 * 1024 * 1024,
        }
    }
}
