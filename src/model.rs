//! # LLM Client Module
//!
//! This module provides a unified client interface for the two model services
//! the pipeline depends on: a chat model that writes answers and an embedding
//! model that turns text into vectors.
//!
//! ## Key Components
//!
//! - `ChatModel` / `Embedder`: the capabilities the rest of the crate is written against
//! - `Client`: a unified client that wraps both a chat and an embedding model
//! - `azure`: Azure OpenAI deployments served through `rig`'s Azure provider
//! - `adapter`: exposes any `rig` completion or embedding model through the same traits
//! - `RateLimitedCompletionModel` / `RateLimitedEmbeddingModel`: `governor` pacing for `rig` models
//! - `EmbeddingConversion`: utilities for converting between embedding formats

use std::future::Future;

pub mod adapter;
pub mod azure;
pub mod embedding;
mod error;
#[cfg(test)]
pub mod mock_model;
mod ratelimited_completion;
mod ratelimited_embedding;

pub use adapter::{RigChat, RigEmbedder};
pub use azure::{AzureChat, AzureEmbedder};
pub use embedding::EmbeddingConversion;
pub use error::ModelError;
pub use ratelimited_completion::RateLimitedCompletionModel;
pub use ratelimited_embedding::RateLimitedEmbeddingModel;

use crate::config::{RequiredSettings, Settings};

/// A model that answers a single prompt with text
pub trait ChatModel: Send + Sync {
    /// Send one user message and return the reply text
    fn complete(&self, prompt: &str) -> impl Future<Output = Result<String, ModelError>> + Send;
}

/// A model that maps texts to fixed-length vectors
pub trait Embedder: Send + Sync {
    /// Dimension of every vector this model returns
    fn ndims(&self) -> usize;

    /// Largest number of texts sent in one request
    fn max_batch(&self) -> usize {
        64
    }

    /// Embed the texts, returning one vector per input in input order
    fn embed_texts(
        &self,
        texts: Vec<String>,
    ) -> impl Future<Output = Result<Vec<Vec<f32>>, ModelError>> + Send;
}

#[derive(Clone)]
pub struct Client<C, E>
where
    C: ChatModel,
    E: Embedder,
{
    completion_model: C,
    embedding_model: E,
}

impl Client<AzureChat, AzureEmbedder> {
    /// Build both Azure OpenAI clients from validated settings
    pub fn new_azure(required: RequiredSettings<'_>, settings: &Settings) -> Result<Self, ModelError> {
        let completion_model = azure::chat_model(
            &azure::Deployment {
                endpoint: required.chat_endpoint.to_string(),
                api_key: required.chat_key.to_string(),
                name: required.chat_deployment.to_string(),
                api_version: settings.chat_api_version.clone(),
            },
            settings.chat_requests_per_minute,
        )?;
        let embedding_model = azure::embedding_model(
            &azure::Deployment {
                endpoint: required.embedding_endpoint.to_string(),
                api_key: required.embedding_key.to_string(),
                name: settings.embedding_deployment.clone(),
                api_version: settings.embedding_api_version.clone(),
            },
            settings.embedding_dimension,
            settings.embedding_requests_per_minute,
        )?;
        Ok(Self {
            completion_model,
            embedding_model,
        })
    }
}

impl<C, E> Client<C, E>
where
    C: ChatModel,
    E: Embedder,
{
    pub fn new(completion_model: C, embedding_model: E) -> Self {
        Self {
            completion_model,
            embedding_model,
        }
    }

    pub fn completion(&self) -> &C {
        &self.completion_model
    }

    pub fn embedding(&self) -> &E {
        &self.embedding_model
    }
}
