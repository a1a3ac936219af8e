//! # Mock rig Models for Testing
//!
//! Provides a `MockCompletionModel` and a `MockEmbeddingModel` that implement
//! the `rig` model traits, so the adapters can be tested without API calls.

use rig::{
    completion::{
        AssistantContent, CompletionError, CompletionModel, CompletionRequest, CompletionResponse,
    },
    embeddings::{Embedding, EmbeddingError, EmbeddingModel},
    one_or_many::OneOrMany,
};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::EmbeddingConversion;

/// A mock completion model for testing purposes.
/// It returns a predefined response when `completion` is called.
#[derive(Debug, Clone)]
pub struct MockCompletionModel {
    response: Arc<Mutex<Option<OneOrMany<AssistantContent>>>>,
}

impl MockCompletionModel {
    /// Creates a new mock model that will return an empty text response.
    pub fn new() -> Self {
        Self {
            response: Arc::new(Mutex::new(None)),
        }
    }

    /// Sets the text that the mock model should return.
    pub async fn set_text_response(&self, text: &str) {
        let mut guard = self.response.lock().await;
        *guard = Some(OneOrMany::one(AssistantContent::text(text)));
    }
}

impl CompletionModel for MockCompletionModel {
    type Response = String;

    async fn completion(
        &self,
        _completion_request: CompletionRequest,
    ) -> Result<CompletionResponse<Self::Response>, CompletionError> {
        let response = {
            let guard = self.response.lock().await;
            guard.clone()
        };
        Ok(CompletionResponse {
            choice: response.unwrap_or_else(|| OneOrMany::one(AssistantContent::text(""))),
            raw_response: "".to_string(),
        })
    }
}

/// A mock embedding model whose first component is the text length
#[derive(Debug, Clone)]
pub struct MockEmbeddingModel {
    ndims: usize,
}

impl MockEmbeddingModel {
    pub fn new(ndims: usize) -> Self {
        Self { ndims }
    }
}

impl EmbeddingModel for MockEmbeddingModel {
    const MAX_DOCUMENTS: usize = 16;

    fn ndims(&self) -> usize {
        self.ndims
    }

    async fn embed_texts(
        &self,
        texts: impl IntoIterator<Item = String> + Send,
    ) -> Result<Vec<Embedding>, EmbeddingError> {
        Ok(texts
            .into_iter()
            .map(|text| {
                let mut vec = vec![0.0; self.ndims];
                vec[0] = text.chars().count() as f32;
                Embedding::from_vec(&text, vec)
            })
            .collect())
    }
}
