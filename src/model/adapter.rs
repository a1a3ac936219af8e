//! Adapters exposing `rig` models through the crate's model traits
//!
//! Any provider `rig` supports can answer questions or embed chunks without
//! the rest of the pipeline knowing about it. The Azure OpenAI clients are
//! built this way.

use rig::{
    completion::{AssistantContent, CompletionModel},
    embeddings::EmbeddingModel,
};
use tracing::instrument;

use super::{ChatModel, Embedder, EmbeddingConversion, ModelError};

/// A `rig` completion model answering single prompts
///
/// The prompt goes out as the only user message, with no system message.
#[derive(Clone)]
pub struct RigChat<M: CompletionModel> {
    model: M,
}

impl<M> RigChat<M>
where
    M: CompletionModel,
{
    pub fn new(model: M) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &M {
        &self.model
    }
}

impl<M> ChatModel for RigChat<M>
where
    M: CompletionModel + 'static,
{
    #[instrument(skip(self, prompt), fields(prompt_chars = prompt.len()))]
    async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
        let response = self.model.completion_request(prompt).send().await?;

        let text: Vec<String> = response
            .choice
            .iter()
            .filter_map(|content| match content {
                AssistantContent::Text(text) => Some(text.text.clone()),
                _ => None,
            })
            .collect();

        if text.is_empty() {
            return Err(ModelError::UnexpectedResponse(
                "completion had no text content".to_string(),
            ));
        }
        Ok(text.join("\n"))
    }
}

/// A `rig` embedding model producing `f32` vectors
#[derive(Clone)]
pub struct RigEmbedder<M: EmbeddingModel> {
    model: M,
}

impl<M> RigEmbedder<M>
where
    M: EmbeddingModel,
{
    pub fn new(model: M) -> Self {
        Self { model }
    }
}

impl<M> Embedder for RigEmbedder<M>
where
    M: EmbeddingModel,
{
    fn ndims(&self) -> usize {
        self.model.ndims()
    }

    fn max_batch(&self) -> usize {
        M::MAX_DOCUMENTS
    }

    #[instrument(skip(self, texts), fields(count = texts.len()))]
    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ModelError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let expected = texts.len();
        let embeddings = self.model.embed_texts(texts).await?;

        if embeddings.len() != expected {
            return Err(ModelError::UnexpectedResponse(format!(
                "expected {} embeddings, got {}",
                expected,
                embeddings.len()
            )));
        }
        Ok(embeddings.iter().map(|e| e.to_vec()).collect())
    }
}
