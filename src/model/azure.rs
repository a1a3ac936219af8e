//! Azure OpenAI models for chat completions and embeddings
//!
//! Both are `rig` Azure models paced by a `governor` rate limiter. Pacing
//! delays requests; nothing is retried.

use std::num::NonZeroU32;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::header::HeaderValue;
use rig::providers::azure;

use super::{
    ModelError, RateLimitedCompletionModel, RateLimitedEmbeddingModel, RigChat, RigEmbedder,
};

/// Chat completions against one deployment
pub type AzureChat = RigChat<RateLimitedCompletionModel<azure::CompletionModel>>;

/// Embeddings from one deployment
pub type AzureEmbedder = RigEmbedder<RateLimitedEmbeddingModel<azure::EmbeddingModel>>;

/// Where a deployment lives and how to reach it
#[derive(Clone)]
pub struct Deployment {
    /// Resource endpoint, e.g. `https://my-resource.openai.azure.com`
    pub endpoint: String,

    /// Credential sent in the `api-key` header
    pub api_key: String,

    /// Deployment identifier
    pub name: String,

    /// Value of the `api-version` query parameter
    pub api_version: String,
}

impl std::fmt::Debug for Deployment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deployment")
            .field("endpoint", &self.endpoint)
            .field("name", &self.name)
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

impl Deployment {
    fn client(&self) -> Result<azure::Client, ModelError> {
        // rig panics on keys that cannot be sent as a header
        HeaderValue::from_str(&self.api_key).map_err(|_| {
            ModelError::Auth(format!(
                "the key for deployment '{}' is not a valid header value",
                self.name
            ))
        })?;

        Ok(azure::Client::from_api_key(
            &self.api_key,
            &self.api_version,
            self.endpoint.trim_end_matches('/'),
        ))
    }
}

fn limiter(requests_per_minute: u32) -> DefaultDirectRateLimiter {
    RateLimiter::direct(Quota::per_minute(
        NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN),
    ))
}

/// Build the chat model for a deployment
pub fn chat_model(deployment: &Deployment, requests_per_minute: u32) -> Result<AzureChat, ModelError> {
    let model = deployment.client()?.completion_model(&deployment.name);
    Ok(RigChat::new(RateLimitedCompletionModel::new(
        model,
        limiter(requests_per_minute),
    )))
}

/// Build the embedding model for a deployment
pub fn embedding_model(
    deployment: &Deployment,
    ndims: usize,
    requests_per_minute: u32,
) -> Result<AzureEmbedder, ModelError> {
    let model = deployment
        .client()?
        .embedding_model_with_ndims(&deployment.name, ndims);
    Ok(RigEmbedder::new(RateLimitedEmbeddingModel::new(
        model,
        limiter(requests_per_minute),
    )))
}
