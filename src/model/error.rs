//! Error types for the model module

use rig::completion::CompletionError;
use rig::embeddings::EmbeddingError;
use serde::Deserialize;
use thiserror::Error;

/// Error type for remote model calls
#[derive(Debug, Error)]
pub enum ModelError {
    /// The request never got an answer
    #[error("HTTP error: {0}")]
    Http(String),

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

    /// The service answered with something we could not use
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Error reported by a `rig` provider
    #[error("Provider error: {0}")]
    Provider(String),
}

// Azure OpenAI error body: {"error": {"code": "401", "message": "..."}}
#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: Option<serde_json::Value>,
    message: Option<String>,
}

impl ModelError {
    /// Classify the body of a failed provider response
    ///
    /// Providers hand back the raw body; numeric codes in it are mapped the
    /// same way HTTP statuses are.
    pub fn from_provider_body(body: String) -> Self {
        let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&body) else {
            return ModelError::Provider(body);
        };
        let message = envelope.error.message.unwrap_or_else(|| body.clone());
        let status = envelope.error.code.and_then(|code| match code {
            serde_json::Value::String(code) => code.parse::<u16>().ok(),
            serde_json::Value::Number(code) => code.as_u64().and_then(|c| u16::try_from(c).ok()),
            _ => None,
        });

        match status {
            Some(401) | Some(403) => ModelError::Auth(message),
            Some(429) => ModelError::RateLimit,
            Some(status_code) => ModelError::Api {
                status_code,
                message,
            },
            None => ModelError::Provider(message),
        }
    }

    /// Whether the service rejected our credentials
    pub fn is_auth(&self) -> bool {
        matches!(self, ModelError::Auth(_))
    }
}

impl From<CompletionError> for ModelError {
    fn from(err: CompletionError) -> Self {
        match err {
            CompletionError::HttpError(e) => ModelError::Http(e.to_string()),
            CompletionError::ProviderError(body) => ModelError::from_provider_body(body),
            CompletionError::JsonError(e) => ModelError::UnexpectedResponse(e.to_string()),
            CompletionError::ResponseError(message) => ModelError::UnexpectedResponse(message),
            CompletionError::RequestError(e) => ModelError::Provider(e.to_string()),
        }
    }
}

impl From<EmbeddingError> for ModelError {
    fn from(err: EmbeddingError) -> Self {
        match err {
            EmbeddingError::HttpError(e) => ModelError::Http(e.to_string()),
            EmbeddingError::ProviderError(body) => ModelError::from_provider_body(body),
            EmbeddingError::JsonError(e) => ModelError::UnexpectedResponse(e.to_string()),
            EmbeddingError::ResponseError(message) => ModelError::UnexpectedResponse(message),
            EmbeddingError::DocumentError(e) => ModelError::Provider(e.to_string()),
        }
    }
}
