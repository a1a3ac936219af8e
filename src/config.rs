//! # Configuration Module
//!
//! Resolves the settings the pipeline needs from the environment (optionally
//! seeded from a `.env` file) and validates that every required credential is
//! present before any remote service is contacted.
//!
//! ## Key Components
//!
//! - `Settings`: every tunable of the pipeline, with defaults for the optional ones
//! - `RequiredSettings`: borrowed view of the credentials, only obtainable after validation
//! - `ConfigError`: missing or malformed settings
//!
//! Required variables are `PINECONE_API_KEY`, `AZURE_OPENAI_KEY`,
//! `AZURE_OPENAI_ENDPOINT` and `DEPLOYMENT_NAME`. The embedding deployment
//! shares the chat credential and endpoint unless `AZURE_OPENAI_EMBEDDING_KEY`
//! or `AZURE_OPENAI_EMBEDDING_ENDPOINT` override them.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::processor::ChunkOptions;

/// Knowledge base used when none is given
pub const DEFAULT_INDEX_NAME: &str = "intellidoc-index";

const PINECONE_API_KEY: &str = "PINECONE_API_KEY";
const AZURE_OPENAI_KEY: &str = "AZURE_OPENAI_KEY";
const AZURE_OPENAI_ENDPOINT: &str = "AZURE_OPENAI_ENDPOINT";
const DEPLOYMENT_NAME: &str = "DEPLOYMENT_NAME";

/// Error type for configuration problems
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// One or more required settings are unset or empty
    #[error("Missing environment variables: {}", .names.join(", "))]
    Missing {
        /// Names of every absent variable
        names: Vec<&'static str>,
    },

    /// A setting is present but cannot be used
    #[error("Invalid value for {name}: {reason}")]
    Invalid {
        /// Name of the offending variable
        name: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

/// Settings for the whole pipeline
#[derive(Clone)]
pub struct Settings {
    /// Vector database credential
    pub pinecone_api_key: Option<String>,

    /// Chat service credential
    pub azure_openai_key: Option<String>,

    /// Chat service endpoint, e.g. `https://my-resource.openai.azure.com`
    pub azure_openai_endpoint: Option<String>,

    /// Chat deployment identifier
    pub chat_deployment: Option<String>,

    /// Embedding credential override
    pub embedding_key: Option<String>,

    /// Embedding endpoint override
    pub embedding_endpoint: Option<String>,

    /// Embedding deployment identifier
    pub embedding_deployment: String,

    /// API version for chat completions
    pub chat_api_version: String,

    /// API version for embeddings
    pub embedding_api_version: String,

    /// Knowledge base name
    pub index_name: String,

    /// How documents are split
    pub chunk_options: ChunkOptions,

    /// Dimension declared for the index; embeddings must match it
    pub embedding_dimension: usize,

    /// Serverless cloud for new indexes
    pub pinecone_cloud: String,

    /// Serverless region for new indexes
    pub pinecone_region: String,

    /// Chunks retrieved per grounded question
    pub top_k: usize,

    /// Upper bound on waiting for a new index to become ready
    pub index_ready_timeout: Duration,

    /// Largest PDF accepted, in bytes
    pub max_document_bytes: usize,

    /// Client-side pacing for chat requests
    pub chat_requests_per_minute: u32,

    /// Client-side pacing for embedding requests
    pub embedding_requests_per_minute: u32,
}

/// Credentials and endpoints, present by construction
#[derive(Clone, Copy)]
pub struct RequiredSettings<'a> {
    pub pinecone_api_key: &'a str,
    pub chat_key: &'a str,
    pub chat_endpoint: &'a str,
    pub chat_deployment: &'a str,
    pub embedding_key: &'a str,
    pub embedding_endpoint: &'a str,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pinecone_api_key: None,
            azure_openai_key: None,
            azure_openai_endpoint: None,
            chat_deployment: None,
            embedding_key: None,
            embedding_endpoint: None,
            embedding_deployment: "text-embedding-3-small".to_string(),
            chat_api_version: "2024-02-01".to_string(),
            embedding_api_version: "2023-05-15".to_string(),
            index_name: DEFAULT_INDEX_NAME.to_string(),
            chunk_options: ChunkOptions::default(),
            embedding_dimension: 1536,
            pinecone_cloud: "aws".to_string(),
            pinecone_region: "us-east-1".to_string(),
            top_k: 3,
            index_ready_timeout: Duration::from_secs(60),
            max_document_bytes: 50 * 1024 * 1024,
            chat_requests_per_minute: 120,
            embedding_requests_per_minute: 600,
        }
    }
}

impl Settings {
    /// Read settings from the process environment, loading `.env` first if one exists
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is the normal case
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary lookup function
    ///
    /// Only malformed values fail here; absent credentials are reported by [`Settings::validate`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let chunk_options = ChunkOptions {
            max_chars: parse_or(&get, "CHUNK_SIZE", defaults.chunk_options.max_chars)?,
            overlap: parse_or(&get, "CHUNK_OVERLAP", defaults.chunk_options.overlap)?,
        };
        chunk_options
            .validate()
            .map_err(|e| ConfigError::Invalid {
                name: if chunk_options.max_chars == 0 {
                    "CHUNK_SIZE"
                } else {
                    "CHUNK_OVERLAP"
                },
                reason: e.to_string(),
            })?;

        let embedding_dimension =
            parse_or(&get, "EMBEDDING_DIMENSION", defaults.embedding_dimension)?;
        if embedding_dimension == 0 {
            return Err(ConfigError::Invalid {
                name: "EMBEDDING_DIMENSION",
                reason: "must be greater than zero".to_string(),
            });
        }

        let top_k = parse_or(&get, "RETRIEVAL_TOP_K", defaults.top_k)?;
        if top_k == 0 {
            return Err(ConfigError::Invalid {
                name: "RETRIEVAL_TOP_K",
                reason: "must be greater than zero".to_string(),
            });
        }

        let timeout_secs = parse_or(
            &get,
            "INDEX_READY_TIMEOUT_SECS",
            defaults.index_ready_timeout.as_secs(),
        )?;
        let max_document_mb: usize = parse_or(
            &get,
            "MAX_DOCUMENT_MB",
            defaults.max_document_bytes / (1024 * 1024),
        )?;
        let max_document_bytes =
            max_document_mb
                .checked_mul(1024 * 1024)
                .ok_or_else(|| ConfigError::Invalid {
                    name: "MAX_DOCUMENT_MB",
                    reason: format!("{max_document_mb} MB does not fit in memory"),
                })?;

        let azure_openai_endpoint = get(AZURE_OPENAI_ENDPOINT);
        check_endpoint(AZURE_OPENAI_ENDPOINT, azure_openai_endpoint.as_deref())?;
        let embedding_endpoint = get("AZURE_OPENAI_EMBEDDING_ENDPOINT");
        check_endpoint(
            "AZURE_OPENAI_EMBEDDING_ENDPOINT",
            embedding_endpoint.as_deref(),
        )?;

        Ok(Self {
            pinecone_api_key: get(PINECONE_API_KEY),
            azure_openai_key: get(AZURE_OPENAI_KEY),
            azure_openai_endpoint,
            chat_deployment: get(DEPLOYMENT_NAME),
            embedding_key: get("AZURE_OPENAI_EMBEDDING_KEY"),
            embedding_endpoint,
            embedding_deployment: get("AZURE_OPENAI_EMBEDDING_DEPLOYMENT")
                .unwrap_or(defaults.embedding_deployment),
            chat_api_version: get("AZURE_OPENAI_API_VERSION")
                .unwrap_or(defaults.chat_api_version),
            embedding_api_version: get("AZURE_OPENAI_EMBEDDING_API_VERSION")
                .unwrap_or(defaults.embedding_api_version),
            index_name: get("INTELLIDOC_INDEX").unwrap_or(defaults.index_name),
            chunk_options,
            embedding_dimension,
            pinecone_cloud: get("PINECONE_CLOUD").unwrap_or(defaults.pinecone_cloud),
            pinecone_region: get("PINECONE_REGION").unwrap_or(defaults.pinecone_region),
            top_k,
            index_ready_timeout: Duration::from_secs(timeout_secs),
            max_document_bytes,
            chat_requests_per_minute: parse_or(
                &get,
                "CHAT_REQUESTS_PER_MINUTE",
                defaults.chat_requests_per_minute,
            )?,
            embedding_requests_per_minute: parse_or(
                &get,
                "EMBEDDING_REQUESTS_PER_MINUTE",
                defaults.embedding_requests_per_minute,
            )?,
        })
    }

    /// Check that every required setting is present
    ///
    /// Fails with a single error naming all absent variables.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.required().map(|_| ())
    }

    /// Borrow the credentials, failing exactly as [`Settings::validate`] does
    pub fn required(&self) -> Result<RequiredSettings<'_>, ConfigError> {
        let mut missing = Vec::new();
        if self.pinecone_api_key.is_none() {
            missing.push(PINECONE_API_KEY);
        }
        if self.azure_openai_key.is_none() {
            missing.push(AZURE_OPENAI_KEY);
        }
        if self.azure_openai_endpoint.is_none() {
            missing.push(AZURE_OPENAI_ENDPOINT);
        }
        if self.chat_deployment.is_none() {
            missing.push(DEPLOYMENT_NAME);
        }

        match (
            &self.pinecone_api_key,
            &self.azure_openai_key,
            &self.azure_openai_endpoint,
            &self.chat_deployment,
        ) {
            (Some(pinecone), Some(chat_key), Some(chat_endpoint), Some(deployment)) => {
                Ok(RequiredSettings {
                    pinecone_api_key: pinecone,
                    chat_key,
                    chat_endpoint,
                    chat_deployment: deployment,
                    embedding_key: self.embedding_key.as_deref().unwrap_or(chat_key),
                    embedding_endpoint: self.embedding_endpoint.as_deref().unwrap_or(chat_endpoint),
                })
            }
            _ => Err(ConfigError::Missing { names: missing }),
        }
    }
}

/// Endpoints must be absolute http(s) URLs; an unset endpoint is left to `required`
fn check_endpoint(name: &'static str, value: Option<&str>) -> Result<(), ConfigError> {
    let Some(raw) = value else {
        return Ok(());
    };
    let parsed = Url::parse(raw.trim()).map_err(|e| ConfigError::Invalid {
        name,
        reason: format!("'{}': {}", raw, e),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ConfigError::Invalid {
            name,
            reason: format!("unsupported scheme '{}'", scheme),
        }),
    }
}

fn parse_or<T, G>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: format!("'{}': {}", raw, e),
        }),
        None => Ok(default),
    }
}

fn redact(value: &Option<String>) -> &'static str {
    if value.is_some() { "<set>" } else { "<unset>" }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("pinecone_api_key", &redact(&self.pinecone_api_key))
            .field("azure_openai_key", &redact(&self.azure_openai_key))
            .field("azure_openai_endpoint", &self.azure_openai_endpoint)
            .field("chat_deployment", &self.chat_deployment)
            .field("embedding_key", &redact(&self.embedding_key))
            .field("embedding_endpoint", &self.embedding_endpoint)
            .field("embedding_deployment", &self.embedding_deployment)
            .field("chat_api_version", &self.chat_api_version)
            .field("embedding_api_version", &self.embedding_api_version)
            .field("index_name", &self.index_name)
            .field("chunk_options", &self.chunk_options)
            .field("embedding_dimension", &self.embedding_dimension)
            .field("pinecone_cloud", &self.pinecone_cloud)
            .field("pinecone_region", &self.pinecone_region)
            .field("top_k", &self.top_k)
            .field("index_ready_timeout", &self.index_ready_timeout)
            .field("max_document_bytes", &self.max_document_bytes)
            .finish_non_exhaustive()
    }
}
