//! Pinecone REST client
//!
//! Index management goes to the control plane; reads and writes go to the
//! data plane host reported for each index.

use std::time::Duration;

use reqwest::{Client as ReqwestClient, RequestBuilder, StatusCode};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, instrument};

use super::{
    ChunkMetadata, IndexDescription, IndexError, IndexHandle, IndexSpec, SourceChunk, VectorRecord,
    VectorStore,
};

/// Default timeout for HTTP requests in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 60;

const CONTROL_PLANE_URL: &str = "https://api.pinecone.io";
const API_VERSION: &str = "2024-07";

/// Namespace every document is written to
const NAMESPACE: &str = "";

/// HTTP client for the Pinecone API
#[derive(Clone)]
pub struct PineconeClient {
    /// The underlying reqwest client
    client: ReqwestClient,

    /// Control plane URL
    base_url: String,

    /// API key sent with every request
    api_key: String,
}

impl std::fmt::Debug for PineconeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PineconeClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
impl PineconeClient {
    /// Set the base URL (for testing only)
    pub fn set_base_url(&mut self, url: String) {
        self.base_url = url;
    }
}

#[derive(Deserialize)]
struct IndexList {
    #[serde(default)]
    indexes: Vec<IndexModel>,
}

#[derive(Deserialize)]
struct IndexModel {
    name: String,
    dimension: usize,
    #[serde(default)]
    metric: String,
    #[serde(default)]
    host: String,
    #[serde(default)]
    status: IndexStatus,
}

#[derive(Deserialize, Default)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
}

impl From<IndexModel> for IndexDescription {
    fn from(model: IndexModel) -> Self {
        Self {
            name: model.name,
            dimension: model.dimension,
            metric: model.metric,
            host: model.host,
            ready: model.status.ready,
        }
    }
}

#[derive(Serialize)]
struct UpsertVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: &'a ChunkMetadata,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<MatchMetadata>,
}

/// Metadata as returned by queries; numbers come back as floats
#[derive(Deserialize, Default)]
struct MatchMetadata {
    #[serde(default)]
    text: String,
    #[serde(default)]
    position: f64,
    #[serde(default)]
    source: String,
}

impl PineconeClient {
    /// Create a new client with an API key
    pub fn new(api_key: &str) -> Result<Self, IndexError> {
        let client = ReqwestClient::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: CONTROL_PLANE_URL.to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn control_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn data_url(&self, index: &IndexHandle, path: &str) -> String {
        let host = index.host.trim_end_matches('/');
        if host.starts_with("http") {
            format!("{}/{}", host, path)
        } else {
            format!("https://{}/{}", host, path)
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
    }

    /// Execute an HTTP request and handle the response
    async fn execute_request<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        resource: &str,
    ) -> Result<T, IndexError> {
        let response = self.authorize(request).send().await?;

        let status = response.status();
        let response_text = response.text().await?;

        if status.is_success() {
            let body = if response_text.trim().is_empty() {
                "{}"
            } else {
                response_text.as_str()
            };
            serde_json::from_str(body).map_err(|e| {
                error!("Failed to parse response: {}", e);
                IndexError::UnexpectedResponse(format!("Failed to parse response: {}", e))
            })
        } else {
            error!("API error: {} - {}", status, response_text);

            match status {
                StatusCode::TOO_MANY_REQUESTS => Err(IndexError::RateLimit),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(IndexError::Auth(
                    "Invalid API key or credentials".to_string(),
                )),
                StatusCode::CONFLICT => Err(IndexError::Conflict),
                StatusCode::NOT_FOUND => Err(IndexError::NotFound(resource.to_string())),
                _ => Err(IndexError::Api {
                    status_code: status.as_u16(),
                    message: response_text,
                }),
            }
        }
    }
}

impl VectorStore for PineconeClient {
    #[instrument(skip(self), level = "debug")]
    async fn list_indexes(&self) -> Result<Vec<IndexDescription>, IndexError> {
        debug!("Sending GET request to indexes");
        let request = self.client.get(self.control_url("indexes"));
        let list: IndexList = self.execute_request(request, "indexes").await?;
        Ok(list.indexes.into_iter().map(IndexDescription::from).collect())
    }

    #[instrument(skip(self, spec), fields(index = %spec.name), level = "debug")]
    async fn create_index(&self, spec: &IndexSpec) -> Result<(), IndexError> {
        let body = json!({
            "name": spec.name,
            "dimension": spec.dimension,
            "metric": spec.metric,
            "spec": {
                "serverless": {
                    "cloud": spec.cloud,
                    "region": spec.region,
                }
            }
        });
        debug!("Sending POST request to indexes");
        let request = self.client.post(self.control_url("indexes")).json(&body);
        let _: IgnoredAny = self.execute_request(request, &spec.name).await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn describe_index(&self, name: &str) -> Result<IndexDescription, IndexError> {
        let path = format!("indexes/{}", name);
        debug!("Sending GET request to {}", path);
        let request = self.client.get(self.control_url(&path));
        let model: IndexModel = self.execute_request(request, name).await?;
        Ok(model.into())
    }

    #[instrument(skip(self, index, records), fields(index = %index.name, count = records.len()), level = "debug")]
    async fn upsert(
        &self,
        index: &IndexHandle,
        records: Vec<VectorRecord>,
    ) -> Result<usize, IndexError> {
        let vectors: Vec<UpsertVector<'_>> = records
            .iter()
            .map(|record| UpsertVector {
                id: &record.id,
                values: &record.values,
                metadata: &record.metadata,
            })
            .collect();
        let body = json!({ "vectors": vectors, "namespace": NAMESPACE });

        let request = self
            .client
            .post(self.data_url(index, "vectors/upsert"))
            .json(&body);
        let response: UpsertResponse = self.execute_request(request, &index.name).await?;
        Ok(response.upserted_count)
    }

    #[instrument(skip(self, index, vector), fields(index = %index.name), level = "debug")]
    async fn query(
        &self,
        index: &IndexHandle,
        vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<SourceChunk>, IndexError> {
        let body = json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
            "includeValues": false,
            "namespace": NAMESPACE,
        });

        let request = self.client.post(self.data_url(index, "query")).json(&body);
        let response: QueryResponse = self.execute_request(request, &index.name).await?;

        Ok(response
            .matches
            .into_iter()
            .map(|m| {
                let metadata = m.metadata.unwrap_or_default();
                SourceChunk {
                    id: m.id,
                    text: metadata.text,
                    score: m.score,
                    position: metadata.position as usize,
                    source: metadata.source,
                }
            })
            .collect())
    }

    #[instrument(skip(self, index), fields(index = %index.name), level = "debug")]
    async fn delete_all(&self, index: &IndexHandle) -> Result<(), IndexError> {
        let body = json!({ "deleteAll": true, "namespace": NAMESPACE });
        let request = self
            .client
            .post(self.data_url(index, "vectors/delete"))
            .json(&body);

        match self.execute_request::<IgnoredAny>(request, &index.name).await {
            Ok(_) => Ok(()),
            // An index that never received vectors has no namespace to delete
            Err(IndexError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
