//! Index manager module for RAG
//!
//! This module owns the knowledge base: creating or connecting to a remote
//! vector index, writing embedded chunks to it, and the capability trait the
//! pipeline uses to talk to the vector database.
//!
//! ## Key Components
//!
//! - `VectorStore`: the operations the pipeline needs from a vector database
//! - `KnowledgeBase`: idempotent index setup with a bounded readiness wait, and chunk upload
//! - `PineconeClient`: the REST implementation of `VectorStore`

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

pub mod error;
mod name;
mod pinecone;

pub use error::IndexError;
pub use name::{MAX_INDEX_NAME_LEN, validate_index_name};
pub use pinecone::PineconeClient;

use crate::config::Settings;
use crate::model::Embedder;
use crate::processor::TextChunk;

/// Most records sent in one upsert request
pub const UPSERT_BATCH_SIZE: usize = 100;

/// Similarity metric used for new indexes
pub const DEFAULT_METRIC: &str = "cosine";

/// Description of a remote index
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexDescription {
    /// Name of the index
    pub name: String,

    /// Vector dimension
    pub dimension: usize,

    /// Similarity metric
    pub metric: String,

    /// Data plane host
    pub host: String,

    /// Whether the index accepts reads and writes
    pub ready: bool,
}

/// Parameters for creating an index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: String,
    pub cloud: String,
    pub region: String,
}

/// A ready index the pipeline can read and write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexHandle {
    /// Name of the index
    pub name: String,

    /// Data plane host
    pub host: String,

    /// Vector dimension
    pub dimension: usize,
}

/// Metadata stored next to every vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Text of the chunk
    pub text: String,

    /// Position of the chunk in its document
    pub position: usize,

    /// Display name of the document
    pub source: String,
}

/// A vector ready to be upserted
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// A chunk returned by a similarity query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceChunk {
    /// Vector ID
    pub id: String,

    /// Text of the chunk
    pub text: String,

    /// Similarity to the query
    pub score: f32,

    /// Position of the chunk in its document
    pub position: usize,

    /// Display name of the document
    pub source: String,
}

/// Outcome of writing a document to an index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    /// Name of the index written to
    pub index: String,

    /// Chunks embedded
    pub chunks: usize,

    /// Vectors the service acknowledged
    pub upserted: usize,
}

/// Operations the pipeline needs from a vector database
pub trait VectorStore: Send + Sync {
    /// List every index visible to the credential
    fn list_indexes(&self) -> impl Future<Output = Result<Vec<IndexDescription>, IndexError>> + Send;

    /// Create an index; `IndexError::Conflict` if it already exists
    fn create_index(&self, spec: &IndexSpec) -> impl Future<Output = Result<(), IndexError>> + Send;

    /// Describe one index; `IndexError::NotFound` if it does not exist
    fn describe_index(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<IndexDescription, IndexError>> + Send;

    /// Insert or overwrite records, returning how many were written
    fn upsert(
        &self,
        index: &IndexHandle,
        records: Vec<VectorRecord>,
    ) -> impl Future<Output = Result<usize, IndexError>> + Send;

    /// Return the `top_k` records closest to `vector`, best first
    fn query(
        &self,
        index: &IndexHandle,
        vector: Vec<f32>,
        top_k: usize,
    ) -> impl Future<Output = Result<Vec<SourceChunk>, IndexError>> + Send;

    /// Remove every record from the index
    fn delete_all(&self, index: &IndexHandle) -> impl Future<Output = Result<(), IndexError>> + Send;
}

/// Settings for index setup and upload
#[derive(Debug, Clone)]
pub struct KnowledgeBaseOptions {
    /// Dimension of new indexes; existing indexes must match it
    pub dimension: usize,

    /// Serverless cloud for new indexes
    pub cloud: String,

    /// Serverless region for new indexes
    pub region: String,

    /// Longest wait for an index to become ready
    pub ready_timeout: Duration,

    /// Delay between readiness checks
    pub poll_interval: Duration,
}

impl Default for KnowledgeBaseOptions {
    fn default() -> Self {
        Self {
            dimension: 1536,
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            ready_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl KnowledgeBaseOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            dimension: settings.embedding_dimension,
            cloud: settings.pinecone_cloud.clone(),
            region: settings.pinecone_region.clone(),
            ready_timeout: settings.index_ready_timeout,
            ..Self::default()
        }
    }
}

/// Vector ID for a chunk; identical text always maps to the same ID
pub fn chunk_id(text: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, text.as_bytes()).to_string()
}

/// The vector database seen as a store of document chunks
#[derive(Debug, Clone)]
pub struct KnowledgeBase<S: VectorStore> {
    store: S,
    options: KnowledgeBaseOptions,
}

impl<S: VectorStore> KnowledgeBase<S> {
    pub fn new(store: S, options: KnowledgeBaseOptions) -> Self {
        Self { store, options }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn options(&self) -> &KnowledgeBaseOptions {
        &self.options
    }

    /// Connect to an index, creating it first if it does not exist
    ///
    /// Calling this again for the same name creates nothing and returns a
    /// handle to the same index.
    #[instrument(skip(self))]
    pub async fn create_or_connect(&self, name: &str) -> Result<IndexHandle, IndexError> {
        validate_index_name(name)?;

        let existing = self.store.list_indexes().await?;
        match existing.iter().find(|index| index.name == name) {
            Some(index) => {
                debug!(host = %index.host, "Index already exists");
                self.check_dimension(index)?;
            }
            None => {
                let spec = IndexSpec {
                    name: name.to_string(),
                    dimension: self.options.dimension,
                    metric: DEFAULT_METRIC.to_string(),
                    cloud: self.options.cloud.clone(),
                    region: self.options.region.clone(),
                };
                match self.store.create_index(&spec).await {
                    Ok(()) => info!("Created index {}", name),
                    Err(IndexError::Conflict) => debug!("Index {} was created concurrently", name),
                    Err(e) => return Err(e),
                }
            }
        }

        self.wait_until_ready(name).await
    }

    /// Connect to an index that must already exist
    #[instrument(skip(self))]
    pub async fn connect(&self, name: &str) -> Result<IndexHandle, IndexError> {
        validate_index_name(name)?;
        self.wait_until_ready(name).await
    }

    /// List every index visible to the credential
    pub async fn list(&self) -> Result<Vec<IndexDescription>, IndexError> {
        self.store.list_indexes().await
    }

    /// Delete every vector in the index
    #[instrument(skip(self), fields(index = %handle.name))]
    pub async fn clear(&self, handle: &IndexHandle) -> Result<(), IndexError> {
        self.store.delete_all(handle).await?;
        info!("Cleared index {}", handle.name);
        Ok(())
    }

    /// Embed one sample text and check it fits the index dimension
    ///
    /// Run before touching the index so a misconfigured deployment fails fast.
    #[instrument(skip(self, embedder, sample))]
    pub async fn check_embedder<E: Embedder>(
        &self,
        embedder: &E,
        sample: &str,
    ) -> Result<usize, IndexError> {
        let vectors = embedder.embed_texts(vec![sample.to_string()]).await?;
        let actual = vectors.first().map(Vec::len).ok_or_else(|| {
            IndexError::UnexpectedResponse("embedding check returned no vector".to_string())
        })?;
        if actual != self.options.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.options.dimension,
                actual,
            });
        }
        debug!(dimension = actual, "Embedding check passed");
        Ok(actual)
    }

    /// Embed chunks and write them to the index
    ///
    /// Embedding happens in batches of the embedder's size, upserts in batches
    /// of at most [`UPSERT_BATCH_SIZE`]. Any failure is reported as
    /// `IndexError::Upload` with the number of vectors already written.
    #[instrument(skip(self, embedder, chunks), fields(index = %handle.name, chunks = chunks.len()))]
    pub async fn index_chunks<E: Embedder>(
        &self,
        embedder: &E,
        handle: &IndexHandle,
        chunks: &[TextChunk],
        source: &str,
    ) -> Result<IndexReport, IndexError> {
        let mut committed = 0;
        let mut pending: Vec<VectorRecord> = Vec::new();
        let embed_batch = embedder.max_batch().max(1);

        for group in chunks.chunks(embed_batch) {
            let texts = group.iter().map(|chunk| chunk.text.clone()).collect();
            let vectors = embedder
                .embed_texts(texts)
                .await
                .map_err(|e| upload_failure(handle, committed, e.into()))?;
            if vectors.len() != group.len() {
                return Err(upload_failure(
                    handle,
                    committed,
                    IndexError::UnexpectedResponse(format!(
                        "expected {} embeddings, got {}",
                        group.len(),
                        vectors.len()
                    )),
                ));
            }

            for (chunk, values) in group.iter().zip(vectors) {
                if values.len() != handle.dimension {
                    let mismatch = IndexError::DimensionMismatch {
                        expected: handle.dimension,
                        actual: values.len(),
                    };
                    return Err(upload_failure(handle, committed, mismatch));
                }
                pending.push(VectorRecord {
                    id: chunk_id(&chunk.text),
                    values,
                    metadata: ChunkMetadata {
                        text: chunk.text.clone(),
                        position: chunk.position,
                        source: source.to_string(),
                    },
                });
            }

            while pending.len() >= UPSERT_BATCH_SIZE {
                let rest = pending.split_off(UPSERT_BATCH_SIZE);
                let batch = std::mem::replace(&mut pending, rest);
                committed += self.upsert_batch(handle, batch, committed).await?;
            }
        }

        if !pending.is_empty() {
            committed += self.upsert_batch(handle, pending, committed).await?;
        }

        info!("Indexed {} chunks into {}", chunks.len(), handle.name);
        Ok(IndexReport {
            index: handle.name.clone(),
            chunks: chunks.len(),
            upserted: committed,
        })
    }

    async fn upsert_batch(
        &self,
        handle: &IndexHandle,
        batch: Vec<VectorRecord>,
        committed: usize,
    ) -> Result<usize, IndexError> {
        let size = batch.len();
        let written = self
            .store
            .upsert(handle, batch)
            .await
            .map_err(|e| upload_failure(handle, committed, e))?;
        debug!(size, written, "Upserted batch");
        Ok(written)
    }

    async fn wait_until_ready(&self, name: &str) -> Result<IndexHandle, IndexError> {
        let started = tokio::time::Instant::now();
        loop {
            let index = self.store.describe_index(name).await?;
            self.check_dimension(&index)?;
            if index.ready {
                debug!(host = %index.host, "Index is ready");
                return Ok(IndexHandle {
                    name: index.name,
                    host: index.host,
                    dimension: index.dimension,
                });
            }

            let waited = started.elapsed();
            if waited >= self.options.ready_timeout {
                warn!(?waited, "Gave up waiting for index {}", name);
                return Err(IndexError::NotReady {
                    index: name.to_string(),
                    waited,
                });
            }
            let remaining = self.options.ready_timeout - waited;
            tokio::time::sleep(self.options.poll_interval.min(remaining)).await;
        }
    }

    fn check_dimension(&self, index: &IndexDescription) -> Result<(), IndexError> {
        if index.dimension != self.options.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.options.dimension,
                actual: index.dimension,
            });
        }
        Ok(())
    }
}

fn upload_failure(handle: &IndexHandle, committed: usize, source: IndexError) -> IndexError {
    IndexError::Upload {
        index: handle.name.clone(),
        committed,
        source: Box::new(source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{KeywordEmbedder, MemoryStore};

    fn options(dimension: usize) -> KnowledgeBaseOptions {
        KnowledgeBaseOptions {
            dimension,
            ready_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(2),
            ..KnowledgeBaseOptions::default()
        }
    }

    fn chunks(count: usize) -> Vec<TextChunk> {
        (0..count)
            .map(|position| TextChunk {
                text: format!("chunk number {position} of the test document"),
                position,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_create_or_connect_is_idempotent() {
        let store = MemoryStore::new();
        let kb = KnowledgeBase::new(store.clone(), options(16));

        let first = kb.create_or_connect("docs").await.unwrap();
        let second = kb.create_or_connect("docs").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.created(), 1);
        assert_eq!(store.index_names(), vec!["docs".to_string()]);
    }

    #[tokio::test]
    async fn test_waits_for_readiness() {
        let store = MemoryStore::new().with_ready_after(3);
        let kb = KnowledgeBase::new(store.clone(), options(16));

        let handle = kb.create_or_connect("docs").await.unwrap();

        assert_eq!(handle.name, "docs");
        assert_eq!(store.describes(), 4);
    }

    #[tokio::test]
    async fn test_readiness_wait_is_bounded() {
        let store = MemoryStore::new().with_ready_after(usize::MAX);
        let mut opts = options(16);
        opts.ready_timeout = Duration::from_millis(30);
        let kb = KnowledgeBase::new(store, opts);

        let started = std::time::Instant::now();
        let err = kb.create_or_connect("docs").await.unwrap_err();

        match err {
            IndexError::NotReady { index, waited } => {
                assert_eq!(index, "docs");
                assert!(waited >= Duration::from_millis(30));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_concurrent_creation_counts_as_existing() {
        let store = MemoryStore::new().with_conflict_on_create();
        let kb = KnowledgeBase::new(store.clone(), options(16));

        let handle = kb.create_or_connect("docs").await.unwrap();

        assert_eq!(handle.name, "docs");
        assert_eq!(store.created(), 0);
    }

    #[tokio::test]
    async fn test_existing_index_with_other_dimension_is_rejected() {
        let store = MemoryStore::new().with_index("docs", 8);
        let kb = KnowledgeBase::new(store.clone(), options(16));

        let err = kb.create_or_connect("docs").await.unwrap_err();

        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: 16,
                actual: 8
            }
        ));
        assert_eq!(store.created(), 0);
    }

    #[tokio::test]
    async fn test_invalid_name_is_rejected_before_any_call() {
        let store = MemoryStore::new();
        let kb = KnowledgeBase::new(store.clone(), options(16));

        let err = kb.create_or_connect("My_Index").await.unwrap_err();

        assert!(matches!(err, IndexError::InvalidName(_)));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_connect_requires_existing_index() {
        let store = MemoryStore::new();
        let kb = KnowledgeBase::new(store.clone(), options(16));

        let err = kb.connect("missing").await.unwrap_err();

        assert!(matches!(err, IndexError::NotFound(_)));
        assert_eq!(store.created(), 0);
    }

    #[tokio::test]
    async fn test_index_chunks_batches_upserts() {
        let store = MemoryStore::new();
        let embedder = KeywordEmbedder::new(16);
        let kb = KnowledgeBase::new(store.clone(), options(16));
        let handle = kb.create_or_connect("docs").await.unwrap();

        let report = kb
            .index_chunks(&embedder, &handle, &chunks(250), "big.pdf")
            .await
            .unwrap();

        assert_eq!(report.chunks, 250);
        assert_eq!(report.upserted, 250);
        assert_eq!(store.upsert_sizes(), vec![100, 100, 50]);
        assert_eq!(store.record_count("docs"), 250);
        // 250 chunks in batches of 64
        assert_eq!(embedder.calls(), 4);
    }

    #[tokio::test]
    async fn test_reindexing_overwrites_instead_of_duplicating() {
        let store = MemoryStore::new();
        let embedder = KeywordEmbedder::new(16);
        let kb = KnowledgeBase::new(store.clone(), options(16));
        let handle = kb.create_or_connect("docs").await.unwrap();

        kb.index_chunks(&embedder, &handle, &chunks(5), "a.pdf")
            .await
            .unwrap();
        kb.index_chunks(&embedder, &handle, &chunks(5), "a.pdf")
            .await
            .unwrap();

        assert_eq!(store.record_count("docs"), 5);
    }

    #[tokio::test]
    async fn test_partial_upload_reports_committed_vectors() {
        let store = MemoryStore::new().fail_upserts_after(1);
        let embedder = KeywordEmbedder::new(16);
        let kb = KnowledgeBase::new(store.clone(), options(16));
        let handle = kb.create_or_connect("docs").await.unwrap();

        let err = kb
            .index_chunks(&embedder, &handle, &chunks(250), "big.pdf")
            .await
            .unwrap_err();

        match err {
            IndexError::Upload {
                index, committed, ..
            } => {
                assert_eq!(index, "docs");
                assert_eq!(committed, 100);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.record_count("docs"), 100);
    }

    #[tokio::test]
    async fn test_wrong_embedding_dimension_writes_nothing() {
        let store = MemoryStore::new();
        let embedder = KeywordEmbedder::new(8);
        let kb = KnowledgeBase::new(store.clone(), options(16));
        let handle = kb.create_or_connect("docs").await.unwrap();

        let err = kb
            .index_chunks(&embedder, &handle, &chunks(3), "a.pdf")
            .await
            .unwrap_err();

        match err {
            IndexError::Upload {
                committed, source, ..
            } => {
                assert_eq!(committed, 0);
                assert!(matches!(*source, IndexError::DimensionMismatch { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(store.upsert_sizes().is_empty());
    }

    #[tokio::test]
    async fn test_check_embedder_checks_dimension() {
        let kb = KnowledgeBase::new(MemoryStore::new(), options(16));

        assert_eq!(
            kb.check_embedder(&KeywordEmbedder::new(16), "sample")
                .await
                .unwrap(),
            16
        );
        assert!(matches!(
            kb.check_embedder(&KeywordEmbedder::new(4), "sample").await,
            Err(IndexError::DimensionMismatch {
                expected: 16,
                actual: 4
            })
        ));
    }

    #[tokio::test]
    async fn test_clear_removes_vectors() {
        let store = MemoryStore::new();
        let embedder = KeywordEmbedder::new(16);
        let kb = KnowledgeBase::new(store.clone(), options(16));
        let handle = kb.create_or_connect("docs").await.unwrap();
        kb.index_chunks(&embedder, &handle, &chunks(3), "a.pdf")
            .await
            .unwrap();

        kb.clear(&handle).await.unwrap();

        assert_eq!(store.record_count("docs"), 0);
    }

    #[test]
    fn test_chunk_ids_are_stable() {
        assert_eq!(chunk_id("same text"), chunk_id("same text"));
        assert_ne!(chunk_id("same text"), chunk_id("other text"));
    }
}
