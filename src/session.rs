//! # Session Module
//!
//! The orchestration boundary of the pipeline. An `Assistant` owns the remote
//! services and one `Session`: the loaded document's index handle, the
//! conversation so far, and the current answer mode.
//!
//! Every lower-level error is converted into the crate's [`Error`] here. A
//! failed operation leaves the session as it was, except that a failed answer
//! is recorded as an assistant turn carrying the error message.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::index::{
    IndexDescription, IndexError, IndexHandle, IndexReport, KnowledgeBase, KnowledgeBaseOptions,
    PineconeClient, SourceChunk, VectorStore, validate_index_name,
};
use crate::model::{AzureChat, AzureEmbedder, ChatModel, Client, Embedder};
use crate::processor::{ChunkOptions, IngestOptions, prepare_document};
use crate::search::{Answer, AnswerMode, SearchError, SearchOptions, SearchSystem};

/// Who wrote a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    pub role: Role,

    /// Question, answer, or error message
    pub content: String,

    /// Mode of a successful answer; `None` for questions and failures
    pub mode: Option<AnswerMode>,

    /// Chunks a grounded answer was built from
    pub sources: Vec<SourceChunk>,

    pub timestamp: DateTime<Utc>,
}

impl Turn {
    fn user(question: &str) -> Self {
        Self {
            role: Role::User,
            content: question.to_string(),
            mode: None,
            sources: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    fn answer(answer: &Answer) -> Self {
        Self {
            role: Role::Assistant,
            content: answer.text.clone(),
            mode: Some(answer.mode),
            sources: answer.sources.clone(),
            timestamp: Utc::now(),
        }
    }

    fn failure(message: String) -> Self {
        Self {
            role: Role::Assistant,
            content: message,
            mode: None,
            sources: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Whether this turn records a failed answer
    pub fn is_failure(&self) -> bool {
        self.role == Role::Assistant && self.mode.is_none()
    }
}

/// Progress of document processing, reported in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Extracting text from the PDF
    Reading { source: String },

    /// Text extracted and split
    Chunked { pages: usize, chunks: usize },

    /// Checking the embedding deployment against the index dimension
    CheckingEmbeddings,

    /// Creating or connecting to the index
    PreparingIndex { index: String },

    /// Embedding and writing chunks
    Uploading { chunks: usize },

    /// Every chunk is in the index
    Indexed(IndexReport),
}

/// Conversation state for one user
///
/// The document counts as processed exactly when an index handle is present.
#[derive(Debug, Clone, Default)]
pub struct Session {
    index: Option<IndexHandle>,
    document: Option<String>,
    turns: Vec<Turn>,
    mode: AnswerMode,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether questions can be asked
    pub fn is_processed(&self) -> bool {
        self.index.is_some()
    }

    pub fn index(&self) -> Option<&IndexHandle> {
        self.index.as_ref()
    }

    /// Display name of the processed document, if it was processed in this session
    pub fn document(&self) -> Option<&str> {
        self.document.as_deref()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn mode(&self) -> AnswerMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: AnswerMode) {
        self.mode = mode;
    }

    /// Switch to the other mode and return it
    pub fn toggle_mode(&mut self) -> AnswerMode {
        self.mode = self.mode.toggle();
        self.mode
    }

    /// Forget the conversation, keep the document
    pub fn new_chat(&mut self) {
        self.turns.clear();
    }

    /// Forget the document and the conversation, keep the mode
    pub fn new_document(&mut self) {
        self.index = None;
        self.document = None;
        self.turns.clear();
    }

    fn attach(&mut self, index: IndexHandle, document: Option<String>) {
        self.index = Some(index);
        self.document = document;
    }
}

/// The document assistant: remote services plus one session
pub struct Assistant<C, E, S>
where
    C: ChatModel,
    E: Embedder,
    S: VectorStore,
{
    search: SearchSystem<C, E, S>,
    ingest: IngestOptions,
    chunk_options: ChunkOptions,
    session: Session,
}

impl Assistant<AzureChat, AzureEmbedder, PineconeClient> {
    /// Validate settings, build the service clients and check the vector database is reachable
    #[instrument(skip(settings))]
    pub async fn connect(settings: &Settings) -> Result<Self> {
        let required = settings.required()?;

        let client = Client::new_azure(required, settings)
            .map_err(|e| Error::ServiceInitialization(e.to_string()))?;
        let store = PineconeClient::new(required.pinecone_api_key)
            .map_err(|e| Error::ServiceInitialization(e.to_string()))?;
        let knowledge_base = KnowledgeBase::new(store, KnowledgeBaseOptions::from_settings(settings));

        let indexes = knowledge_base
            .list()
            .await
            .map_err(|e| Error::ServiceInitialization(e.to_string()))?;
        info!("Connected to vector database ({} indexes)", indexes.len());

        let search = SearchSystem::new(
            client,
            knowledge_base,
            SearchOptions {
                top_k: settings.top_k,
            },
        );
        Ok(Self::new(
            search,
            IngestOptions {
                temp_dir: None,
                max_bytes: settings.max_document_bytes,
            },
            settings.chunk_options,
        ))
    }
}

impl<C, E, S> Assistant<C, E, S>
where
    C: ChatModel,
    E: Embedder,
    S: VectorStore,
{
    pub fn new(search: SearchSystem<C, E, S>, ingest: IngestOptions, chunk_options: ChunkOptions) -> Self {
        Self {
            search,
            ingest,
            chunk_options,
            session: Session::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn search(&self) -> &SearchSystem<C, E, S> {
        &self.search
    }

    pub fn search_mut(&mut self) -> &mut SearchSystem<C, E, S> {
        &mut self.search
    }

    /// Read, split, embed and index a PDF, then make it the session's document
    ///
    /// Refused while a document is loaded; start a new document first.
    #[instrument(skip(self, bytes, progress), fields(bytes = bytes.len()))]
    pub async fn process_document<F>(
        &mut self,
        bytes: &[u8],
        source: &str,
        index_name: &str,
        mut progress: F,
    ) -> Result<IndexReport>
    where
        F: FnMut(ProcessingStage) + Send,
    {
        if self.session.is_processed() {
            return Err(Error::DocumentAlreadyProcessed);
        }
        validate_index_name(index_name)?;

        progress(ProcessingStage::Reading {
            source: source.to_string(),
        });
        let prepared = prepare_document(bytes, source, &self.ingest, &self.chunk_options).await?;
        progress(ProcessingStage::Chunked {
            pages: prepared.pages,
            chunks: prepared.chunks.len(),
        });

        let knowledge_base = self.search.knowledge_base();
        let embedder = self.search.client().embedding();

        progress(ProcessingStage::CheckingEmbeddings);
        let sample = prepared
            .chunks
            .first()
            .map(|chunk| chunk.text.as_str())
            .unwrap_or(source);
        knowledge_base
            .check_embedder(embedder, sample)
            .await
            .map_err(|e| match e {
                IndexError::Embedding(model) if model.is_auth() => {
                    Error::ServiceInitialization(format!("embedding service: {model}"))
                }
                other => Error::Upload {
                    index: index_name.to_string(),
                    committed: 0,
                    source: other,
                },
            })?;

        progress(ProcessingStage::PreparingIndex {
            index: index_name.to_string(),
        });
        let handle = knowledge_base.create_or_connect(index_name).await?;

        progress(ProcessingStage::Uploading {
            chunks: prepared.chunks.len(),
        });
        let report = knowledge_base
            .index_chunks(embedder, &handle, &prepared.chunks, source)
            .await?;

        info!(
            "Processed {} into {} ({} vectors)",
            source, handle.name, report.upserted
        );
        self.session.attach(handle, Some(source.to_string()));
        progress(ProcessingStage::Indexed(report.clone()));
        Ok(report)
    }

    /// Use an index filled earlier as the session's document
    #[instrument(skip(self))]
    pub async fn resume(&mut self, index_name: &str) -> Result<IndexHandle> {
        if self.session.is_processed() {
            return Err(Error::DocumentAlreadyProcessed);
        }
        let handle = match self.search.knowledge_base().connect(index_name).await {
            Ok(handle) => handle,
            Err(IndexError::NotFound(name)) => {
                return Err(Error::ServiceInitialization(format!(
                    "index '{}' does not exist; process a document into it first",
                    name
                )));
            }
            Err(e) => return Err(e.into()),
        };
        self.session.attach(handle.clone(), None);
        Ok(handle)
    }

    /// Answer a question in the session's current mode
    ///
    /// The question and the answer are recorded as turns. A failure is recorded
    /// as an assistant turn with the error message and returned.
    #[instrument(skip(self))]
    pub async fn ask(&mut self, question: &str) -> Result<Answer> {
        let mode = self.session.mode;
        let Some(index) = self.session.index.as_ref() else {
            return Err(Error::NoDocument);
        };
        if question.trim().is_empty() {
            return Err(Error::Generation {
                mode,
                source: SearchError::InvalidParameters("question is empty".to_string()),
            });
        }

        let result = self.search.answer(Some(index), question, mode).await;
        self.session.turns.push(Turn::user(question));

        match result {
            Ok(answer) => {
                self.session.turns.push(Turn::answer(&answer));
                Ok(answer)
            }
            Err(source) => {
                let err = match source {
                    SearchError::Embedding(model) | SearchError::Generation(model)
                        if model.is_auth() =>
                    {
                        Error::ServiceInitialization(format!("language model service: {model}"))
                    }
                    source => Error::Generation { mode, source },
                };
                warn!(error = %err, "Answer generation failed");
                self.session.turns.push(Turn::failure(err.user_message()));
                Err(err)
            }
        }
    }

    /// List the knowledge bases visible to the credential
    pub async fn list_indexes(&self) -> Result<Vec<IndexDescription>> {
        Ok(self.search.knowledge_base().list().await?)
    }

    /// Delete every vector in a knowledge base
    #[instrument(skip(self))]
    pub async fn clear_index(&self, index_name: &str) -> Result<()> {
        let knowledge_base = self.search.knowledge_base();
        let handle = knowledge_base.connect(index_name).await?;
        knowledge_base.clear(&handle).await?;
        Ok(())
    }
}
