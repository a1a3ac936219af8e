//! # Semantic Search Module for RAG
//!
//! This module answers questions, either from the retrieved content of the
//! knowledge base or from the language model's general knowledge. It forms the
//! "retrieval" and "generation" parts of Retrieval Augmented Generation.
//!
//! ## Key Components
//!
//! - `SearchSystem`: Main interface for answering a question in a given mode
//! - `AnswerMode`: context-grounded or open-knowledge answering, switched explicitly
//! - `Answer`: the answer text with the mode and any source chunks
//!
//! ## Search Process
//!
//! In context-grounded mode:
//! 1. Convert the question to an embedding vector
//! 2. Query the index for the most similar chunks
//! 3. Prepare a context block and wrap it in the grounding instruction
//! 4. Generate a response from that prompt
//!
//! In open-knowledge mode the question goes to the model unchanged and the
//! index is never queried. Nothing is retried and nothing is cached.

mod error;
mod search_impl;

use std::fmt;

use serde::Serialize;
use tracing::{info, instrument};

pub use error::SearchError;
pub use search_impl::{
    SearchOptions, answer_directly, build_grounded_prompt, generate_answer_with_rag,
    prepare_rag_context, retrieve,
};

use crate::index::{IndexHandle, KnowledgeBase, SourceChunk, VectorStore};
use crate::model::{ChatModel, Client, Embedder};

/// How a question is answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMode {
    /// Retrieve chunks from the index and answer only from them
    #[default]
    ContextGrounded,

    /// Ask the language model directly
    OpenKnowledge,
}

impl AnswerMode {
    /// The other mode
    pub fn toggle(self) -> Self {
        match self {
            AnswerMode::ContextGrounded => AnswerMode::OpenKnowledge,
            AnswerMode::OpenKnowledge => AnswerMode::ContextGrounded,
        }
    }

    /// Short tag recorded on assistant turns
    pub fn tag(self) -> &'static str {
        match self {
            AnswerMode::ContextGrounded => "RAG",
            AnswerMode::OpenKnowledge => "LLM",
        }
    }

    /// Line shown under an answer
    pub fn footer(self) -> &'static str {
        match self {
            AnswerMode::ContextGrounded => "Answer generated using document context",
            AnswerMode::OpenKnowledge => "Answer generated using general knowledge",
        }
    }
}

impl fmt::Display for AnswerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerMode::ContextGrounded => write!(f, "context-grounded"),
            AnswerMode::OpenKnowledge => write!(f, "open-knowledge"),
        }
    }
}

/// An answer with everything needed to display it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    /// Text from the language model
    pub text: String,

    /// Mode that produced it
    pub mode: AnswerMode,

    /// Retrieved chunks; always empty in open-knowledge mode
    pub sources: Vec<SourceChunk>,
}

/// Search system for RAG
///
/// Owns the model client and the knowledge base so that processing and
/// answering share the same connections.
pub struct SearchSystem<C, E, S>
where
    C: ChatModel,
    E: Embedder,
    S: VectorStore,
{
    client: Client<C, E>,
    knowledge_base: KnowledgeBase<S>,
    options: SearchOptions,
}

impl<C, E, S> SearchSystem<C, E, S>
where
    C: ChatModel,
    E: Embedder,
    S: VectorStore,
{
    /// Create a new search system
    pub fn new(client: Client<C, E>, knowledge_base: KnowledgeBase<S>, options: SearchOptions) -> Self {
        Self {
            client,
            knowledge_base,
            options,
        }
    }

    /// Answer a question in the given mode
    ///
    /// Context-grounded answering requires `index`; open-knowledge answering ignores it.
    #[instrument(skip(self, index, mode), fields(mode = %mode))]
    pub async fn answer(
        &self,
        index: Option<&IndexHandle>,
        question: &str,
        mode: AnswerMode,
    ) -> Result<Answer, SearchError> {
        if question.trim().is_empty() {
            return Err(SearchError::InvalidParameters("question is empty".to_string()));
        }

        match mode {
            AnswerMode::ContextGrounded => {
                let index = index.ok_or(SearchError::MissingIndex)?;
                let sources = retrieve(
                    self.client.embedding(),
                    self.knowledge_base.store(),
                    index,
                    question,
                    &self.options,
                )
                .await?;
                let context = prepare_rag_context(&sources);
                let text = generate_answer_with_rag(self.client.completion(), question, &context).await?;
                info!(sources = sources.len(), "Generated grounded answer");
                Ok(Answer {
                    text,
                    mode,
                    sources,
                })
            }
            AnswerMode::OpenKnowledge => {
                let text = answer_directly(self.client.completion(), question).await?;
                info!("Generated open answer");
                Ok(Answer {
                    text,
                    mode,
                    sources: Vec::new(),
                })
            }
        }
    }

    /// Get the client reference
    pub fn client(&self) -> &Client<C, E> {
        &self.client
    }

    /// Get the knowledge base reference
    pub fn knowledge_base(&self) -> &KnowledgeBase<S> {
        &self.knowledge_base
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    /// Change how many chunks are retrieved per question
    pub fn set_top_k(&mut self, top_k: usize) {
        self.options.top_k = top_k;
    }
}
