//! Search implementation for RAG functionality

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::error::SearchError;
use crate::index::{IndexHandle, SourceChunk, VectorStore};
use crate::model::{ChatModel, Embedder};

const GROUNDED_INSTRUCTION: &str = "Use the following pieces of context to answer the question at the end.\nIf you don't know the answer based on the context, just say that you don't know, don't try to make up an answer.";

/// Options for search queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Maximum number of chunks to retrieve
    pub top_k: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { top_k: 3 }
    }
}

/// Retrieve the chunks closest to the question
#[instrument(skip(embedder, store, index, options), fields(index = %index.name, top_k = options.top_k))]
pub async fn retrieve<E, S>(
    embedder: &E,
    store: &S,
    index: &IndexHandle,
    question: &str,
    options: &SearchOptions,
) -> Result<Vec<SourceChunk>, SearchError>
where
    E: Embedder,
    S: VectorStore,
{
    if options.top_k == 0 {
        return Err(SearchError::InvalidParameters(
            "top_k must be greater than zero".to_string(),
        ));
    }

    let vector = embedder
        .embed_texts(vec![question.to_string()])
        .await
        .map_err(SearchError::Embedding)?
        .into_iter()
        .next()
        .ok_or_else(|| {
            SearchError::InvalidParameters("no embedding returned for the question".to_string())
        })?;

    let results = store.query(index, vector, options.top_k).await?;
    debug!("Retrieved {} chunks", results.len());
    Ok(results)
}

/// Join retrieved chunks into a context block, best match first
pub fn prepare_rag_context(results: &[SourceChunk]) -> String {
    results
        .iter()
        .map(|r| r.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Build the grounded prompt around a context block and a question
pub fn build_grounded_prompt(context: &str, question: &str) -> String {
    format!(
        "{}\n\nContext: {}\n\nQuestion: {}\n\nAnswer: ",
        GROUNDED_INSTRUCTION, context, question
    )
}

/// Generate an answer restricted to the given context
#[instrument(skip(chat, context), fields(context_chars = context.len()))]
pub async fn generate_answer_with_rag<C: ChatModel>(
    chat: &C,
    question: &str,
    context: &str,
) -> Result<String, SearchError> {
    let prompt = build_grounded_prompt(context, question);
    chat.complete(&prompt)
        .await
        .map_err(SearchError::Generation)
}

/// Send the question to the model as is
#[instrument(skip(chat))]
pub async fn answer_directly<C: ChatModel>(chat: &C, question: &str) -> Result<String, SearchError> {
    chat.complete(question)
        .await
        .map_err(SearchError::Generation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{ChunkMetadata, VectorRecord};
    use crate::model::ModelError;
    use crate::testing::{KeywordEmbedder, MemoryStore, ScriptedChat};

    fn source(text: &str) -> SourceChunk {
        SourceChunk {
            id: text.to_string(),
            text: text.to_string(),
            score: 1.0,
            position: 0,
            source: "doc.pdf".to_string(),
        }
    }

    #[test]
    fn test_prepare_rag_context() {
        let context = prepare_rag_context(&[source("first"), source("second")]);
        assert_eq!(context, "first\n\nsecond");
        assert_eq!(prepare_rag_context(&[]), "");
    }

    #[test]
    fn test_grounded_prompt_layout() {
        let prompt = build_grounded_prompt("The capital of Florin is X.", "What is the capital?");

        assert!(prompt.starts_with("Use the following pieces of context"));
        assert!(prompt.contains("don't try to make up an answer"));
        assert!(prompt.contains("Context: The capital of Florin is X.\n\nQuestion: What is the capital?"));
        assert!(prompt.ends_with("Answer: "));
    }

    #[tokio::test]
    async fn test_retrieve_returns_best_match_first() {
        let store = MemoryStore::new().with_index("docs", 32);
        let embedder = KeywordEmbedder::new(32);
        let handle = IndexHandle {
            name: "docs".to_string(),
            host: "memory".to_string(),
            dimension: 32,
        };
        let texts = [
            "The capital of Florin is X.",
            "Guilder lies across the sea.",
            "Rivers flow north in winter.",
        ];
        let vectors = embedder
            .embed_texts(texts.iter().map(|t| t.to_string()).collect())
            .await
            .unwrap();
        let records = texts
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(position, (text, values))| VectorRecord {
                id: format!("id-{position}"),
                values,
                metadata: ChunkMetadata {
                    text: text.to_string(),
                    position,
                    source: "doc.pdf".to_string(),
                },
            })
            .collect();
        store.upsert(&handle, records).await.unwrap();

        let results = retrieve(
            &embedder,
            &store,
            &handle,
            "What is the capital of Florin?",
            &SearchOptions { top_k: 2 },
        )
        .await
        .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text, "The capital of Florin is X.");
    }

    #[tokio::test]
    async fn test_generation_failure_is_reported() {
        let chat = ScriptedChat::failing(|| ModelError::RateLimit);

        let err = answer_directly(&chat, "hello").await.unwrap_err();

        assert!(matches!(err, SearchError::Generation(ModelError::RateLimit)));
    }

    #[tokio::test]
    async fn test_rag_answer_uses_grounded_prompt() {
        let chat = ScriptedChat::replying("X");

        let answer = generate_answer_with_rag(&chat, "What is the capital?", "Florin facts")
            .await
            .unwrap();

        assert_eq!(answer, "X");
        let prompts = chat.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Context: Florin facts"));
    }
}
