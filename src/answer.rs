//! Retrieval-augmented question answering over one document.
//!
//! ```text
//! document id → lookup → embed question → top-k chunks → prompt → LLM → Answer
//! ```
//!
//! Each call is independent: nothing is cached and no conversation history
//! is kept between questions.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::embedding::Embedder;
use crate::error::{AskError, StoreError};
use crate::llm::{ChatMessage, LanguageModel};
use crate::models::{Answer, ScoredChunk};
use crate::store::DocumentStore;
use crate::vector_index::VectorStore;

const SYSTEM_PROMPT: &str = "Use the following pieces of context to answer the user's question. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.";

/// Build the chat messages for `question` grounded on `context`.
///
/// The system message carries the instruction followed by the chunk texts
/// separated by blank lines; the user message is the question verbatim.
pub fn build_prompt(context: &[ScoredChunk], question: &str) -> Vec<ChatMessage> {
    let joined = context
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    vec![
        ChatMessage::system(format!("{}\n----------------\n{}", SYSTEM_PROMPT, joined)),
        ChatMessage::user(question),
    ]
}

pub struct Answerer {
    top_k: usize,
    documents: Arc<dyn DocumentStore>,
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorStore>,
    llm: Arc<dyn LanguageModel>,
}

impl Answerer {
    pub fn new(
        top_k: usize,
        documents: Arc<dyn DocumentStore>,
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorStore>,
        llm: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            top_k: top_k.max(1),
            documents,
            embedder,
            vectors,
            llm,
        }
    }

    pub async fn answer(&self, document_id: &str, question: &str) -> Result<Answer, AskError> {
        match self.documents.find_path(document_id).await {
            Ok(_) => {}
            Err(StoreError::NotFound(id)) => return Err(AskError::NotFound(id)),
            Err(e) => return Err(AskError::Retrieval(e.to_string())),
        }

        let query = self
            .embedder
            .embed_query(question)
            .await
            .map_err(|e| AskError::Retrieval(format!("{:#}", e)))?;

        let context = self
            .vectors
            .search(document_id, &query, self.top_k)
            .await
            .map_err(|e| AskError::Retrieval(format!("{:#}", e)))?;

        let reply = self
            .llm
            .complete(&build_prompt(&context, question))
            .await
            .map_err(|e| AskError::Generation(format!("{:#}", e)))?;

        let reply = reply.trim();
        if reply.is_empty() {
            return Err(AskError::Generation("model returned no text".to_string()));
        }

        tracing::info!(
            document_id,
            chunks = context.len(),
            answer_chars = reply.chars().count(),
            "question answered"
        );

        Ok(Answer {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            question: question.to_string(),
            answer: reply.to_string(),
            timestamp: Utc::now(),
        })
    }
}
