//! Query-time retrieval.
//!
//! Embeds the user query and asks the knowledge store for the nearest
//! chunks, each carrying its parent document's id, title and source for
//! citation. An empty store (or one with no match above the score floor)
//! is a normal outcome and yields an empty list, not an error.

use std::sync::Arc;

use crate::core::config::RetrievalConfig;
use crate::core::errors::ApiError;
use crate::embed::{embed_with_retry, Embedder};
use crate::store::{ChunkHit, KnowledgeStore};

#[derive(Clone)]
pub struct Retriever {
    store: KnowledgeStore,
    embedder: Arc<dyn Embedder>,
    config: RetrievalConfig,
    retry_attempts: u32,
}

impl Retriever {
    pub fn new(
        store: KnowledgeStore,
        embedder: Arc<dyn Embedder>,
        config: RetrievalConfig,
        retry_attempts: u32,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
            retry_attempts,
        }
    }

    pub async fn retrieve(
        &self,
        query: &str,
        category: Option<&str>,
    ) -> Result<Vec<ChunkHit>, ApiError> {
        self.retrieve_top(query, self.config.top_k, category).await
    }

    pub async fn retrieve_top(
        &self,
        query: &str,
        k: usize,
        category: Option<&str>,
    ) -> Result<Vec<ChunkHit>, ApiError> {
        if query.trim().is_empty() {
            return Err(ApiError::BadRequest("query must not be empty".to_string()));
        }

        let inputs = vec![query.to_string()];
        let mut vectors =
            embed_with_retry(self.embedder.as_ref(), &inputs, self.retry_attempts).await?;
        let query_embedding = vectors
            .pop()
            .ok_or_else(|| ApiError::Internal("embedder returned no vector".to_string()))?;

        self.store
            .similarity_search(
                &query_embedding,
                k,
                self.config.metric,
                category,
                self.config.min_score,
            )
            .await
    }

    pub fn max_context_chars(&self) -> usize {
        self.config.max_context_chars
    }
}

/// Parent document ids of the hits, deduplicated, best rank first.
pub fn cited_document_ids(hits: &[ChunkHit]) -> Vec<String> {
    let mut ids = Vec::new();
    for hit in hits {
        if !ids.iter().any(|id| id == &hit.document_id) {
            ids.push(hit.document_id.clone());
        }
    }
    ids
}

/// Format hits into the numbered context block handed to the generator.
///
/// Stops before exceeding `max_chars`; lower-ranked hits are dropped first.
/// Returns the block and how many hits made it in, so citations can be
/// limited to sources the model actually saw.
pub fn format_context(hits: &[ChunkHit], max_chars: usize) -> (String, usize) {
    if hits.is_empty() {
        return (String::new(), 0);
    }

    let mut context = String::new();
    let mut current_length = 0;
    let mut included = 0;

    for (i, hit) in hits.iter().enumerate() {
        let source = hit
            .document_source
            .as_deref()
            .unwrap_or(&hit.document_title);
        let block = format!(
            "[{}] (Source: {}, relevance: {:.2})\n{}\n\n",
            i + 1,
            source,
            hit.score,
            hit.content
        );

        if current_length + block.len() > max_chars {
            break;
        }
        current_length += block.len();
        context.push_str(&block);
        included += 1;
    }

    (context.trim().to_string(), included)
}
