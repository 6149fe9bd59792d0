//! Document indexing pipeline: chunk, embed, swap into the store.
//!
//! Runs on create, on any content-changing update, and on the manual
//! reindex endpoint. The chunk swap is transactional; if embedding fails
//! the document keeps its previous chunks and is marked `failed` so the
//! admin surface can offer a retry.

use std::sync::Arc;

use crate::chunk::{split_text, TextChunk};
use crate::core::config::ChunkingConfig;
use crate::core::errors::ApiError;
use crate::embed::{embed_with_retry, Embedder};
use crate::store::{Document, IndexStatus, KnowledgeStore};

#[derive(Clone)]
pub struct Indexer {
    store: KnowledgeStore,
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
    retry_attempts: u32,
}

impl Indexer {
    pub fn new(
        store: KnowledgeStore,
        embedder: Arc<dyn Embedder>,
        chunking: ChunkingConfig,
        retry_attempts: u32,
    ) -> Self {
        Self {
            store,
            embedder,
            chunking,
            retry_attempts,
        }
    }

    /// Rebuild the document's chunks and embeddings. Returns the number of
    /// chunks written.
    pub async fn index_document(&self, document: &Document) -> Result<usize, ApiError> {
        let chunks = split_text(&document.content, &self.chunking)?;

        if chunks.is_empty() {
            // Empty content is valid and indexes to zero chunks.
            self.store.replace_chunks(&document.id, &[]).await?;
            tracing::info!("Indexed document {} with 0 chunks", document.id);
            return Ok(0);
        }

        let inputs: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings =
            match embed_with_retry(self.embedder.as_ref(), &inputs, self.retry_attempts).await {
                Ok(embeddings) => embeddings,
                Err(err) => {
                    self.store
                        .set_index_status(&document.id, IndexStatus::Failed)
                        .await?;
                    tracing::warn!("Indexing failed for document {}: {}", document.id, err);
                    return Err(err);
                }
            };

        if embeddings.len() != chunks.len() {
            self.store
                .set_index_status(&document.id, IndexStatus::Failed)
                .await?;
            return Err(ApiError::Internal(format!(
                "embedder returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let rows: Vec<(TextChunk, Vec<f32>)> = chunks.into_iter().zip(embeddings).collect();
        let written = self.store.replace_chunks(&document.id, &rows).await?;
        tracing::info!("Indexed document {} with {} chunks", document.id, written);
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::embed::HashEmbedder;
    use crate::store::{test_pool, NewDocument};

    struct DownEmbedder;

    #[async_trait]
    impl Embedder for DownEmbedder {
        fn name(&self) -> &str {
            "down"
        }

        fn dimension(&self) -> usize {
            4
        }

        async fn embed(&self, _inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
            Err(ApiError::EmbeddingUnavailable("provider down".to_string()))
        }
    }

    async fn store_with_doc(content: &str) -> (KnowledgeStore, Document) {
        let store = KnowledgeStore::new(test_pool().await);
        let doc = store
            .create_document(NewDocument {
                title: "FAQ".to_string(),
                content: content.to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        (store, doc)
    }

    fn chunking(size: usize, overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size: size,
            chunk_overlap: overlap,
        }
    }

    #[tokio::test]
    async fn indexing_writes_contiguous_chunks_and_marks_indexed() {
        let (store, doc) = store_with_doc(&"x".repeat(250)).await;
        let indexer = Indexer::new(
            store.clone(),
            Arc::new(HashEmbedder::new(32)),
            chunking(100, 0),
            1,
        );

        let written = indexer.index_document(&doc).await.unwrap();
        assert_eq!(written, 3);

        let chunks = store.chunks_for_document(&doc.id).await.unwrap();
        let ordinals: Vec<i64> = chunks.iter().map(|c| c.chunk_index).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
        assert!(chunks.iter().all(|c| c.embedding.len() == 32));

        let doc = store.get_document(&doc.id).await.unwrap().unwrap();
        assert_eq!(doc.index_status, IndexStatus::Indexed);
    }

    #[tokio::test]
    async fn emptied_content_reindexes_to_zero_chunks() {
        let (store, doc) = store_with_doc("some initial body of text").await;
        let indexer = Indexer::new(
            store.clone(),
            Arc::new(HashEmbedder::new(32)),
            chunking(10, 0),
            1,
        );
        indexer.index_document(&doc).await.unwrap();
        assert!(store.count_chunks(Some(&doc.id)).await.unwrap() > 0);

        let (updated, changed) = store
            .update_document(
                &doc.id,
                crate::store::DocumentPatch {
                    content: Some(String::new()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(changed);

        let written = indexer.index_document(&updated).await.unwrap();
        assert_eq!(written, 0);
        assert_eq!(store.count_chunks(Some(&doc.id)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn whitespace_only_content_indexes_to_zero_chunks() {
        // Blank content must never reach the embedder (which rejects blank
        // inputs); it indexes cleanly to zero chunks like empty content.
        let (store, doc) = store_with_doc("   \n\t   ").await;
        let indexer = Indexer::new(
            store.clone(),
            Arc::new(HashEmbedder::new(32)),
            chunking(100, 10),
            1,
        );

        let written = indexer.index_document(&doc).await.unwrap();
        assert_eq!(written, 0);
        assert_eq!(store.count_chunks(Some(&doc.id)).await.unwrap(), 0);

        let doc = store.get_document(&doc.id).await.unwrap().unwrap();
        assert_eq!(doc.index_status, IndexStatus::Indexed);
    }

    #[tokio::test]
    async fn embed_failure_marks_failed_and_keeps_document() {
        let (store, doc) = store_with_doc("content that will not embed").await;
        let indexer = Indexer::new(store.clone(), Arc::new(DownEmbedder), chunking(100, 0), 1);

        let err = indexer.index_document(&doc).await.unwrap_err();
        assert!(matches!(err, ApiError::EmbeddingUnavailable(_)));

        let doc = store.get_document(&doc.id).await.unwrap().unwrap();
        assert_eq!(doc.index_status, IndexStatus::Failed);
    }

    #[tokio::test]
    async fn reindexing_unchanged_content_is_idempotent() {
        let (store, doc) = store_with_doc(&"stable text ".repeat(30)).await;
        let indexer = Indexer::new(
            store.clone(),
            Arc::new(HashEmbedder::new(32)),
            chunking(50, 10),
            1,
        );

        indexer.index_document(&doc).await.unwrap();
        let first = store.chunks_for_document(&doc.id).await.unwrap();

        indexer.index_document(&doc).await.unwrap();
        let second = store.chunks_for_document(&doc.id).await.unwrap();

        let contents_first: Vec<&str> = first.iter().map(|c| c.content.as_str()).collect();
        let contents_second: Vec<&str> = second.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents_first, contents_second);

        let embeddings_first: Vec<&[f32]> = first.iter().map(|c| c.embedding.as_slice()).collect();
        let embeddings_second: Vec<&[f32]> =
            second.iter().map(|c| c.embedding.as_slice()).collect();
        assert_eq!(embeddings_first, embeddings_second);
    }
}
