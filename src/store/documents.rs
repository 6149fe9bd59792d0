//! Document and chunk persistence, plus brute-force similarity search.
//!
//! Chunks are owned by their parent document (cascade delete) and are only
//! ever written through [`KnowledgeStore::replace_chunks`], which swaps the
//! whole chunk set inside one transaction. Concurrent readers see either
//! the old set or the new set, never a mix and never a mid-reindex gap.

use serde::Serialize;
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::chunk::TextChunk;
use crate::core::errors::ApiError;
use crate::vector::{decode_embedding, encode_embedding, SimilarityMetric};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexStatus {
    Pending,
    Indexed,
    Failed,
}

impl IndexStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStatus::Pending => "pending",
            IndexStatus::Indexed => "indexed",
            IndexStatus::Failed => "failed",
        }
    }

    fn parse(raw: &str) -> Self {
        match raw {
            "indexed" => IndexStatus::Indexed,
            "failed" => IndexStatus::Failed,
            _ => IndexStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
    pub source: Option<String>,
    pub category: Option<String>,
    pub metadata: Value,
    pub index_status: IndexStatus,
    pub created_at: String,
    pub updated_at: String,
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewDocument {
    pub title: String,
    pub content: String,
    pub source: Option<String>,
    pub category: Option<String>,
    pub metadata: Option<Value>,
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub source: Option<String>,
    pub category: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: String,
    pub document_id: String,
    pub content: String,
    pub chunk_index: i64,
    pub embedding: Vec<f32>,
    pub metadata: Value,
    pub created_at: String,
}

/// A similarity hit with parent-document provenance for citations.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkHit {
    pub chunk_id: String,
    pub document_id: String,
    pub document_title: String,
    pub document_source: Option<String>,
    pub content: String,
    pub chunk_index: i64,
    pub score: f32,
}

#[derive(Clone)]
pub struct KnowledgeStore {
    pool: SqlitePool,
}

impl KnowledgeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_document(&self, new: NewDocument) -> Result<Document, ApiError> {
        let title = new.title.trim();
        if title.is_empty() {
            return Err(ApiError::BadRequest(
                "Document title is required".to_string(),
            ));
        }

        let id = Uuid::new_v4().to_string();
        let metadata = serde_json::to_string(&new.metadata.unwrap_or_else(|| Value::Object(Default::default())))
            .map_err(ApiError::internal)?;

        sqlx::query(
            "\
            INSERT INTO rag_documents (id, title, content, source, category, metadata, created_by)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&id)
        .bind(title)
        .bind(&new.content)
        .bind(&new.source)
        .bind(&new.category)
        .bind(&metadata)
        .bind(&new.created_by)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        self.get_document(&id)
            .await?
            .ok_or_else(|| ApiError::Internal("document vanished after insert".to_string()))
    }

    pub async fn get_document(&self, id: &str) -> Result<Option<Document>, ApiError> {
        let row = sqlx::query(
            "\
            SELECT id, title, content, source, category, metadata, index_status,
                   created_at, updated_at, created_by
            FROM rag_documents
            WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        row.map(document_from_row)
            .transpose()
            .map_err(ApiError::internal)
    }

    pub async fn list_documents(
        &self,
        limit: i64,
        offset: i64,
        category: Option<&str>,
    ) -> Result<Vec<Document>, ApiError> {
        let limit = limit.clamp(1, 500);
        let offset = offset.max(0);

        let rows = if let Some(category) = category {
            sqlx::query(
                "\
                SELECT id, title, content, source, category, metadata, index_status,
                       created_at, updated_at, created_by
                FROM rag_documents
                WHERE category = ?1
                ORDER BY updated_at DESC
                LIMIT ?2 OFFSET ?3",
            )
            .bind(category)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?
        } else {
            sqlx::query(
                "\
                SELECT id, title, content, source, category, metadata, index_status,
                       created_at, updated_at, created_by
                FROM rag_documents
                ORDER BY updated_at DESC
                LIMIT ?1 OFFSET ?2",
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?
        };

        rows.into_iter()
            .map(document_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(ApiError::internal)
    }

    /// Apply a patch; returns the updated document and whether `content`
    /// changed (the caller decides whether a reindex is due).
    pub async fn update_document(
        &self,
        id: &str,
        patch: DocumentPatch,
    ) -> Result<(Document, bool), ApiError> {
        let existing = self
            .get_document(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Document not found".to_string()))?;

        let title = patch.title.unwrap_or_else(|| existing.title.clone());
        if title.trim().is_empty() {
            return Err(ApiError::BadRequest(
                "Document title is required".to_string(),
            ));
        }
        let content = patch.content.unwrap_or_else(|| existing.content.clone());
        let content_changed = content != existing.content;
        let source = patch.source.or_else(|| existing.source.clone());
        let category = patch.category.or_else(|| existing.category.clone());
        let metadata = patch.metadata.unwrap_or_else(|| existing.metadata.clone());
        let metadata_raw = serde_json::to_string(&metadata).map_err(ApiError::internal)?;

        sqlx::query(
            "\
            UPDATE rag_documents
            SET title = ?1, content = ?2, source = ?3, category = ?4, metadata = ?5,
                updated_at = STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE id = ?6",
        )
        .bind(title.trim())
        .bind(&content)
        .bind(&source)
        .bind(&category)
        .bind(&metadata_raw)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let updated = self
            .get_document(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Document not found".to_string()))?;

        Ok((updated, content_changed))
    }

    pub async fn delete_document(&self, id: &str) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM rag_documents WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_index_status(&self, id: &str, status: IndexStatus) -> Result<(), ApiError> {
        sqlx::query("UPDATE rag_documents SET index_status = ?1 WHERE id = ?2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(())
    }

    /// Replace a document's chunk set in one transaction and mark it
    /// indexed. Readers observe the old set or the new set, nothing in
    /// between.
    pub async fn replace_chunks(
        &self,
        document_id: &str,
        chunks: &[(TextChunk, Vec<f32>)],
    ) -> Result<usize, ApiError> {
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        sqlx::query("DELETE FROM rag_chunks WHERE document_id = ?1")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        for (chunk, embedding) in chunks {
            let metadata = serde_json::json!({ "start_offset": chunk.start_offset });

            sqlx::query(
                "\
                INSERT INTO rag_chunks (id, document_id, content, chunk_index, embedding, metadata)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(document_id)
            .bind(&chunk.text)
            .bind(chunk.chunk_index as i64)
            .bind(encode_embedding(embedding))
            .bind(metadata.to_string())
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }

        sqlx::query("UPDATE rag_documents SET index_status = 'indexed' WHERE id = ?1")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(chunks.len())
    }

    pub async fn chunks_for_document(
        &self,
        document_id: &str,
    ) -> Result<Vec<ChunkRecord>, ApiError> {
        let rows = sqlx::query(
            "\
            SELECT id, document_id, content, chunk_index, embedding, metadata, created_at
            FROM rag_chunks
            WHERE document_id = ?1
            ORDER BY chunk_index ASC",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        rows.into_iter()
            .map(chunk_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(ApiError::internal)
    }

    pub async fn count_documents(&self) -> Result<i64, ApiError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM rag_documents")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)
    }

    pub async fn count_chunks(&self, document_id: Option<&str>) -> Result<i64, ApiError> {
        if let Some(document_id) = document_id {
            sqlx::query_scalar("SELECT COUNT(*) FROM rag_chunks WHERE document_id = ?1")
                .bind(document_id)
                .fetch_one(&self.pool)
                .await
                .map_err(ApiError::internal)
        } else {
            sqlx::query_scalar("SELECT COUNT(*) FROM rag_chunks")
                .fetch_one(&self.pool)
                .await
                .map_err(ApiError::internal)
        }
    }

    /// Top-K chunks by similarity to the query vector.
    ///
    /// Results are ordered by descending score; ties break by
    /// `chunk_index` ascending, then `document_id` ascending, so repeated
    /// queries over unchanged data return identical lists. An empty store
    /// yields an empty list.
    pub async fn similarity_search(
        &self,
        query_embedding: &[f32],
        k: usize,
        metric: SimilarityMetric,
        category: Option<&str>,
        min_score: f32,
    ) -> Result<Vec<ChunkHit>, ApiError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = if let Some(category) = category {
            sqlx::query(
                "\
                SELECT c.id, c.document_id, c.content, c.chunk_index, c.embedding,
                       d.title, d.source
                FROM rag_chunks c
                JOIN rag_documents d ON d.id = c.document_id
                WHERE d.category = ?1",
            )
            .bind(category)
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?
        } else {
            sqlx::query(
                "\
                SELECT c.id, c.document_id, c.content, c.chunk_index, c.embedding,
                       d.title, d.source
                FROM rag_chunks c
                JOIN rag_documents d ON d.id = c.document_id",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?
        };

        let mut scored: Vec<ChunkHit> = rows
            .iter()
            .filter_map(|row| {
                let raw: String = row.get("embedding");
                let stored = decode_embedding(&raw);
                if stored.len() != query_embedding.len() {
                    return None;
                }
                let score = metric.score(query_embedding, &stored);
                if score < min_score {
                    return None;
                }

                Some(ChunkHit {
                    chunk_id: row.get("id"),
                    document_id: row.get("document_id"),
                    document_title: row.get("title"),
                    document_source: row.get("source"),
                    content: row.get("content"),
                    chunk_index: row.get("chunk_index"),
                    score,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_index.cmp(&b.chunk_index))
                .then_with(|| a.document_id.cmp(&b.document_id))
        });
        scored.truncate(k);

        Ok(scored)
    }
}

fn document_from_row(row: sqlx::sqlite::SqliteRow) -> Result<Document, sqlx::Error> {
    let metadata_raw: String = row.try_get("metadata")?;
    let metadata = serde_json::from_str(&metadata_raw)
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
    let status_raw: String = row.try_get("index_status")?;

    Ok(Document {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        source: row.try_get("source")?,
        category: row.try_get("category")?,
        metadata,
        index_status: IndexStatus::parse(&status_raw),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        created_by: row.try_get("created_by")?,
    })
}

fn chunk_from_row(row: sqlx::sqlite::SqliteRow) -> Result<ChunkRecord, sqlx::Error> {
    let metadata_raw: String = row.try_get("metadata")?;
    let metadata = serde_json::from_str(&metadata_raw)
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
    let embedding_raw: String = row.try_get("embedding")?;

    Ok(ChunkRecord {
        id: row.try_get("id")?,
        document_id: row.try_get("document_id")?,
        content: row.try_get("content")?,
        chunk_index: row.try_get("chunk_index")?,
        embedding: decode_embedding(&embedding_raw),
        metadata,
        created_at: row.try_get("created_at")?,
    })
}
