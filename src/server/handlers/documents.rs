//! Document admin surface: CRUD plus the reindex contract.
//!
//! Create and content-changing updates run the indexing pipeline inline.
//! When the embedding provider is down the document is kept with
//! `index_status: "failed"` and the response carries the error text, so
//! the admin UI can show "indexing failed, retry" and call the reindex
//! endpoint later.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::errors::ApiError;
use crate::core::security::require_api_key;
use crate::state::AppState;
use crate::store::{DocumentPatch, NewDocument};

#[derive(Debug, Deserialize)]
pub struct CreateDocumentRequest {
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub source: Option<String>,
    pub category: Option<String>,
    pub metadata: Option<Value>,
    pub created_by: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateDocumentRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub source: Option<String>,
    pub category: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListDocumentsQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub category: Option<String>,
}

pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListDocumentsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.api_key)?;

    let documents = state
        .store
        .list_documents(
            query.limit.unwrap_or(100),
            query.offset.unwrap_or(0),
            query.category.as_deref(),
        )
        .await?;

    Ok(Json(json!({"documents": documents})))
}

pub async fn get_document(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(document_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.api_key)?;

    let document = state
        .store
        .get_document(&document_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Document not found".to_string()))?;
    let chunk_count = state.store.count_chunks(Some(&document_id)).await?;

    Ok(Json(json!({"document": document, "chunk_count": chunk_count})))
}

pub async fn create_document(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateDocumentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.api_key)?;

    let document = state
        .store
        .create_document(NewDocument {
            title: payload.title,
            content: payload.content,
            source: payload.source,
            category: payload.category,
            metadata: payload.metadata,
            created_by: payload.created_by,
        })
        .await?;

    let index_error = match state.indexer.index_document(&document).await {
        Ok(_) => None,
        Err(err) => Some(err.to_string()),
    };

    // Re-read so the response reflects the final index_status.
    let document = state
        .store
        .get_document(&document.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Document not found".to_string()))?;

    Ok(Json(json!({"document": document, "index_error": index_error})))
}

pub async fn update_document(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(document_id): Path<String>,
    Json(payload): Json<UpdateDocumentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.api_key)?;

    let (document, content_changed) = state
        .store
        .update_document(
            &document_id,
            DocumentPatch {
                title: payload.title,
                content: payload.content,
                source: payload.source,
                category: payload.category,
                metadata: payload.metadata,
            },
        )
        .await?;

    let index_error = if content_changed {
        match state.indexer.index_document(&document).await {
            Ok(_) => None,
            Err(err) => Some(err.to_string()),
        }
    } else {
        None
    };

    let document = state
        .store
        .get_document(&document_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Document not found".to_string()))?;

    Ok(Json(json!({
        "document": document,
        "reindexed": content_changed,
        "index_error": index_error,
    })))
}

pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(document_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.api_key)?;

    if !state.store.delete_document(&document_id).await? {
        return Err(ApiError::NotFound("Document not found".to_string()));
    }

    Ok(Json(json!({"success": true})))
}

/// Manual retry for a document whose last indexing attempt failed.
pub async fn reindex_document(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(document_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.api_key)?;

    let document = state
        .store
        .get_document(&document_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Document not found".to_string()))?;

    let chunks = state.indexer.index_document(&document).await?;
    Ok(Json(json!({"success": true, "chunks": chunks})))
}
