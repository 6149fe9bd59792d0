use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::core::security::require_api_key;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub text: String,
    pub user_id: Option<String>,
    /// Optional category filter for retrieval (e.g. "pools", "marinas").
    pub category: Option<String>,
}

pub async fn post_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
    Json(payload): Json<PostMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.api_key)?;

    let reply = state
        .chat
        .send_message(
            &session_id,
            &payload.text,
            payload.user_id.as_deref(),
            payload.category.as_deref(),
        )
        .await?;

    Ok(Json(json!({
        "assistant_text": reply.assistant_text,
        "cited_document_ids": reply.cited_document_ids,
    })))
}
