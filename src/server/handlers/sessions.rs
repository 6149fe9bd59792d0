use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::core::security::require_api_key;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateSessionRequest {
    pub title: String,
}

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.api_key)?;
    let sessions = state.history.list_sessions().await?;
    Ok(Json(json!({"sessions": sessions})))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.api_key)?;

    let session = state
        .history
        .get_session(&session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Session not found".to_string()))?;

    let limit = params
        .get("limit")
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(100);
    let messages = state.history.get_messages(&session_id, limit).await?;

    Ok(Json(json!({"session": session, "messages": messages})))
}

pub async fn update_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
    Json(payload): Json<UpdateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.api_key)?;

    if !state
        .history
        .update_session_title(&session_id, &payload.title)
        .await?
    {
        return Err(ApiError::NotFound("Session not found".to_string()));
    }

    Ok(Json(json!({"success": true})))
}

pub async fn close_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.api_key)?;

    if !state.history.close_session(&session_id).await? {
        return Err(ApiError::NotFound("Session not found".to_string()));
    }
    state.chat.forget_session(&session_id).await;

    Ok(Json(json!({"success": true})))
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.api_key)?;

    if !state.history.delete_session(&session_id).await? {
        return Err(ApiError::NotFound("Session not found".to_string()));
    }
    state.chat.forget_session(&session_id).await;

    Ok(Json(json!({"success": true})))
}
