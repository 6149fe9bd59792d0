use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok", "version": env!("CARGO_PKG_VERSION")}))
}

pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let documents = state.store.count_documents().await?;
    let chunks = state.store.count_chunks(None).await?;
    let sessions = state.history.count_sessions().await?;
    let uptime_secs = (Utc::now() - state.started_at).num_seconds();

    Ok(Json(json!({
        "documents": documents,
        "chunks": chunks,
        "sessions": sessions,
        "uptime_secs": uptime_secs,
    })))
}
