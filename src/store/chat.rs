//! Chat session and message persistence.
//!
//! Sessions are keyed by the client-generated `session_id`; the integer
//! primary key is only a surrogate. Messages cascade from their session
//! and read back in insertion order.

use serde::Serialize;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::core::errors::ApiError;

const MAX_HISTORY_LIMIT: i64 = 1000;
const MAX_TITLE_LEN: usize = 160;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub title: Option<String>,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
    pub message_count: i64,
    pub preview: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionDetail {
    pub session_id: String,
    pub user_id: Option<String>,
    pub title: Option<String>,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageRecord {
    pub id: i64,
    pub role: String,
    pub content: String,
    pub cited_documents: Vec<String>,
    pub created_at: String,
}

#[derive(Clone)]
pub struct ChatStore {
    pool: SqlitePool,
}

impl ChatStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the session if it does not exist yet. Returns its detail row
    /// and whether this call created it.
    pub async fn ensure_session(
        &self,
        session_id: &str,
        user_id: Option<&str>,
        title_hint: Option<&str>,
    ) -> Result<(SessionDetail, bool), ApiError> {
        if session_id.trim().is_empty() {
            return Err(ApiError::BadRequest(
                "session_id must not be empty".to_string(),
            ));
        }

        let title = title_hint.map(normalize_title);
        let result = sqlx::query(
            "INSERT OR IGNORE INTO chat_sessions (session_id, user_id, title) VALUES (?1, ?2, ?3)",
        )
        .bind(session_id)
        .bind(user_id)
        .bind(&title)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let created = result.rows_affected() > 0;
        let detail = self
            .get_session(session_id)
            .await?
            .ok_or_else(|| ApiError::Internal("session vanished after insert".to_string()))?;

        Ok((detail, created))
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<SessionDetail>, ApiError> {
        let row = sqlx::query(
            "\
            SELECT session_id, user_id, title, active, created_at, updated_at
            FROM chat_sessions
            WHERE session_id = ?1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        row.map(session_detail_from_row)
            .transpose()
            .map_err(ApiError::internal)
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionInfo>, ApiError> {
        let rows = sqlx::query(
            "\
            SELECT s.session_id, s.title, s.active, s.created_at, s.updated_at,
                   (SELECT COUNT(*) FROM chat_messages WHERE session_id = s.session_id) as message_count,
                   (SELECT content FROM chat_messages WHERE session_id = s.session_id ORDER BY id DESC LIMIT 1) as last_message
            FROM chat_sessions s
            ORDER BY s.updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        rows.into_iter()
            .map(session_info_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(ApiError::internal)
    }

    pub async fn update_session_title(
        &self,
        session_id: &str,
        title: &str,
    ) -> Result<bool, ApiError> {
        let title = normalize_title(title);
        if title.is_empty() {
            return Err(ApiError::BadRequest("title must not be empty".to_string()));
        }

        let result = sqlx::query(
            "UPDATE chat_sessions SET title = ?1, updated_at = STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE session_id = ?2",
        )
        .bind(title)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark a session inactive. Terminal: there is no reopen.
    pub async fn close_session(&self, session_id: &str) -> Result<bool, ApiError> {
        let result = sqlx::query(
            "UPDATE chat_sessions SET active = 0, updated_at = STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE session_id = ?1",
        )
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM chat_sessions WHERE session_id = ?1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn append_message(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        cited_documents: Option<&[String]>,
    ) -> Result<i64, ApiError> {
        let cited = cited_documents
            .map(serde_json::to_string)
            .transpose()
            .map_err(ApiError::internal)?;

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        let result = sqlx::query(
            "\
            INSERT INTO chat_messages (session_id, role, content, cited_documents)
            VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(session_id)
        .bind(role.as_str())
        .bind(content)
        .bind(&cited)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        touch_session_tx(&mut tx, session_id).await?;
        tx.commit().await.map_err(ApiError::internal)?;

        Ok(result.last_insert_rowid())
    }

    /// Last `limit` messages in insertion (FIFO) order.
    pub async fn get_messages(
        &self,
        session_id: &str,
        limit: i64,
    ) -> Result<Vec<MessageRecord>, ApiError> {
        let limit = sanitize_limit(limit);

        let rows = sqlx::query(
            "\
            SELECT id, role, content, cited_documents, created_at
            FROM (
                SELECT id, role, content, cited_documents, created_at
                FROM chat_messages
                WHERE session_id = ?1
                ORDER BY id DESC
                LIMIT ?2
            )
            ORDER BY id ASC",
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        rows.into_iter()
            .map(message_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(ApiError::internal)
    }

    pub async fn message_count(&self, session_id: &str) -> Result<i64, ApiError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM chat_messages WHERE session_id = ?1")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)
    }

    pub async fn count_sessions(&self) -> Result<i64, ApiError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM chat_sessions")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)
    }
}

fn session_detail_from_row(row: sqlx::sqlite::SqliteRow) -> Result<SessionDetail, sqlx::Error> {
    let active: i64 = row.try_get("active")?;
    Ok(SessionDetail {
        session_id: row.try_get("session_id")?,
        user_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        active: active != 0,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn session_info_from_row(row: sqlx::sqlite::SqliteRow) -> Result<SessionInfo, sqlx::Error> {
    let active: i64 = row.try_get("active")?;
    let last_message: Option<String> = row.try_get("last_message")?;
    let preview = last_message.unwrap_or_default().chars().take(100).collect();

    Ok(SessionInfo {
        session_id: row.try_get("session_id")?,
        title: row.try_get("title")?,
        active: active != 0,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        message_count: row.try_get("message_count")?,
        preview,
    })
}

fn message_from_row(row: sqlx::sqlite::SqliteRow) -> Result<MessageRecord, sqlx::Error> {
    let cited_raw: Option<String> = row.try_get("cited_documents")?;
    let cited_documents = cited_raw
        .as_deref()
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default();

    Ok(MessageRecord {
        id: row.try_get("id")?,
        role: row.try_get("role")?,
        content: row.try_get("content")?,
        cited_documents,
        created_at: row.try_get("created_at")?,
    })
}

async fn touch_session_tx(
    tx: &mut Transaction<'_, Sqlite>,
    session_id: &str,
) -> Result<(), ApiError> {
    sqlx::query(
        "UPDATE chat_sessions SET updated_at = STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE session_id = ?1",
    )
    .bind(session_id)
    .execute(&mut **tx)
    .await
    .map_err(ApiError::internal)?;
    Ok(())
}

fn sanitize_limit(limit: i64) -> i64 {
    if limit <= 0 {
        return 1;
    }
    limit.min(MAX_HISTORY_LIMIT)
}

fn normalize_title(raw: &str) -> String {
    raw.trim().chars().take(MAX_TITLE_LEN).collect()
}
