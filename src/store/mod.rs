//! SQLite persistence.
//!
//! One database file holds the whole knowledge-base schema: documents,
//! their derived chunks, chat sessions and chat messages. Chunks cascade
//! from documents and messages cascade from sessions, so a delete can
//! never leave orphans behind.

pub mod chat;
pub mod documents;

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;

use crate::core::errors::ApiError;

pub use chat::{ChatStore, MessageRecord, Role, SessionDetail, SessionInfo};
pub use documents::{
    ChunkHit, ChunkRecord, Document, DocumentPatch, IndexStatus, KnowledgeStore, NewDocument,
};

const SCHEMA_VERSION: i64 = 1;

pub async fn open_pool(db_path: &Path) -> Result<SqlitePool, ApiError> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(8)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
        .map_err(ApiError::internal)?;

    init_schema(&pool).await?;
    Ok(pool)
}

async fn init_schema(pool: &SqlitePool) -> Result<(), ApiError> {
    let version: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await
        .map_err(ApiError::internal)?;

    if version != SCHEMA_VERSION {
        rebuild_schema(pool).await?;
    }

    Ok(())
}

async fn rebuild_schema(pool: &SqlitePool) -> Result<(), ApiError> {
    let mut tx = pool.begin().await.map_err(ApiError::internal)?;

    for table in ["chat_messages", "chat_sessions", "rag_chunks", "rag_documents"] {
        let drop = format!("DROP TABLE IF EXISTS {table}");
        sqlx::query(&drop)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
    }

    sqlx::query(
        "\
        CREATE TABLE rag_documents (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL CHECK(length(trim(title)) > 0),
            content TEXT NOT NULL,
            source TEXT,
            category TEXT,
            metadata TEXT NOT NULL DEFAULT '{}',
            index_status TEXT NOT NULL DEFAULT 'pending'
                CHECK(index_status IN ('pending', 'indexed', 'failed')),
            created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
            updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
            created_by TEXT
        )",
    )
    .execute(&mut *tx)
    .await
    .map_err(ApiError::internal)?;

    sqlx::query(
        "\
        CREATE TABLE rag_chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            content TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            embedding TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
            UNIQUE(document_id, chunk_index),
            FOREIGN KEY (document_id) REFERENCES rag_documents(id) ON DELETE CASCADE
        )",
    )
    .execute(&mut *tx)
    .await
    .map_err(ApiError::internal)?;

    sqlx::query(
        "\
        CREATE TABLE chat_sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT,
            session_id TEXT NOT NULL UNIQUE,
            title TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
            updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
        )",
    )
    .execute(&mut *tx)
    .await
    .map_err(ApiError::internal)?;

    sqlx::query(
        "\
        CREATE TABLE chat_messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            role TEXT NOT NULL CHECK(role IN ('user', 'assistant')),
            content TEXT NOT NULL,
            cited_documents TEXT,
            created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
            FOREIGN KEY (session_id) REFERENCES chat_sessions(session_id) ON DELETE CASCADE
        )",
    )
    .execute(&mut *tx)
    .await
    .map_err(ApiError::internal)?;

    sqlx::query("CREATE INDEX idx_chunks_document ON rag_chunks(document_id, chunk_index)")
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;
    sqlx::query("CREATE INDEX idx_documents_category ON rag_documents(category)")
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;
    sqlx::query("CREATE INDEX idx_sessions_updated_at ON chat_sessions(updated_at DESC)")
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;
    sqlx::query("CREATE INDEX idx_messages_session_id_id ON chat_messages(session_id, id)")
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

    let pragma = format!("PRAGMA user_version = {}", SCHEMA_VERSION);
    sqlx::query(&pragma)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

    tx.commit().await.map_err(ApiError::internal)?;
    Ok(())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let tmp = std::env::temp_dir().join(format!("smartcoat-kb-test-{}.db", uuid::Uuid::new_v4()));
    open_pool(&tmp).await.expect("test pool opens")
}
