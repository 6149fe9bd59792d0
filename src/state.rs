use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::chat::ChatService;
use crate::core::config::{AppConfig, AppPaths};
use crate::core::security::ApiKey;
use crate::embed::build_embedder;
use crate::index::Indexer;
use crate::llm::build_generator;
use crate::retrieve::Retriever;
use crate::store::{open_pool, ChatStore, KnowledgeStore};

pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: AppConfig,
    pub api_key: ApiKey,
    pub store: KnowledgeStore,
    pub history: ChatStore,
    pub indexer: Indexer,
    pub chat: ChatService,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Wire up the full service from an already-discovered data directory.
    /// Logging is the caller's concern and should be installed first so the
    /// warnings emitted here are not lost.
    pub async fn initialize(paths: Arc<AppPaths>) -> anyhow::Result<Arc<Self>> {
        let config = AppConfig::load(&paths.config_path)?;
        let api_key = ApiKey::from_env();

        let pool = open_pool(&paths.db_path).await?;
        let store = KnowledgeStore::new(pool.clone());
        let history = ChatStore::new(pool);

        let embedder = build_embedder(&config.embedding);
        let generator = build_generator(&config.generation);

        let indexer = Indexer::new(
            store.clone(),
            embedder.clone(),
            config.chunking.clone(),
            config.embedding.retry_attempts,
        );
        let retriever = Retriever::new(
            store.clone(),
            embedder,
            config.retrieval.clone(),
            config.embedding.retry_attempts,
        );
        let chat = ChatService::new(history.clone(), retriever, generator);

        Ok(Arc::new(AppState {
            paths,
            config,
            api_key,
            store,
            history,
            indexer,
            chat,
            started_at: Utc::now(),
        }))
    }
}
