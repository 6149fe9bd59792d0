use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;
use crate::vector::SimilarityMetric;

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub db_path: PathBuf,
    pub config_path: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let data_dir = discover_data_dir();
        let log_dir = data_dir.join("logs");
        let db_path = data_dir.join("smartcoat_kb.db");
        let config_path = data_dir.join("config.toml");

        for dir in [&data_dir, &log_dir] {
            let _ = fs::create_dir_all(dir);
        }

        AppPaths {
            data_dir,
            log_dir,
            db_path,
            config_path,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn discover_data_dir() -> PathBuf {
    if let Ok(dir) = env::var("SMARTCOAT_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if cfg!(debug_assertions) {
        return PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data");
    }

    if cfg!(target_os = "windows") {
        let base = env::var("LOCALAPPDATA")
            .unwrap_or_else(|_| env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string()));
        return PathBuf::from(base).join("SmartcoatKb");
    }

    if cfg!(target_os = "macos") {
        return home_dir()
            .join("Library")
            .join("Application Support")
            .join("SmartcoatKb");
    }

    let xdg = env::var("XDG_DATA_HOME").unwrap_or_else(|_| {
        home_dir()
            .join(".local/share")
            .to_string_lossy()
            .to_string()
    });
    PathBuf::from(xdg).join("smartcoat-kb")
}

fn home_dir() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cors_allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters.
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 80,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of chunks returned per query.
    pub top_k: usize,
    /// Similarity metric used for ranking.
    pub metric: SimilarityMetric,
    /// Chunks scoring below this are dropped from results.
    pub min_score: f32,
    /// Character budget for the assembled context block.
    pub max_context_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            metric: SimilarityMetric::Cosine,
            min_score: 0.0,
            max_context_chars: 4000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// "hashed" (in-process, deterministic) or "http" (OpenAI-compatible).
    pub backend: String,
    pub base_url: String,
    pub model: String,
    pub dimension: usize,
    /// Attempts per provider call before surfacing EmbeddingUnavailable.
    pub retry_attempts: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: "hashed".to_string(),
            base_url: "http://127.0.0.1:1234".to_string(),
            model: "text-embedding-nomic-embed-text-v1.5".to_string(),
            dimension: 384,
            retry_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub base_url: String,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:1234".to_string(),
            model: "default".to_string(),
            max_tokens: Some(1024),
            temperature: Some(0.3),
        }
    }
}

impl AppConfig {
    /// Load config from the data directory, writing defaults on first run.
    pub fn load(config_path: &Path) -> Result<Self, ApiError> {
        let mut config = if config_path.exists() {
            let raw = fs::read_to_string(config_path).map_err(ApiError::internal)?;
            toml::from_str(&raw)
                .map_err(|err| ApiError::InvalidConfig(format!("config.toml: {err}")))?
        } else {
            let config = AppConfig::default();
            let raw = toml::to_string_pretty(&config).map_err(ApiError::internal)?;
            if let Err(err) = fs::write(config_path, raw) {
                tracing::warn!("Failed to write default config: {}", err);
            }
            config
        };

        if let Ok(url) = env::var("SMARTCOAT_EMBEDDING_URL") {
            config.embedding.base_url = url;
            config.embedding.backend = "http".to_string();
        }
        if let Ok(url) = env::var("SMARTCOAT_GENERATION_URL") {
            config.generation.base_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        if self.chunking.chunk_size == 0 {
            return Err(ApiError::InvalidConfig(
                "chunking.chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(ApiError::InvalidConfig(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(ApiError::InvalidConfig(
                "retrieval.top_k must be at least 1".to_string(),
            ));
        }
        if self.embedding.dimension == 0 {
            return Err(ApiError::InvalidConfig(
                "embedding.dimension must be greater than zero".to_string(),
            ));
        }
        match self.embedding.backend.as_str() {
            "hashed" | "http" => {}
            other => {
                return Err(ApiError::InvalidConfig(format!(
                    "embedding.backend must be \"hashed\" or \"http\", got \"{other}\""
                )));
            }
        }
        Ok(())
    }
}
