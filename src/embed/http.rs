//! OpenAI-compatible HTTP embedding backend.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{reject_blank_inputs, Embedder};
use crate::core::errors::ApiError;

#[derive(Clone)]
pub struct HttpEmbedder {
    base_url: String,
    model: String,
    dimension: usize,
    client: Client,
}

impl HttpEmbedder {
    pub fn new(base_url: String, model: String, dimension: usize) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            dimension,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn name(&self) -> &str {
        "http"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        reject_blank_inputs(inputs)?;
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.base_url);
        let body = json!({
            "model": self.model,
            "input": inputs,
        });

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|err| ApiError::EmbeddingUnavailable(err.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::EmbeddingUnavailable(format!(
                "embedding provider returned {status}: {text}"
            )));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|err| ApiError::EmbeddingUnavailable(err.to_string()))?;

        let mut embeddings = Vec::new();
        if let Some(data) = payload["data"].as_array() {
            for item in data {
                if let Some(vals) = item["embedding"].as_array() {
                    let vec: Vec<f32> = vals
                        .iter()
                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                        .collect();
                    embeddings.push(vec);
                }
            }
        }

        if embeddings.len() != inputs.len() {
            return Err(ApiError::Internal(format!(
                "embedding provider returned {} vectors for {} inputs",
                embeddings.len(),
                inputs.len()
            )));
        }
        for vec in &embeddings {
            if vec.len() != self.dimension {
                return Err(ApiError::Internal(format!(
                    "embedding dimension mismatch: expected {}, got {}",
                    self.dimension,
                    vec.len()
                )));
            }
        }

        Ok(embeddings)
    }
}
