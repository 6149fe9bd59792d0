//! Embedding backends.
//!
//! The embedder maps chunk or query text to a fixed-dimension vector. Two
//! backends exist: an OpenAI-compatible HTTP provider and an in-process
//! deterministic hashing embedder. Both are deterministic for a fixed
//! model/configuration, which the reindex pipeline relies on.

pub mod hashed;
pub mod http;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::config::EmbeddingConfig;
use crate::core::errors::ApiError;

pub use hashed::HashEmbedder;
pub use http::HttpEmbedder;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Backend name (e.g. "hashed", "http").
    fn name(&self) -> &str;

    /// Fixed output dimension D.
    fn dimension(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError>;
}

pub fn build_embedder(config: &EmbeddingConfig) -> Arc<dyn Embedder> {
    match config.backend.as_str() {
        "http" => Arc::new(HttpEmbedder::new(
            config.base_url.clone(),
            config.model.clone(),
            config.dimension,
        )),
        _ => Arc::new(HashEmbedder::new(config.dimension)),
    }
}

/// Embed with bounded retries on provider failure.
///
/// Only `EmbeddingUnavailable` is retried (linear backoff); every other
/// error is surfaced immediately.
pub async fn embed_with_retry(
    embedder: &dyn Embedder,
    inputs: &[String],
    attempts: u32,
) -> Result<Vec<Vec<f32>>, ApiError> {
    let attempts = attempts.max(1);
    let mut last_err = None;

    for attempt in 1..=attempts {
        match embedder.embed(inputs).await {
            Ok(vectors) => return Ok(vectors),
            Err(ApiError::EmbeddingUnavailable(msg)) => {
                tracing::warn!(
                    "Embedding attempt {}/{} failed: {}",
                    attempt,
                    attempts,
                    msg
                );
                last_err = Some(ApiError::EmbeddingUnavailable(msg));
                if attempt < attempts {
                    tokio::time::sleep(Duration::from_millis(200 * u64::from(attempt))).await;
                }
            }
            Err(other) => return Err(other),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        ApiError::EmbeddingUnavailable("embedding provider unavailable".to_string())
    }))
}

pub(crate) fn reject_blank_inputs(inputs: &[String]) -> Result<(), ApiError> {
    if inputs.iter().any(|input| input.trim().is_empty()) {
        return Err(ApiError::BadRequest(
            "embedding input must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyEmbedder {
        calls: AtomicU32,
        succeed_on: u32,
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        fn name(&self) -> &str {
            "flaky"
        }

        fn dimension(&self) -> usize {
            2
        }

        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call < self.succeed_on {
                return Err(ApiError::EmbeddingUnavailable("provider down".to_string()));
            }
            Ok(inputs.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    #[tokio::test]
    async fn retry_recovers_from_transient_failure() {
        let embedder = FlakyEmbedder {
            calls: AtomicU32::new(0),
            succeed_on: 2,
        };

        let vectors = embed_with_retry(&embedder, &["hello".to_string()], 3)
            .await
            .unwrap();
        assert_eq!(vectors.len(), 1);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retry_gives_up_after_configured_attempts() {
        let embedder = FlakyEmbedder {
            calls: AtomicU32::new(0),
            succeed_on: 10,
        };

        let err = embed_with_retry(&embedder, &["hello".to_string()], 2)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::EmbeddingUnavailable(_)));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn blank_inputs_are_rejected() {
        let err = reject_blank_inputs(&["  ".to_string()]).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
        reject_blank_inputs(&["fine".to_string()]).unwrap();
    }
}
