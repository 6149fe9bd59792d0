//! Deterministic in-process embedder.
//!
//! Token-hashing bag-of-words: each lowercased alphanumeric token is hashed
//! into one of `dimension` buckets and the resulting count vector is
//! L2-normalized. Not a semantic model, but fully offline and exactly
//! reproducible, which keeps single-host deployments and the test suite
//! independent of an embedding provider.

use async_trait::async_trait;

use super::{reject_blank_inputs, Embedder};
use crate::core::errors::ApiError;

pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];

        for token in tokenize(text) {
            let bucket = (fnv1a64(token.as_bytes()) % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for value in &mut vector {
                *value /= norm;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn name(&self) -> &str {
        "hashed"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        reject_blank_inputs(inputs)?;
        Ok(inputs.iter().map(|input| self.embed_one(input)).collect())
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_lowercase())
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}
