//! Offline embedding provider using feature hashing
//!
//! Each lowercase alphanumeric token is hashed with SHA-256 into a signed
//! bucket and the result is L2-normalized. Texts sharing vocabulary end up
//! close under cosine similarity, which is enough for keyless local runs and
//! deterministic tests.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::embedding::{EmbedMode, EmbeddingProvider};
use crate::error::Result;

/// Deterministic bag-of-words embedder
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// Embed without going through the async trait
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        if self.dimensions == 0 {
            return vector;
        }

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let bucket = digest[..8]
                .iter()
                .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[(bucket % self.dimensions as u64) as usize] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str, _mode: EmbedMode) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "hashing"
    }
}
