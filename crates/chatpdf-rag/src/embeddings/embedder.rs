use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use crate::providers::{EmbedMode, EmbeddingProvider};
use crate::retry::{tokio_sleeper, Sleeper};

/// Produces embeddings of the configured dimensionality.
///
/// Bulk requests are sent in batches. A failed batch degrades to one call per
/// text, and a text that still cannot be embedded is represented by a zero
/// vector so that ingestion never aborts halfway through a document.
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    sleeper: Arc<dyn Sleeper>,
    dimensions: usize,
    batch_size: usize,
    config: EmbeddingConfig,
}

impl Embedder {
    /// Wrap a provider. Fails when the provider's dimensionality differs from
    /// the configured one.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Result<Self> {
        if provider.dimensions() != config.dimensions {
            return Err(Error::config(format!(
                "embedding provider {} produces {} dimensions, configured {}",
                provider.name(),
                provider.dimensions(),
                config.dimensions
            )));
        }

        Ok(Self {
            provider,
            sleeper: tokio_sleeper(),
            dimensions: config.dimensions,
            batch_size: config.batch_size.max(1),
            config: config.clone(),
        })
    }

    /// Replace the sleeper used for rate-limit pauses
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Embed a single text. Provider failures propagate.
    pub async fn embed_one(&self, text: &str, mode: EmbedMode) -> Result<Vec<f32>> {
        let vector = self.provider.embed(text, mode).await?;
        self.check_dimensions(&vector)?;
        Ok(vector)
    }

    /// Embed many texts, preserving order and length.
    ///
    /// Only a dimensionality mismatch is returned as an error; any other
    /// failure yields a zero vector for the affected text.
    pub async fn embed_many(&self, texts: &[String], mode: EmbedMode) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());

        for (batch_idx, batch) in texts.chunks(self.batch_size).enumerate() {
            if batch_idx > 0 {
                self.sleeper.sleep(self.config.batch_delay()).await;
            }

            match self.provider.embed_batch(batch, mode).await {
                Ok(batch_vectors) if batch_vectors.len() == batch.len() => {
                    for vector in &batch_vectors {
                        self.check_dimensions(vector)?;
                    }
                    vectors.extend(batch_vectors);
                }
                Ok(batch_vectors) => {
                    warn!(
                        "Embedding batch {} returned {} vectors for {} texts, retrying individually",
                        batch_idx,
                        batch_vectors.len(),
                        batch.len()
                    );
                    vectors.extend(self.embed_individually(batch, mode).await?);
                }
                Err(e) => {
                    warn!(
                        "Embedding batch {} failed ({}), retrying individually",
                        batch_idx, e
                    );
                    vectors.extend(self.embed_individually(batch, mode).await?);
                }
            }
        }

        debug!(
            "Embedded {} texts with {}",
            vectors.len(),
            self.provider.name()
        );
        Ok(vectors)
    }

    async fn embed_individually(&self, texts: &[String], mode: EmbedMode) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());

        for (i, text) in texts.iter().enumerate() {
            if i > 0 {
                self.sleeper.sleep(self.config.item_delay()).await;
            }

            match self.provider.embed(text, mode).await {
                Ok(vector) => {
                    self.check_dimensions(&vector)?;
                    vectors.push(vector);
                }
                Err(e) => {
                    warn!("Failed to embed text, storing zero vector: {}", e);
                    vectors.push(vec![0.0; self.dimensions]);
                }
            }
        }

        Ok(vectors)
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(Error::config(format!(
                "embedding has {} dimensions, expected {}",
                vector.len(),
                self.dimensions
            )));
        }
        Ok(())
    }
}

/// Whether a vector is the sentinel stored for an unembeddable text
pub fn is_zero_vector(vector: &[f32]) -> bool {
    vector.iter().all(|v| *v == 0.0)
}
