//! Embedding provider trait for generating text embeddings

use async_trait::async_trait;

use crate::error::Result;

/// What a text is embedded for. Providers may use asymmetric models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmbedMode {
    /// A user question
    Query,
    /// A document chunk to be stored
    Document,
}

impl EmbedMode {
    /// Gemini task type for this mode
    pub fn task_type(&self) -> &'static str {
        match self {
            Self::Query => "RETRIEVAL_QUERY",
            Self::Document => "RETRIEVAL_DOCUMENT",
        }
    }
}

/// Trait for generating text embeddings
///
/// Implementations:
/// - `GeminiEmbedder`: Gemini API (text-embedding-004)
/// - `HashingEmbedder`: offline feature hashing
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str, mode: EmbedMode) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts in one request
    ///
    /// Default implementation calls `embed` sequentially.
    async fn embed_batch(&self, texts: &[String], mode: EmbedMode) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text, mode).await?);
        }
        Ok(embeddings)
    }

    /// Embedding dimensions (e.g., 768 for text-embedding-004)
    fn dimensions(&self) -> usize;

    /// Check if the provider is healthy and available
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}
