//! Vector store provider trait for storing and searching embeddings

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ChunkMetadata, EvidenceItem, IndexStats};

/// Trait for vector storage and similarity search
///
/// Implementations:
/// - `SqliteVectorStore`: file-backed SQLite index with exact cosine search
#[async_trait]
pub trait VectorStoreProvider: Send + Sync {
    /// Insert or replace the chunks of a document. The three slices must have
    /// equal length; entry `i` gets the id `{document_id}_{i}`.
    async fn upsert(
        &self,
        document_id: &str,
        texts: &[String],
        vectors: &[Vec<f32>],
        metadatas: &[ChunkMetadata],
    ) -> Result<usize>;

    /// Nearest neighbours by cosine similarity, most similar first. When
    /// `allowed_document_ids` is given, only those documents are candidates.
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        allowed_document_ids: Option<&[String]>,
    ) -> Result<Vec<EvidenceItem>>;

    /// Delete all chunks for a document. Returns the number removed.
    async fn delete_by_document(&self, document_id: &str) -> Result<usize>;

    /// Get index statistics
    async fn stats(&self) -> Result<IndexStats>;

    /// Vector dimensionality the index was created with
    fn dimensions(&self) -> usize;

    /// Check if the provider is healthy
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}
