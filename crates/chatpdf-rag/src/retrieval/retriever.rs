//! Question to evidence: embed the question, then query the index

use std::sync::Arc;
use tracing::debug;

use crate::embeddings::Embedder;
use crate::error::Result;
use crate::providers::{EmbedMode, VectorStoreProvider};
use crate::types::EvidenceItem;

/// Retrieves evidence for a question
pub struct Retriever {
    embedder: Arc<Embedder>,
    store: Arc<dyn VectorStoreProvider>,
}

impl Retriever {
    pub fn new(embedder: Arc<Embedder>, store: Arc<dyn VectorStoreProvider>) -> Self {
        Self { embedder, store }
    }

    /// Top `k` evidence items for `question`. An empty result is not an error.
    pub async fn retrieve(
        &self,
        question: &str,
        k: usize,
        allowed_document_ids: Option<&[String]>,
    ) -> Result<Vec<EvidenceItem>> {
        let vector = self.embedder.embed_one(question, EmbedMode::Query).await?;
        let evidence = self.store.query(&vector, k, allowed_document_ids).await?;

        debug!(
            "Retrieved {} evidence items (k={}, filtered={})",
            evidence.len(),
            k,
            allowed_document_ids.is_some()
        );
        Ok(evidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;
    use crate::providers::HashingEmbedder;
    use crate::retrieval::SqliteVectorStore;
    use crate::types::ChunkMetadata;

    #[tokio::test]
    async fn test_retrieves_related_chunk_first() {
        let hashing = Arc::new(HashingEmbedder::new(64));
        let config = EmbeddingConfig {
            dimensions: 64,
            ..Default::default()
        };
        let embedder = Arc::new(Embedder::new(hashing.clone(), &config).unwrap());
        let store = Arc::new(SqliteVectorStore::in_memory(64).unwrap());

        let texts = vec![
            "invoices are paid monthly".to_string(),
            "the office cat sleeps all afternoon".to_string(),
        ];
        let vectors: Vec<Vec<f32>> = texts.iter().map(|t| hashing.embed_text(t)).collect();
        let metadatas: Vec<ChunkMetadata> = (0..2)
            .map(|i| ChunkMetadata {
                document_id: "doc".to_string(),
                filename: "notes.txt".to_string(),
                page: i + 1,
                chunk_index: 0,
            })
            .collect();
        store.upsert("doc", &texts, &vectors, &metadatas).await.unwrap();

        let retriever = Retriever::new(embedder, store);
        let evidence = retriever.retrieve("when are invoices paid", 1, None).await.unwrap();
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].metadata.page, 1);

        let missing = vec!["other".to_string()];
        let evidence = retriever
            .retrieve("when are invoices paid", 5, Some(&missing))
            .await
            .unwrap();
        assert!(evidence.is_empty());
    }
}
