//! Embedding service: batching, fallback and dimensionality checks on top of
//! an [`EmbeddingProvider`](crate::providers::EmbeddingProvider)

mod embedder;

pub use embedder::{is_zero_vector, Embedder};
