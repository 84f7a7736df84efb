//! Provider abstractions for embeddings, generation and vector storage
//!
//! Trait-based seams let the pipeline switch between the Gemini backend, the
//! offline hashing embedder and in-process test doubles.

pub mod embedding;
pub mod gemini;
pub mod hashing;
pub mod llm;
#[cfg(test)]
pub mod scripted;
pub mod vector_store;

pub use embedding::{EmbedMode, EmbeddingProvider};
pub use gemini::{GeminiClient, GeminiEmbedder, GeminiLlm};
pub use hashing::HashingEmbedder;
pub use llm::{GenerationParams, LlmProvider, TokenStream};
pub use vector_store::VectorStoreProvider;
