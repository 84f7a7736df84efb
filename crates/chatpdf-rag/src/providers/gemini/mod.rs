//! Google Gemini provider implementations
//!
//! Uses the Generative Language REST API with an API key:
//! - text-embedding-004 for embeddings (`embedContent`, `batchEmbedContents`)
//! - gemini-2.0-flash for answers (`streamGenerateContent`) and titles
//!   (`generateContent`)

mod client;
mod embedder;
mod generator;

pub use client::{classify_failure, GeminiClient};
pub use embedder::GeminiEmbedder;
pub use generator::{GeminiLlm, SseDecoder};
