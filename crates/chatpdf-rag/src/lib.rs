//! chatpdf-rag: question answering over uploaded documents with page-level citations
//!
//! Page text is chunked, embedded and stored in a file-backed vector index.
//! Questions are answered by retrieving the closest chunks, asking a language
//! model to answer from them only, and verifying every citation the model
//! produces against the retrieved pages.
//!
//! The main entry point is [`RagPipeline`]; [`server::RagServer`] relays it
//! over HTTP with server-sent events.

pub mod config;
pub mod embeddings;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod pipeline;
pub mod providers;
pub mod retrieval;
pub mod retry;
pub mod server;
pub mod types;

pub use config::RagConfig;
pub use error::{Error, Result};
pub use pipeline::{EventStream, RagPipeline};
pub use types::{
    document::{Chunk, ChunkMetadata, PageText},
    response::{Citation, EvidenceItem, GenerationEvent, IndexStats, IngestReport},
};
