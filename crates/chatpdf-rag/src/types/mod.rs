//! Core types for the RAG pipeline

pub mod document;
pub mod response;

pub use document::{Chunk, ChunkMetadata, PageText};
pub use response::{Citation, EvidenceItem, GenerationEvent, IndexStats, IngestReport};
