//! Chunk and page types with source tracking for citations

use serde::{Deserialize, Serialize};

/// Already-extracted text of one page of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    /// 1-based page number
    pub page_number: u32,
    /// Plain page text
    pub text: String,
}

impl PageText {
    pub fn new(page_number: u32, text: impl Into<String>) -> Self {
        Self {
            page_number,
            text: text.into(),
        }
    }
}

/// A window of page text ready for embedding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk content
    pub text: String,
    /// Owning document
    pub source_document_id: String,
    /// Filename shown in citations
    pub source_filename: String,
    /// Page the chunk was cut from
    pub source_page: u32,
    /// Position within the page (bookkeeping only, not identity)
    pub chunk_index: u32,
}

impl Chunk {
    /// Scalar metadata stored next to the vector
    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            document_id: self.source_document_id.clone(),
            filename: self.source_filename.clone(),
            page: self.source_page,
            chunk_index: self.chunk_index,
        }
    }
}

/// Metadata persisted with every vector in the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub document_id: String,
    pub filename: String,
    pub page: u32,
    pub chunk_index: u32,
}

/// Identifier of the `ordinal`-th chunk of a document.
///
/// Deterministic so that re-ingesting a document overwrites instead of duplicating.
pub fn chunk_id(document_id: &str, ordinal: usize) -> String {
    format!("{}_{}", document_id, ordinal)
}
