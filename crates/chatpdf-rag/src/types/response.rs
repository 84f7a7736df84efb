//! Retrieval and generation output types

use serde::{Deserialize, Serialize};

use super::document::ChunkMetadata;

/// A retrieved chunk with its similarity to the question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// Chunk identifier (`{document_id}_{ordinal}`)
    pub id: String,
    /// Chunk content
    pub text: String,
    /// Source metadata
    pub metadata: ChunkMetadata,
    /// Cosine similarity (higher is more similar)
    pub similarity: f32,
}

/// A verified reference from the answer to a retrieved page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub document_id: String,
    pub filename: String,
    pub page: u32,
    /// First characters of the matched evidence text
    pub chunk_preview: String,
}

impl Citation {
    /// Uniqueness key within a single answer
    pub fn key(&self) -> (&str, u32) {
        (self.filename.as_str(), self.page)
    }
}

/// Events emitted while answering a question, in stream order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationEvent {
    /// Opens a stream; emitted by the relay layer, never by the pipeline
    Start { conversation_id: String },
    /// Incremental answer text
    Token { text: String },
    /// Verified citation, only after the last token
    Citation(Citation),
    /// Terminal success event
    Done {
        full_text: String,
        citations: Vec<Citation>,
    },
    /// Terminal failure event
    Error { message: String },
}

impl GenerationEvent {
    /// Whether this event closes the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

/// Vector index statistics for health reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Total stored chunks
    pub count: usize,
}

/// Outcome of ingesting one document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Chunks stored in the index
    pub chunk_count: usize,
    /// Chunks stored with a zero vector because embedding failed
    pub unembedded_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let event = GenerationEvent::Token {
            text: "Hello".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "token");
        assert_eq!(json["text"], "Hello");

        let event = GenerationEvent::Citation(Citation {
            document_id: "d1".to_string(),
            filename: "a.pdf".to_string(),
            page: 3,
            chunk_preview: "text".to_string(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "citation");
        assert_eq!(json["page"], 3);
        assert!(!event.is_terminal());
    }
}
