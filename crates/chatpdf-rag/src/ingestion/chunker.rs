//! Recursive separator-based text chunking with overlap

use std::collections::VecDeque;

use crate::config::ChunkingConfig;
use crate::error::{Error, Result};

/// Separators in priority order. The empty separator splits into characters.
pub const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// Text chunker with configurable size and overlap, both measured in characters
#[derive(Debug, Clone)]
pub struct TextChunker {
    /// Maximum chunk size in characters
    chunk_size: usize,
    /// Characters carried over between consecutive chunks
    overlap: usize,
}

impl TextChunker {
    /// Create a new chunker. `overlap` must be smaller than `chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::config("chunk size must be positive"));
        }
        if overlap >= chunk_size {
            return Err(Error::config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split text into overlapping chunks. Whitespace-only input yields nothing.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        self.split_recursive(text, &SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();

        // Use the first separator that occurs in the text
        let mut separator = separators.last().copied().unwrap_or("");
        let mut finer: &[&str] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = sep;
                break;
            }
            if text.contains(sep) {
                separator = sep;
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut pending: Vec<&str> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                chunks.extend(self.merge(&pending));
                pending.clear();
            }

            if finer.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    chunks.push(trimmed.to_string());
                }
            } else {
                chunks.extend(self.split_recursive(piece, finer));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge(&pending));
        }

        chunks
    }

    /// Greedily merge small pieces into chunks, carrying up to `overlap`
    /// characters of the previous chunk into the next one.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);

            if total + len > self.chunk_size && !window.is_empty() {
                push_joined(&mut chunks, &window);

                while total > self.overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some(dropped) => total -= char_len(dropped),
                        None => break,
                    }
                }
            }

            window.push_back(piece);
            total += len;
        }

        push_joined(&mut chunks, &window);
        chunks
    }
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<&str>) {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Split on `separator`, attaching each separator to the start of the piece
/// that follows it. Empty pieces are dropped.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0usize;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_input() {
        let chunker = TextChunker::new(500, 50).unwrap();
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk("  \n\n\t ").is_empty());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        assert!(matches!(TextChunker::new(100, 100), Err(Error::Config(_))));
        assert!(matches!(TextChunker::new(0, 0), Err(Error::Config(_))));
        assert!(TextChunker::new(100, 99).is_ok());
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunker = TextChunker::new(500, 50).unwrap();
        let chunks = chunker.chunk("  The refund window is thirty days.  ");
        assert_eq!(chunks, vec!["The refund window is thirty days.".to_string()]);
    }

    #[test]
    fn test_prefers_paragraph_breaks() {
        let chunker = TextChunker::new(40, 5).unwrap();
        let text = "First paragraph has some words.\n\nSecond paragraph has more.";
        let chunks = chunker.chunk(text);
        assert_eq!(
            chunks,
            vec![
                "First paragraph has some words.".to_string(),
                "Second paragraph has more.".to_string(),
            ]
        );
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let chunker = TextChunker::new(30, 10).unwrap();
        let text: Vec<String> = (0..50).map(|i| format!("w{:02}", i)).collect();
        let chunks = chunker.chunk(&text.join(" "));

        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let first_word = pair[1].split(' ').next().unwrap();
            assert!(
                pair[0].contains(first_word),
                "{:?} should carry over into {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_long_word_falls_back_to_characters() {
        let chunker = TextChunker::new(10, 2).unwrap();
        let word = "a".repeat(35);
        let chunks = chunker.chunk(&word);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert!(chunks.concat().len() >= 35);
    }

    #[test]
    fn test_multibyte_text_is_counted_in_characters() {
        let chunker = TextChunker::new(8, 2).unwrap();
        let chunks = chunker.chunk("ééé ààà üüü ööö");
        assert!(chunks.iter().all(|c| c.chars().count() <= 8));
        assert!(chunks.iter().any(|c| c.contains("üüü")));
    }

    fn document() -> impl Strategy<Value = (Vec<String>, String)> {
        let word = "[a-z]{1,12}";
        let joiner = prop_oneof![Just(" "), Just("\n"), Just("\n\n"), Just(". ")];
        prop::collection::vec((word, joiner), 1..120).prop_map(|parts| {
            let words: Vec<String> = parts.iter().map(|(w, _)| w.clone()).collect();
            let text: String = parts.iter().map(|(w, j)| format!("{}{}", w, j)).collect();
            (words, text)
        })
    }

    proptest! {
        #[test]
        fn prop_chunks_bounded_and_cover_input(
            (words, text) in document(),
            size in 20usize..200,
            overlap_pct in 0usize..50,
        ) {
            let overlap = size * overlap_pct / 100;
            let chunker = TextChunker::new(size, overlap).unwrap();
            let chunks = chunker.chunk(&text);

            for chunk in &chunks {
                prop_assert!(chunk.chars().count() <= size);
                prop_assert!(!chunk.trim().is_empty());
            }
            for word in &words {
                prop_assert!(chunks.iter().any(|c| c.contains(word.as_str())));
            }

            let original: usize = text.chars().filter(|c| !c.is_whitespace()).count();
            let rebuilt: usize = chunks
                .iter()
                .map(|c| c.chars().filter(|c| !c.is_whitespace()).count())
                .sum();
            prop_assert!(rebuilt >= original);
        }
    }
}
