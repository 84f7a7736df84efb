//! Document ingestion: page text to chunks

mod chunker;
mod pages;

pub use chunker::{TextChunker, SEPARATORS};
pub use pages::virtual_pages;

use crate::types::{Chunk, PageText};

/// Chunk every page of a document, tagging each chunk with its source page
pub fn chunk_pages(
    chunker: &TextChunker,
    document_id: &str,
    filename: &str,
    pages: &[PageText],
) -> Vec<Chunk> {
    pages
        .iter()
        .flat_map(|page| {
            chunker
                .chunk(&page.text)
                .into_iter()
                .enumerate()
                .map(move |(i, text)| Chunk {
                    text,
                    source_document_id: document_id.to_string(),
                    source_filename: filename.to_string(),
                    source_page: page.page_number,
                    chunk_index: i as u32,
                })
        })
        .collect()
}
