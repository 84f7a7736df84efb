//! Virtual paging for documents without native page boundaries
//!
//! Page numbers produced here only group chunks for citation display; they do
//! not correspond to any physical layout.

use crate::types::PageText;

/// Split `text` into windows of `page_size` characters numbered from 1 by
/// position. Whitespace-only windows are skipped but still consume a number.
pub fn virtual_pages(text: &str, page_size: usize) -> Vec<PageText> {
    if page_size == 0 || text.trim().is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(page_size)
        .enumerate()
        .filter_map(|(i, window)| {
            let content: String = window.iter().collect();
            if content.trim().is_empty() {
                None
            } else {
                Some(PageText::new(i as u32 + 1, content))
            }
        })
        .collect()
}
