//! Citation extraction and verification
//!
//! The model is asked to cite with markers rendered by [`format_marker`];
//! [`extract`] parses them back and keeps only those that point at a page
//! that was actually part of the retrieved evidence.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::fmt::Display;

use crate::types::{Citation, EvidenceItem};

/// Characters of evidence text kept in a citation preview
pub const PREVIEW_CHARS: usize = 200;

static MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^,\[\]]+),\s*Page\s*(\d+)\]").expect("valid citation pattern"));

/// Render a citation marker, e.g. `[manual.pdf, Page 3]`
pub fn format_marker(filename: &str, page: impl Display) -> String {
    format!("[{}, Page {}]", filename, page)
}

/// Extract verified citations from a complete answer.
///
/// A marker is accepted only when its filename and page exactly match an
/// evidence item. Citations are unique per `(filename, page)` and keep the
/// order in which they first appear.
pub fn extract(text: &str, evidence: &[EvidenceItem]) -> Vec<Citation> {
    let mut seen: HashSet<(String, u32)> = HashSet::new();
    let mut citations = Vec::new();

    for cap in MARKER.captures_iter(text) {
        let filename = cap.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        let Some(page) = cap.get(2).and_then(|m| m.as_str().parse::<u32>().ok()) else {
            continue;
        };

        if seen.contains(&(filename.to_string(), page)) {
            continue;
        }

        let Some(item) = evidence
            .iter()
            .find(|e| e.metadata.filename == filename && e.metadata.page == page)
        else {
            continue;
        };

        seen.insert((filename.to_string(), page));
        citations.push(Citation {
            document_id: item.metadata.document_id.clone(),
            filename: item.metadata.filename.clone(),
            page,
            chunk_preview: preview(&item.text),
        });
    }

    citations
}

/// First [`PREVIEW_CHARS`] characters, with `...` appended when cut
pub fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChunkMetadata;

    fn evidence(filename: &str, page: u32, text: &str) -> EvidenceItem {
        EvidenceItem {
            id: format!("doc-{}_{}", filename, page),
            text: text.to_string(),
            metadata: ChunkMetadata {
                document_id: format!("doc-{}", filename),
                filename: filename.to_string(),
                page,
                chunk_index: 0,
            },
            similarity: 0.9,
        }
    }

    #[test]
    fn test_only_markers_backed_by_evidence_survive() {
        let items = vec![evidence("a.pdf", 2, "refunds"), evidence("b.pdf", 1, "shipping")];
        let text = "Refunds take 30 days [a.pdf, Page 2]. Shipping [b.pdf, Page 7] and \
                    [c.pdf, Page 1] and [b.pdf,Page1].";

        let citations = extract(text, &items);
        let keys: Vec<(&str, u32)> = citations.iter().map(|c| c.key()).collect();
        assert_eq!(keys, vec![("a.pdf", 2), ("b.pdf", 1)]);
        assert_eq!(citations[0].document_id, "doc-a.pdf");
    }

    #[test]
    fn test_duplicates_keep_first_occurrence() {
        let items = vec![evidence("a.pdf", 1, "x"), evidence("a.pdf", 2, "y")];
        let text = "[a.pdf, Page 2] then [ a.pdf , Page 1] then [a.pdf, Page 2] again";

        let citations = extract(text, &items);
        let keys: Vec<(&str, u32)> = citations.iter().map(|c| c.key()).collect();
        assert_eq!(keys, vec![("a.pdf", 2), ("a.pdf", 1)]);
    }

    #[test]
    fn test_unparseable_page_is_ignored() {
        let items = vec![evidence("a.pdf", 1, "x")];
        assert!(extract("[a.pdf, Page 99999999999999999999]", &items).is_empty());
        assert!(extract("no markers here", &items).is_empty());
        assert!(extract("[a.pdf, Page 1]", &[]).is_empty());
    }

    #[test]
    fn test_marker_round_trips_through_pattern() {
        let items = vec![evidence("Q3 report.pdf", 12, "numbers")];
        let text = format!("Revenue grew {}", format_marker("Q3 report.pdf", 12));
        assert_eq!(extract(&text, &items).len(), 1);
    }

    #[test]
    fn test_preview_truncates_by_characters() {
        assert_eq!(preview("short"), "short");

        let long = "é".repeat(250);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 3);

        let exact = "x".repeat(PREVIEW_CHARS);
        assert_eq!(preview(&exact), exact);
    }
}
