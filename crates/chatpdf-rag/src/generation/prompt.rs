//! Prompt templates for grounded answer generation

use super::citation::format_marker;
use crate::types::EvidenceItem;

/// Phrase the model must use when the context does not contain the answer
pub const INSUFFICIENT_INFORMATION: &str = "I don't have enough information to answer that.";

/// Prompt builder for RAG queries
pub struct PromptBuilder;

impl PromptBuilder {
    /// Render evidence as labeled blocks separated by blank lines
    pub fn build_context(evidence: &[EvidenceItem]) -> String {
        evidence
            .iter()
            .map(|item| {
                format!(
                    "[Source: {}, Page {}]\n{}",
                    item.metadata.filename, item.metadata.page, item.text
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Build the full prompt. Deterministic for a given question and evidence.
    pub fn build(question: &str, evidence: &[EvidenceItem]) -> String {
        format!(
            r#"You are a helpful research assistant. Answer the question based ONLY on the provided context. If the answer is not in the context, say "{fallback}"

Context:
{context}

Question: {question}

Instructions:
- Be concise but complete
- Cite sources using {marker} format
- If multiple sources support a point, cite all relevant sources
- Use markdown for formatting

Answer:"#,
            fallback = INSUFFICIENT_INFORMATION,
            context = Self::build_context(evidence),
            question = question,
            marker = format_marker("Filename", "X"),
        )
    }

    /// Prompt asking for a short conversation title
    pub fn build_title(first_message: &str) -> String {
        format!(
            "Generate a short, concise 3-5 word title for a conversation that starts with: '{}'. \
             Respond only with the title, no quotes or explanations.",
            first_message
        )
    }
}
