//! Prompt assembly, streamed generation and citation handling

pub mod citation;
mod generator;
mod prompt;

pub use generator::{
    parse_retry_hint, GenerationState, Generator, RetryPolicy, FALLBACK_TITLE,
};
pub use prompt::{PromptBuilder, INSUFFICIENT_INFORMATION};
