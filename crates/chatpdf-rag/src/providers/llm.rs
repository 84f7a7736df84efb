//! LLM provider trait for answer and title generation

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::config::LlmConfig;
use crate::error::Result;

/// Incremental text fragments of one generation
pub type TokenStream = BoxStream<'static, Result<String>>;

/// Bounded decoding parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl GenerationParams {
    /// Parameters for full answers
    pub fn answer(config: &LlmConfig) -> Self {
        Self {
            temperature: config.temperature,
            top_p: config.top_p,
            max_output_tokens: config.max_output_tokens,
        }
    }

    /// Tighter budget for short auxiliary text such as titles
    pub fn title(config: &LlmConfig) -> Self {
        Self {
            temperature: config.temperature,
            top_p: config.top_p,
            max_output_tokens: config.title_max_output_tokens,
        }
    }
}

/// Trait for LLM-based generation
///
/// Implementations:
/// - `GeminiLlm`: Gemini API (gemini-2.0-flash)
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Open a streaming generation. Errors raised before the first fragment
    /// (including rate limiting) are returned here, not inside the stream.
    async fn generate_stream(&self, prompt: &str, params: &GenerationParams)
        -> Result<TokenStream>;

    /// Single-shot generation
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String>;

    /// Check if the provider is healthy and available
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;
}
