//! Configuration for the RAG pipeline

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable naming an optional TOML configuration file
pub const CONFIG_PATH_ENV: &str = "CHATPDF_CONFIG";

/// Main RAG configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Backend provider (gemini or offline)
    pub backend: BackendProvider,
    /// Server configuration
    pub server: ServerConfig,
    /// Embedding configuration
    pub embeddings: EmbeddingConfig,
    /// Chunking configuration
    pub chunking: ChunkingConfig,
    /// Generation model configuration
    pub llm: LlmConfig,
    /// Vector index configuration
    pub vector_db: VectorDbConfig,
    /// Retrieval configuration
    pub retrieval: RetrievalConfig,
}

impl RagConfig {
    /// Load configuration from `CHATPDF_CONFIG` (if set), overlay environment
    /// variables and validate the result.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML configuration file. Missing sections fall back to defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_toml(&raw)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config(format!("Invalid config: {}", e)))
    }

    /// Overlay well-known environment variables
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            if !key.trim().is_empty() {
                self.llm.api_key = key;
            }
        }
        if let Ok(model) = std::env::var("GEMINI_MODEL") {
            if !model.trim().is_empty() {
                self.llm.generate_model = model;
            }
        }
        if let Ok(path) = std::env::var("CHATPDF_VECTOR_PATH") {
            if !path.trim().is_empty() {
                self.vector_db.storage_path = PathBuf::from(path);
            }
        }
    }

    /// Reject configurations that can never work
    pub fn validate(&self) -> Result<()> {
        // Answers are always generated by Gemini, whatever embeds the chunks
        if self.llm.api_key.trim().is_empty() {
            return Err(Error::config("GEMINI_API_KEY is not set"));
        }
        if self.embeddings.dimensions == 0 {
            return Err(Error::config("embedding dimensions must be positive"));
        }
        if self.embeddings.batch_size == 0 {
            return Err(Error::config("embedding batch size must be positive"));
        }
        if self.chunking.chunk_size == 0 || self.chunking.chunk_overlap >= self.chunking.chunk_size
        {
            return Err(Error::config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.chunking.virtual_page_size == 0 {
            return Err(Error::config("virtual page size must be positive"));
        }
        if self.retrieval.top_k == 0 {
            return Err(Error::config("retrieval top_k must be positive"));
        }
        Ok(())
    }
}

/// Backend provider selection
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendProvider {
    /// Google Gemini for embeddings and generation
    #[default]
    Gemini,
    /// Local hashing embedder; generation still goes through Gemini
    Offline,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            enable_cors: true,
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding model identifier
    pub model: String,
    /// Embedding dimensions; must match the vector index
    pub dimensions: usize,
    /// Texts per batch request
    pub batch_size: usize,
    /// Pause between batches in milliseconds (provider rate limits)
    pub batch_delay_ms: u64,
    /// Pause between single-item fallback calls in milliseconds
    pub item_delay_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-004".to_string(),
            dimensions: 768,
            batch_size: 10,
            batch_delay_ms: 500,
            item_delay_ms: 200,
        }
    }
}

impl EmbeddingConfig {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn item_delay(&self) -> Duration {
        Duration::from_millis(self.item_delay_ms)
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap between chunks in characters
    pub chunk_overlap: usize,
    /// Characters per virtual page for unpaged documents
    pub virtual_page_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            virtual_page_size: 2000,
        }
    }
}

/// Generation model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// API key; usually supplied through `GEMINI_API_KEY`
    #[serde(skip_serializing)]
    pub api_key: String,
    /// API base URL
    pub base_url: String,
    /// Generation model name
    pub generate_model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Nucleus sampling
    pub top_p: f32,
    /// Output token cap for answers
    pub max_output_tokens: u32,
    /// Output token cap for titles
    pub title_max_output_tokens: u32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Retries after a rate-limit signal
    pub max_retries: u32,
    /// Exponential backoff base in milliseconds
    pub base_delay_ms: u64,
    /// Added to a provider-supplied retry hint, in milliseconds
    pub retry_hint_buffer_ms: u64,
    /// Upper bound of the random jitter, in milliseconds
    pub max_jitter_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            generate_model: "gemini-2.0-flash".to_string(),
            temperature: 0.7,
            top_p: 0.9,
            max_output_tokens: 2048,
            title_max_output_tokens: 100,
            timeout_secs: 120,
            max_retries: 3,
            base_delay_ms: 2000,
            retry_hint_buffer_ms: 1000,
            max_jitter_ms: 1000,
        }
    }
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorDbConfig {
    /// SQLite file holding the index
    pub storage_path: PathBuf,
    /// Attempts to open the index while another process holds the lock
    pub lock_retry_attempts: u32,
    /// Fixed pause between lock attempts in milliseconds
    pub lock_retry_delay_ms: u64,
    /// How long reads and writes wait on another connection's lock once the
    /// index is open, in milliseconds
    pub busy_timeout_ms: u64,
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        let storage_path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("chatpdf-rag")
            .join("vectors.db");

        Self {
            storage_path,
            lock_retry_attempts: 5,
            lock_retry_delay_ms: 1000,
            busy_timeout_ms: 5000,
        }
    }
}

impl VectorDbConfig {
    pub fn lock_retry_delay(&self) -> Duration {
        Duration::from_millis(self.lock_retry_delay_ms)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Evidence items per question
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = RagConfig::from_toml(
            r#"
            backend = "offline"

            [chunking]
            chunk_size = 800

            [llm]
            api_key = "test-key"
            max_retries = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.backend, BackendProvider::Offline);
        assert_eq!(config.chunking.chunk_size, 800);
        assert_eq!(config.chunking.chunk_overlap, 50);
        assert_eq!(config.llm.max_retries, 5);
        assert_eq!(config.embeddings.batch_size, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_overlap() {
        let mut config = RagConfig {
            backend: BackendProvider::Offline,
            ..Default::default()
        };
        config.llm.api_key = "k".to_string();
        config.chunking.chunk_overlap = config.chunking.chunk_size;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_requires_key() {
        let config = RagConfig::default();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = RagConfig::default();
        config.llm.api_key = "k".to_string();
        assert!(config.validate().is_ok());

        config.backend = BackendProvider::Offline;
        config.llm.api_key.clear();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
