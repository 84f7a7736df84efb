//! Gemini embedding provider using text-embedding-004

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::client::GeminiClient;
use crate::error::{Error, Result};
use crate::providers::embedding::{EmbedMode, EmbeddingProvider};

/// Gemini embedding provider
pub struct GeminiEmbedder {
    client: Arc<GeminiClient>,
    model: String,
    dimensions: usize,
}

impl GeminiEmbedder {
    /// Create a new embedder
    ///
    /// # Arguments
    /// * `client` - shared Gemini client
    /// * `model` - model name without the `models/` prefix
    /// * `dimensions` - requested output dimensionality
    pub fn new(client: Arc<GeminiClient>, model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            client,
            model: model.into(),
            dimensions,
        }
    }

    fn request(&self, text: &str, mode: EmbedMode) -> EmbedContentRequest {
        EmbedContentRequest {
            model: format!("models/{}", self.model),
            content: Content {
                parts: vec![Part {
                    text: text.to_string(),
                }],
            },
            task_type: mode.task_type(),
            output_dimensionality: self.dimensions,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest {
    model: String,
    content: Content,
    task_type: &'static str,
    output_dimensionality: usize,
}

#[derive(Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedContentRequest>,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedder {
    async fn embed(&self, text: &str, mode: EmbedMode) -> Result<Vec<f32>> {
        let url = self.client.endpoint(&self.model, "embedContent");
        let response = self.client.post_json(&url, &self.request(text, mode)).await?;

        let parsed: EmbedContentResponse = response
            .json()
            .await
            .map_err(|e| Error::embedding(format!("Failed to parse Gemini response: {}", e)))?;

        Ok(parsed.embedding.values)
    }

    async fn embed_batch(&self, texts: &[String], mode: EmbedMode) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.client.endpoint(&self.model, "batchEmbedContents");
        let request = BatchEmbedRequest {
            requests: texts.iter().map(|t| self.request(t, mode)).collect(),
        };
        let response = self.client.post_json(&url, &request).await?;

        let parsed: BatchEmbedResponse = response.json().await.map_err(|e| {
            Error::embedding(format!("Failed to parse Gemini batch response: {}", e))
        })?;

        Ok(parsed.embeddings.into_iter().map(|e| e.values).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn health_check(&self) -> Result<bool> {
        self.client.health_check().await
    }

    fn name(&self) -> &str {
        "gemini"
    }
}
