//! Application state for the relay server

use crate::config::RagConfig;
use crate::error::Result;
use crate::pipeline::RagPipeline;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pipeline: RagPipeline,
}

impl AppState {
    /// Build the pipeline described by `config`
    pub async fn new(config: &RagConfig) -> Result<Self> {
        tracing::info!(
            "Initializing RAG pipeline (backend: {:?})...",
            config.backend
        );
        let pipeline = RagPipeline::from_config(config).await?;
        tracing::info!("RAG pipeline ready");
        Ok(Self { pipeline })
    }

    /// Wrap an already assembled pipeline
    pub fn from_pipeline(pipeline: RagPipeline) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &RagPipeline {
        &self.pipeline
    }
}
