//! HTTP relay for the RAG pipeline

pub mod routes;
pub mod state;

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::{RagConfig, ServerConfig};
use crate::error::{Error, Result};
use crate::pipeline::RagPipeline;
use state::AppState;

/// RAG HTTP Server
pub struct RagServer {
    config: ServerConfig,
    state: AppState,
}

impl RagServer {
    /// Create a new server, building the pipeline from `config`
    pub async fn new(config: RagConfig) -> Result<Self> {
        let state = AppState::new(&config).await?;
        Ok(Self {
            config: config.server,
            state,
        })
    }

    /// Serve an already assembled pipeline
    pub fn with_pipeline(config: ServerConfig, pipeline: RagPipeline) -> Self {
        Self {
            config,
            state: AppState::from_pipeline(pipeline),
        }
    }

    /// Build the router with all routes
    pub fn router(&self) -> Router {
        let router = Router::new()
            .route("/health", get(health_check))
            .nest("/api", routes::api_routes())
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            router.layer(cors)
        } else {
            router
        }
    }

    /// Start the server
    pub async fn start(self) -> Result<()> {
        let addr: SocketAddr = self
            .address()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid address: {}", e)))?;

        let router = self.router();

        tracing::info!("Starting RAG server on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Config(format!("Failed to bind: {}", e)))?;

        axum::serve(listener, router)
            .await
            .map_err(|e| Error::Internal(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Get the server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }
}

/// GET /health - liveness plus index size
async fn health_check(State(state): State<AppState>) -> Result<Json<Value>> {
    let stats = state.pipeline().stats().await?;
    Ok(Json(json!({
        "status": "ok",
        "chunks": stats.count,
    })))
}
