//! ChatPDF RAG relay server binary
//!
//! Run with: cargo run -p chatpdf-rag --bin chatpdf-rag-server

use chatpdf_rag::{config::RagConfig, server::RagServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatpdf_rag=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration (CHATPDF_CONFIG file, then environment)
    let config = RagConfig::load()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Backend: {:?}", config.backend);
    tracing::info!("  - Embedding model: {}", config.embeddings.model);
    tracing::info!("  - Embedding dimensions: {}", config.embeddings.dimensions);
    tracing::info!("  - LLM model: {}", config.llm.generate_model);
    tracing::info!(
        "  - Chunk size: {} (overlap {})",
        config.chunking.chunk_size,
        config.chunking.chunk_overlap
    );
    tracing::info!(
        "  - Vector index: {}",
        config.vector_db.storage_path.display()
    );

    let server = RagServer::new(config).await?;

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("\nEndpoints:");
    println!("  PUT    /api/documents/:id/pages - Index extracted pages");
    println!("  PUT    /api/documents/:id/text  - Index unpaged text");
    println!("  DELETE /api/documents/:id       - Remove a document");
    println!("  POST   /api/chat                - Ask a question (SSE)");
    println!("  POST   /api/titles              - Conversation title");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
