//! API routes for the relay server

pub mod chat;
pub mod documents;

use axum::{
    routing::{delete, post, put},
    Router,
};

use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Document indexing
        .route("/documents/:id", delete(documents::delete_document))
        .route("/documents/:id/pages", put(documents::ingest_pages))
        .route("/documents/:id/text", put(documents::ingest_text))
        // Chat
        .route("/chat", post(chat::chat))
        .route("/titles", post(chat::title))
}
