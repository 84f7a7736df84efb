//! Document indexing endpoints
//!
//! Text extraction happens upstream; these routes receive page text only.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::{IngestReport, PageText};

#[derive(Debug, Deserialize)]
pub struct PagesRequest {
    pub filename: String,
    pub pages: Vec<PageText>,
}

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub filename: String,
    pub text: String,
}

/// PUT /api/documents/:id/pages - index extracted pages
pub async fn ingest_pages(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: std::result::Result<Json<PagesRequest>, JsonRejection>,
) -> Result<Json<IngestReport>> {
    let Json(request) = payload?;
    require_filename(&request.filename)?;
    tracing::info!(
        "Indexing {} ({} pages) as {}",
        request.filename,
        request.pages.len(),
        id
    );

    let report = state
        .pipeline()
        .ingest(&id, &request.filename, &request.pages)
        .await?;
    Ok(Json(report))
}

/// PUT /api/documents/:id/text - index unpaged text
pub async fn ingest_text(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: std::result::Result<Json<TextRequest>, JsonRejection>,
) -> Result<Json<IngestReport>> {
    let Json(request) = payload?;
    require_filename(&request.filename)?;
    tracing::info!("Indexing unpaged {} as {}", request.filename, id);

    let report = state
        .pipeline()
        .ingest_unpaged(&id, &request.filename, &request.text)
        .await?;
    Ok(Json(report))
}

/// DELETE /api/documents/:id - drop a document from the index
pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.pipeline().remove(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn require_filename(filename: &str) -> Result<()> {
    if filename.trim().is_empty() {
        return Err(Error::InvalidInput("filename must not be empty".to_string()));
    }
    Ok(())
}
