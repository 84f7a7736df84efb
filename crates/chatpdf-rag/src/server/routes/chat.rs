//! Chat endpoints: streamed answers and conversation titles

use axum::{
    extract::{rejection::JsonRejection, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures_util::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::GenerationEvent;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub question: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Restrict retrieval to these documents
    #[serde(default)]
    pub document_ids: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct TitleRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct TitleResponse {
    pub title: String,
}

/// POST /api/chat - answer a question as server-sent events
///
/// Emits a `start` event carrying the conversation id, then the pipeline's
/// events, each as a `data:` line with a JSON payload.
pub async fn chat(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>>> {
    let Json(request) = payload?;
    let question = request.question.trim().to_string();
    if question.is_empty() {
        return Err(Error::InvalidInput("question must not be empty".to_string()));
    }

    let conversation_id = request
        .conversation_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    tracing::info!("Chat [{}]: \"{}\"", conversation_id, question);

    let start = GenerationEvent::Start { conversation_id };
    let events = stream::once(async move { start })
        .chain(state.pipeline().answer(question, request.document_ids))
        .map(|event| Event::default().json_data(&event));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// POST /api/titles - short title for a new conversation
pub async fn title(
    State(state): State<AppState>,
    payload: std::result::Result<Json<TitleRequest>, JsonRejection>,
) -> Result<Json<TitleResponse>> {
    let Json(request) = payload?;
    let title = state.pipeline().title_for(&request.message).await;
    Ok(Json(TitleResponse { title }))
}
