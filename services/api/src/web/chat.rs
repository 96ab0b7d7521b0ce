//! services/api/src/web/chat.rs
//!
//! The chat endpoint. It validates the request, runs the relay stages that may still
//! fail with a JSON error, and then commits to an event-stream response fed by the
//! relay task.

use crate::error::ApiError;
use crate::web::chat_task;
use crate::web::rest::{json_body, ErrorResponse};
use crate::web::state::AppState;
use async_stream::stream;
use axum::{
    extract::{rejection::JsonRejection, State},
    response::{sse::Sse, IntoResponse, Json, Response},
};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{info, Instrument};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct ChatRequest {
    pub conversation_id: Option<i64>,
    pub content: Option<String>,
}

/// Send a message and stream the companion's answer.
///
/// The body is a stream of `data:` events: `{"token": ...}` for each fragment, then
/// `[DONE]`. A failure after streaming has begun is reported as a single
/// `{"error": ...}` event before the stream closes.
#[utoipa::path(
    post,
    path = "/api/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Answer stream", content_type = "text/event-stream", body = String),
        (status = 400, description = "Missing conversation id or content", body = ErrorResponse),
        (status = 404, description = "Conversation or book not found", body = ErrorResponse),
        (status = 500, description = "The completion could not be started", body = ErrorResponse)
    )
)]
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = json_body(payload)?;
    let (conversation_id, content) = match (request.conversation_id, request.content) {
        (Some(id), Some(content)) if !content.trim().is_empty() => (id, content),
        _ => {
            return Err(ApiError::validation(
                "conversation_id and content are required",
            ))
        }
    };

    let span = chat_task::relay_span(conversation_id);
    let relay = chat_task::prepare_relay(&state, conversation_id, &content)
        .instrument(span.clone())
        .await?;
    span.in_scope(|| info!("Streaming answer"));

    let mut events = chat_task::spawn_relay(state, relay, span);
    let body = stream! {
        while let Some(event) = events.recv().await {
            yield Ok::<_, Infallible>(event.into_event());
        }
    };
    Ok(Sse::new(body).into_response())
}
