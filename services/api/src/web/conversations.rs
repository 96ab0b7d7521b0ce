//! services/api/src/web/conversations.rs
//!
//! Handlers for conversations about a book and their transcripts.

use crate::error::ApiError;
use crate::web::rest::{
    ConversationDetailResponse, ConversationResponse, ErrorResponse, Path, SuccessResponse,
};
use crate::web::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use std::sync::Arc;
use tracing::info;

/// List the conversations about a book, most recently active first.
#[utoipa::path(
    get,
    path = "/api/books/{id}/conversations",
    params(("id" = i64, Path, description = "Book id")),
    responses(
        (status = 200, description = "Conversations of the book", body = Vec<ConversationResponse>)
    )
)]
pub async fn list_conversations_handler(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<i64>,
) -> Result<Json<Vec<ConversationResponse>>, ApiError> {
    let conversations = state.db.list_conversations(book_id).await?;
    Ok(Json(conversations.into_iter().map(Into::into).collect()))
}

/// Start an empty conversation about a book.
#[utoipa::path(
    post,
    path = "/api/books/{id}/conversations",
    params(("id" = i64, Path, description = "Book id")),
    responses(
        (status = 201, description = "Conversation created", body = ConversationResponse),
        (status = 404, description = "Book not found", body = ErrorResponse)
    )
)]
pub async fn create_conversation_handler(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let conversation = state.db.create_conversation(book_id).await?;
    info!("Created conversation {} for book {}", conversation.id, book_id);
    Ok((
        StatusCode::CREATED,
        Json(ConversationResponse::from(conversation)),
    ))
}

/// Fetch a conversation with all of its messages in order.
#[utoipa::path(
    get,
    path = "/api/conversations/{id}",
    params(("id" = i64, Path, description = "Conversation id")),
    responses(
        (status = 200, description = "Conversation and transcript", body = ConversationDetailResponse),
        (status = 404, description = "Conversation not found", body = ErrorResponse)
    )
)]
pub async fn get_conversation_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ConversationDetailResponse>, ApiError> {
    let conversation = state.db.get_conversation(id).await?;
    let messages = state.db.list_messages(id).await?;
    Ok(Json(ConversationDetailResponse {
        conversation: conversation.into(),
        messages: messages.into_iter().map(Into::into).collect(),
    }))
}

/// Delete a conversation and its messages.
#[utoipa::path(
    delete,
    path = "/api/conversations/{id}",
    params(("id" = i64, Path, description = "Conversation id")),
    responses(
        (status = 200, description = "Conversation deleted", body = SuccessResponse),
        (status = 404, description = "Conversation not found", body = ErrorResponse)
    )
)]
pub async fn delete_conversation_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.db.delete_conversation(id).await?;
    Ok(Json(SuccessResponse::ok()))
}
