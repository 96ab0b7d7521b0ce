//! services/api/src/web/notes.rs
//!
//! Handlers for the user's free-form notes on a book.

use crate::error::ApiError;
use crate::web::rest::{
    json_body, optional_text, ErrorResponse, NoteResponse, Path, SuccessResponse,
};
use crate::web::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use marginalia_core::domain::NoteDraft;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;

/// The body of both note creation and note replacement.
#[derive(Deserialize, ToSchema)]
pub struct NoteRequest {
    pub content: Option<String>,
    pub chapter: Option<String>,
    /// 1 or greater.
    pub page: Option<i64>,
}

impl NoteRequest {
    fn into_draft(self) -> Result<NoteDraft, ApiError> {
        Ok(NoteDraft {
            content: self.content.unwrap_or_default(),
            chapter: optional_text(self.chapter),
            page: self.page,
        }
        .validate()?)
    }
}

/// List the notes of a book in page order.
#[utoipa::path(
    get,
    path = "/api/notes/books/{book_id}/notes",
    params(("book_id" = i64, Path, description = "Book id")),
    responses((status = 200, description = "Notes of the book", body = Vec<NoteResponse>))
)]
pub async fn list_notes_handler(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<i64>,
) -> Result<Json<Vec<NoteResponse>>, ApiError> {
    let notes = state.db.list_notes(book_id).await?;
    Ok(Json(notes.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    post,
    path = "/api/notes/books/{book_id}/notes",
    params(("book_id" = i64, Path, description = "Book id")),
    request_body = NoteRequest,
    responses(
        (status = 201, description = "Note created", body = NoteResponse),
        (status = 400, description = "Missing content or invalid page", body = ErrorResponse),
        (status = 404, description = "Book not found", body = ErrorResponse)
    )
)]
pub async fn create_note_handler(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<i64>,
    payload: Result<Json<NoteRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let draft = json_body(payload)?.into_draft()?;
    let note = state.db.create_note(book_id, draft).await?;
    Ok((StatusCode::CREATED, Json(NoteResponse::from(note))))
}

#[utoipa::path(
    put,
    path = "/api/notes/{id}",
    params(("id" = i64, Path, description = "Note id")),
    request_body = NoteRequest,
    responses(
        (status = 200, description = "Note updated", body = NoteResponse),
        (status = 400, description = "Missing content or invalid page", body = ErrorResponse),
        (status = 404, description = "Note not found", body = ErrorResponse)
    )
)]
pub async fn update_note_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    payload: Result<Json<NoteRequest>, JsonRejection>,
) -> Result<Json<NoteResponse>, ApiError> {
    let draft = json_body(payload)?.into_draft()?;
    Ok(Json(state.db.update_note(id, draft).await?.into()))
}

#[utoipa::path(
    delete,
    path = "/api/notes/{id}",
    params(("id" = i64, Path, description = "Note id")),
    responses(
        (status = 200, description = "Note deleted", body = SuccessResponse),
        (status = 404, description = "Note not found", body = ErrorResponse)
    )
)]
pub async fn delete_note_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.db.delete_note(id).await?;
    Ok(Json(SuccessResponse::ok()))
}
