//! services/api/src/web/books.rs
//!
//! Handlers for the user's shelf: saving books from the catalog, marking them as
//! currently read, tracking status and progress, and shelf-wide statistics.

use crate::error::ApiError;
use crate::web::rest::{
    json_body, optional_text, BookResponse, BookSummaryResponse, ErrorResponse, Path,
    ReadingStatsResponse, SuccessResponse,
};
use crate::web::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use marginalia_core::domain::{NewBook, ReadingProgress, ReadingStatus};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;

//=========================================================================================
// Request Payloads
//=========================================================================================

/// A catalog entry the user wants on their shelf.
#[derive(Deserialize, ToSchema)]
pub struct CreateBookRequest {
    pub ol_work_id: Option<String>,
    pub ol_edition_id: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub cover_url: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    /// One of `reading`, `finished`, `abandoned`.
    pub status: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateProgressRequest {
    pub current_chapter: Option<String>,
    pub current_page: Option<i64>,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// List every saved book with the time of its latest message.
#[utoipa::path(
    get,
    path = "/api/books",
    responses(
        (status = 200, description = "All saved books, most recently updated first", body = Vec<BookSummaryResponse>),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn list_books_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<BookSummaryResponse>>, ApiError> {
    let books = state.db.list_books().await?;
    Ok(Json(books.into_iter().map(Into::into).collect()))
}

/// List the books currently being read.
#[utoipa::path(
    get,
    path = "/api/books/current",
    responses(
        (status = 200, description = "Active books", body = Vec<BookResponse>),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn list_current_books_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<BookResponse>>, ApiError> {
    let books = state.db.list_current_books().await?;
    Ok(Json(books.into_iter().map(Into::into).collect()))
}

/// Save a book chosen from the catalog.
///
/// Saving a work that is already on the shelf returns the stored book unchanged.
#[utoipa::path(
    post,
    path = "/api/books",
    request_body = CreateBookRequest,
    responses(
        (status = 201, description = "Book saved", body = BookResponse),
        (status = 200, description = "Book was already saved", body = BookResponse),
        (status = 400, description = "Missing work id or title", body = ErrorResponse)
    )
)]
pub async fn create_book_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateBookRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = json_body(payload)?;
    let mut book = NewBook {
        ol_work_id: request.ol_work_id.unwrap_or_default().trim().to_string(),
        ol_edition_id: optional_text(request.ol_edition_id),
        title: request.title.unwrap_or_default().trim().to_string(),
        author: optional_text(request.author),
        description: optional_text(request.description),
        cover_url: optional_text(request.cover_url),
    }
    .validate()?;

    if let Some(existing) = state.db.find_book_by_work_id(&book.ol_work_id).await? {
        return Ok((StatusCode::OK, Json(BookResponse::from(existing))));
    }

    if book.description.is_none() {
        book.description = match state.catalog.work_description(&book.ol_work_id).await {
            Ok(description) => description,
            Err(e) => {
                warn!("Description lookup for {} failed: {}", book.ol_work_id, e);
                None
            }
        };
    }

    let (stored, created) = state.db.upsert_book(book).await?;
    let status = if created {
        info!("Saved book {} ('{}')", stored.id, stored.title);
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(BookResponse::from(stored))))
}

/// Shelf-wide counts and books added per month.
#[utoipa::path(
    get,
    path = "/api/books/stats/overview",
    responses(
        (status = 200, description = "Reading statistics", body = ReadingStatsResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn stats_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReadingStatsResponse>, ApiError> {
    Ok(Json(state.db.reading_stats().await?.into()))
}

/// Mark a book as currently being read.
#[utoipa::path(
    put,
    path = "/api/books/{id}/current",
    params(("id" = i64, Path, description = "Book id")),
    responses(
        (status = 200, description = "Updated book", body = BookResponse),
        (status = 404, description = "Book not found", body = ErrorResponse)
    )
)]
pub async fn set_current_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<BookResponse>, ApiError> {
    Ok(Json(state.db.set_book_current(id, true).await?.into()))
}

/// Remove a book from the currently-reading list.
#[utoipa::path(
    put,
    path = "/api/books/{id}/uncurrent",
    params(("id" = i64, Path, description = "Book id")),
    responses(
        (status = 200, description = "Updated book", body = BookResponse),
        (status = 404, description = "Book not found", body = ErrorResponse)
    )
)]
pub async fn unset_current_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<BookResponse>, ApiError> {
    Ok(Json(state.db.set_book_current(id, false).await?.into()))
}

/// Change the reading status of a book.
#[utoipa::path(
    put,
    path = "/api/books/{id}/status",
    params(("id" = i64, Path, description = "Book id")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Updated book", body = BookResponse),
        (status = 400, description = "Unknown status", body = ErrorResponse),
        (status = 404, description = "Book not found", body = ErrorResponse)
    )
)]
pub async fn update_status_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<BookResponse>, ApiError> {
    let request = json_body(payload)?;
    let status = ReadingStatus::from_str(request.status.as_deref().unwrap_or_default())?;
    Ok(Json(state.db.update_book_status(id, status).await?.into()))
}

/// Record where the user is in a book.
#[utoipa::path(
    put,
    path = "/api/books/{id}/progress",
    params(("id" = i64, Path, description = "Book id")),
    request_body = UpdateProgressRequest,
    responses(
        (status = 200, description = "Updated book", body = BookResponse),
        (status = 400, description = "Page below 1", body = ErrorResponse),
        (status = 404, description = "Book not found", body = ErrorResponse)
    )
)]
pub async fn update_progress_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    payload: Result<Json<UpdateProgressRequest>, JsonRejection>,
) -> Result<Json<BookResponse>, ApiError> {
    let request = json_body(payload)?;
    let progress = ReadingProgress {
        chapter: optional_text(request.current_chapter),
        page: request.current_page,
    }
    .validate()?;
    Ok(Json(state.db.update_book_progress(id, progress).await?.into()))
}

/// Delete a book together with its conversations, notes and collection items.
#[utoipa::path(
    delete,
    path = "/api/books/{id}",
    params(("id" = i64, Path, description = "Book id")),
    responses(
        (status = 200, description = "Book deleted", body = SuccessResponse),
        (status = 404, description = "Book not found", body = ErrorResponse)
    )
)]
pub async fn delete_book_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.db.delete_book(id).await?;
    info!("Deleted book {}", id);
    Ok(Json(SuccessResponse::ok()))
}
