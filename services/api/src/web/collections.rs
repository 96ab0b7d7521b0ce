//! services/api/src/web/collections.rs
//!
//! Handlers for the per-book collections of vocabulary terms and quotes.

use crate::error::ApiError;
use crate::web::rest::{
    json_body, optional_text, CollectionItemResponse, ErrorResponse, Path, Query,
    SuccessResponse,
};
use crate::web::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use marginalia_core::domain::{CollectionItemDraft, CollectionItemUpdate, CollectionKind};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

//=========================================================================================
// Request Payloads
//=========================================================================================

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CollectionFilter {
    /// `vocabulary` or `quote`. Any other value lists every item.
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateCollectionItemRequest {
    /// `vocabulary` or `quote`.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub content: Option<String>,
    pub note: Option<String>,
    pub chapter: Option<String>,
    pub page: Option<i64>,
}

/// The kind of an item is fixed once created.
#[derive(Deserialize, ToSchema)]
pub struct UpdateCollectionItemRequest {
    pub content: Option<String>,
    pub note: Option<String>,
    pub chapter: Option<String>,
    pub page: Option<i64>,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// List the collection items of a book, newest first.
#[utoipa::path(
    get,
    path = "/api/collections/books/{book_id}/collections",
    params(("book_id" = i64, Path, description = "Book id"), CollectionFilter),
    responses(
        (status = 200, description = "Collection items of the book", body = Vec<CollectionItemResponse>)
    )
)]
pub async fn list_collection_items_handler(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<i64>,
    Query(filter): Query<CollectionFilter>,
) -> Result<Json<Vec<CollectionItemResponse>>, ApiError> {
    // An unrecognised filter is ignored rather than rejected.
    let kind = filter
        .kind
        .as_deref()
        .and_then(|k| CollectionKind::from_str(k).ok());
    let items = state.db.list_collection_items(book_id, kind).await?;
    Ok(Json(items.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    post,
    path = "/api/collections/books/{book_id}/collections",
    params(("book_id" = i64, Path, description = "Book id")),
    request_body = CreateCollectionItemRequest,
    responses(
        (status = 201, description = "Item created", body = CollectionItemResponse),
        (status = 400, description = "Missing or invalid type, content or page", body = ErrorResponse),
        (status = 404, description = "Book not found", body = ErrorResponse)
    )
)]
pub async fn create_collection_item_handler(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<i64>,
    payload: Result<Json<CreateCollectionItemRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = json_body(payload)?;
    let (kind, content) = match (request.kind, request.content) {
        (Some(kind), Some(content)) if !kind.is_empty() && !content.trim().is_empty() => {
            (kind, content)
        }
        _ => return Err(ApiError::validation("Type and content are required")),
    };

    let draft = CollectionItemDraft {
        kind: CollectionKind::from_str(&kind)?,
        content,
        note: optional_text(request.note),
        chapter: optional_text(request.chapter),
        page: request.page,
    }
    .validate()?;

    let item = state.db.create_collection_item(book_id, draft).await?;
    Ok((StatusCode::CREATED, Json(CollectionItemResponse::from(item))))
}

#[utoipa::path(
    put,
    path = "/api/collections/{id}",
    params(("id" = i64, Path, description = "Collection item id")),
    request_body = UpdateCollectionItemRequest,
    responses(
        (status = 200, description = "Item updated", body = CollectionItemResponse),
        (status = 400, description = "Missing content or invalid page", body = ErrorResponse),
        (status = 404, description = "Item not found", body = ErrorResponse)
    )
)]
pub async fn update_collection_item_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    payload: Result<Json<UpdateCollectionItemRequest>, JsonRejection>,
) -> Result<Json<CollectionItemResponse>, ApiError> {
    let request = json_body(payload)?;
    let update = CollectionItemUpdate {
        content: request.content.unwrap_or_default(),
        note: optional_text(request.note),
        chapter: optional_text(request.chapter),
        page: request.page,
    }
    .validate()?;
    Ok(Json(state.db.update_collection_item(id, update).await?.into()))
}

#[utoipa::path(
    delete,
    path = "/api/collections/{id}",
    params(("id" = i64, Path, description = "Collection item id")),
    responses(
        (status = 200, description = "Item deleted", body = SuccessResponse),
        (status = 404, description = "Item not found", body = ErrorResponse)
    )
)]
pub async fn delete_collection_item_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.db.delete_collection_item(id).await?;
    Ok(Json(SuccessResponse::ok()))
}
