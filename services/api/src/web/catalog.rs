//! services/api/src/web/catalog.rs
//!
//! Handlers that look books up in the external catalog. Both degrade to an empty
//! answer when the catalog is unreachable.

use crate::error::ApiError;
use crate::web::rest::{CatalogSearchResultResponse, ErrorResponse, Path, Query};
use crate::web::state::AppState;
use axum::{
    extract::State,
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    /// Title to search for.
    pub q: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct BookDetailsResponse {
    pub description: Option<String>,
}

/// Search the catalog by title.
#[utoipa::path(
    get,
    path = "/api/books/search",
    params(SearchQuery),
    responses(
        (status = 200, description = "Matching works, empty when the catalog is unavailable", body = Vec<CatalogSearchResultResponse>),
        (status = 400, description = "Missing query", body = ErrorResponse)
    )
)]
pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<CatalogSearchResultResponse>>, ApiError> {
    let q = query.q.as_deref().map(str::trim).unwrap_or_default();
    if q.is_empty() {
        return Err(ApiError::validation("Query parameter \"q\" is required"));
    }

    let results = match state.catalog.search_books(q).await {
        Ok(results) => results,
        Err(e) => {
            warn!("Catalog search for '{}' failed: {}", q, e);
            Vec::new()
        }
    };
    Ok(Json(results.into_iter().map(Into::into).collect()))
}

/// Fetch the long description of a catalog work.
#[utoipa::path(
    get,
    path = "/api/books/details/{work_id}",
    params(("work_id" = String, Path, description = "Catalog work id, e.g. OL893415W")),
    responses(
        (status = 200, description = "Description, null when unknown or unavailable", body = BookDetailsResponse)
    )
)]
pub async fn details_handler(
    State(state): State<Arc<AppState>>,
    Path(work_id): Path<String>,
) -> Json<BookDetailsResponse> {
    let description = match state.catalog.work_description(&work_id).await {
        Ok(description) => description,
        Err(e) => {
            warn!("Description lookup for {} failed: {}", work_id, e);
            None
        }
    };
    Json(BookDetailsResponse { description })
}
