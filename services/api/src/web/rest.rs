//! services/api/src/web/rest.rs
//!
//! Contains the master definition for the OpenAPI specification, the response
//! payloads shared by the REST handlers, and the health endpoint.

use crate::error::ApiError;
use crate::web::{books, catalog, chat, collections, conversations, notes};
use axum::extract::{rejection::JsonRejection, FromRequestParts};
use axum::response::Json;
use chrono::{DateTime, Utc};
use marginalia_core::domain::{
    Book, BookSummary, CatalogSearchResult, CollectionItem, Conversation, Message, MonthlyCount,
    Note, ReadingStats,
};
use serde::Serialize;
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        catalog::search_handler,
        catalog::details_handler,
        books::list_books_handler,
        books::list_current_books_handler,
        books::create_book_handler,
        books::stats_handler,
        books::set_current_handler,
        books::unset_current_handler,
        books::update_status_handler,
        books::update_progress_handler,
        books::delete_book_handler,
        conversations::list_conversations_handler,
        conversations::create_conversation_handler,
        conversations::get_conversation_handler,
        conversations::delete_conversation_handler,
        chat::chat_handler,
        notes::list_notes_handler,
        notes::create_note_handler,
        notes::update_note_handler,
        notes::delete_note_handler,
        collections::list_collection_items_handler,
        collections::create_collection_item_handler,
        collections::update_collection_item_handler,
        collections::delete_collection_item_handler,
    ),
    components(
        schemas(
            HealthResponse, ErrorResponse, SuccessResponse, BookResponse, BookSummaryResponse,
            ConversationResponse, ConversationDetailResponse, MessageResponse, NoteResponse,
            CollectionItemResponse, ReadingStatsResponse, MonthlyCountResponse,
            CatalogSearchResultResponse, catalog::BookDetailsResponse,
            books::CreateBookRequest, books::UpdateStatusRequest, books::UpdateProgressRequest,
            chat::ChatRequest, notes::NoteRequest, collections::CreateCollectionItemRequest,
            collections::UpdateCollectionItemRequest,
        )
    ),
    tags(
        (name = "Marginalia API", description = "Book shelf, notes, collections and the streaming reading companion.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
}

/// The body of every 4xx and 5xx response.
#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize, ToSchema)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

#[derive(Serialize, ToSchema)]
pub struct BookResponse {
    pub id: i64,
    pub ol_work_id: String,
    pub ol_edition_id: Option<String>,
    pub title: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    pub is_current: bool,
    pub current_chapter: Option<String>,
    pub current_page: Option<i64>,
    /// One of `reading`, `finished`, `abandoned`.
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<Book> for BookResponse {
    fn from(book: Book) -> Self {
        Self {
            id: book.id,
            ol_work_id: book.ol_work_id,
            ol_edition_id: book.ol_edition_id,
            title: book.title,
            author: book.author,
            description: book.description,
            cover_url: book.cover_url,
            is_current: book.is_current,
            current_chapter: book.current_chapter,
            current_page: book.current_page,
            status: book.status.as_str().to_string(),
            created_at: book.created_at,
            updated_at: book.updated_at,
            started_at: book.started_at,
            finished_at: book.finished_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct BookSummaryResponse {
    #[serde(flatten)]
    pub book: BookResponse,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl From<BookSummary> for BookSummaryResponse {
    fn from(summary: BookSummary) -> Self {
        Self {
            book: summary.book.into(),
            last_message_at: summary.last_message_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ConversationResponse {
    pub id: i64,
    pub book_id: i64,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Conversation> for ConversationResponse {
    fn from(conversation: Conversation) -> Self {
        Self {
            id: conversation.id,
            book_id: conversation.book_id,
            title: conversation.title,
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub id: i64,
    pub conversation_id: i64,
    /// `user` or `assistant`.
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<Message> for MessageResponse {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            role: message.role.as_str().to_string(),
            content: message.content,
            created_at: message.created_at,
        }
    }
}

/// A conversation with its full transcript, oldest message first.
#[derive(Serialize, ToSchema)]
pub struct ConversationDetailResponse {
    #[serde(flatten)]
    pub conversation: ConversationResponse,
    pub messages: Vec<MessageResponse>,
}

#[derive(Serialize, ToSchema)]
pub struct NoteResponse {
    pub id: i64,
    pub book_id: i64,
    pub content: String,
    pub chapter: Option<String>,
    pub page: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Note> for NoteResponse {
    fn from(note: Note) -> Self {
        Self {
            id: note.id,
            book_id: note.book_id,
            content: note.content,
            chapter: note.chapter,
            page: note.page,
            created_at: note.created_at,
            updated_at: note.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct CollectionItemResponse {
    pub id: i64,
    pub book_id: i64,
    /// `vocabulary` or `quote`.
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    pub note: Option<String>,
    pub chapter: Option<String>,
    pub page: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl From<CollectionItem> for CollectionItemResponse {
    fn from(item: CollectionItem) -> Self {
        Self {
            id: item.id,
            book_id: item.book_id,
            kind: item.kind.as_str().to_string(),
            content: item.content,
            note: item.note,
            chapter: item.chapter,
            page: item.page,
            created_at: item.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct MonthlyCountResponse {
    pub month: String,
    pub count: i64,
}

#[derive(Serialize, ToSchema)]
pub struct ReadingStatsResponse {
    pub total_books: i64,
    pub books_reading: i64,
    pub books_finished: i64,
    pub books_abandoned: i64,
    pub total_conversations: i64,
    pub total_messages: i64,
    pub books_by_month: Vec<MonthlyCountResponse>,
}

impl From<ReadingStats> for ReadingStatsResponse {
    fn from(stats: ReadingStats) -> Self {
        Self {
            total_books: stats.total_books,
            books_reading: stats.books_reading,
            books_finished: stats.books_finished,
            books_abandoned: stats.books_abandoned,
            total_conversations: stats.total_conversations,
            total_messages: stats.total_messages,
            books_by_month: stats
                .books_by_month
                .into_iter()
                .map(|MonthlyCount { month, count }| MonthlyCountResponse { month, count })
                .collect(),
        }
    }
}

/// Search hits use the camelCase keys the web client reads.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSearchResultResponse {
    pub work_id: String,
    pub title: String,
    pub author: String,
    pub publish_year: Option<i64>,
    pub cover_url: Option<String>,
    pub edition_id: Option<String>,
}

impl From<CatalogSearchResult> for CatalogSearchResultResponse {
    fn from(result: CatalogSearchResult) -> Self {
        Self {
            work_id: result.work_id,
            title: result.title,
            author: result.author,
            publish_year: result.publish_year,
            cover_url: result.cover_url,
            edition_id: result.edition_id,
        }
    }
}

/// `axum::extract::Path` with the rejection rendered as a JSON 400.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct Path<T>(pub T);

/// `axum::extract::Query` with the rejection rendered as a JSON 400.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct Query<T>(pub T);

/// Unwraps a JSON body, turning any rejection into a 400 with a JSON error body.
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::validation(rejection.body_text()))
}

/// Trims optional free text, treating blank strings as absent.
pub fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/api/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn document_lists_every_route_group() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/health",
            "/api/books/search",
            "/api/books/{id}/progress",
            "/api/conversations/{id}",
            "/api/chat",
            "/api/notes/books/{book_id}/notes",
            "/api/collections/{id}",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
        assert!(doc.to_pretty_json().unwrap().contains("CatalogSearchResultResponse"));
    }

    #[test]
    fn search_hits_use_camel_case_keys() {
        let hit = CatalogSearchResultResponse::from(CatalogSearchResult {
            work_id: "OL893415W".to_string(),
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            publish_year: Some(1965),
            cover_url: Some("https://covers.example/b/olid/OL1M-M.jpg".to_string()),
            edition_id: Some("OL1M".to_string()),
        });
        assert_eq!(
            serde_json::to_value(hit).unwrap(),
            json!({
                "workId": "OL893415W",
                "title": "Dune",
                "author": "Frank Herbert",
                "publishYear": 1965,
                "coverUrl": "https://covers.example/b/olid/OL1M-M.jpg",
                "editionId": "OL1M"
            })
        );
    }
}
