pub mod books;
pub mod catalog;
pub mod chat;
pub mod chat_task;
pub mod collections;
pub mod conversations;
pub mod notes;
pub mod protocol;
pub mod rest;
pub mod state;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use state::AppState;
use std::sync::Arc;

/// Builds every `/api` route over the shared state.
pub fn build_router(app_state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/health", get(rest::health_handler))
        // --- Catalog ---
        .route("/books/search", get(catalog::search_handler))
        .route("/books/details/{work_id}", get(catalog::details_handler))
        // --- Books ---
        .route(
            "/books",
            get(books::list_books_handler).post(books::create_book_handler),
        )
        .route("/books/current", get(books::list_current_books_handler))
        .route("/books/stats/overview", get(books::stats_handler))
        .route("/books/{id}", delete(books::delete_book_handler))
        .route("/books/{id}/current", put(books::set_current_handler))
        .route("/books/{id}/uncurrent", put(books::unset_current_handler))
        .route("/books/{id}/status", put(books::update_status_handler))
        .route("/books/{id}/progress", put(books::update_progress_handler))
        // --- Conversations and Chat ---
        .route(
            "/books/{id}/conversations",
            get(conversations::list_conversations_handler)
                .post(conversations::create_conversation_handler),
        )
        .route(
            "/conversations/{id}",
            get(conversations::get_conversation_handler)
                .delete(conversations::delete_conversation_handler),
        )
        .route("/chat", post(chat::chat_handler))
        // --- Notes ---
        .route(
            "/notes/books/{book_id}/notes",
            get(notes::list_notes_handler).post(notes::create_note_handler),
        )
        .route(
            "/notes/{id}",
            put(notes::update_note_handler).delete(notes::delete_note_handler),
        )
        // --- Collections ---
        .route(
            "/collections/books/{book_id}/collections",
            get(collections::list_collection_items_handler)
                .post(collections::create_collection_item_handler),
        )
        .route(
            "/collections/{id}",
            put(collections::update_collection_item_handler)
                .delete(collections::delete_collection_item_handler),
        );

    Router::new()
        .nest("/api", api_routes)
        .with_state(app_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::DbAdapter;
    use crate::config::Config;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use marginalia_core::domain::{CatalogSearchResult, Message};
    use marginalia_core::ports::{
        CatalogService, CompletionService, FragmentStream, PortError, PortResult,
    };
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    struct SilentCompletion;

    #[async_trait]
    impl CompletionService for SilentCompletion {
        async fn stream_completion(&self, _: &str, _: &[Message]) -> PortResult<FragmentStream> {
            Err(PortError::Upstream("not scripted".to_string()))
        }
    }

    struct FixedCatalog;

    #[async_trait]
    impl CatalogService for FixedCatalog {
        async fn search_books(&self, query: &str) -> PortResult<Vec<CatalogSearchResult>> {
            if query == "broken" {
                return Err(PortError::Upstream("timeout".to_string()));
            }
            Ok(vec![CatalogSearchResult {
                work_id: "OL893415W".to_string(),
                title: "Dune".to_string(),
                author: "Frank Herbert".to_string(),
                publish_year: Some(1965),
                cover_url: None,
                edition_id: None,
            }])
        }

        async fn work_description(&self, work_id: &str) -> PortResult<Option<String>> {
            match work_id {
                "OL893415W" => Ok(Some("Set on the desert planet Arrakis.".to_string())),
                _ => Err(PortError::Upstream("timeout".to_string())),
            }
        }
    }

    /// Counts description lookups before delegating to `FixedCatalog`.
    #[derive(Default)]
    struct CountingCatalog {
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl CatalogService for CountingCatalog {
        async fn search_books(&self, query: &str) -> PortResult<Vec<CatalogSearchResult>> {
            FixedCatalog.search_books(query).await
        }

        async fn work_description(&self, work_id: &str) -> PortResult<Option<String>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            FixedCatalog.work_description(work_id).await
        }
    }

    async fn app() -> Router {
        app_with_catalog(Arc::new(FixedCatalog)).await
    }

    async fn app_with_catalog(catalog: Arc<dyn CatalogService>) -> Router {
        let db = DbAdapter::connect("sqlite::memory:").await.unwrap();
        db.run_migrations().await.unwrap();
        let config =
            Config::from_lookup(|key| (key == "OPENAI_API_KEY").then(|| "sk-test".to_string()))
                .unwrap();
        build_router(Arc::new(AppState {
            db: Arc::new(db),
            config: Arc::new(config),
            completion: Arc::new(SilentCompletion),
            catalog,
        }))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn add_dune(app: &Router) -> i64 {
        let (status, book) = send(
            app,
            "POST",
            "/api/books",
            Some(json!({ "ol_work_id": "OL893415W", "title": "Dune", "author": "Frank Herbert" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        book["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = app().await;
        let (status, body) = send(&app, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn saving_a_known_work_returns_the_same_book() {
        let app = app().await;
        let id = add_dune(&app).await;

        let (status, again) = send(
            &app,
            "POST",
            "/api/books",
            Some(json!({ "ol_work_id": "OL893415W", "title": "Dune" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(again["id"].as_i64(), Some(id));
        assert_eq!(again["description"], "Set on the desert planet Arrakis.");
        assert_eq!(again["status"], "reading");
    }

    #[tokio::test]
    async fn saving_a_known_work_skips_the_description_lookup() {
        let catalog = Arc::new(CountingCatalog::default());
        let app = app_with_catalog(catalog.clone()).await;
        let id = add_dune(&app).await;
        assert_eq!(catalog.lookups.load(Ordering::SeqCst), 1);

        let (status, again) = send(
            &app,
            "POST",
            "/api/books",
            Some(json!({ "ol_work_id": "OL893415W", "title": "Dune" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(again["id"].as_i64(), Some(id));
        assert_eq!(catalog.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn malformed_ids_and_queries_are_json_bad_requests() {
        let app = app().await;

        for uri in [
            "/api/conversations/abc",
            "/api/books/abc/conversations",
            "/api/notes/books/x/notes",
            "/api/collections/books/1.5/collections",
        ] {
            let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
            assert_eq!(response.headers()["content-type"], "application/json", "{}", uri);

            let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
            let body: Value = serde_json::from_slice(&bytes).unwrap();
            assert!(body["error"].as_str().unwrap().contains("Cannot parse"), "{}", uri);
        }

        let (status, body) = send(&app, "DELETE", "/api/books/abc", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, body) = send(&app, "GET", "/api/books/search?q=a&q=b", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn description_lookup_failure_does_not_block_saving() {
        let app = app().await;
        let (status, book) = send(
            &app,
            "POST",
            "/api/books",
            Some(json!({ "ol_work_id": "OL1W", "title": "Emma" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(book["description"], Value::Null);
    }

    #[tokio::test]
    async fn book_requires_work_id_and_title() {
        let app = app().await;
        let (status, body) = send(&app, "POST", "/api/books", Some(json!({ "title": "Dune" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "ol_work_id and title are required");
    }

    #[tokio::test]
    async fn status_changes_follow_the_shelf_rules() {
        let app = app().await;
        let id = add_dune(&app).await;

        let (_, current) = send(&app, "PUT", &format!("/api/books/{}/current", id), None).await;
        assert_eq!(current["is_current"], true);

        let (status, finished) = send(
            &app,
            "PUT",
            &format!("/api/books/{}/status", id),
            Some(json!({ "status": "finished" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(finished["is_current"], false);
        assert!(finished["finished_at"].is_string());

        let (status, body) = send(
            &app,
            "PUT",
            &format!("/api/books/{}/status", id),
            Some(json!({ "status": "paused" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Status must be \"reading\", \"finished\", or \"abandoned\"");

        let (status, _) = send(
            &app,
            "PUT",
            "/api/books/999/status",
            Some(json!({ "status": "reading" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn page_below_one_is_rejected_everywhere() {
        let app = app().await;
        let id = add_dune(&app).await;

        let (status, _) = send(
            &app,
            "PUT",
            &format!("/api/books/{}/progress", id),
            Some(json!({ "current_chapter": "1", "current_page": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            "POST",
            &format!("/api/notes/books/{}/notes", id),
            Some(json!({ "content": "Arrakis", "page": -3 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            "POST",
            &format!("/api/collections/books/{}/collections", id),
            Some(json!({ "type": "quote", "content": "Fear is the mind-killer.", "page": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, book) = send(
            &app,
            "PUT",
            &format!("/api/books/{}/progress", id),
            Some(json!({ "current_chapter": "Book One", "current_page": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(book["current_page"], 1);
    }

    #[tokio::test]
    async fn collections_use_the_type_field() {
        let app = app().await;
        let id = add_dune(&app).await;
        let uri = format!("/api/collections/books/{}/collections", id);

        let (status, body) = send(&app, "POST", &uri, Some(json!({ "content": "kanly" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Type and content are required");

        let (status, body) = send(&app, "POST", &uri, Some(json!({ "type": "word", "content": "kanly" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Type must be \"vocabulary\" or \"quote\"");

        let (status, item) = send(
            &app,
            "POST",
            &uri,
            Some(json!({ "type": "vocabulary", "content": "kanly", "note": "a feud" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(item["type"], "vocabulary");

        let (_, quotes) = send(&app, "GET", &format!("{}?type=quote", uri), None).await;
        assert_eq!(quotes, json!([]));
        let (_, all) = send(&app, "GET", &uri, None).await;
        assert_eq!(all.as_array().unwrap().len(), 1);

        let (status, _) = send(
            &app,
            "PUT",
            "/api/collections/4242",
            Some(json!({ "content": "kanly" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn catalog_failures_degrade_quietly() {
        let app = app().await;

        let (status, results) = send(&app, "GET", "/api/books/search?q=dune", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(results[0]["workId"], "OL893415W");
        assert_eq!(results[0]["publishYear"], 1965);
        assert!(results[0].get("work_id").is_none());

        let (status, results) = send(&app, "GET", "/api/books/search?q=broken", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(results, json!([]));

        let (status, _) = send(&app, "GET", "/api/books/search?q=%20", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, details) = send(&app, "GET", "/api/books/details/OL404W", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(details, json!({ "description": null }));
    }

    #[tokio::test]
    async fn chat_rejects_incomplete_requests_before_touching_storage() {
        let app = app().await;

        let (status, body) = send(&app, "POST", "/api/chat", Some(json!({ "content": "hi" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "conversation_id and content are required");

        let (status, _) = send(
            &app,
            "POST",
            "/api/chat",
            Some(json!({ "conversation_id": 1, "content": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app,
            "POST",
            "/api/chat",
            Some(json!({ "conversation_id": 77, "content": "hi" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Conversation not found");
    }

    #[tokio::test]
    async fn completion_that_cannot_start_is_a_json_error() {
        let app = app().await;
        let id = add_dune(&app).await;
        let (_, conversation) = send(&app, "POST", &format!("/api/books/{}/conversations", id), None).await;
        let conversation_id = conversation["id"].as_i64().unwrap();

        let (status, body) = send(
            &app,
            "POST",
            "/api/chat",
            Some(json!({ "conversation_id": conversation_id, "content": "Who is Paul?" })),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].is_string());

        let (_, detail) = send(&app, "GET", &format!("/api/conversations/{}", conversation_id), None).await;
        assert_eq!(detail["title"], "Who is Paul?");
        assert_eq!(detail["messages"].as_array().unwrap().len(), 1);
        assert_eq!(detail["messages"][0]["role"], "user");
    }
}
