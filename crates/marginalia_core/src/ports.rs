//! crates/marginalia_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the storage engine, the LLM provider and the book catalog.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::domain::{
    Book, BookSummary, CatalogSearchResult, CollectionItem, CollectionItemDraft,
    CollectionItemUpdate, CollectionKind, Conversation, Message, MessageRole, NewBook, Note,
    NoteDraft, ReadingProgress, ReadingStats, ReadingStatus,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Upstream service failed: {0}")]
    Upstream(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Incremental text fragments produced by a streamed completion.
pub type FragmentStream = Pin<Box<dyn Stream<Item = PortResult<String>> + Send>>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Record-level access to books, conversations, messages, notes and collection items.
///
/// Reads and writes addressed by id return `PortError::NotFound` when the row is absent.
/// Listings filtered by a parent id return an empty list for unknown parents.
#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Books ---
    async fn list_books(&self) -> PortResult<Vec<BookSummary>>;

    async fn list_current_books(&self) -> PortResult<Vec<Book>>;

    async fn get_book(&self, book_id: i64) -> PortResult<Book>;

    async fn find_book_by_work_id(&self, ol_work_id: &str) -> PortResult<Option<Book>>;

    /// Saves a book unless its work id is already known. Returns the stored row and
    /// whether it was newly created.
    async fn upsert_book(&self, book: NewBook) -> PortResult<(Book, bool)>;

    async fn set_book_current(&self, book_id: i64, is_current: bool) -> PortResult<Book>;

    async fn update_book_status(&self, book_id: i64, status: ReadingStatus) -> PortResult<Book>;

    async fn update_book_progress(
        &self,
        book_id: i64,
        progress: ReadingProgress,
    ) -> PortResult<Book>;

    /// Removes the book with all of its conversations, messages, notes and collection items.
    async fn delete_book(&self, book_id: i64) -> PortResult<()>;

    async fn reading_stats(&self) -> PortResult<ReadingStats>;

    // --- Conversations ---
    async fn list_conversations(&self, book_id: i64) -> PortResult<Vec<Conversation>>;

    async fn create_conversation(&self, book_id: i64) -> PortResult<Conversation>;

    async fn get_conversation(&self, conversation_id: i64) -> PortResult<Conversation>;

    /// Sets the title only if none is stored yet. Returns whether it was applied.
    async fn set_conversation_title_if_unset(
        &self,
        conversation_id: i64,
        title: &str,
    ) -> PortResult<bool>;

    async fn touch_conversation(&self, conversation_id: i64) -> PortResult<()>;

    async fn delete_conversation(&self, conversation_id: i64) -> PortResult<()>;

    // --- Messages ---
    async fn append_message(
        &self,
        conversation_id: i64,
        role: MessageRole,
        content: &str,
    ) -> PortResult<Message>;

    /// All messages of a conversation in creation order.
    async fn list_messages(&self, conversation_id: i64) -> PortResult<Vec<Message>>;

    // --- Notes ---
    async fn list_notes(&self, book_id: i64) -> PortResult<Vec<Note>>;

    async fn create_note(&self, book_id: i64, draft: NoteDraft) -> PortResult<Note>;

    async fn update_note(&self, note_id: i64, draft: NoteDraft) -> PortResult<Note>;

    async fn delete_note(&self, note_id: i64) -> PortResult<()>;

    // --- Collection Items ---
    async fn list_collection_items(
        &self,
        book_id: i64,
        kind: Option<CollectionKind>,
    ) -> PortResult<Vec<CollectionItem>>;

    async fn create_collection_item(
        &self,
        book_id: i64,
        draft: CollectionItemDraft,
    ) -> PortResult<CollectionItem>;

    async fn update_collection_item(
        &self,
        item_id: i64,
        update: CollectionItemUpdate,
    ) -> PortResult<CollectionItem>;

    async fn delete_collection_item(&self, item_id: i64) -> PortResult<()>;
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Opens a streamed completion for the given system prompt and ordered history.
    ///
    /// The stream ends when the upstream response ends. An upstream failure surfaces
    /// as a single `Err` item; fragments yielded before it stay valid.
    async fn stream_completion(
        &self,
        system_prompt: &str,
        history: &[Message],
    ) -> PortResult<FragmentStream>;
}

#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Finds candidate books whose title matches the query.
    async fn search_books(&self, query: &str) -> PortResult<Vec<CatalogSearchResult>>;

    /// Looks up the long description of a catalog work.
    async fn work_description(&self, work_id: &str) -> PortResult<Option<String>>;
}
