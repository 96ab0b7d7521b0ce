//! crates/marginalia_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

use crate::ports::{PortError, PortResult};

/// Conversation titles derived from the first message are cut at this many characters.
pub const CONVERSATION_TITLE_MAX_CHARS: usize = 80;

/// Smallest page number accepted anywhere a page can be recorded.
pub const MIN_PAGE: i64 = 1;

//=========================================================================================
// Books
//=========================================================================================

/// Lifecycle status of a book on the user's shelf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadingStatus {
    #[default]
    Reading,
    Finished,
    Abandoned,
}

impl ReadingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingStatus::Reading => "reading",
            ReadingStatus::Finished => "finished",
            ReadingStatus::Abandoned => "abandoned",
        }
    }

    /// Whether this status ends the reading, which stamps `finished_at`.
    pub fn is_closed(&self) -> bool {
        matches!(self, ReadingStatus::Finished | ReadingStatus::Abandoned)
    }
}

impl fmt::Display for ReadingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadingStatus {
    type Err = PortError;

    fn from_str(s: &str) -> PortResult<Self> {
        match s {
            "reading" => Ok(ReadingStatus::Reading),
            "finished" => Ok(ReadingStatus::Finished),
            "abandoned" => Ok(ReadingStatus::Abandoned),
            _ => Err(PortError::Validation(
                "Status must be \"reading\", \"finished\", or \"abandoned\"".to_string(),
            )),
        }
    }
}

/// A book saved from the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct Book {
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
    pub status: ReadingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Book {
    /// The user's recorded position, if any part of it is set.
    pub fn progress(&self) -> Option<ReadingProgress> {
        let progress = ReadingProgress {
            chapter: self.current_chapter.clone(),
            page: self.current_page,
        };
        (!progress.is_empty()).then_some(progress)
    }
}

/// A book together with the timestamp of the latest message about it.
#[derive(Debug, Clone)]
pub struct BookSummary {
    pub book: Book,
    pub last_message_at: Option<DateTime<Utc>>,
}

/// The fields needed to save a book selected from the catalog.
#[derive(Debug, Clone, Default)]
pub struct NewBook {
    pub ol_work_id: String,
    pub ol_edition_id: Option<String>,
    pub title: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub cover_url: Option<String>,
}

impl NewBook {
    pub fn validate(self) -> PortResult<Self> {
        if self.ol_work_id.trim().is_empty() || self.title.trim().is_empty() {
            return Err(PortError::Validation(
                "ol_work_id and title are required".to_string(),
            ));
        }
        Ok(self)
    }
}

/// Where the user is in a book. Chapters are free text ("Part II", "12", "Epilogue").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadingProgress {
    pub chapter: Option<String>,
    pub page: Option<i64>,
}

impl ReadingProgress {
    pub fn is_empty(&self) -> bool {
        self.chapter_label().is_none() && self.page.is_none()
    }

    /// The chapter label, ignoring blank strings.
    pub fn chapter_label(&self) -> Option<&str> {
        non_blank(self.chapter.as_deref())
    }

    pub fn validate(self) -> PortResult<Self> {
        validate_page("current_page", self.page)?;
        Ok(self)
    }
}

//=========================================================================================
// Conversations and Messages
//=========================================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub id: i64,
    pub book_id: i64,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

impl FromStr for MessageRole {
    type Err = PortError;

    fn from_str(s: &str) -> PortResult<Self> {
        match s {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(PortError::Unexpected(format!("Unknown message role '{}'", other))),
        }
    }
}

/// A single chat turn. Messages are never edited once stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Derives a conversation title from the first user message, trimmed and then cut.
pub fn derive_conversation_title(content: &str) -> String {
    truncate_chars(content.trim(), CONVERSATION_TITLE_MAX_CHARS)
}

//=========================================================================================
// Notes and Collection Items
//=========================================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub id: i64,
    pub book_id: i64,
    pub content: String,
    pub chapter: Option<String>,
    pub page: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User input for creating or replacing a note.
#[derive(Debug, Clone, Default)]
pub struct NoteDraft {
    pub content: String,
    pub chapter: Option<String>,
    pub page: Option<i64>,
}

impl NoteDraft {
    pub fn validate(self) -> PortResult<Self> {
        require_text("Content", &self.content)?;
        validate_page("page", self.page)?;
        Ok(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Vocabulary,
    Quote,
}

impl CollectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionKind::Vocabulary => "vocabulary",
            CollectionKind::Quote => "quote",
        }
    }
}

impl FromStr for CollectionKind {
    type Err = PortError;

    fn from_str(s: &str) -> PortResult<Self> {
        match s {
            "vocabulary" => Ok(CollectionKind::Vocabulary),
            "quote" => Ok(CollectionKind::Quote),
            _ => Err(PortError::Validation(
                "Type must be \"vocabulary\" or \"quote\"".to_string(),
            )),
        }
    }
}

/// A saved vocabulary term or quote.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionItem {
    pub id: i64,
    pub book_id: i64,
    pub kind: CollectionKind,
    pub content: String,
    pub note: Option<String>,
    pub chapter: Option<String>,
    pub page: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CollectionItemDraft {
    pub kind: CollectionKind,
    pub content: String,
    pub note: Option<String>,
    pub chapter: Option<String>,
    pub page: Option<i64>,
}

impl CollectionItemDraft {
    pub fn validate(self) -> PortResult<Self> {
        require_text("Content", &self.content)?;
        validate_page("page", self.page)?;
        Ok(self)
    }
}

/// Replacement values for an existing collection item. The kind is fixed at creation.
#[derive(Debug, Clone, Default)]
pub struct CollectionItemUpdate {
    pub content: String,
    pub note: Option<String>,
    pub chapter: Option<String>,
    pub page: Option<i64>,
}

impl CollectionItemUpdate {
    pub fn validate(self) -> PortResult<Self> {
        require_text("Content", &self.content)?;
        validate_page("page", self.page)?;
        Ok(self)
    }
}

//=========================================================================================
// Stats and Catalog
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthlyCount {
    /// `YYYY-MM`
    pub month: String,
    pub count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadingStats {
    pub total_books: i64,
    pub books_reading: i64,
    pub books_finished: i64,
    pub books_abandoned: i64,
    pub total_conversations: i64,
    pub total_messages: i64,
    /// Oldest month first, at most twelve entries.
    pub books_by_month: Vec<MonthlyCount>,
}

/// A candidate book returned by the bibliographic catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSearchResult {
    pub work_id: String,
    pub title: String,
    pub author: String,
    pub publish_year: Option<i64>,
    pub cover_url: Option<String>,
    pub edition_id: Option<String>,
}

//=========================================================================================
// Shared Rules
//=========================================================================================

/// Pages start at 1. Zero and negative values are rejected rather than clamped.
pub fn validate_page(field: &str, page: Option<i64>) -> PortResult<Option<i64>> {
    match page {
        Some(p) if p < MIN_PAGE => Err(PortError::Validation(format!(
            "{} must be at least {}",
            field, MIN_PAGE
        ))),
        other => Ok(other),
    }
}

fn require_text(field: &str, value: &str) -> PortResult<()> {
    if value.trim().is_empty() {
        return Err(PortError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

/// Keeps the first `max` characters, marking the cut with `...`.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
