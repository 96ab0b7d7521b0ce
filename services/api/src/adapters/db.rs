//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the SQLite database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marginalia_core::domain::{
    Book, BookSummary, CollectionItem, CollectionItemDraft, CollectionItemUpdate, CollectionKind,
    Conversation, Message, MessageRole, MonthlyCount, NewBook, Note, NoteDraft, ReadingProgress,
    ReadingStats, ReadingStatus,
};
use marginalia_core::ports::{DatabaseService, PortError, PortResult};
use sqlx::migrate::MigrateError;
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Executor, FromRow};
use std::str::FromStr;
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: SqlitePool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens the pool for a `sqlite:` URL, creating the database file when missing.
    ///
    /// In-memory databases live as long as their connection, so they get a single
    /// connection that is never recycled.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            if let Some(parent) = options.get_filename().parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            SqlitePoolOptions::new().max_connections(5)
        };

        debug!("Connecting to SQLite database at {}", database_url);
        let pool = pool_options.connect_with(options).await?;
        Ok(Self::new(pool))
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    /// Closes every pooled connection, letting SQLite flush to disk.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct BookRecord {
    id: i64,
    ol_work_id: String,
    ol_edition_id: Option<String>,
    title: String,
    author: Option<String>,
    description: Option<String>,
    cover_url: Option<String>,
    is_current: bool,
    current_chapter: Option<String>,
    current_page: Option<i64>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}
impl BookRecord {
    fn to_domain(self) -> PortResult<Book> {
        Ok(Book {
            id: self.id,
            ol_work_id: self.ol_work_id,
            ol_edition_id: self.ol_edition_id,
            title: self.title,
            author: self.author,
            description: self.description,
            cover_url: self.cover_url,
            is_current: self.is_current,
            current_chapter: self.current_chapter,
            current_page: self.current_page,
            status: ReadingStatus::from_str(&self.status)
                .map_err(|_| PortError::Unexpected(format!("Unknown book status '{}'", self.status)))?,
            created_at: self.created_at,
            updated_at: self.updated_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
        })
    }
}

#[derive(FromRow)]
struct BookSummaryRecord {
    #[sqlx(flatten)]
    book: BookRecord,
    last_message_at: Option<DateTime<Utc>>,
}
impl BookSummaryRecord {
    fn to_domain(self) -> PortResult<BookSummary> {
        Ok(BookSummary {
            book: self.book.to_domain()?,
            last_message_at: self.last_message_at,
        })
    }
}

#[derive(FromRow)]
struct ConversationRecord {
    id: i64,
    book_id: i64,
    title: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl ConversationRecord {
    fn to_domain(self) -> Conversation {
        Conversation {
            id: self.id,
            book_id: self.book_id,
            title: self.title,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct MessageRecord {
    id: i64,
    conversation_id: i64,
    role: String,
    content: String,
    created_at: DateTime<Utc>,
}
impl MessageRecord {
    fn to_domain(self) -> PortResult<Message> {
        Ok(Message {
            id: self.id,
            conversation_id: self.conversation_id,
            role: MessageRole::from_str(&self.role)?,
            content: self.content,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct NoteRecord {
    id: i64,
    book_id: i64,
    content: String,
    chapter: Option<String>,
    page: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl NoteRecord {
    fn to_domain(self) -> Note {
        Note {
            id: self.id,
            book_id: self.book_id,
            content: self.content,
            chapter: self.chapter,
            page: self.page,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct CollectionItemRecord {
    id: i64,
    book_id: i64,
    kind: String,
    content: String,
    note: Option<String>,
    chapter: Option<String>,
    page: Option<i64>,
    created_at: DateTime<Utc>,
}
impl CollectionItemRecord {
    fn to_domain(self) -> PortResult<CollectionItem> {
        Ok(CollectionItem {
            id: self.id,
            book_id: self.book_id,
            kind: CollectionKind::from_str(&self.kind)
                .map_err(|_| PortError::Unexpected(format!("Unknown collection kind '{}'", self.kind)))?,
            content: self.content,
            note: self.note,
            chapter: self.chapter,
            page: self.page,
            created_at: self.created_at,
        })
    }
}

//=========================================================================================
// Helpers
//=========================================================================================

/// The tables whose rows are addressed by id from the HTTP surface.
#[derive(Clone, Copy)]
enum Table {
    Books,
    Conversations,
    Notes,
    CollectionItems,
}

impl Table {
    fn exists_sql(self) -> &'static str {
        match self {
            Table::Books => "SELECT id FROM books WHERE id = ?",
            Table::Conversations => "SELECT id FROM conversations WHERE id = ?",
            Table::Notes => "SELECT id FROM notes WHERE id = ?",
            Table::CollectionItems => "SELECT id FROM collection_items WHERE id = ?",
        }
    }

    fn not_found(self) -> PortError {
        let message = match self {
            Table::Books => "Book not found",
            Table::Conversations => "Conversation not found",
            Table::Notes => "Note not found",
            Table::CollectionItems => "Item not found",
        };
        PortError::NotFound(message.to_string())
    }
}

/// Confirms a row exists before it is mutated, so a missing id reads as `NotFound`.
async fn ensure_exists<'e, E>(executor: E, table: Table, id: i64) -> PortResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let found: Option<(i64,)> = sqlx::query_as(table.exists_sql())
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(unexpected)?;
    found.map(|_| ()).ok_or_else(|| table.not_found())
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn list_books(&self) -> PortResult<Vec<BookSummary>> {
        let records = sqlx::query_as::<_, BookSummaryRecord>(
            r#"
            SELECT b.*,
                (SELECT MAX(m.created_at) FROM messages m
                 JOIN conversations c ON c.id = m.conversation_id
                 WHERE c.book_id = b.id) AS last_message_at
            FROM books b
            ORDER BY b.updated_at DESC, b.id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn list_current_books(&self) -> PortResult<Vec<Book>> {
        let records = sqlx::query_as::<_, BookRecord>(
            "SELECT * FROM books WHERE is_current = 1 ORDER BY updated_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn get_book(&self, book_id: i64) -> PortResult<Book> {
        sqlx::query_as::<_, BookRecord>("SELECT * FROM books WHERE id = ?")
            .bind(book_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| Table::Books.not_found())?
            .to_domain()
    }

    async fn find_book_by_work_id(&self, ol_work_id: &str) -> PortResult<Option<Book>> {
        sqlx::query_as::<_, BookRecord>("SELECT * FROM books WHERE ol_work_id = ?")
            .bind(ol_work_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .map(BookRecord::to_domain)
            .transpose()
    }

    async fn upsert_book(&self, book: NewBook) -> PortResult<(Book, bool)> {
        let now = Utc::now();
        let inserted = sqlx::query(
            r#"
            INSERT INTO books (ol_work_id, ol_edition_id, title, author, description, cover_url, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (ol_work_id) DO NOTHING
            "#,
        )
        .bind(&book.ol_work_id)
        .bind(&book.ol_edition_id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.description)
        .bind(&book.cover_url)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?
        .rows_affected()
            == 1;

        let stored = sqlx::query_as::<_, BookRecord>("SELECT * FROM books WHERE ol_work_id = ?")
            .bind(&book.ol_work_id)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?
            .to_domain()?;

        Ok((stored, inserted))
    }

    async fn set_book_current(&self, book_id: i64, is_current: bool) -> PortResult<Book> {
        ensure_exists(&self.pool, Table::Books, book_id).await?;
        let now = Utc::now();

        let query = if is_current {
            sqlx::query(
                r#"
                UPDATE books
                SET is_current = 1, status = 'reading', finished_at = NULL,
                    started_at = COALESCE(started_at, ?), updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(now)
            .bind(now)
            .bind(book_id)
        } else {
            sqlx::query("UPDATE books SET is_current = 0, updated_at = ? WHERE id = ?")
                .bind(now)
                .bind(book_id)
        };
        query.execute(&self.pool).await.map_err(unexpected)?;

        self.get_book(book_id).await
    }

    async fn update_book_status(&self, book_id: i64, status: ReadingStatus) -> PortResult<Book> {
        ensure_exists(&self.pool, Table::Books, book_id).await?;
        let now = Utc::now();

        let query = if status.is_closed() {
            sqlx::query(
                "UPDATE books SET status = ?, finished_at = ?, is_current = 0, updated_at = ? WHERE id = ?",
            )
            .bind(status.as_str())
            .bind(now)
            .bind(now)
            .bind(book_id)
        } else {
            sqlx::query("UPDATE books SET status = ?, finished_at = NULL, updated_at = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(now)
                .bind(book_id)
        };
        query.execute(&self.pool).await.map_err(unexpected)?;

        self.get_book(book_id).await
    }

    async fn update_book_progress(
        &self,
        book_id: i64,
        progress: ReadingProgress,
    ) -> PortResult<Book> {
        ensure_exists(&self.pool, Table::Books, book_id).await?;

        sqlx::query(
            "UPDATE books SET current_chapter = ?, current_page = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&progress.chapter)
        .bind(progress.page)
        .bind(Utc::now())
        .bind(book_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        self.get_book(book_id).await
    }

    async fn delete_book(&self, book_id: i64) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        ensure_exists(&mut *tx, Table::Books, book_id).await?;

        // Children first, so no row is ever left pointing at a missing parent.
        let cascade = [
            "DELETE FROM messages WHERE conversation_id IN (SELECT id FROM conversations WHERE book_id = ?)",
            "DELETE FROM conversations WHERE book_id = ?",
            "DELETE FROM notes WHERE book_id = ?",
            "DELETE FROM collection_items WHERE book_id = ?",
            "DELETE FROM books WHERE id = ?",
        ];
        for statement in cascade {
            sqlx::query(statement)
                .bind(book_id)
                .execute(&mut *tx)
                .await
                .map_err(unexpected)?;
        }

        tx.commit().await.map_err(unexpected)?;
        debug!("Deleted book {} and its dependents", book_id);
        Ok(())
    }

    async fn reading_stats(&self) -> PortResult<ReadingStats> {
        let (total_books, books_reading, books_finished, books_abandoned, total_conversations, total_messages) =
            sqlx::query_as::<_, (i64, i64, i64, i64, i64, i64)>(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM books),
                    (SELECT COUNT(*) FROM books WHERE status = 'reading'),
                    (SELECT COUNT(*) FROM books WHERE status = 'finished'),
                    (SELECT COUNT(*) FROM books WHERE status = 'abandoned'),
                    (SELECT COUNT(*) FROM conversations),
                    (SELECT COUNT(*) FROM messages)
                "#,
            )
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;

        let mut months = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT substr(created_at, 1, 7) AS month, COUNT(*) AS count
            FROM books
            GROUP BY month
            ORDER BY month DESC
            LIMIT 12
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        months.reverse();

        Ok(ReadingStats {
            total_books,
            books_reading,
            books_finished,
            books_abandoned,
            total_conversations,
            total_messages,
            books_by_month: months
                .into_iter()
                .map(|(month, count)| MonthlyCount { month, count })
                .collect(),
        })
    }

    async fn list_conversations(&self, book_id: i64) -> PortResult<Vec<Conversation>> {
        let records = sqlx::query_as::<_, ConversationRecord>(
            "SELECT * FROM conversations WHERE book_id = ? ORDER BY updated_at DESC, id DESC",
        )
        .bind(book_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn create_conversation(&self, book_id: i64) -> PortResult<Conversation> {
        ensure_exists(&self.pool, Table::Books, book_id).await?;
        let now = Utc::now();

        let record = sqlx::query_as::<_, ConversationRecord>(
            "INSERT INTO conversations (book_id, created_at, updated_at) VALUES (?, ?, ?) RETURNING *",
        )
        .bind(book_id)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(record.to_domain())
    }

    async fn get_conversation(&self, conversation_id: i64) -> PortResult<Conversation> {
        let record = sqlx::query_as::<_, ConversationRecord>("SELECT * FROM conversations WHERE id = ?")
            .bind(conversation_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| Table::Conversations.not_found())?;

        Ok(record.to_domain())
    }

    async fn set_conversation_title_if_unset(
        &self,
        conversation_id: i64,
        title: &str,
    ) -> PortResult<bool> {
        ensure_exists(&self.pool, Table::Conversations, conversation_id).await?;

        let applied = sqlx::query("UPDATE conversations SET title = ? WHERE id = ? AND title IS NULL")
            .bind(title)
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?
            .rows_affected()
            == 1;
        Ok(applied)
    }

    async fn touch_conversation(&self, conversation_id: i64) -> PortResult<()> {
        ensure_exists(&self.pool, Table::Conversations, conversation_id).await?;

        sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn delete_conversation(&self, conversation_id: i64) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        ensure_exists(&mut *tx, Table::Conversations, conversation_id).await?;

        for statement in [
            "DELETE FROM messages WHERE conversation_id = ?",
            "DELETE FROM conversations WHERE id = ?",
        ] {
            sqlx::query(statement)
                .bind(conversation_id)
                .execute(&mut *tx)
                .await
                .map_err(unexpected)?;
        }

        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }

    async fn append_message(
        &self,
        conversation_id: i64,
        role: MessageRole,
        content: &str,
    ) -> PortResult<Message> {
        ensure_exists(&self.pool, Table::Conversations, conversation_id).await?;

        sqlx::query_as::<_, MessageRecord>(
            "INSERT INTO messages (conversation_id, role, content, created_at) VALUES (?, ?, ?, ?) RETURNING *",
        )
        .bind(conversation_id)
        .bind(role.as_str())
        .bind(content)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?
        .to_domain()
    }

    async fn list_messages(&self, conversation_id: i64) -> PortResult<Vec<Message>> {
        let records = sqlx::query_as::<_, MessageRecord>(
            "SELECT * FROM messages WHERE conversation_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn list_notes(&self, book_id: i64) -> PortResult<Vec<Note>> {
        let records = sqlx::query_as::<_, NoteRecord>(
            r#"
            SELECT * FROM notes
            WHERE book_id = ?
            ORDER BY page IS NULL, page ASC, created_at ASC, id ASC
            "#,
        )
        .bind(book_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn create_note(&self, book_id: i64, draft: NoteDraft) -> PortResult<Note> {
        ensure_exists(&self.pool, Table::Books, book_id).await?;
        let now = Utc::now();

        let record = sqlx::query_as::<_, NoteRecord>(
            r#"
            INSERT INTO notes (book_id, content, chapter, page, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(book_id)
        .bind(&draft.content)
        .bind(&draft.chapter)
        .bind(draft.page)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(record.to_domain())
    }

    async fn update_note(&self, note_id: i64, draft: NoteDraft) -> PortResult<Note> {
        ensure_exists(&self.pool, Table::Notes, note_id).await?;

        let record = sqlx::query_as::<_, NoteRecord>(
            r#"
            UPDATE notes SET content = ?, chapter = ?, page = ?, updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(&draft.content)
        .bind(&draft.chapter)
        .bind(draft.page)
        .bind(Utc::now())
        .bind(note_id)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(record.to_domain())
    }

    async fn delete_note(&self, note_id: i64) -> PortResult<()> {
        ensure_exists(&self.pool, Table::Notes, note_id).await?;

        sqlx::query("DELETE FROM notes WHERE id = ?")
            .bind(note_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn list_collection_items(
        &self,
        book_id: i64,
        kind: Option<CollectionKind>,
    ) -> PortResult<Vec<CollectionItem>> {
        let kind = kind.map(|k| k.as_str());
        let records = sqlx::query_as::<_, CollectionItemRecord>(
            r#"
            SELECT * FROM collection_items
            WHERE book_id = ? AND (? IS NULL OR kind = ?)
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(book_id)
        .bind(kind)
        .bind(kind)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn create_collection_item(
        &self,
        book_id: i64,
        draft: CollectionItemDraft,
    ) -> PortResult<CollectionItem> {
        ensure_exists(&self.pool, Table::Books, book_id).await?;

        sqlx::query_as::<_, CollectionItemRecord>(
            r#"
            INSERT INTO collection_items (book_id, kind, content, note, chapter, page, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(book_id)
        .bind(draft.kind.as_str())
        .bind(&draft.content)
        .bind(&draft.note)
        .bind(&draft.chapter)
        .bind(draft.page)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?
        .to_domain()
    }

    async fn update_collection_item(
        &self,
        item_id: i64,
        update: CollectionItemUpdate,
    ) -> PortResult<CollectionItem> {
        ensure_exists(&self.pool, Table::CollectionItems, item_id).await?;

        sqlx::query_as::<_, CollectionItemRecord>(
            r#"
            UPDATE collection_items SET content = ?, note = ?, chapter = ?, page = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(&update.content)
        .bind(&update.note)
        .bind(&update.chapter)
        .bind(update.page)
        .bind(item_id)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?
        .to_domain()
    }

    async fn delete_collection_item(&self, item_id: i64) -> PortResult<()> {
        ensure_exists(&self.pool, Table::CollectionItems, item_id).await?;

        sqlx::query("DELETE FROM collection_items WHERE id = ?")
            .bind(item_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> DbAdapter {
        let db = DbAdapter::connect("sqlite::memory:").await.unwrap();
        db.run_migrations().await.unwrap();
        db
    }

    fn dune() -> NewBook {
        NewBook {
            ol_work_id: "OL893415W".to_string(),
            title: "Dune".to_string(),
            author: Some("Frank Herbert".to_string()),
            ..Default::default()
        }
    }

    fn note(content: &str, page: Option<i64>) -> NoteDraft {
        NoteDraft {
            content: content.to_string(),
            chapter: None,
            page,
        }
    }

    #[tokio::test]
    async fn upsert_returns_existing_row_untouched() {
        let db = test_db().await;
        let work_id = dune().ol_work_id;
        assert!(db.find_book_by_work_id(&work_id).await.unwrap().is_none());

        let (book, created) = db.upsert_book(dune()).await.unwrap();
        assert!(created);
        assert_eq!(db.find_book_by_work_id(&work_id).await.unwrap(), Some(book.clone()));

        let progress = ReadingProgress {
            chapter: Some("Book One".to_string()),
            page: Some(40),
        };
        db.update_book_progress(book.id, progress.clone()).await.unwrap();
        db.update_book_status(book.id, ReadingStatus::Finished).await.unwrap();

        let mut again = dune();
        again.title = "Dune (retitled)".to_string();
        let (existing, created) = db.upsert_book(again).await.unwrap();

        assert!(!created);
        assert_eq!(existing.id, book.id);
        assert_eq!(existing.title, "Dune");
        assert_eq!(existing.progress(), Some(progress));
        assert_eq!(existing.status, ReadingStatus::Finished);
        assert_eq!(db.list_books().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn status_transitions_maintain_finished_at() {
        let db = test_db().await;
        let (book, _) = db.upsert_book(dune()).await.unwrap();

        let current = db.set_book_current(book.id, true).await.unwrap();
        assert!(current.is_current);
        assert!(current.started_at.is_some());

        for closed in [ReadingStatus::Finished, ReadingStatus::Abandoned] {
            let updated = db.update_book_status(book.id, closed).await.unwrap();
            assert_eq!(updated.status, closed);
            assert!(updated.finished_at.is_some());
            assert!(!updated.is_current);
        }

        let reopened = db.update_book_status(book.id, ReadingStatus::Reading).await.unwrap();
        assert!(reopened.finished_at.is_none());

        db.update_book_status(book.id, ReadingStatus::Finished).await.unwrap();
        let resumed = db.set_book_current(book.id, true).await.unwrap();
        assert_eq!(resumed.status, ReadingStatus::Reading);
        assert!(resumed.finished_at.is_none());
        assert_eq!(resumed.started_at, current.started_at);
    }

    #[tokio::test]
    async fn missing_rows_are_reported_as_not_found() {
        let db = test_db().await;

        assert!(matches!(db.get_book(42).await, Err(PortError::NotFound(_))));
        assert!(matches!(
            db.update_book_status(42, ReadingStatus::Finished).await,
            Err(PortError::NotFound(_))
        ));
        assert!(matches!(db.create_conversation(42).await, Err(PortError::NotFound(_))));
        assert!(matches!(db.get_conversation(7).await, Err(PortError::NotFound(_))));
        assert!(matches!(
            db.append_message(7, MessageRole::User, "hi").await,
            Err(PortError::NotFound(_))
        ));
        assert!(matches!(db.update_note(3, note("x", None)).await, Err(PortError::NotFound(_))));
        assert!(matches!(db.delete_collection_item(3).await, Err(PortError::NotFound(_))));
        assert!(matches!(db.delete_book(42).await, Err(PortError::NotFound(_))));
    }

    #[tokio::test]
    async fn title_is_only_set_once() {
        let db = test_db().await;
        let (book, _) = db.upsert_book(dune()).await.unwrap();
        let conversation = db.create_conversation(book.id).await.unwrap();
        assert!(conversation.title.is_none());

        assert!(db.set_conversation_title_if_unset(conversation.id, "First").await.unwrap());
        assert!(!db.set_conversation_title_if_unset(conversation.id, "Second").await.unwrap());

        let stored = db.get_conversation(conversation.id).await.unwrap();
        assert_eq!(stored.title.as_deref(), Some("First"));
    }

    #[tokio::test]
    async fn messages_come_back_in_insertion_order() {
        let db = test_db().await;
        let (book, _) = db.upsert_book(dune()).await.unwrap();
        let conversation = db.create_conversation(book.id).await.unwrap();

        for (role, content) in [
            (MessageRole::User, "one"),
            (MessageRole::Assistant, "two"),
            (MessageRole::User, "three"),
        ] {
            db.append_message(conversation.id, role, content).await.unwrap();
        }

        let contents: Vec<String> = db
            .list_messages(conversation.id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, ["one", "two", "three"]);
    }

    #[tokio::test]
    async fn deleting_a_book_cascades_to_every_child() {
        let db = test_db().await;
        let (book, _) = db.upsert_book(dune()).await.unwrap();
        let (other, _) = db
            .upsert_book(NewBook {
                ol_work_id: "OL2W".to_string(),
                title: "Emma".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let conversation = db.create_conversation(book.id).await.unwrap();
        db.append_message(conversation.id, MessageRole::User, "Who is Paul?").await.unwrap();
        db.create_note(book.id, note("Arrakis", Some(3))).await.unwrap();
        db.create_collection_item(
            book.id,
            CollectionItemDraft {
                kind: CollectionKind::Vocabulary,
                content: "kanly".to_string(),
                note: None,
                chapter: None,
                page: None,
            },
        )
        .await
        .unwrap();
        let kept = db.create_conversation(other.id).await.unwrap();

        db.delete_book(book.id).await.unwrap();

        assert!(matches!(db.get_book(book.id).await, Err(PortError::NotFound(_))));
        assert!(db.list_conversations(book.id).await.unwrap().is_empty());
        assert!(db.list_messages(conversation.id).await.unwrap().is_empty());
        assert!(db.list_notes(book.id).await.unwrap().is_empty());
        assert!(db.list_collection_items(book.id, None).await.unwrap().is_empty());
        assert_eq!(db.get_conversation(kept.id).await.unwrap().book_id, other.id);

        let stats = db.reading_stats().await.unwrap();
        assert_eq!(stats.total_books, 1);
        assert_eq!(stats.total_conversations, 1);
        assert_eq!(stats.total_messages, 0);
    }

    #[tokio::test]
    async fn notes_are_listed_in_page_order() {
        let db = test_db().await;
        let (book, _) = db.upsert_book(dune()).await.unwrap();

        db.create_note(book.id, note("no page", None)).await.unwrap();
        db.create_note(book.id, note("late", Some(300))).await.unwrap();
        db.create_note(book.id, note("early", Some(12))).await.unwrap();

        let contents: Vec<String> = db
            .list_notes(book.id)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.content)
            .collect();
        assert_eq!(contents, ["early", "late", "no page"]);
    }

    #[tokio::test]
    async fn collection_items_filter_by_kind() {
        let db = test_db().await;
        let (book, _) = db.upsert_book(dune()).await.unwrap();

        for (kind, content) in [
            (CollectionKind::Vocabulary, "gom jabbar"),
            (CollectionKind::Quote, "Fear is the mind-killer."),
        ] {
            db.create_collection_item(
                book.id,
                CollectionItemDraft {
                    kind,
                    content: content.to_string(),
                    note: None,
                    chapter: Some("1".to_string()),
                    page: Some(8),
                },
            )
            .await
            .unwrap();
        }

        let quotes = db
            .list_collection_items(book.id, Some(CollectionKind::Quote))
            .await
            .unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].content, "Fear is the mind-killer.");
        assert_eq!(db.list_collection_items(book.id, None).await.unwrap().len(), 2);

        let updated = db
            .update_collection_item(
                quotes[0].id,
                CollectionItemUpdate {
                    content: "I must not fear.".to_string(),
                    note: Some("Litany".to_string()),
                    chapter: None,
                    page: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.kind, CollectionKind::Quote);
        assert_eq!(updated.note.as_deref(), Some("Litany"));
    }

    #[tokio::test]
    async fn list_books_reports_last_message_time() {
        let db = test_db().await;
        let (book, _) = db.upsert_book(dune()).await.unwrap();
        assert!(db.list_books().await.unwrap()[0].last_message_at.is_none());

        let conversation = db.create_conversation(book.id).await.unwrap();
        let message = db
            .append_message(conversation.id, MessageRole::User, "hello")
            .await
            .unwrap();

        let books = db.list_books().await.unwrap();
        assert_eq!(books[0].last_message_at, Some(message.created_at));

        let stats = db.reading_stats().await.unwrap();
        assert_eq!(stats.books_reading, 1);
        assert_eq!(stats.books_by_month.len(), 1);
        assert_eq!(stats.books_by_month[0].count, 1);
    }
}
