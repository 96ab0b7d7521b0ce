//! crates/marginalia_core/src/context.rs
//!
//! Builds the system prompt handed to the completion service for a book conversation.
//! Everything here is a pure function of its inputs so the same shelf state always
//! produces the same prompt.

use crate::domain::{non_blank, truncate_chars, Book, Note, ReadingProgress};

/// At most this many notes are quoted in the prompt.
pub const MAX_PROMPT_NOTES: usize = 10;
/// Each quoted note is cut to this many characters.
pub const MAX_NOTE_CHARS: usize = 200;
/// At most this many other books are listed.
pub const MAX_OTHER_BOOKS: usize = 20;

const PREAMBLE: &str = "You are a knowledgeable reading companion. The user is currently reading:";

const SPOILER_BOUNDARY: &str = "SPOILER BOUNDARY: Do not reveal plot events, twists, character fates or any other story content beyond this point. If the user asks about anything past their current position, gently decline and offer to discuss what they have read so far.";

const CROSS_BOOK_INSTRUCTION: &str = "You may draw comparisons and connections between this book and the others on the user's shelf when it helps the discussion.";

const CLOSING_INSTRUCTION: &str = "Help the user understand this book. Answer questions about themes, characters, plot, historical context, the author's style, and related works. Keep responses conversational and insightful. If you don't know something specific about this book, say so honestly instead of inventing details.";

/// Everything the prompt may mention about the book being discussed.
#[derive(Debug, Clone, Copy)]
pub struct BookContext<'a> {
    pub book: &'a Book,
    pub progress: Option<&'a ReadingProgress>,
    /// Notes in the order they should be quoted.
    pub notes: &'a [Note],
    /// The rest of the user's shelf, excluding `book`.
    pub other_books: &'a [Book],
}

impl<'a> BookContext<'a> {
    /// A context carrying only the book metadata.
    pub fn new(book: &'a Book) -> Self {
        Self {
            book,
            progress: None,
            notes: &[],
            other_books: &[],
        }
    }
}

/// Assembles the system prompt for a conversation about `ctx.book`.
pub fn build_system_prompt(ctx: &BookContext<'_>) -> String {
    let book = ctx.book;
    let mut parts: Vec<String> = vec![
        PREAMBLE.to_string(),
        String::new(),
        format!("Title: {}", book.title),
    ];

    if let Some(author) = non_blank(book.author.as_deref()) {
        parts.push(format!("Author: {}", author));
    }
    if let Some(description) = non_blank(book.description.as_deref()) {
        parts.push(format!("Description: {}", description));
    }

    if let Some(position) = ctx.progress.and_then(describe_position) {
        parts.push(String::new());
        parts.push(format!("Reading progress: The user is currently at {}.", position));
        parts.push(SPOILER_BOUNDARY.to_string());
    }

    if !ctx.notes.is_empty() {
        parts.push(String::new());
        parts.push("The user's notes on this book:".to_string());
        for note in ctx.notes.iter().take(MAX_PROMPT_NOTES) {
            parts.push(format_note(note));
        }
    }

    if !ctx.other_books.is_empty() {
        parts.push(String::new());
        parts.push("Other books on the user's shelf:".to_string());
        for other in ctx.other_books.iter().take(MAX_OTHER_BOOKS) {
            parts.push(format_other_book(other));
        }
        parts.push(CROSS_BOOK_INSTRUCTION.to_string());
    }

    parts.push(String::new());
    parts.push(CLOSING_INSTRUCTION.to_string());

    parts.join("\n")
}

fn describe_position(progress: &ReadingProgress) -> Option<String> {
    match (progress.chapter_label(), progress.page) {
        (Some(chapter), Some(page)) => Some(format!("chapter \"{}\", page {}", chapter, page)),
        (Some(chapter), None) => Some(format!("chapter \"{}\"", chapter)),
        (None, Some(page)) => Some(format!("page {}", page)),
        (None, None) => None,
    }
}

fn format_note(note: &Note) -> String {
    let content = truncate_chars(note.content.trim(), MAX_NOTE_CHARS);
    let locator = match (non_blank(note.chapter.as_deref()), note.page) {
        (Some(chapter), Some(page)) => Some(format!("Chapter {}, p. {}", chapter, page)),
        (Some(chapter), None) => Some(format!("Chapter {}", chapter)),
        (None, Some(page)) => Some(format!("p. {}", page)),
        (None, None) => None,
    };
    match locator {
        Some(locator) => format!("- [{}] {}", locator, content),
        None => format!("- {}", content),
    }
}

fn format_other_book(book: &Book) -> String {
    match non_blank(book.author.as_deref()) {
        Some(author) => format!("- {} by {} ({})", book.title, author, book.status),
        None => format!("- {} ({})", book.title, book.status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ReadingStatus;
    use chrono::{TimeZone, Utc};

    fn book(id: i64, title: &str, author: Option<&str>) -> Book {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        Book {
            id,
            ol_work_id: format!("OL{}W", id),
            ol_edition_id: None,
            title: title.to_string(),
            author: author.map(str::to_string),
            description: None,
            cover_url: None,
            is_current: true,
            current_chapter: None,
            current_page: None,
            status: ReadingStatus::Reading,
            created_at: at,
            updated_at: at,
            started_at: None,
            finished_at: None,
        }
    }

    fn note(id: i64, content: &str, chapter: Option<&str>, page: Option<i64>) -> Note {
        let at = Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap();
        Note {
            id,
            book_id: 1,
            content: content.to_string(),
            chapter: chapter.map(str::to_string),
            page,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn metadata_only_prompt() {
        let dune = book(1, "Dune", Some("Frank Herbert"));
        let prompt = build_system_prompt(&BookContext::new(&dune));

        assert!(prompt.starts_with(PREAMBLE));
        assert!(prompt.contains("Title: Dune\nAuthor: Frank Herbert"));
        assert!(!prompt.contains("Description:"));
        assert!(!prompt.contains("SPOILER BOUNDARY"));
        assert!(!prompt.contains("Other books"));
        assert!(prompt.ends_with(CLOSING_INSTRUCTION));
    }

    #[test]
    fn blank_author_and_description_are_omitted() {
        let mut dune = book(1, "Dune", Some("  "));
        dune.description = Some(String::new());
        let prompt = build_system_prompt(&BookContext::new(&dune));
        assert!(!prompt.contains("Author:"));
        assert!(!prompt.contains("Description:"));
    }

    #[test]
    fn progress_adds_spoiler_boundary() {
        let dune = book(1, "Dune", None);
        let progress = ReadingProgress {
            chapter: Some("Book Two".to_string()),
            page: Some(212),
        };
        let ctx = BookContext {
            progress: Some(&progress),
            ..BookContext::new(&dune)
        };
        let prompt = build_system_prompt(&ctx);
        assert!(prompt.contains("currently at chapter \"Book Two\", page 212."));
        assert!(prompt.contains(SPOILER_BOUNDARY));

        let page_only = ReadingProgress {
            chapter: None,
            page: Some(3),
        };
        let ctx = BookContext {
            progress: Some(&page_only),
            ..BookContext::new(&dune)
        };
        assert!(build_system_prompt(&ctx).contains("currently at page 3."));
    }

    #[test]
    fn notes_are_capped_truncated_and_located() {
        let dune = book(1, "Dune", None);
        let mut notes: Vec<Note> = (1..=12)
            .map(|i| note(i, &format!("note number {}", i), None, Some(i)))
            .collect();
        notes[0] = note(1, &"x".repeat(250), Some("1"), Some(10));

        let ctx = BookContext {
            notes: &notes,
            ..BookContext::new(&dune)
        };
        let prompt = build_system_prompt(&ctx);

        assert!(prompt.contains(&format!("- [Chapter 1, p. 10] {}...", "x".repeat(200))));
        assert!(prompt.contains("- [p. 10] note number 10"));
        assert!(!prompt.contains("note number 11"));
        assert!(!prompt.contains(&"x".repeat(201)));
    }

    #[test]
    fn other_books_are_listed_with_status() {
        let dune = book(1, "Dune", None);
        let mut emma = book(2, "Emma", Some("Jane Austen"));
        emma.status = ReadingStatus::Finished;
        let others: Vec<Book> = std::iter::once(emma)
            .chain((3..30).map(|i| book(i, &format!("Shelf Book {}", i), None)))
            .collect();

        let ctx = BookContext {
            other_books: &others,
            ..BookContext::new(&dune)
        };
        let prompt = build_system_prompt(&ctx);

        assert!(prompt.contains("- Emma by Jane Austen (finished)"));
        assert!(prompt.contains("- Shelf Book 21 (reading)"));
        assert!(!prompt.contains("Shelf Book 22"));
        assert!(prompt.contains(CROSS_BOOK_INSTRUCTION));
    }

    #[test]
    fn identical_inputs_give_identical_prompts() {
        let dune = book(1, "Dune", Some("Frank Herbert"));
        let progress = ReadingProgress {
            chapter: Some("3".to_string()),
            page: None,
        };
        let notes = vec![note(1, "Paul meets the Reverend Mother", Some("1"), Some(5))];
        let others = vec![book(2, "Children of Dune", Some("Frank Herbert"))];
        let ctx = BookContext {
            book: &dune,
            progress: Some(&progress),
            notes: &notes,
            other_books: &others,
        };

        let first = build_system_prompt(&ctx);
        let second = build_system_prompt(&ctx);
        assert_eq!(first.as_bytes(), second.as_bytes());
    }
}
