pub mod context;
pub mod domain;
pub mod ports;

pub use context::{build_system_prompt, BookContext};
pub use domain::{
    derive_conversation_title, Book, BookSummary, CatalogSearchResult, CollectionItem,
    CollectionItemDraft, CollectionItemUpdate, CollectionKind, Conversation, Message,
    MessageRole, MonthlyCount, NewBook, Note, NoteDraft, ReadingProgress, ReadingStats,
    ReadingStatus,
};
pub use ports::{
    CatalogService, CompletionService, DatabaseService, FragmentStream, PortError, PortResult,
};
