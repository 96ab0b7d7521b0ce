pub mod catalog;
pub mod chat_llm;
pub mod db;

pub use catalog::OpenLibraryAdapter;
pub use chat_llm::OpenAiCompletionAdapter;
pub use db::DbAdapter;
