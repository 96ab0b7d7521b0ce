//! services/api/src/web/chat_task.rs
//!
//! This module contains the asynchronous "worker" side of a chat relay: the stages
//! that run before the response is committed, and the spawned task that forwards
//! completion fragments to the client and stores the finished answer.

use crate::error::ApiError;
use crate::web::{
    protocol::{RelayEvent, STREAM_INTERRUPTED},
    state::AppState,
};
use futures::StreamExt;
use marginalia_core::{
    build_system_prompt, derive_conversation_title,
    domain::{Book, MessageRole},
    ports::{FragmentStream, PortResult},
    BookContext,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, info_span, Instrument, Span};
use uuid::Uuid;

/// Events buffered between the relay task and the response body.
pub const RELAY_CHANNEL_CAPACITY: usize = 32;

const PERSIST_FAILED: &str = "Failed to save response";

/// A relay whose upstream completion is open and ready to be drained.
pub struct PreparedRelay {
    pub conversation_id: i64,
    pub book_id: i64,
    pub fragments: FragmentStream,
}

/// Represents how a relay task ended.
#[derive(Debug, PartialEq, Eq)]
pub enum RelayOutcome {
    /// The answer was stored and `[DONE]` was sent (or would have been, had the client stayed).
    Completed {
        fragments: usize,
        client_connected: bool,
    },
    /// The upstream failed mid-answer. Nothing was stored for the assistant.
    Interrupted,
    /// The answer streamed fully but could not be stored.
    PersistFailed,
}

/// The span every stage of one relay is logged under.
pub fn relay_span(conversation_id: i64) -> Span {
    info_span!(
        "chat_relay",
        relay_id = %Uuid::new_v4(),
        conversation_id,
        book_id = tracing::field::Empty
    )
}

//=========================================================================================
// Before the Response Is Committed
//=========================================================================================

/// Runs every stage up to opening the upstream completion.
///
/// Any error returned here is still reported as a plain JSON response. The user
/// message is stored before the completion is opened, so it survives an upstream failure.
pub async fn prepare_relay(
    state: &AppState,
    conversation_id: i64,
    content: &str,
) -> Result<PreparedRelay, ApiError> {
    // --- Loading ---
    let conversation = state.db.get_conversation(conversation_id).await?;
    let book = state.db.get_book(conversation.book_id).await?;
    Span::current().record("book_id", book.id);
    debug!("Loaded conversation and book '{}'", book.title);

    // --- Persisting the user message ---
    state
        .db
        .append_message(conversation_id, MessageRole::User, content)
        .await?;
    if conversation.title.is_none() {
        let title = derive_conversation_title(content);
        state
            .db
            .set_conversation_title_if_unset(conversation_id, &title)
            .await?;
    }

    // --- Building the context ---
    let history = state.db.list_messages(conversation_id).await?;
    let notes = state.db.list_notes(book.id).await?;
    let other_books: Vec<Book> = state
        .db
        .list_books()
        .await?
        .into_iter()
        .map(|summary| summary.book)
        .filter(|other| other.id != book.id)
        .collect();
    let progress = book.progress();

    let system_prompt = build_system_prompt(&BookContext {
        book: &book,
        progress: progress.as_ref(),
        notes: &notes,
        other_books: &other_books,
    });
    debug!(
        "Built a {}-character prompt with {} notes, {} other books and {} history messages",
        system_prompt.chars().count(),
        notes.len(),
        other_books.len(),
        history.len()
    );

    // --- Opening the completion ---
    let fragments = state
        .completion
        .stream_completion(&system_prompt, &history)
        .await
        .map_err(|e| {
            error!("Failed to open the completion stream: {}", e);
            ApiError::from(e)
        })?;
    info!("Completion stream opened");

    Ok(PreparedRelay {
        conversation_id,
        book_id: book.id,
        fragments,
    })
}

//=========================================================================================
// After the Response Is Committed
//=========================================================================================

/// Spawns the relay task and returns the receiving end of its events.
pub fn spawn_relay(
    state: Arc<AppState>,
    relay: PreparedRelay,
    span: Span,
) -> mpsc::Receiver<RelayEvent> {
    let (tx, rx) = mpsc::channel(RELAY_CHANNEL_CAPACITY);
    tokio::spawn(
        async move {
            let outcome = run_relay(state, relay, tx).await;
            info!("Relay finished: {:?}", outcome);
        }
        .instrument(span),
    );
    rx
}

/// Forwards events to the client until it goes away, then keeps draining silently.
struct EventSink {
    tx: mpsc::Sender<RelayEvent>,
    connected: bool,
}

impl EventSink {
    async fn send(&mut self, event: RelayEvent) {
        if self.connected && self.tx.send(event).await.is_err() {
            debug!("Client disconnected, finishing the relay without it");
            self.connected = false;
        }
    }
}

/// Drains the completion, relaying each fragment, and stores the assembled answer.
///
/// A client disconnect does not stop the task: the upstream is still consumed to the
/// end and the answer is stored, so the transcript stays complete.
pub async fn run_relay(
    state: Arc<AppState>,
    relay: PreparedRelay,
    tx: mpsc::Sender<RelayEvent>,
) -> RelayOutcome {
    let PreparedRelay {
        conversation_id,
        book_id,
        mut fragments,
    } = relay;
    let mut sink = EventSink {
        tx,
        connected: true,
    };
    let mut answer = String::new();
    let mut count = 0;

    // --- Streaming ---
    while let Some(item) = fragments.next().await {
        match item {
            Ok(fragment) => {
                answer.push_str(&fragment);
                count += 1;
                sink.send(RelayEvent::Token(fragment)).await;
            }
            Err(e) => {
                error!("Completion stream for book {} failed: {}", book_id, e);
                sink.send(RelayEvent::Error(STREAM_INTERRUPTED.to_string()))
                    .await;
                return RelayOutcome::Interrupted;
            }
        }
    }

    // --- Persisting the assistant message ---
    if let Err(e) = persist_answer(&state, conversation_id, &answer).await {
        error!("Failed to store the assistant message: {}", e);
        sink.send(RelayEvent::Error(PERSIST_FAILED.to_string())).await;
        return RelayOutcome::PersistFailed;
    }

    // --- Finalizing ---
    sink.send(RelayEvent::Done).await;
    RelayOutcome::Completed {
        fragments: count,
        client_connected: sink.connected,
    }
}

async fn persist_answer(state: &AppState, conversation_id: i64, answer: &str) -> PortResult<()> {
    state
        .db
        .append_message(conversation_id, MessageRole::Assistant, answer)
        .await?;
    state.db.touch_conversation(conversation_id).await
}
