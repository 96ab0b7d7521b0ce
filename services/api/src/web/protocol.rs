//! services/api/src/web/protocol.rs
//!
//! Defines the event-stream protocol between the API server and the browser client
//! for a single chat relay.
//!
//! Each event is one `data:` line. Tokens and errors carry a small JSON object,
//! and the end of a successful answer is the literal `[DONE]`.

use axum::response::sse::Event;
use serde_json::json;

/// Payload of the final event of a successful relay.
pub const DONE_MARKER: &str = "[DONE]";

/// Sent when the upstream completion fails after tokens have started flowing.
pub const STREAM_INTERRUPTED: &str = "Stream interrupted";

//=========================================================================================
// Events Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Represents the events the server writes to the chat response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// An incremental piece of the assistant's answer. `{"token": "..."}`
    Token(String),
    /// The relay failed and the stream is about to close. `{"error": "..."}`
    Error(String),
    /// The answer is complete and has been stored.
    Done,
}

impl RelayEvent {
    /// The text that follows `data: ` on the wire.
    pub fn data(&self) -> String {
        match self {
            RelayEvent::Token(token) => json!({ "token": token }).to_string(),
            RelayEvent::Error(message) => json!({ "error": message }).to_string(),
            RelayEvent::Done => DONE_MARKER.to_string(),
        }
    }

    pub fn into_event(self) -> Event {
        Event::default().data(self.data())
    }
}
