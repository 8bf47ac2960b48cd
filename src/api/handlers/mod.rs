//! API request handlers.

/// Generation and revision streams.
pub mod content;
/// Publishing to external sites.
pub mod publish;
/// Research stream.
pub mod research;
/// Session and version CRUD.
pub mod sessions;

use crate::types::AppError;
use axum::response::sse::Event;
use serde_json::json;

/// Terminal SSE event for a failed operation.
pub(crate) fn error_event(err: &AppError) -> Event {
    Event::default()
        .event("error")
        .data(json!({ "error": err.to_string() }).to_string())
}
