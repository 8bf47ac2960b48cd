use super::error_event;
use crate::{
    agents::{EventStream, StreamEvent},
    types::{IterateRequest, Result},
    AppState,
};
use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use std::convert::Infallible;

fn event_payload(event: &StreamEvent) -> Value {
    match event {
        StreamEvent::Outline(content) => json!({
            "content": content,
            "message": "Content outline created",
        }),
        StreamEvent::Analysis(analysis) => json!({
            "action": analysis.action,
            "specific_changes": analysis.specific_changes,
            "sections_affected": analysis.sections_affected,
            "needs_research": analysis.wants_research(),
        }),
        StreamEvent::Researching { queries } => json!({
            "phase": "researching",
            "queries": queries,
        }),
        StreamEvent::ResearchComplete { findings } => json!({
            "phase": "research_complete",
            "findings": findings,
        }),
        StreamEvent::Fragment(chunk) => json!({ "chunk": chunk }),
        StreamEvent::Completed(version) => json!({
            "status": "complete",
            "version": version.version_number,
            "feedback_applied": version.feedback_applied,
            "generated_at": version.generated_at,
        }),
    }
}

fn to_sse(events: EventStream) -> impl Stream<Item = std::result::Result<Event, Infallible>> {
    events.map(|item| {
        Ok::<_, Infallible>(match item {
            Ok(event) => Event::default()
                .event(event.name())
                .data(event_payload(&event).to_string()),
            Err(e) => error_event(&e),
        })
    })
}

/// Generate content from research (SSE)
///
/// Emits `outline`, a series of `content` chunks, then `complete` with the
/// new version number.
#[utoipa::path(
    post,
    path = "/api/sessions/{id}/generate",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Generation event stream", content_type = "text/event-stream"),
        (status = 404, description = "Session not found"),
        (status = 409, description = "Research has not completed")
    ),
    tag = "content"
)]
pub async fn generate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let events = state.sessions.start_generation(&id).await?;
    Ok(Sse::new(to_sse(events)).keep_alive(KeepAlive::default()))
}

/// Revise the latest version with feedback (SSE)
///
/// Emits `analysis`, optional `status` events for extra research, `content`
/// chunks, then `complete`.
#[utoipa::path(
    post,
    path = "/api/sessions/{id}/iterate",
    params(("id" = String, Path, description = "Session id")),
    request_body = IterateRequest,
    responses(
        (status = 200, description = "Revision event stream", content_type = "text/event-stream"),
        (status = 400, description = "Empty feedback"),
        (status = 404, description = "Session not found"),
        (status = 409, description = "No version to revise")
    ),
    tag = "content"
)]
pub async fn iterate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<IterateRequest>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let events = state.sessions.submit_feedback(&id, &payload.feedback).await?;
    Ok(Sse::new(to_sse(events)).keep_alive(KeepAlive::default()))
}
