use super::error_event;
use crate::{
    research::ResearchProgress,
    sessions::{Evidence, Operation},
    types::{AppError, Result},
    utils::text::truncate_chars,
    AppState,
};
use async_stream::stream;
use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use serde_json::json;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tracing::debug;

const SYNTHESIS_PREVIEW_CHARS: usize = 1000;

fn progress_event(progress: &ResearchProgress) -> Event {
    let data = serde_json::to_string(progress).unwrap_or_default();
    Event::default().event(progress.name()).data(data)
}

/// Run research for a session (SSE)
///
/// Emits `status`, `complexity`, `plan` and `research_progress` events while
/// research runs, then a final `complete` (or `error`) event.
#[utoipa::path(
    post,
    path = "/api/sessions/{id}/research",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Research event stream", content_type = "text/event-stream"),
        (status = 404, description = "Session not found"),
        (status = 409, description = "Session is not in the created state")
    ),
    tag = "research"
)]
pub async fn start_research(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let session = state.sessions.get(&id).await?;
    Operation::Research.check(session.status, Evidence::default())?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let service = state.sessions.clone();
    let task = tokio::spawn(async move { service.start_research(&id, Some(tx)).await });

    let events = stream! {
        while let Some(progress) = rx.recv().await {
            if matches!(progress, ResearchProgress::Completed { .. }) {
                continue;
            }
            yield Ok::<_, Infallible>(progress_event(&progress));
        }

        let event = match task.await {
            Ok(Ok(outcome)) => {
                let data = json!({
                    "status": "complete",
                    "rounds": outcome.rounds,
                    "complexity": outcome.complexity,
                    "objectives_attempted": outcome.objectives_attempted,
                    "findings_succeeded": outcome.findings_succeeded,
                    "total_sources": outcome.synthesis.source_count,
                    "synthesis_preview": truncate_chars(&outcome.synthesis.content, SYNTHESIS_PREVIEW_CHARS),
                });
                Event::default().event("complete").data(data.to_string())
            }
            Ok(Err(e)) => error_event(&e),
            Err(join_err) => error_event(&AppError::Internal(format!("research task failed: {}", join_err))),
        };
        debug!("Research stream finished");
        yield Ok(event);
    };

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
