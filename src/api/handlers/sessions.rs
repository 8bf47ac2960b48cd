use crate::{
    types::{
        CreateSessionRequest, Result, SessionResponse, Version, VersionSummary, VersionsResponse,
    },
    utils::text::preview,
    AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

const VERSION_PREVIEW_CHARS: usize = 200;

/// Create a content session
#[utoipa::path(
    post,
    path = "/api/sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Session created", body = SessionResponse),
        (status = 400, description = "Invalid topic or parameters")
    ),
    tag = "sessions"
)]
pub async fn create_session(
    State(state): State<AppState>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>)> {
    let session = state.sessions.create(payload).await?;
    Ok((StatusCode::CREATED, Json(SessionResponse::from(&session))))
}

/// Get a session
#[utoipa::path(
    get,
    path = "/api/sessions/{id}",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Session", body = SessionResponse),
        (status = 404, description = "Session not found")
    ),
    tag = "sessions"
)]
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>> {
    let session = state.sessions.get(&id).await?;
    Ok(Json(SessionResponse::from(&session)))
}

/// Delete a session and everything stored for it
#[utoipa::path(
    delete,
    path = "/api/sessions/{id}",
    params(("id" = String, Path, description = "Session id")),
    responses((status = 204, description = "Session deleted")),
    tag = "sessions"
)]
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.sessions.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Cancel the operation running for a session
#[utoipa::path(
    post,
    path = "/api/sessions/{id}/cancel",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Cancellation requested"),
        (status = 404, description = "Session not found")
    ),
    tag = "sessions"
)]
pub async fn cancel_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let cancelled = state.sessions.cancel(&id).await?;
    Ok(Json(json!({
        "session_id": id,
        "cancelled": cancelled,
    })))
}

/// List content versions
#[utoipa::path(
    get,
    path = "/api/sessions/{id}/versions",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Versions, oldest first", body = VersionsResponse),
        (status = 404, description = "Session not found")
    ),
    tag = "versions"
)]
pub async fn list_versions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<VersionsResponse>> {
    let versions = state.sessions.list_versions(&id).await?;
    let versions = versions
        .into_iter()
        .map(|v| VersionSummary {
            version_number: v.version_number,
            generated_at: v.generated_at,
            feedback_applied: v.feedback_applied,
            content_preview: preview(&v.content, VERSION_PREVIEW_CHARS),
        })
        .collect();

    Ok(Json(VersionsResponse {
        session_id: id,
        versions,
    }))
}

/// Get one content version
#[utoipa::path(
    get,
    path = "/api/sessions/{id}/versions/{number}",
    params(
        ("id" = String, Path, description = "Session id"),
        ("number" = u32, Path, description = "Version number, starting at 1")
    ),
    responses(
        (status = 200, description = "Version", body = Version),
        (status = 404, description = "Session or version not found")
    ),
    tag = "versions"
)]
pub async fn get_version(
    State(state): State<AppState>,
    Path((id, number)): Path<(String, u32)>,
) -> Result<Json<Version>> {
    Ok(Json(state.sessions.get_version(&id, number).await?))
}
