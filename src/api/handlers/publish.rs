use crate::{
    publish::{PostStatus, PublishReceipt},
    types::{PublishRequest, Result},
    AppState,
};
use axum::{
    extract::{Path, State},
    Json,
};

/// Publish the latest version
#[utoipa::path(
    post,
    path = "/api/sessions/{id}/publish",
    params(("id" = String, Path, description = "Session id")),
    request_body = PublishRequest,
    responses(
        (status = 200, description = "Post created", body = PublishReceipt),
        (status = 400, description = "Unknown post status"),
        (status = 404, description = "Session not found"),
        (status = 409, description = "Session not ready or publishing not configured"),
        (status = 502, description = "Publishing target rejected the post")
    ),
    tag = "publish"
)]
pub async fn publish(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<PublishRequest>,
) -> Result<Json<PublishReceipt>> {
    let status = match payload.status.as_deref() {
        Some(label) => label.parse::<PostStatus>()?,
        None => PostStatus::default(),
    };
    let receipt = state.sessions.publish(&id, status).await?;
    Ok(Json(receipt))
}
