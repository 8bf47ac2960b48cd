use crate::api::handlers::{content, publish, research, sessions};
use crate::AppState;
use axum::{
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(sessions::create_session))
        .route(
            "/sessions/{id}",
            get(sessions::get_session).delete(sessions::delete_session),
        )
        .route("/sessions/{id}/research", post(research::start_research))
        .route("/sessions/{id}/generate", post(content::generate))
        .route("/sessions/{id}/iterate", post(content::iterate))
        .route("/sessions/{id}/versions", get(sessions::list_versions))
        .route(
            "/sessions/{id}/versions/{number}",
            get(sessions::get_version),
        )
        .route("/sessions/{id}/cancel", post(sessions::cancel_session))
        .route("/sessions/{id}/publish", post(publish::publish))
}

/// Router with every route mounted: `/api/...` plus `/health`.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api", create_router())
        .with_state(state)
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
