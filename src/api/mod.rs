//! HTTP API Handlers and Routes
//!
//! # API Endpoints
//!
//! ## Sessions (`/api/sessions`)
//! - `POST /api/sessions` - Create a session
//! - `GET /api/sessions/{id}` - Get a session
//! - `DELETE /api/sessions/{id}` - Delete a session, cancelling running work
//! - `POST /api/sessions/{id}/cancel` - Cancel the running operation
//!
//! ## Streams (Server-Sent Events)
//! - `POST /api/sessions/{id}/research` - `status`, `complexity`, `plan`,
//!   `research_progress`, `complete`
//! - `POST /api/sessions/{id}/generate` - `outline`, `content`, `complete`
//! - `POST /api/sessions/{id}/iterate` - `analysis`, `status`, `content`, `complete`
//!
//! A failed stream ends with an `error` event.
//!
//! ## Versions
//! - `GET /api/sessions/{id}/versions`
//! - `GET /api/sessions/{id}/versions/{number}`
//!
//! ## Publishing
//! - `POST /api/sessions/{id}/publish`
//!
//! ## Health
//! - `GET /health`
//!
//! # OpenAPI Documentation
//!
//! When the `swagger-ui` feature is enabled, interactive API documentation
//! is available at `/swagger-ui/`.

/// Request and response handlers for all API endpoints.
pub mod handlers;
/// Router configuration and route definitions.
pub mod routes;

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::sessions::create_session,
        handlers::sessions::get_session,
        handlers::sessions::delete_session,
        handlers::sessions::cancel_session,
        handlers::sessions::list_versions,
        handlers::sessions::get_version,
        handlers::research::start_research,
        handlers::content::generate,
        handlers::content::iterate,
        handlers::publish::publish,
    ),
    components(schemas(
        crate::types::CreateSessionRequest,
        crate::types::SessionResponse,
        crate::types::GenerationParameters,
        crate::types::IterateRequest,
        crate::types::PublishRequest,
        crate::types::Version,
        crate::types::VersionSummary,
        crate::types::VersionsResponse,
        crate::publish::PublishReceipt,
    )),
    tags(
        (name = "sessions", description = "Session lifecycle"),
        (name = "research", description = "Parallel research"),
        (name = "content", description = "Generation and revision"),
        (name = "versions", description = "Version history"),
        (name = "publish", description = "Publishing")
    )
)]
pub struct ApiDoc;
