//! # Quire - multi-agent research and content orchestration
//!
//! Quire turns a topic into researched, reviewable long-form content. A lead
//! coordinator classifies the request, splits it into research objectives and
//! fans them out to independent workers. Workers communicate only through a
//! per-session coordination store. The synthesized research feeds a streaming
//! producer, and a reviser applies user feedback as new immutable versions.
//!
//! Quire can be used in two ways:
//!
//! 1. **As a standalone server** - Run the `quire-server` binary
//! 2. **As a library** - Embed the orchestration core in your own service
//!
//! ## Quick Start (Library Usage)
//!
//! ```rust,ignore
//! use quire::{FileStore, Provider, SessionService, DaedraRetriever};
//! use quire::types::CreateSessionRequest;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> quire::Result<()> {
//!     let llm = Provider::Ollama {
//!         base_url: "http://localhost:11434".to_string(),
//!         model: "llama3.2".to_string(),
//!     }
//!     .create_client()
//!     .await?;
//!
//!     let service = SessionService::new(
//!         Arc::new(FileStore::new("./data/sessions")),
//!         llm,
//!         Arc::new(DaedraRetriever::new()),
//!     );
//!
//!     let session = service
//!         .create(CreateSessionRequest { topic: "edge caching".into(), parameters: None })
//!         .await?;
//!     let outcome = service.start_research(&session.id, None).await?;
//!     println!("{}", outcome.synthesis.content);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `ollama` | Ollama local inference (default) |
//! | `openai` | OpenAI and compatible APIs |
//! | `swagger-ui` | Interactive API docs at `/swagger-ui/` |
//!
//! ## Modules
//!
//! - [`research`] - Orchestrator, fan-out executor and research workers
//! - [`agents`] - Producer, reviser, version ledger and the agent context
//! - [`memory`] - Coordination store (filesystem and in-memory)
//! - [`sessions`] - Session lifecycle and service
//! - [`publish`] - Publishing targets
//! - [`api`] - HTTP handlers and routes
//! - [`llm`] - Completion service clients
//! - [`tools`] - Retrieval service

#![cfg_attr(docsrs, feature(doc_cfg))]

/// Content agents and the shared execution context.
pub mod agents;
/// HTTP API handlers and routes.
pub mod api;
/// Command-line interface.
pub mod cli;
/// Completion service clients and abstractions.
pub mod llm;
/// Per-session coordination store.
pub mod memory;
/// Publishing targets.
pub mod publish;
/// Multi-agent research coordination.
pub mod research;
/// Session lifecycle and client operations.
pub mod sessions;
/// Retrieval service (search and fetch).
pub mod tools;
/// Core types (records, requests, responses, errors).
pub mod types;
/// Configuration and text utilities.
pub mod utils;

// Re-export commonly used types
pub use llm::{LLMClient, Provider};
pub use memory::{CoordinationStore, FileStore, InMemoryStore, SharedStore};
pub use research::{ResearchCoordinator, ResearchOutcome};
pub use sessions::SessionService;
pub use tools::{DaedraRetriever, Retriever};
pub use types::{AppError, Result};
pub use utils::toml_config::{QuireConfig, QuireConfigManager};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Session operations
    pub sessions: SessionService,
}
