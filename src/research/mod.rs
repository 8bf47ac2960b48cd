//! Multi-Agent Research Coordination
//!
//! This module coordinates independent research workers whose findings are
//! written to the session's coordination store and read back for synthesis.
//!
//! # Architecture
//!
//! - [`coordinator::ResearchCoordinator`] - classifies, decomposes, aggregates
//!   and synthesizes, with at most one adaptive gap-filling round
//! - [`fanout::FanOutExecutor`] - runs workers concurrently and isolates
//!   their failures
//! - [`worker::ResearchWorker`] - searches, evaluates, scrapes and
//!   synthesizes a single objective
//!
//! # Usage
//!
//! ```ignore
//! use quire::research::ResearchCoordinator;
//!
//! let coordinator = ResearchCoordinator::new(ctx);
//! let outcome = coordinator.research(&session).await?;
//!
//! println!("{} of {} objectives succeeded", outcome.findings_succeeded, outcome.objectives_attempted);
//! println!("{}", outcome.synthesis.content);
//! ```

/// Research task coordination and multi-source aggregation.
pub mod coordinator;
/// Concurrent worker execution.
pub mod fanout;
/// Single-objective research worker.
pub mod worker;

pub use coordinator::{ResearchCoordinator, ResearchOutcome};
pub use fanout::{FanOutExecutor, FanOutReport};
pub use worker::ResearchWorker;

use crate::types::Complexity;
use serde::Serialize;
use tokio::sync::mpsc;

/// Progress notifications emitted while research runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ResearchProgress {
    Analyzing,
    Classified { complexity: Complexity },
    Planned { objectives: usize, fallback: bool },
    WorkersStarted { round: u8, count: usize },
    WorkerCompleted { agent_id: String, succeeded: bool },
    Synthesizing { round: u8 },
    GapCheck { needs_more: bool },
    Completed { rounds: u8, total_sources: usize },
}

impl ResearchProgress {
    /// SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            ResearchProgress::Analyzing
            | ResearchProgress::Synthesizing { .. }
            | ResearchProgress::GapCheck { .. } => "status",
            ResearchProgress::Classified { .. } => "complexity",
            ResearchProgress::Planned { .. } => "plan",
            ResearchProgress::WorkersStarted { .. } | ResearchProgress::WorkerCompleted { .. } => {
                "research_progress"
            }
            ResearchProgress::Completed { .. } => "complete",
        }
    }
}

pub type ProgressSender = mpsc::UnboundedSender<ResearchProgress>;
