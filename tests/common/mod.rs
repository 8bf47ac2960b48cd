#![allow(dead_code)]

pub mod mocks;

use mocks::{MockLLMClient, MockRetriever};
use quire::agents::AgentContext;
use quire::memory::InMemoryStore;
use quire::types::{GenerationParameters, Session};
use std::sync::Arc;

pub const CLASSIFY: &str = "Analyze the complexity of this content creation request";
pub const DECOMPOSE: &str = "Create a research plan for this content";
pub const EVALUATE: &str = "Evaluate these sources for the research task";
pub const WORKER_SYNTHESIS: &str = "Synthesize research findings for:";
pub const SYNTHESIZE: &str = "Synthesize these research findings into a coherent summary";
pub const GAP_CHECK: &str = "Based on this research synthesis, is additional research needed?";
pub const FOLLOW_UP: &str = "Based on this synthesis, what specific gaps need more research?";
pub const OUTLINE: &str = "Plan the structure for this content";
pub const WRITE: &str = "Write a ";
pub const ANALYZE_FEEDBACK: &str = "Analyze this user feedback for content revision";
pub const REVISE: &str = "Revise this content based on the feedback";

pub fn session(topic: &str) -> Session {
    Session::new(topic, GenerationParameters::default())
}

/// Context over a fresh in-memory store.
pub fn context(
    session_id: &str,
    llm: Arc<MockLLMClient>,
    retriever: Arc<MockRetriever>,
) -> (AgentContext, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let ctx = AgentContext::new(session_id, store.clone(), llm, retriever);
    (ctx, store)
}
