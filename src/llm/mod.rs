//! Completion service clients
//!
//! The orchestration core only sees [`LLMClient`]; concrete providers are
//! selected at startup through [`Provider`] and enabled via Cargo features:
//! - `ollama` - Local Ollama server (default)
//! - `openai` - OpenAI API and compatible endpoints
//!
//! # Streaming
//!
//! Providers return [`TextStream`], a boxed stream of text fragments in
//! arrival order. The producer and reviser forward each fragment as it
//! arrives and persist only after the stream drains.

/// Core LLM client trait and provider selection.
pub mod client;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "openai")]
pub mod openai;

pub use client::{LLMClient, Provider, TextStream};
