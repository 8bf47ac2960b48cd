//! Shared utilities
//!
//! - [`toml_config`] - `quire.toml` loading, validation and hot reload
//! - [`extract`] - JSON payload extraction from completion text
//! - [`text`] - character-safe truncation

pub mod extract;
pub mod text;
pub mod toml_config;
