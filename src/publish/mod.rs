//! Publishing finished content to external sites.

pub mod render;
pub mod wordpress;

pub use wordpress::WordPressPublisher;

use crate::types::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Draft,
    Publish,
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostStatus::Draft => f.write_str("draft"),
            PostStatus::Publish => f.write_str("publish"),
        }
    }
}

impl FromStr for PostStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(PostStatus::Draft),
            "publish" => Ok(PostStatus::Publish),
            other => Err(AppError::InvalidInput(format!(
                "post status must be 'draft' or 'publish', got '{}'",
                other
            ))),
        }
    }
}

/// A rendered post ready for a target.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub title: String,
    pub html: String,
    pub status: PostStatus,
}

impl Post {
    /// Build a post from markdown. The first H1 becomes the title, or
    /// `fallback_title` when there is none.
    pub fn from_markdown(markdown: &str, fallback_title: &str, status: PostStatus) -> Self {
        let title = render::extract_title(markdown, fallback_title);
        let html = render::markdown_to_html(&render::strip_title(markdown));
        Self {
            title,
            html,
            status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PublishReceipt {
    pub id: u64,
    pub url: String,
    pub edit_url: String,
    pub status: String,
}

#[async_trait]
pub trait PublishTarget: Send + Sync {
    async fn publish(&self, post: &Post) -> Result<PublishReceipt>;

    fn name(&self) -> &str;
}
