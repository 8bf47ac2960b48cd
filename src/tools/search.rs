//! Retrieval service implementation using daedra
//!
//! Web search goes through DuckDuckGo via the daedra crate; page extraction
//! uses daedra's fetcher, which converts HTML to markdown.

use crate::types::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One search result candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub description: String,
}

/// Extracted page body plus whatever metadata the backend reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedPage {
    pub content: String,
    #[serde(default)]
    pub metadata: Value,
}

/// Search and page extraction used by research workers
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return up to `limit` hits for `query`
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>>;

    /// Fetch and extract the main content of `url`
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;
}

/// Retriever powered by daedra
#[derive(Debug, Clone, Default)]
pub struct DaedraRetriever {
    /// Optional CSS selector applied to every fetched page
    selector: Option<String>,
}

impl DaedraRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }
}

#[async_trait]
impl Retriever for DaedraRetriever {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Err(AppError::InvalidInput("Empty search query".to_string()));
        }

        let search_args = daedra::SearchArgs {
            query: query.to_string(),
            options: Some(daedra::SearchOptions {
                num_results: limit,
                ..Default::default()
            }),
        };

        match daedra::tools::search::perform_search(&search_args).await {
            Ok(response) => Ok(response
                .data
                .iter()
                .take(limit)
                .map(|r| SearchHit {
                    url: r.url.clone(),
                    title: r.title.clone(),
                    description: r.description.clone(),
                })
                .collect()),
            Err(e) => Err(AppError::Retrieval(format!("Search failed: {}", e))),
        }
    }

    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        if url.trim().is_empty() {
            return Err(AppError::InvalidInput("Empty URL".to_string()));
        }

        let fetch_args = daedra::VisitPageArgs {
            url: url.to_string(),
            include_images: false,
            selector: self.selector.clone(),
        };

        match daedra::tools::fetch::fetch_page(&fetch_args).await {
            Ok(page_content) => Ok(FetchedPage {
                content: page_content.content,
                metadata: json!({
                    "url": page_content.url,
                    "title": page_content.title,
                    "word_count": page_content.word_count
                }),
            }),
            Err(e) => Err(AppError::Retrieval(format!("Failed to fetch page: {}", e))),
        }
    }
}
