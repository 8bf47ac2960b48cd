//! Mock completion and retrieval services for testing.
//!
//! Both mocks are scripted: replies are chosen by prompt prefix (completion)
//! or by query content (retrieval), and every call is recorded so tests can
//! assert on what the agents asked for.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;
use quire::llm::{LLMClient, TextStream};
use quire::tools::{FetchedPage, Retriever, SearchHit};
use quire::types::{AppError, Result};
use serde_json::json;

/// What the mock does for a matching prompt.
#[derive(Clone, Debug)]
pub enum Reply {
    Text(String),
    /// Reply with the prompt itself
    Echo,
    Fail,
    /// Never answer
    Hang,
    /// Stream the text, then fail before the end
    BreakStream(String),
}

/// Scripted completion client.
///
/// ```ignore
/// let llm = MockLLMClient::new("default reply")
///     .on("Analyze the complexity", "SIMPLE")
///     .fail_on("Based on this research synthesis");
/// ```
pub struct MockLLMClient {
    rules: Vec<(String, Reply)>,
    default: Reply,
    chunk_chars: usize,
    prompts: Mutex<Vec<String>>,
}

impl MockLLMClient {
    pub fn new(default: &str) -> Self {
        Self {
            rules: Vec::new(),
            default: Reply::Text(default.to_string()),
            chunk_chars: 8,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(mut self, prefix: &str, reply: Reply) -> Self {
        self.rules.push((prefix.to_string(), reply));
        self
    }

    pub fn on(self, prefix: &str, text: &str) -> Self {
        self.reply(prefix, Reply::Text(text.to_string()))
    }

    pub fn fail_on(self, prefix: &str) -> Self {
        self.reply(prefix, Reply::Fail)
    }

    pub fn echo_on(self, prefix: &str) -> Self {
        self.reply(prefix, Reply::Echo)
    }

    pub fn hang_on(self, prefix: &str) -> Self {
        self.reply(prefix, Reply::Hang)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    /// Number of prompts received that start with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.prompts
            .lock()
            .iter()
            .filter(|p| p.starts_with(prefix))
            .count()
    }

    fn pick(&self, prompt: &str) -> Reply {
        self.prompts.lock().push(prompt.to_string());
        self.rules
            .iter()
            .find(|(prefix, _)| prompt.starts_with(prefix.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| self.default.clone())
    }

    fn chunks(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        chars
            .chunks(self.chunk_chars)
            .map(|c| c.iter().collect())
            .collect()
    }
}

#[async_trait]
impl LLMClient for MockLLMClient {
    async fn generate(&self, prompt: &str, _max_tokens: u32) -> Result<String> {
        match self.pick(prompt) {
            Reply::Text(text) | Reply::BreakStream(text) => Ok(text),
            Reply::Echo => Ok(prompt.to_string()),
            Reply::Fail => Err(AppError::LLM("Mock LLM failure".to_string())),
            Reply::Hang => futures::future::pending::<Result<String>>().await,
        }
    }

    async fn stream(&self, prompt: &str, _max_tokens: u32) -> Result<TextStream> {
        match self.pick(prompt) {
            Reply::Text(text) => {
                let chunks: Vec<Result<String>> = self.chunks(&text).into_iter().map(Ok).collect();
                Ok(Box::new(stream::iter(chunks)))
            }
            Reply::Echo => {
                let chunks: Vec<Result<String>> = self.chunks(prompt).into_iter().map(Ok).collect();
                Ok(Box::new(stream::iter(chunks)))
            }
            Reply::BreakStream(text) => {
                let mut chunks: Vec<Result<String>> =
                    self.chunks(&text).into_iter().map(Ok).collect();
                chunks.push(Err(AppError::LLM("Mock stream broke".to_string())));
                Ok(Box::new(stream::iter(chunks)))
            }
            Reply::Fail => Err(AppError::LLM("Mock LLM failure".to_string())),
            Reply::Hang => Ok(Box::new(stream::pending::<Result<String>>())),
        }
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

/// Scripted retrieval service.
///
/// Every query yields `hits_per_query` results under
/// `https://example.com/<query-slug>/<n>`. Queries containing a failing
/// marker error out; URLs containing a failing marker cannot be fetched.
pub struct MockRetriever {
    hits_per_query: usize,
    failing_queries: Vec<String>,
    failing_urls: Vec<String>,
    searches: Mutex<Vec<String>>,
    fetches: Mutex<Vec<String>>,
}

impl MockRetriever {
    pub fn new(hits_per_query: usize) -> Self {
        Self {
            hits_per_query,
            failing_queries: Vec::new(),
            failing_urls: Vec::new(),
            searches: Mutex::new(Vec::new()),
            fetches: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_queries_containing(mut self, marker: &str) -> Self {
        self.failing_queries.push(marker.to_string());
        self
    }

    pub fn fail_urls_containing(mut self, marker: &str) -> Self {
        self.failing_urls.push(marker.to_string());
        self
    }

    pub fn searches(&self) -> Vec<String> {
        self.searches.lock().clone()
    }

    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().clone()
    }
}

pub fn slug(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect()
}

#[async_trait]
impl Retriever for MockRetriever {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        self.searches.lock().push(query.to_string());
        if self.failing_queries.iter().any(|m| query.contains(m.as_str())) {
            return Err(AppError::Retrieval(format!("Mock search failure for '{}'", query)));
        }

        Ok((0..self.hits_per_query.min(limit))
            .map(|i| SearchHit {
                url: format!("https://example.com/{}/{}", slug(query), i),
                title: format!("{} #{}", query, i),
                description: format!("About {}", query),
            })
            .collect())
    }

    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        self.fetches.lock().push(url.to_string());
        if self.failing_urls.iter().any(|m| url.contains(m.as_str())) {
            return Err(AppError::Retrieval(format!("Mock fetch failure for {}", url)));
        }

        Ok(FetchedPage {
            content: format!("Full text of {}", url),
            metadata: json!({ "url": url }),
        })
    }
}
