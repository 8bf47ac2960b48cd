//! Content-stage agents and the execution context every agent runs in.
//!
//! - [`AgentContext`] - session handle, service clients, timeouts, cancellation
//! - [`producer::ContentProducer`] - outline + streaming body generation
//! - [`reviser::ContentReviser`] - feedback-driven revision
//! - [`versions`] - the gapless version ledger
//!
//! Every external call made by an agent goes through [`AgentContext`], which
//! bounds it with a timeout and aborts it when the session's cancellation
//! token fires. A timeout is reported exactly like a failure of the service.

pub mod producer;
pub mod reviser;
pub mod versions;

pub use producer::ContentProducer;
pub use reviser::{ContentReviser, FeedbackAnalysis, RevisionAction};

use crate::llm::{LLMClient, TextStream};
use crate::memory::{get_json, put_json, SharedStore};
use crate::tools::{FetchedPage, Retriever, SearchHit};
use crate::types::{AppError, Result, Version};
use futures::{Stream, StreamExt};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Upper bounds applied to external calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallTimeouts {
    pub completion: Duration,
    pub retrieval: Duration,
    /// Longest wait for the next fragment of a stream
    pub stream_idle: Duration,
}

impl Default for CallTimeouts {
    fn default() -> Self {
        Self {
            completion: Duration::from_secs(120),
            retrieval: Duration::from_secs(60),
            stream_idle: Duration::from_secs(60),
        }
    }
}

/// Everything an agent needs to act on behalf of one session.
#[derive(Clone)]
pub struct AgentContext {
    pub session_id: String,
    pub store: SharedStore,
    pub llm: Arc<dyn LLMClient>,
    pub retriever: Arc<dyn Retriever>,
    pub cancel: CancellationToken,
    pub timeouts: CallTimeouts,
}

impl AgentContext {
    pub fn new(
        session_id: impl Into<String>,
        store: SharedStore,
        llm: Arc<dyn LLMClient>,
        retriever: Arc<dyn Retriever>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            store,
            llm,
            retriever,
            cancel: CancellationToken::new(),
            timeouts: CallTimeouts::default(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_timeouts(mut self, timeouts: CallTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fail fast if the session has been cancelled.
    pub fn ensure_active(&self, stage: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(self.cancelled(stage));
        }
        Ok(())
    }

    fn cancelled(&self, stage: &str) -> AppError {
        AppError::Cancelled(format!(
            "{} cancelled for session {}",
            stage, self.session_id
        ))
    }

    /// Run `fut` bounded by `limit` and the cancellation token.
    async fn guard<T, F>(&self, stage: &str, limit: Duration, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(self.cancelled(stage)),
            res = tokio::time::timeout(limit, fut) => match res {
                Ok(inner) => inner,
                Err(_) => Err(AppError::Timeout(format!(
                    "{} exceeded {}s for session {}",
                    stage,
                    limit.as_secs(),
                    self.session_id
                ))),
            },
        }
    }

    /// One-shot completion.
    pub async fn complete(&self, stage: &str, prompt: &str, max_tokens: u32) -> Result<String> {
        self.guard(
            stage,
            self.timeouts.completion,
            self.llm.generate(prompt, max_tokens),
        )
        .await
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        self.guard("search", self.timeouts.retrieval, self.retriever.search(query, limit))
            .await
    }

    pub async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        self.guard("fetch", self.timeouts.retrieval, self.retriever.fetch(url))
            .await
    }

    /// Open a streaming completion.
    pub async fn open_stream(
        &self,
        stage: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<TextStream> {
        self.guard(
            stage,
            self.timeouts.completion,
            self.llm.stream(prompt, max_tokens),
        )
        .await
    }

    /// Next fragment of an open stream, `None` once drained.
    pub async fn next_fragment(
        &self,
        stage: &str,
        stream: &mut TextStream,
    ) -> Result<Option<String>> {
        self.guard(stage, self.timeouts.stream_idle, async {
            stream.next().await.transpose()
        })
        .await
    }

    /// Persist a record unless the session has been cancelled.
    ///
    /// A write that races a cancellation is removed again, so a session
    /// deleted mid-write is not recreated.
    pub async fn persist<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.ensure_active(key)?;
        put_json(self.store.as_ref(), &self.session_id, key, value).await?;
        if self.cancel.is_cancelled() {
            self.store.remove(&self.session_id, key).await?;
            return Err(self.cancelled(key));
        }
        Ok(())
    }

    pub async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        get_json(self.store.as_ref(), &self.session_id, key).await
    }
}

/// Events emitted while content is generated or revised.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    Outline(String),
    Analysis(FeedbackAnalysis),
    Researching { queries: Vec<String> },
    ResearchComplete { findings: usize },
    Fragment(String),
    Completed(Version),
}

impl StreamEvent {
    /// SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Outline(_) => "outline",
            StreamEvent::Analysis(_) => "analysis",
            StreamEvent::Researching { .. } | StreamEvent::ResearchComplete { .. } => "status",
            StreamEvent::Fragment(_) => "content",
            StreamEvent::Completed(_) => "complete",
        }
    }
}

pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;
