use super::lifecycle::{self, Evidence, Operation};
use super::repository::SessionRepository;
use crate::agents::{
    versions, AgentContext, CallTimeouts, ContentProducer, ContentReviser, EventStream,
    StreamEvent,
};
use crate::llm::LLMClient;
use crate::memory::{get_json, keys, put_json, validate_session_id, SharedStore};
use crate::publish::{Post, PostStatus, PublishReceipt, PublishTarget};
use crate::research::{ProgressSender, ResearchCoordinator, ResearchOutcome};
use crate::tools::Retriever;
use crate::types::{
    AgentState, AppError, CreateSessionRequest, Result, Session, SessionStatus, Version,
};
use crate::utils::toml_config::QuireConfigManager;
use async_stream::stream;
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Puts a session back into the status it had before an operation began,
/// unless the operation finished.
struct OperationGuard {
    repo: Arc<SessionRepository>,
    session_id: String,
    previous: SessionStatus,
    armed: bool,
}

impl OperationGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let previous = self.previous;
        let restored = self.repo.update(&self.session_id, |s| {
            s.status = previous;
            s.touch();
            Ok(())
        });
        if restored.is_ok() {
            debug!(session_id = %self.session_id, status = %previous, "Session status restored");
        }
    }
}

/// Entry point for everything a client can do with a session.
#[derive(Clone)]
pub struct SessionService {
    repo: Arc<SessionRepository>,
    store: SharedStore,
    llm: Arc<dyn LLMClient>,
    retriever: Arc<dyn Retriever>,
    config: Option<Arc<QuireConfigManager>>,
    publisher: Option<Arc<dyn PublishTarget>>,
}

impl SessionService {
    pub fn new(store: SharedStore, llm: Arc<dyn LLMClient>, retriever: Arc<dyn Retriever>) -> Self {
        Self {
            repo: Arc::new(SessionRepository::new()),
            store,
            llm,
            retriever,
            config: None,
            publisher: None,
        }
    }

    /// Read call timeouts from a reloadable configuration. Each operation
    /// picks up the values current when it starts.
    pub fn with_config(mut self, config: Arc<QuireConfigManager>) -> Self {
        self.config = Some(config);
        self
    }

    pub fn call_timeouts(&self) -> CallTimeouts {
        match &self.config {
            Some(config) => config.config().timeouts.call_timeouts(),
            None => CallTimeouts::default(),
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn PublishTarget>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn repository(&self) -> &SessionRepository {
        &self.repo
    }

    fn context(&self, session_id: &str, cancel: CancellationToken) -> AgentContext {
        AgentContext::new(
            session_id,
            self.store.clone(),
            self.llm.clone(),
            self.retriever.clone(),
        )
        .with_cancel(cancel)
        .with_timeouts(self.call_timeouts())
    }

    async fn save_snapshot(&self, session: &Session) -> Result<()> {
        put_json(self.store.as_ref(), &session.id, keys::SESSION, session).await
    }

    async fn evidence(&self, session_id: &str) -> Result<Evidence> {
        let has_synthesis = self.store.get(session_id, keys::SYNTHESIS).await?.is_some();
        let version_count = versions::next_version_number(self.store.as_ref(), session_id).await? - 1;
        Ok(Evidence {
            has_synthesis,
            version_count,
        })
    }

    /// Check preconditions and enter the operation's active status in one step.
    async fn begin(
        &self,
        session_id: &str,
        op: Operation,
    ) -> Result<(Session, OperationGuard, CancellationToken)> {
        self.get(session_id).await?;
        let evidence = self.evidence(session_id).await?;

        let (session, previous) = self.repo.update(session_id, |s| {
            op.check(s.status, evidence)?;
            let previous = s.status;
            if let Some(active) = op.active_status() {
                s.status = active;
                s.touch();
            }
            Ok((s.clone(), previous))
        })?;
        let cancel = self.repo.cancel_token(session_id)?;

        info!(session_id, operation = %op, from = %previous, "Operation started");
        let guard = OperationGuard {
            repo: self.repo.clone(),
            session_id: session_id.to_string(),
            previous,
            armed: true,
        };
        Ok((session, guard, cancel))
    }

    /// Move to the operation's success status and persist the snapshot.
    async fn finish(
        &self,
        session_id: &str,
        op: Operation,
        guard: OperationGuard,
        apply: impl FnOnce(&mut Session),
    ) -> Result<Session> {
        let session = self.repo.update(session_id, |s| {
            apply(s);
            s.status = op.success_status();
            s.touch();
            Ok(s.clone())
        })?;
        guard.disarm();

        info!(session_id, operation = %op, status = %session.status, "Operation finished");
        self.save_snapshot(&session).await?;
        if !self.repo.contains(session_id) {
            self.store.clear(session_id).await?;
            return Err(AppError::Cancelled(format!("session {} was deleted", session_id)));
        }
        Ok(session)
    }

    pub async fn create(&self, request: CreateSessionRequest) -> Result<Session> {
        let topic = request.topic.trim();
        if topic.is_empty() {
            return Err(AppError::InvalidInput("topic must not be empty".to_string()));
        }
        let parameters = request.parameters.unwrap_or_default();
        parameters.validate()?;

        let session = Session::new(topic, parameters);
        self.save_snapshot(&session).await?;
        let session = self.repo.insert(session);

        info!(session_id = %session.id, topic = %session.topic, "Session created");
        Ok(session)
    }

    /// Live session, restored from its stored snapshot after a restart.
    pub async fn get(&self, session_id: &str) -> Result<Session> {
        if let Some(session) = self.repo.get(session_id) {
            return self.reconcile(session).await;
        }

        let not_found = || AppError::NotFound(format!("session {}", session_id));
        validate_session_id(session_id).map_err(|_| not_found())?;

        let mut session = get_json::<Session>(self.store.as_ref(), session_id, keys::SESSION)
            .await?
            .ok_or_else(not_found)?;
        versions::rehydrate(self.store.as_ref(), &mut session).await?;
        settle_status(&mut session);

        debug!(session_id, versions = session.versions.len(), "Session restored from store");
        Ok(self.repo.insert(session))
    }

    /// Bring the live version list in line with the store, which wins.
    ///
    /// A version write can land after its stream was dropped, in which case
    /// the stream never recorded it.
    async fn reconcile(&self, session: Session) -> Result<Session> {
        let stored = versions::next_version_number(self.store.as_ref(), &session.id).await? - 1;
        let known = session.versions.last().map_or(0, |v| v.version_number);
        if stored == known {
            return Ok(session);
        }

        let listed = versions::list_versions(self.store.as_ref(), &session.id).await?;
        let session = self.repo.update(&session.id, move |s| {
            s.versions = listed;
            settle_status(s);
            s.touch();
            Ok(s.clone())
        })?;

        warn!(
            session_id = %session.id,
            known,
            stored,
            status = %session.status,
            "Live versions reconciled with store"
        );
        Ok(session)
    }

    /// Run the full research phase. Progress is reported on `progress`
    /// when given.
    pub async fn start_research(
        &self,
        session_id: &str,
        progress: Option<ProgressSender>,
    ) -> Result<ResearchOutcome> {
        let (session, guard, cancel) = self.begin(session_id, Operation::Research).await?;

        let coordinator =
            ResearchCoordinator::new(self.context(session_id, cancel)).with_progress(progress);
        let outcome = match coordinator.research(&session).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(session_id, error = %e, "Research failed");
                return Err(e);
            }
        };

        let lead = AgentState {
            agent_id: "lead".to_string(),
            agent_type: "lead".to_string(),
            status: "complete".to_string(),
            current_task: format!(
                "{} round(s), {} of {} objectives succeeded",
                outcome.rounds, outcome.findings_succeeded, outcome.objectives_attempted
            ),
            tool_calls: 0,
            findings_count: outcome.findings_succeeded,
        };
        let complexity = outcome.complexity;
        self.finish(session_id, Operation::Research, guard, move |s| {
            s.complexity = complexity;
            s.agents.push(lead);
        })
        .await?;

        Ok(outcome)
    }

    /// Stream a new version generated from the research.
    pub async fn start_generation(&self, session_id: &str) -> Result<EventStream> {
        let (session, guard, cancel) = self.begin(session_id, Operation::Generate).await?;
        let agent = ContentProducer::state(&session, "complete");
        let inner = ContentProducer::new(self.context(session_id, cancel)).generate_stream(session);
        Ok(self.track(session_id, Operation::Generate, guard, inner, agent))
    }

    /// Stream a revision of the latest version.
    pub async fn submit_feedback(&self, session_id: &str, feedback: &str) -> Result<EventStream> {
        let feedback = feedback.trim();
        if feedback.is_empty() {
            return Err(AppError::InvalidInput("feedback must not be empty".to_string()));
        }

        let (_, guard, cancel) = self.begin(session_id, Operation::Iterate).await?;
        let agent = AgentState {
            agent_id: "iterator".to_string(),
            agent_type: "iterator".to_string(),
            status: "complete".to_string(),
            current_task: "applying feedback".to_string(),
            tool_calls: 0,
            findings_count: 0,
        };
        let inner =
            ContentReviser::new(self.context(session_id, cancel)).revise_stream(feedback.to_string());
        Ok(self.track(session_id, Operation::Iterate, guard, inner, agent))
    }

    /// Forward a content stream and settle the session status when it ends.
    ///
    /// The status is restored if the stream fails or is dropped early.
    fn track(
        &self,
        session_id: &str,
        op: Operation,
        guard: OperationGuard,
        inner: EventStream,
        agent: AgentState,
    ) -> EventStream {
        let service = self.clone();
        let session_id = session_id.to_string();

        let output = stream! {
            let mut guard = Some(guard);
            let mut inner = inner;

            while let Some(event) = inner.next().await {
                match event {
                    Ok(StreamEvent::Completed(version)) => {
                        if let Some(guard) = guard.take() {
                            let recorded = version.clone();
                            let mut agent = agent.clone();
                            let finished = service
                                .finish(&session_id, op, guard, move |s| {
                                    record_version(s, recorded);
                                    agent.findings_count = s.versions.len();
                                    s.agents.push(agent);
                                })
                                .await;
                            if let Err(e) = finished {
                                yield Err(e);
                                return;
                            }
                        }
                        yield Ok(StreamEvent::Completed(version));
                    }
                    Ok(event) => yield Ok(event),
                    Err(e) => {
                        warn!(session_id = %session_id, operation = %op, error = %e, "Operation failed");
                        yield Err(e);
                        return;
                    }
                }
            }
        };

        Box::pin(output)
    }

    pub async fn get_version(&self, session_id: &str, number: u32) -> Result<Version> {
        self.get(session_id).await?;
        get_json::<Version>(self.store.as_ref(), session_id, &keys::version(number))
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("version {} of session {}", number, session_id))
            })
    }

    pub async fn list_versions(&self, session_id: &str) -> Result<Vec<Version>> {
        self.get(session_id).await?;
        versions::list_versions(self.store.as_ref(), session_id).await
    }

    /// Cancel in-flight work and drop everything stored for the session.
    /// Deleting an unknown session is not an error.
    pub async fn delete(&self, session_id: &str) -> Result<()> {
        let removed = self.repo.remove(session_id).is_some();
        if validate_session_id(session_id).is_err() {
            return Ok(());
        }
        self.store.clear(session_id).await?;

        info!(session_id, removed, "Session deleted");
        Ok(())
    }

    /// Abort the running operation. Returns whether one was running.
    pub async fn cancel(&self, session_id: &str) -> Result<bool> {
        let session = self.get(session_id).await?;
        let busy = lifecycle::is_busy(session.status);
        self.repo.cancel(session_id);

        info!(session_id, busy, "Session cancelled");
        Ok(busy)
    }

    /// Publish the latest version to the configured target.
    pub async fn publish(&self, session_id: &str, status: PostStatus) -> Result<PublishReceipt> {
        let publisher = self
            .publisher
            .clone()
            .ok_or_else(|| AppError::Precondition("no publishing target configured".to_string()))?;

        let (session, guard, _) = self.begin(session_id, Operation::Publish).await?;
        let latest = versions::latest_version(self.store.as_ref(), session_id)
            .await?
            .ok_or_else(|| AppError::Precondition("nothing to publish".to_string()))?;

        let post = Post::from_markdown(&latest.content, &session.topic, status);
        let receipt = publisher
            .publish(&post)
            .await
            .map_err(|e| e.in_stage("publish", session_id))?;

        let agent = AgentState {
            agent_id: "publisher".to_string(),
            agent_type: "publisher".to_string(),
            status: receipt.status.clone(),
            current_task: format!("published version {} to {}", latest.version_number, publisher.name()),
            tool_calls: 1,
            findings_count: 0,
        };
        self.finish(session_id, Operation::Publish, guard, move |s| s.agents.push(agent))
            .await?;

        Ok(receipt)
    }
}

/// A stored version means generation finished, whatever the status says.
fn settle_status(session: &mut Session) {
    if session.status == SessionStatus::ReadyForGeneration && !session.versions.is_empty() {
        session.status = SessionStatus::ReadyForReview;
    }
}

fn record_version(session: &mut Session, version: Version) {
    if session
        .versions
        .iter()
        .all(|v| v.version_number != version.version_number)
    {
        session.versions.push(version);
        session.versions.sort_by_key(|v| v.version_number);
    }
}
