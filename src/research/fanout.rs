//! Concurrent execution of research workers with per-worker failure isolation.

use super::worker::ResearchWorker;
use super::{ProgressSender, ResearchProgress};
use crate::agents::AgentContext;
use crate::memory::keys;
use crate::types::{AppError, Finding, Objective, Result};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Outcome of one fan-out: the successful findings and how many ran.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FanOutReport {
    pub findings: Vec<Finding>,
    pub attempted: usize,
}

impl FanOutReport {
    pub fn succeeded(&self) -> usize {
        self.findings.len()
    }

    pub fn failed(&self) -> usize {
        self.attempted - self.findings.len()
    }
}

#[derive(Clone)]
pub struct FanOutExecutor {
    ctx: AgentContext,
    progress: Option<ProgressSender>,
}

impl FanOutExecutor {
    pub fn new(ctx: AgentContext) -> Self {
        Self {
            ctx,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressSender>) -> Self {
        self.progress = progress;
        self
    }

    fn emit(&self, event: ResearchProgress) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(event);
        }
    }

    /// Run one worker per objective concurrently.
    ///
    /// A failing worker only loses its own finding; its error record is
    /// still in the store. Store failures and cancellation abort every
    /// worker still running and are returned as errors.
    pub async fn run_all(&self, objectives: Vec<Objective>) -> Result<FanOutReport> {
        let attempted = objectives.len();
        self.ctx.ensure_active("fan_out")?;

        let mut set = JoinSet::new();
        for objective in objectives {
            let worker = ResearchWorker::new(objective.clone(), self.ctx.clone());
            let agent_id = worker.agent_id().to_string();

            set.spawn(async move {
                let outcome = AssertUnwindSafe(worker.execute()).catch_unwind().await;
                (agent_id, objective, outcome)
            });
        }

        info!(
            session_id = %self.ctx.session_id,
            workers = attempted,
            "Fan-out started"
        );

        let mut findings = Vec::with_capacity(attempted);
        loop {
            let joined = tokio::select! {
                biased;
                _ = self.ctx.cancel.cancelled() => {
                    set.abort_all();
                    return Err(AppError::Cancelled(format!(
                        "fan-out cancelled for session {}",
                        self.ctx.session_id
                    )));
                }
                next = set.join_next() => next,
            };

            let Some(joined) = joined else {
                break;
            };

            match joined {
                Ok((agent_id, _, Ok(Ok(finding)))) => {
                    self.emit(ResearchProgress::WorkerCompleted {
                        agent_id,
                        succeeded: true,
                    });
                    findings.push(finding);
                }
                Ok((agent_id, _, Ok(Err(err)))) => {
                    if err.is_fatal() {
                        set.abort_all();
                        return Err(err);
                    }
                    warn!(agent_id = %agent_id, error = %err, "Research worker omitted from results");
                    self.emit(ResearchProgress::WorkerCompleted {
                        agent_id,
                        succeeded: false,
                    });
                }
                Ok((agent_id, objective, Err(panic))) => {
                    let message = panic_message(panic.as_ref());
                    error!(agent_id = %agent_id, panic = %message, "Research worker panicked");

                    let failed = Finding::failed(
                        &agent_id,
                        &objective.description,
                        format!("worker panicked: {}", message),
                        0,
                    );
                    if let Err(err) = self.ctx.persist(&keys::research(&agent_id), &failed).await {
                        set.abort_all();
                        return Err(err);
                    }
                    self.emit(ResearchProgress::WorkerCompleted {
                        agent_id,
                        succeeded: false,
                    });
                }
                Err(join_err) => {
                    error!(error = %join_err, "Research worker task aborted");
                }
            }
        }

        info!(
            session_id = %self.ctx.session_id,
            succeeded = findings.len(),
            attempted,
            "Fan-out finished"
        );

        Ok(FanOutReport {
            findings,
            attempted,
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
