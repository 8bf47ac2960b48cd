//! Session state machine.
//!
//! ```text
//! created -> researching -> ready_for_generation -> generating -> ready_for_review
//!                                   ^                                  |   ^
//!                                   |                                  v   |
//!                                   +-------- (regenerate) ------- iterating
//!                                                                      |
//!                                                   ready_for_review -> published
//! ```

use crate::types::{AppError, Result, SessionStatus};
use std::fmt;

/// A long-running operation that moves a session through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Research,
    Generate,
    Iterate,
    Publish,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Operation::Research => "research",
            Operation::Generate => "generate",
            Operation::Iterate => "iterate",
            Operation::Publish => "publish",
        };
        f.write_str(label)
    }
}

/// What the coordination store currently holds for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Evidence {
    pub has_synthesis: bool,
    pub version_count: u32,
}

impl Operation {
    pub fn allowed_from(self) -> &'static [SessionStatus] {
        match self {
            Operation::Research => &[SessionStatus::Created],
            Operation::Generate => &[
                SessionStatus::ReadyForGeneration,
                SessionStatus::ReadyForReview,
            ],
            Operation::Iterate | Operation::Publish => &[SessionStatus::ReadyForReview],
        }
    }

    /// Status held while the operation runs, if it has one.
    pub fn active_status(self) -> Option<SessionStatus> {
        match self {
            Operation::Research => Some(SessionStatus::Researching),
            Operation::Generate => Some(SessionStatus::Generating),
            Operation::Iterate => Some(SessionStatus::Iterating),
            Operation::Publish => None,
        }
    }

    pub fn success_status(self) -> SessionStatus {
        match self {
            Operation::Research => SessionStatus::ReadyForGeneration,
            Operation::Generate | Operation::Iterate => SessionStatus::ReadyForReview,
            Operation::Publish => SessionStatus::Published,
        }
    }

    /// Reject the operation unless `status` and `evidence` allow it.
    pub fn check(self, status: SessionStatus, evidence: Evidence) -> Result<()> {
        if !self.allowed_from().contains(&status) {
            return Err(AppError::Precondition(format!(
                "cannot {} a session that is {}",
                self, status
            )));
        }

        match self {
            Operation::Generate if !evidence.has_synthesis => Err(AppError::Precondition(
                "generation requires completed research".to_string(),
            )),
            Operation::Iterate | Operation::Publish if evidence.version_count == 0 => {
                Err(AppError::Precondition(format!(
                    "cannot {} before any content version exists",
                    self
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Whether an operation is currently running in this status.
pub fn is_busy(status: SessionStatus) -> bool {
    matches!(
        status,
        SessionStatus::Researching | SessionStatus::Generating | SessionStatus::Iterating
    )
}
