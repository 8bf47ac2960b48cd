use crate::types::{AppError, Result, Session};
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

struct Entry {
    session: Session,
    cancel: CancellationToken,
}

/// Live sessions of one server instance.
#[derive(Default)]
pub struct SessionRepository {
    entries: RwLock<HashMap<String, Entry>>,
}

impl SessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session, keeping the existing one if the id is taken.
    pub fn insert(&self, session: Session) -> Session {
        let mut entries = self.entries.write();
        entries
            .entry(session.id.clone())
            .or_insert_with(|| Entry {
                session,
                cancel: CancellationToken::new(),
            })
            .session
            .clone()
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        self.entries.read().get(id).map(|e| e.session.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().contains_key(id)
    }

    /// Mutate a session in place under the write lock.
    pub fn update<T>(&self, id: &str, f: impl FnOnce(&mut Session) -> Result<T>) -> Result<T> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("session {}", id)))?;
        f(&mut entry.session)
    }

    /// Token that aborts work started for this session from now on.
    pub fn cancel_token(&self, id: &str) -> Result<CancellationToken> {
        self.entries
            .read()
            .get(id)
            .map(|e| e.cancel.clone())
            .ok_or_else(|| AppError::NotFound(format!("session {}", id)))
    }

    /// Cancel in-flight work and arm a fresh token for the next operation.
    pub fn cancel(&self, id: &str) -> bool {
        let mut entries = self.entries.write();
        match entries.get_mut(id) {
            Some(entry) => {
                entry.cancel.cancel();
                entry.cancel = CancellationToken::new();
                true
            }
            None => false,
        }
    }

    /// Remove a session and cancel whatever it was doing.
    pub fn remove(&self, id: &str) -> Option<Session> {
        let entry = self.entries.write().remove(id)?;
        entry.cancel.cancel();
        Some(entry.session)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
