//! In-process coordination store, used by tests and ephemeral deployments.

use super::{validate_key, validate_session_id, CoordinationStore, Envelope};
use crate::types::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
pub struct InMemoryStore {
    sessions: RwLock<HashMap<String, BTreeMap<String, Envelope>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full envelope including the write timestamp.
    pub fn envelope(&self, session_id: &str, key: &str) -> Option<Envelope> {
        self.sessions
            .read()
            .get(session_id)
            .and_then(|entries| entries.get(key).cloned())
    }
}

#[async_trait]
impl CoordinationStore for InMemoryStore {
    async fn put(&self, session_id: &str, key: &str, value: &Value) -> Result<()> {
        validate_session_id(session_id)?;
        validate_key(key)?;

        self.sessions
            .write()
            .entry(session_id.to_string())
            .or_default()
            .insert(key.to_string(), Envelope::new(key, value.clone()));
        Ok(())
    }

    async fn get(&self, session_id: &str, key: &str) -> Result<Option<Value>> {
        validate_session_id(session_id)?;
        validate_key(key)?;

        Ok(self.envelope(session_id, key).map(|e| e.data))
    }

    async fn list_keys(&self, session_id: &str, prefix: &str) -> Result<Vec<String>> {
        validate_session_id(session_id)?;

        Ok(self
            .sessions
            .read()
            .get(session_id)
            .map(|entries| {
                entries
                    .keys()
                    .filter(|k| k.starts_with(prefix))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn remove(&self, session_id: &str, key: &str) -> Result<()> {
        validate_session_id(session_id)?;
        validate_key(key)?;

        let mut sessions = self.sessions.write();
        if let Some(entries) = sessions.get_mut(session_id) {
            entries.remove(key);
            if entries.is_empty() {
                sessions.remove(session_id);
            }
        }
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> Result<()> {
        validate_session_id(session_id)?;

        self.sessions.write().remove(session_id);
        Ok(())
    }
}
