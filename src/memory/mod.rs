//! Coordination store shared by every agent of a session.
//!
//! Each component writes its results under its own key namespace and later
//! stages read them back directly instead of receiving them through a chain
//! of agents:
//! - `research/<agent_id>` - one finding per worker invocation
//! - `plan`, `synthesis` - written by the research coordinator
//! - `outline` - written by the content producer
//! - `versions/v<n>` - the version ledger
//! - `session` - the session snapshot
//!
//! The store does no merging or locking. Writes are atomic per key.

pub mod fs;
pub mod in_memory;

pub use fs::FileStore;
pub use in_memory::InMemoryStore;

use crate::types::{AppError, Finding, Result, SourceRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Well-known keys and key builders.
pub mod keys {
    pub const RESEARCH_PREFIX: &str = "research/";
    pub const VERSIONS_PREFIX: &str = "versions/";
    pub const PLAN: &str = "plan";
    pub const SYNTHESIS: &str = "synthesis";
    pub const OUTLINE: &str = "outline";
    pub const SESSION: &str = "session";

    pub fn research(agent_id: &str) -> String {
        format!("{}{}", RESEARCH_PREFIX, agent_id)
    }

    pub fn version(number: u32) -> String {
        format!("{}v{}", VERSIONS_PREFIX, number)
    }
}

/// Persisted form of one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub data: Value,
    pub saved_at: DateTime<Utc>,
    pub key: String,
}

impl Envelope {
    pub fn new(key: &str, data: Value) -> Self {
        Self {
            data,
            saved_at: Utc::now(),
            key: key.to_string(),
        }
    }
}

/// Key-value store partitioned by session.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Write `value` at `key`, replacing any previous value atomically.
    async fn put(&self, session_id: &str, key: &str, value: &Value) -> Result<()>;

    /// Read the value at `key`, or `None` when absent.
    async fn get(&self, session_id: &str, key: &str) -> Result<Option<Value>>;

    /// All keys starting with `prefix`, sorted.
    async fn list_keys(&self, session_id: &str, prefix: &str) -> Result<Vec<String>>;

    /// Remove one entry. Removing an absent key is a no-op.
    async fn remove(&self, session_id: &str, key: &str) -> Result<()>;

    /// Remove every entry of the session. Clearing an absent session is a no-op.
    async fn clear(&self, session_id: &str) -> Result<()>;
}

pub type SharedStore = Arc<dyn CoordinationStore>;

/// Reject keys that could escape the session partition.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(AppError::InvalidInput("Store key must not be empty".to_string()));
    }
    if key.starts_with('/') || key.contains('\\') {
        return Err(AppError::InvalidInput(format!(
            "Store key '{}' must be a relative '/'-separated path",
            key
        )));
    }
    for segment in key.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(AppError::InvalidInput(format!(
                "Store key '{}' contains an invalid segment",
                key
            )));
        }
    }
    Ok(())
}

/// Session ids share the key rules but may not nest.
pub fn validate_session_id(session_id: &str) -> Result<()> {
    validate_key(session_id)?;
    if session_id.contains('/') {
        return Err(AppError::InvalidInput(format!(
            "Session id '{}' must not contain '/'",
            session_id
        )));
    }
    Ok(())
}

/// Serialize and store a typed record.
pub async fn put_json<T: Serialize + ?Sized>(
    store: &dyn CoordinationStore,
    session_id: &str,
    key: &str,
    value: &T,
) -> Result<()> {
    let value = serde_json::to_value(value)
        .map_err(|e| AppError::Storage(format!("Failed to serialize '{}': {}", key, e)))?;
    store.put(session_id, key, &value).await
}

/// Load and deserialize a typed record.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn CoordinationStore,
    session_id: &str,
    key: &str,
) -> Result<Option<T>> {
    match store.get(session_id, key).await? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| AppError::Storage(format!("Malformed entry at '{}': {}", key, e))),
        None => Ok(None),
    }
}

/// Everything the research workers of a session have recorded so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedResearch {
    /// Summary bodies of the successful findings, in key order
    pub findings: Vec<String>,
    pub sources: Vec<SourceRecord>,
    pub total_sources: usize,
    /// Number of error findings that were skipped
    pub failed: usize,
}

impl AggregatedResearch {
    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Read every `research/` entry of a session, skipping error findings.
pub async fn aggregate_research(
    store: &dyn CoordinationStore,
    session_id: &str,
) -> Result<AggregatedResearch> {
    let mut aggregated = AggregatedResearch::default();

    for key in store.list_keys(session_id, keys::RESEARCH_PREFIX).await? {
        let Some(finding) = get_json::<Finding>(store, session_id, &key).await? else {
            continue;
        };
        if finding.is_error() {
            aggregated.failed += 1;
            continue;
        }
        aggregated.total_sources += finding.sources.len();
        aggregated.sources.extend(finding.sources);
        aggregated.findings.push(finding.summary);
    }

    Ok(aggregated)
}
