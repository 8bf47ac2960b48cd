//! The version ledger: gapless `versions/v<n>` entries in the coordination store.
//!
//! The store is the source of truth. A session's in-memory list is only a
//! cache and can be rebuilt at any time with [`rehydrate`].

use super::{AgentContext, StreamEvent};
use crate::memory::{get_json, keys, CoordinationStore};
use crate::types::{Result, Session, Version};
use async_stream::stream;
use chrono::Utc;
use futures::Stream;
use tracing::{debug, info};

/// Sequence number encoded in a `versions/v<n>` key.
pub fn parse_version_key(key: &str) -> Option<u32> {
    key.strip_prefix(keys::VERSIONS_PREFIX)?
        .strip_prefix('v')?
        .parse()
        .ok()
        .filter(|n| *n > 0)
}

/// All stored versions, ordered by sequence number.
pub async fn list_versions(store: &dyn CoordinationStore, session_id: &str) -> Result<Vec<Version>> {
    let mut numbered: Vec<(u32, String)> = store
        .list_keys(session_id, keys::VERSIONS_PREFIX)
        .await?
        .into_iter()
        .filter_map(|key| parse_version_key(&key).map(|n| (n, key)))
        .collect();
    numbered.sort_by_key(|(n, _)| *n);

    let mut versions = Vec::with_capacity(numbered.len());
    for (_, key) in numbered {
        if let Some(version) = get_json::<Version>(store, session_id, &key).await? {
            versions.push(version);
        }
    }
    Ok(versions)
}

pub async fn latest_version(
    store: &dyn CoordinationStore,
    session_id: &str,
) -> Result<Option<Version>> {
    let latest = store
        .list_keys(session_id, keys::VERSIONS_PREFIX)
        .await?
        .iter()
        .filter_map(|key| parse_version_key(key))
        .max();

    match latest {
        Some(n) => get_json(store, session_id, &keys::version(n)).await,
        None => Ok(None),
    }
}

/// Store max + 1.
pub async fn next_version_number(store: &dyn CoordinationStore, session_id: &str) -> Result<u32> {
    let max = store
        .list_keys(session_id, keys::VERSIONS_PREFIX)
        .await?
        .iter()
        .filter_map(|key| parse_version_key(key))
        .max()
        .unwrap_or(0);
    Ok(max + 1)
}

/// Persist `content` as the next version of the context's session.
pub async fn append_version(
    ctx: &AgentContext,
    content: String,
    feedback_applied: Option<String>,
) -> Result<Version> {
    let number = next_version_number(ctx.store.as_ref(), &ctx.session_id).await?;
    let version = Version {
        version_number: number,
        content,
        generated_at: Utc::now(),
        feedback_applied,
    };
    ctx.persist(&keys::version(number), &version).await?;

    info!(
        session_id = %ctx.session_id,
        version = number,
        chars = version.content.len(),
        "Version saved"
    );
    Ok(version)
}

/// Replace the session's cached versions with what the store holds.
///
/// Idempotent: calling it twice leaves the same list.
pub async fn rehydrate(store: &dyn CoordinationStore, session: &mut Session) -> Result<()> {
    session.versions = list_versions(store, &session.id).await?;
    debug!(session_id = %session.id, versions = session.versions.len(), "Versions rehydrated");
    Ok(())
}

/// Stream a completion, forwarding each fragment, then persist the drained
/// text once as the next version.
///
/// Nothing is written if the stream fails, is cancelled, or is dropped
/// before it finishes.
pub fn stream_version(
    ctx: AgentContext,
    stage: &'static str,
    prompt: String,
    max_tokens: u32,
    feedback_applied: Option<String>,
) -> impl Stream<Item = Result<StreamEvent>> + Send {
    stream! {
        let mut text = match ctx.open_stream(stage, &prompt, max_tokens).await {
            Ok(text) => text,
            Err(e) => {
                yield Err(e.in_stage(stage, &ctx.session_id));
                return;
            }
        };

        let mut body = String::new();
        loop {
            match ctx.next_fragment(stage, &mut text).await {
                Ok(Some(fragment)) => {
                    body.push_str(&fragment);
                    yield Ok(StreamEvent::Fragment(fragment));
                }
                Ok(None) => break,
                Err(e) => {
                    yield Err(e.in_stage(stage, &ctx.session_id));
                    return;
                }
            }
        }

        match append_version(&ctx, body, feedback_applied).await {
            Ok(version) => yield Ok(StreamEvent::Completed(version)),
            Err(e) => yield Err(e.in_stage(stage, &ctx.session_id)),
        }
    }
}
