mod common;

use async_trait::async_trait;
use common::mocks::{MockLLMClient, MockRetriever, Reply};
use common::*;
use futures::StreamExt;
use parking_lot::Mutex;
use quire::agents::{EventStream, StreamEvent};
use quire::memory::{keys, CoordinationStore, SharedStore};
use quire::publish::{Post, PostStatus, PublishReceipt, PublishTarget};
use quire::types::{
    AppError, CreateSessionRequest, GenerationParameters, Result, SessionStatus,
};
use quire::{FileStore, InMemoryStore, QuireConfigManager, SessionService};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const PLAN: &str = r#"[{"objective": "Basics", "search_queries": ["cdn basics", "cdn intro", "cdn internals"]}]"#;
const BODY: &str = "# Edge Caching Explained\n\nCaches sit close to readers.";

fn scripted() -> MockLLMClient {
    MockLLMClient::new("unused")
        .on(CLASSIFY, "MODERATE")
        .on(DECOMPOSE, PLAN)
        .on(EVALUATE, "0, 1")
        .on(WORKER_SYNTHESIS, "Worker summary")
        .on(SYNTHESIZE, "Overall synthesis")
        .on(GAP_CHECK, "NO")
        .on(OUTLINE, "1. Intro")
        .on(WRITE, BODY)
        .on(ANALYZE_FEEDBACK, r#"{"action": "REWRITE", "specific_changes": "Shorter"}"#)
        .on(REVISE, "# Edge Caching\n\nShorter.")
}

fn service_with(llm: MockLLMClient, store: SharedStore) -> SessionService {
    SessionService::new(store, Arc::new(llm), Arc::new(MockRetriever::new(2)))
}

fn service(llm: MockLLMClient) -> (SessionService, SharedStore) {
    let store: SharedStore = Arc::new(InMemoryStore::new());
    (service_with(llm, store.clone()), store)
}

fn request(topic: &str) -> CreateSessionRequest {
    CreateSessionRequest {
        topic: topic.to_string(),
        parameters: None,
    }
}

async fn drain(mut stream: EventStream) -> Vec<Result<StreamEvent>> {
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event);
    }
    events
}

async fn status(service: &SessionService, id: &str) -> SessionStatus {
    service.get(id).await.unwrap().status
}

/// Session that has completed research and one generation.
async fn reviewed_session(service: &SessionService) -> String {
    let id = service.create(request("edge caching")).await.unwrap().id;
    service.start_research(&id, None).await.unwrap();
    let events = drain(service.start_generation(&id).await.unwrap()).await;
    assert!(events.iter().all(|e| e.is_ok()));
    id
}

#[derive(Default)]
struct RecordingPublisher {
    posts: Mutex<Vec<Post>>,
}

#[async_trait]
impl PublishTarget for RecordingPublisher {
    async fn publish(&self, post: &Post) -> Result<PublishReceipt> {
        self.posts.lock().push(post.clone());
        Ok(PublishReceipt {
            id: 7,
            url: "https://blog.example.com/?p=7".to_string(),
            edit_url: "https://blog.example.com/wp-admin/post.php?post=7&action=edit".to_string(),
            status: post.status.to_string(),
        })
    }

    fn name(&self) -> &str {
        "recording"
    }
}

// ============= Creation =============

#[tokio::test]
async fn test_create_validates_input() {
    let (service, _) = service(scripted());

    assert!(matches!(
        service.create(request("   ")).await,
        Err(AppError::InvalidInput(_))
    ));

    let params = GenerationParameters {
        word_count: 50,
        ..Default::default()
    };
    let result = service
        .create(CreateSessionRequest {
            topic: "edge caching".to_string(),
            parameters: Some(params),
        })
        .await;
    assert!(matches!(result, Err(AppError::InvalidInput(_))));
    assert!(service.repository().is_empty());
}

#[tokio::test]
async fn test_created_session_is_readable() {
    let (service, store) = service(scripted());
    let session = service.create(request("  edge caching ")).await.unwrap();

    assert_eq!(session.topic, "edge caching");
    assert_eq!(session.status, SessionStatus::Created);
    assert_eq!(service.get(&session.id).await.unwrap().id, session.id);
    assert!(store.get(&session.id, keys::SESSION).await.unwrap().is_some());
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let (service, _) = service(scripted());
    assert!(matches!(
        service.get("missing").await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        service.get("../escape").await,
        Err(AppError::NotFound(_))
    ));
}

// ============= Full lifecycle =============

#[tokio::test]
async fn test_full_lifecycle() {
    let (service, _) = service(scripted());
    let id = service.create(request("edge caching")).await.unwrap().id;

    let outcome = service.start_research(&id, None).await.unwrap();
    assert_eq!(outcome.synthesis.content, "Overall synthesis");
    let session = service.get(&id).await.unwrap();
    assert_eq!(session.status, SessionStatus::ReadyForGeneration);
    assert_eq!(session.complexity, quire::types::Complexity::Moderate);

    let events = drain(service.start_generation(&id).await.unwrap()).await;
    assert!(matches!(events.last(), Some(Ok(StreamEvent::Completed(v))) if v.version_number == 1));
    assert_eq!(status(&service, &id).await, SessionStatus::ReadyForReview);

    let events = drain(service.submit_feedback(&id, "Make it shorter").await.unwrap()).await;
    assert!(matches!(events.last(), Some(Ok(StreamEvent::Completed(v))) if v.version_number == 2));

    let session = service.get(&id).await.unwrap();
    assert_eq!(session.status, SessionStatus::ReadyForReview);
    let numbers: Vec<u32> = session.versions.iter().map(|v| v.version_number).collect();
    assert_eq!(numbers, vec![1, 2]);

    let listed = service.list_versions(&id).await.unwrap();
    assert_eq!(listed.len(), 2);
    let second = service.get_version(&id, 2).await.unwrap();
    assert_eq!(second.feedback_applied.as_deref(), Some("Make it shorter"));
    assert!(matches!(
        service.get_version(&id, 3).await,
        Err(AppError::NotFound(_))
    ));

    // regenerating from review adds a third version
    drain(service.start_generation(&id).await.unwrap()).await;
    assert_eq!(service.list_versions(&id).await.unwrap().len(), 3);
}

// ============= Preconditions =============

#[tokio::test]
async fn test_generate_before_research_is_rejected() {
    let (service, _) = service(scripted());
    let id = service.create(request("edge caching")).await.unwrap().id;

    assert!(matches!(
        service.start_generation(&id).await,
        Err(AppError::Precondition(_))
    ));
    assert!(matches!(
        service.submit_feedback(&id, "more").await,
        Err(AppError::Precondition(_))
    ));
    assert_eq!(status(&service, &id).await, SessionStatus::Created);
}

#[tokio::test]
async fn test_research_twice_is_rejected() {
    let (service, _) = service(scripted());
    let id = service.create(request("edge caching")).await.unwrap().id;
    service.start_research(&id, None).await.unwrap();

    assert!(matches!(
        service.start_research(&id, None).await,
        Err(AppError::Precondition(_))
    ));
    assert_eq!(status(&service, &id).await, SessionStatus::ReadyForGeneration);
}

#[tokio::test]
async fn test_empty_feedback_is_rejected() {
    let (service, _) = service(scripted());
    let id = reviewed_session(&service).await;

    assert!(matches!(
        service.submit_feedback(&id, "  ").await,
        Err(AppError::InvalidInput(_))
    ));
    assert_eq!(status(&service, &id).await, SessionStatus::ReadyForReview);
}

// ============= Failure and cancellation =============

#[tokio::test]
async fn test_failed_research_restores_status() {
    let (service, _) = service(scripted().fail_on(CLASSIFY));
    let id = service.create(request("edge caching")).await.unwrap().id;

    assert!(matches!(
        service.start_research(&id, None).await,
        Err(AppError::LLM(_))
    ));
    assert_eq!(status(&service, &id).await, SessionStatus::Created);
}

#[tokio::test]
async fn test_broken_generation_restores_status() {
    let llm = scripted().reply(WRITE, Reply::BreakStream(BODY.to_string()));
    let (service, store) = service(llm);
    let id = service.create(request("edge caching")).await.unwrap().id;
    service.start_research(&id, None).await.unwrap();

    let events = drain(service.start_generation(&id).await.unwrap()).await;
    assert!(matches!(events.last(), Some(Err(AppError::LLM(_)))));

    assert_eq!(status(&service, &id).await, SessionStatus::ReadyForGeneration);
    assert!(store
        .list_keys(&id, keys::VERSIONS_PREFIX)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_dropped_generation_restores_status() {
    let (service, _) = service(scripted());
    let id = service.create(request("edge caching")).await.unwrap().id;
    service.start_research(&id, None).await.unwrap();

    let mut stream = service.start_generation(&id).await.unwrap();
    assert!(matches!(stream.next().await, Some(Ok(StreamEvent::Outline(_)))));
    assert_eq!(status(&service, &id).await, SessionStatus::Generating);
    drop(stream);

    assert_eq!(status(&service, &id).await, SessionStatus::ReadyForGeneration);
    assert!(service.list_versions(&id).await.unwrap().is_empty());
}

/// Commits version writes, then never returns from them.
struct StallAfterVersionWrite {
    inner: InMemoryStore,
}

#[async_trait]
impl CoordinationStore for StallAfterVersionWrite {
    async fn put(&self, session_id: &str, key: &str, value: &Value) -> Result<()> {
        self.inner.put(session_id, key, value).await?;
        if key.starts_with(keys::VERSIONS_PREFIX) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn get(&self, session_id: &str, key: &str) -> Result<Option<Value>> {
        self.inner.get(session_id, key).await
    }

    async fn list_keys(&self, session_id: &str, prefix: &str) -> Result<Vec<String>> {
        self.inner.list_keys(session_id, prefix).await
    }

    async fn remove(&self, session_id: &str, key: &str) -> Result<()> {
        self.inner.remove(session_id, key).await
    }

    async fn clear(&self, session_id: &str) -> Result<()> {
        self.inner.clear(session_id).await
    }
}

#[tokio::test]
async fn test_version_written_by_dropped_stream_is_picked_up() {
    let store: SharedStore = Arc::new(StallAfterVersionWrite {
        inner: InMemoryStore::new(),
    });
    let service = service_with(scripted(), store);
    let id = service.create(request("edge caching")).await.unwrap().id;
    service.start_research(&id, None).await.unwrap();

    let mut stream = service.start_generation(&id).await.unwrap();
    let mut fragments = 0;
    loop {
        match tokio::time::timeout(Duration::from_millis(200), stream.next()).await {
            Ok(Some(Ok(StreamEvent::Fragment(_)))) => fragments += 1,
            Ok(Some(Ok(_))) => {}
            Ok(other) => panic!("stream ended before the version write: {:?}", other),
            // stuck inside the version write
            Err(_) => break,
        }
    }
    assert!(fragments > 0);
    drop(stream);

    let session = service.get(&id).await.unwrap();
    assert_eq!(session.versions.len(), 1);
    assert_eq!(session.versions[0].content, BODY);
    assert_eq!(session.status, SessionStatus::ReadyForReview);
    assert_eq!(service.list_versions(&id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_reloaded_timeouts_apply_to_next_operation() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("quire.toml");
    std::fs::write(&path, "[timeouts]\ncompletion_secs = 120\n").unwrap();
    let config = Arc::new(QuireConfigManager::new(&path).unwrap());

    let (service, _) = service(scripted().hang_on(CLASSIFY));
    let service = service.with_config(config.clone());
    assert_eq!(service.call_timeouts().completion, Duration::from_secs(120));

    std::fs::write(&path, "[timeouts]\ncompletion_secs = 1\n").unwrap();
    config.reload().unwrap();
    assert_eq!(service.call_timeouts().completion, Duration::from_secs(1));

    let id = service.create(request("edge caching")).await.unwrap().id;
    let result = service.start_research(&id, None).await;
    assert!(matches!(result, Err(AppError::Timeout(_))));
    assert_eq!(status(&service, &id).await, SessionStatus::Created);
}

#[tokio::test]
async fn test_cancel_during_generation() {
    let (service, store) = service(scripted().hang_on(WRITE));
    let id = service.create(request("edge caching")).await.unwrap().id;
    service.start_research(&id, None).await.unwrap();

    let stream = service.start_generation(&id).await.unwrap();
    let consumer = tokio::spawn(drain(stream));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(service.cancel(&id).await.unwrap());

    let events = consumer.await.unwrap();
    assert!(matches!(events.last(), Some(Err(AppError::Cancelled(_)))));
    assert_eq!(status(&service, &id).await, SessionStatus::ReadyForGeneration);
    assert!(store
        .list_keys(&id, keys::VERSIONS_PREFIX)
        .await
        .unwrap()
        .is_empty());

    // a fresh token lets the session continue
    assert!(!service.cancel(&id).await.unwrap());
}

#[tokio::test]
async fn test_cancel_during_research() {
    let (service, _) = service(scripted().hang_on(WORKER_SYNTHESIS));
    let id = service.create(request("edge caching")).await.unwrap().id;

    let task = {
        let service = service.clone();
        let id = id.clone();
        tokio::spawn(async move { service.start_research(&id, None).await })
    };

    for _ in 0..100 {
        if status(&service, &id).await == SessionStatus::Researching {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(service.cancel(&id).await.unwrap());

    let result = task.await.unwrap();
    assert!(matches!(result, Err(AppError::Cancelled(_))));
    assert_eq!(status(&service, &id).await, SessionStatus::Created);
}

// ============= Delete and restore =============

#[tokio::test]
async fn test_delete_is_idempotent() {
    let (service, store) = service(scripted());
    let id = reviewed_session(&service).await;

    service.delete(&id).await.unwrap();
    service.delete(&id).await.unwrap();
    service.delete("never-existed").await.unwrap();

    assert!(matches!(service.get(&id).await, Err(AppError::NotFound(_))));
    assert!(store.list_keys(&id, "").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_session_restored_after_restart() {
    let dir = TempDir::new().unwrap();
    let id = {
        let service = service_with(scripted(), Arc::new(FileStore::new(dir.path())));
        reviewed_session(&service).await
    };

    let restarted = service_with(scripted(), Arc::new(FileStore::new(dir.path())));
    let session = restarted.get(&id).await.unwrap();

    assert_eq!(session.status, SessionStatus::ReadyForReview);
    assert_eq!(session.versions.len(), 1);
    assert_eq!(session.versions[0].content, BODY);

    // the restored session keeps working
    let events = drain(restarted.submit_feedback(&id, "Shorter please").await.unwrap()).await;
    assert!(matches!(events.last(), Some(Ok(StreamEvent::Completed(v))) if v.version_number == 2));
}

// ============= Publish =============

#[tokio::test]
async fn test_publish_without_target_is_precondition() {
    let (service, _) = service(scripted());
    let id = reviewed_session(&service).await;

    assert!(matches!(
        service.publish(&id, PostStatus::Draft).await,
        Err(AppError::Precondition(_))
    ));
    assert_eq!(status(&service, &id).await, SessionStatus::ReadyForReview);
}

#[tokio::test]
async fn test_publish_latest_version() {
    let publisher = Arc::new(RecordingPublisher::default());
    let (service, _) = service(scripted());
    let service = service.with_publisher(publisher.clone());
    let id = reviewed_session(&service).await;

    let receipt = service.publish(&id, PostStatus::Publish).await.unwrap();
    assert_eq!(receipt.id, 7);
    assert_eq!(receipt.status, "publish");

    let posts = publisher.posts.lock().clone();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].title, "Edge Caching Explained");
    assert!(posts[0].html.contains("Caches sit close to readers."));

    assert_eq!(status(&service, &id).await, SessionStatus::Published);
    assert!(matches!(
        service.start_generation(&id).await,
        Err(AppError::Precondition(_))
    ));
    assert!(matches!(
        service.publish(&id, PostStatus::Draft).await,
        Err(AppError::Precondition(_))
    ));
}

#[tokio::test]
async fn test_publish_before_generation_is_rejected() {
    let publisher = Arc::new(RecordingPublisher::default());
    let (service, _) = service(scripted());
    let service = service.with_publisher(publisher.clone());
    let id = service.create(request("edge caching")).await.unwrap().id;
    service.start_research(&id, None).await.unwrap();

    assert!(matches!(
        service.publish(&id, PostStatus::Draft).await,
        Err(AppError::Precondition(_))
    ));
    assert!(publisher.posts.lock().is_empty());
}
