mod common;

use common::mocks::{MockLLMClient, MockRetriever};
use common::*;
use quire::memory::{get_json, keys, CoordinationStore};
use quire::research::coordinator::{synthesis_prompt, NO_FINDINGS_SYNTHESIS};
use quire::research::{FanOutExecutor, ResearchCoordinator, ResearchProgress, ResearchWorker};
use quire::types::{AppError, Complexity, Finding, Objective, ResearchPlan, Synthesis};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const ONE_OBJECTIVE_PLAN: &str = r#"[{"objective": "Core concepts", "search_queries": ["core a", "core b", "core c"], "tool_guidance": ""}]"#;

fn objective(name: &str) -> Objective {
    Objective::new(
        name,
        vec![
            format!("{} one", name),
            format!("{} two", name),
            format!("{} three", name),
        ],
    )
}

// ============= Worker =============

#[tokio::test]
async fn test_worker_narrows_when_selection_is_short() {
    let llm = Arc::new(
        MockLLMClient::new("unused")
            .on(EVALUATE, "0, 2")
            .on(WORKER_SYNTHESIS, "Finding body"),
    );
    let retriever = Arc::new(MockRetriever::new(3));
    let (ctx, store) = context("s1", llm.clone(), retriever.clone());

    let worker = ResearchWorker::with_agent_id("research_00000001", objective("cache"), ctx);
    let finding = worker.execute().await.unwrap();

    // two broad queries, then the narrow one
    assert_eq!(retriever.searches(), vec!["cache one", "cache two", "cache three"]);
    // first three of the selection, in selection order
    assert_eq!(
        retriever.fetches(),
        vec![
            "https://example.com/cache-one/0",
            "https://example.com/cache-one/2",
            "https://example.com/cache-three/0",
        ]
    );
    assert_eq!(finding.sources.len(), 3);
    assert!(finding.error.is_none());
    assert!(finding.summary.starts_with("Finding body"));
    assert!(finding.summary.contains("## Sources"));

    let keys = store.list_keys("s1", keys::RESEARCH_PREFIX).await.unwrap();
    assert_eq!(keys, vec!["research/research_00000001"]);
}

#[tokio::test]
async fn test_worker_falls_back_to_first_candidates() {
    let llm = Arc::new(
        MockLLMClient::new("unused")
            .on(EVALUATE, "the best ones are all of them")
            .on(WORKER_SYNTHESIS, "Body"),
    );
    let retriever = Arc::new(MockRetriever::new(5));
    let (ctx, _) = context("s1", llm, retriever.clone());

    let worker = ResearchWorker::new(objective("edge").with_max_sources(3), ctx);
    let finding = worker.execute().await.unwrap();

    // three selected satisfies max_sources, so no narrow search
    assert_eq!(retriever.searches().len(), 2);
    let urls: Vec<&str> = finding.sources.iter().map(|s| s.url.as_str()).collect();
    assert_eq!(
        urls,
        vec![
            "https://example.com/edge-one/0",
            "https://example.com/edge-one/1",
            "https://example.com/edge-one/2",
        ]
    );
}

#[tokio::test]
async fn test_worker_degrades_failed_fetch() {
    let llm = Arc::new(
        MockLLMClient::new("unused")
            .on(EVALUATE, "0, 1, 2")
            .on(WORKER_SYNTHESIS, "Body"),
    );
    let retriever = Arc::new(MockRetriever::new(3).fail_urls_containing("cdn-one/1"));
    let (ctx, _) = context("s1", llm, retriever);

    let worker = ResearchWorker::new(objective("cdn").with_max_sources(3), ctx);
    let finding = worker.execute().await.unwrap();

    assert_eq!(finding.sources.len(), 3);
    assert_eq!(finding.sources[1].snippet, "About cdn one");
    assert!(finding.sources[0].snippet.starts_with("Full text of"));
}

#[tokio::test]
async fn test_worker_without_sources_records_error() {
    let llm = Arc::new(MockLLMClient::new("unused"));
    let retriever = Arc::new(MockRetriever::new(3).fail_queries_containing("void"));
    let (ctx, store) = context("s1", llm.clone(), retriever);

    let worker = ResearchWorker::with_agent_id("research_deadbeef", objective("void"), ctx);
    let result = worker.execute().await;
    assert!(matches!(result, Err(AppError::Retrieval(_))));

    let recorded: Finding = get_json(store.as_ref(), "s1", "research/research_deadbeef")
        .await
        .unwrap()
        .unwrap();
    assert!(recorded.is_error());
    assert!(recorded.summary.is_empty());
    assert!(recorded.sources.is_empty());
    assert_eq!(llm.count(WORKER_SYNTHESIS), 0);
}

// ============= Fan-Out =============

#[tokio::test]
async fn test_fan_out_isolates_failures() {
    let llm = Arc::new(
        MockLLMClient::new("unused")
            .on(EVALUATE, "0")
            .on(WORKER_SYNTHESIS, "Body"),
    );
    let retriever = Arc::new(MockRetriever::new(2).fail_queries_containing("broken"));
    let (ctx, store) = context("s1", llm, retriever);

    let objectives = vec![
        objective("alpha"),
        objective("broken-1"),
        objective("beta"),
        objective("broken-2"),
    ];
    let report = FanOutExecutor::new(ctx).run_all(objectives).await.unwrap();

    assert_eq!(report.attempted, 4);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 2);

    let keys = store.list_keys("s1", keys::RESEARCH_PREFIX).await.unwrap();
    assert_eq!(keys.len(), 4);
}

#[tokio::test]
async fn test_fan_out_cancellation_writes_nothing() {
    let llm = Arc::new(
        MockLLMClient::new("unused")
            .on(EVALUATE, "0")
            .hang_on(WORKER_SYNTHESIS),
    );
    let retriever = Arc::new(MockRetriever::new(2));
    let (ctx, store) = context("s1", llm, retriever);

    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let result = FanOutExecutor::new(ctx)
        .run_all(vec![objective("a"), objective("b")])
        .await;
    assert!(matches!(result, Err(AppError::Cancelled(_))));
    assert!(store
        .list_keys("s1", keys::RESEARCH_PREFIX)
        .await
        .unwrap()
        .is_empty());
}

// ============= Orchestrator =============

#[tokio::test]
async fn test_simple_request_synthesizes_single_finding() {
    let llm = Arc::new(
        MockLLMClient::new("unused")
            .on(CLASSIFY, "SIMPLE")
            .on(DECOMPOSE, ONE_OBJECTIVE_PLAN)
            .on(EVALUATE, "0, 1")
            .on(WORKER_SYNTHESIS, "Core concepts explained")
            .echo_on(SYNTHESIZE)
            .on(GAP_CHECK, "NO"),
    );
    let retriever = Arc::new(MockRetriever::new(2));
    let session = session("edge caching");
    let (ctx, store) = context(&session.id, llm.clone(), retriever);

    let outcome = ResearchCoordinator::new(ctx).research(&session).await.unwrap();

    assert_eq!(outcome.complexity, Complexity::Simple);
    assert_eq!(outcome.rounds, 1);
    assert_eq!(outcome.objectives_attempted, 1);
    assert_eq!(outcome.findings_succeeded, 1);

    let keys = store.list_keys(&session.id, keys::RESEARCH_PREFIX).await.unwrap();
    assert_eq!(keys.len(), 1);
    let finding: Finding = get_json(store.as_ref(), &session.id, &keys[0])
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome.synthesis.content, synthesis_prompt(&[finding.summary]));
    let stored: Synthesis = get_json(store.as_ref(), &session.id, keys::SYNTHESIS)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored, outcome.synthesis);
    assert_eq!(llm.count(FOLLOW_UP), 0);
}

#[tokio::test]
async fn test_garbage_decomposition_uses_catch_all_objective() {
    let llm = Arc::new(
        MockLLMClient::new("unused")
            .on(CLASSIFY, "COMPLEX")
            .on(DECOMPOSE, "I would research many things!")
            .on(EVALUATE, "0")
            .on(WORKER_SYNTHESIS, "Body")
            .on(SYNTHESIZE, "Summary")
            .on(GAP_CHECK, "NO"),
    );
    let retriever = Arc::new(MockRetriever::new(2));
    let session = session("rust");
    let (ctx, store) = context(&session.id, llm, retriever.clone());

    let outcome = ResearchCoordinator::new(ctx).research(&session).await.unwrap();
    assert_eq!(outcome.complexity, Complexity::Complex);
    assert_eq!(outcome.objectives_attempted, 1);
    assert_eq!(outcome.synthesis.content, "Summary");

    let plan: ResearchPlan = get_json(store.as_ref(), &session.id, keys::PLAN)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(plan.objectives.len(), 1);
    assert_eq!(
        plan.objectives[0].queries,
        vec!["rust", "rust guide", "rust best practices", "rust examples"]
    );
    assert!(retriever.searches().contains(&"rust guide".to_string()));
}

#[tokio::test]
async fn test_gap_check_yes_runs_exactly_two_rounds() {
    let llm = Arc::new(
        MockLLMClient::new("unused")
            .on(CLASSIFY, "SIMPLE")
            .on(DECOMPOSE, ONE_OBJECTIVE_PLAN)
            .on(EVALUATE, "0")
            .on(WORKER_SYNTHESIS, "Body")
            .on(SYNTHESIZE, "Summary")
            .on(GAP_CHECK, "YES")
            .on(FOLLOW_UP, r#"[{"objective": "pricing", "search_queries": ["ignored"]}]"#),
    );
    let retriever = Arc::new(MockRetriever::new(2));
    let session = session("cdn");
    let (ctx, store) = context(&session.id, llm.clone(), retriever.clone());

    let outcome = ResearchCoordinator::new(ctx).research(&session).await.unwrap();

    assert_eq!(outcome.rounds, 2);
    assert_eq!(outcome.objectives_attempted, 2);
    assert_eq!(outcome.synthesis.round, 2);
    assert_eq!(llm.count(GAP_CHECK), 1);
    assert_eq!(llm.count(SYNTHESIZE), 2);
    assert!(retriever.searches().contains(&"pricing examples".to_string()));

    let keys = store.list_keys(&session.id, keys::RESEARCH_PREFIX).await.unwrap();
    assert_eq!(keys.len(), 2);
}

#[tokio::test]
async fn test_zero_findings_skips_synthesis_call() {
    let llm = Arc::new(
        MockLLMClient::new("unused")
            .on(CLASSIFY, "SIMPLE")
            .on(DECOMPOSE, ONE_OBJECTIVE_PLAN)
            .on(GAP_CHECK, "NO"),
    );
    let retriever = Arc::new(MockRetriever::new(2).fail_queries_containing("core"));
    let session = session("obscure");
    let (ctx, _) = context(&session.id, llm.clone(), retriever);

    let outcome = ResearchCoordinator::new(ctx).research(&session).await.unwrap();

    assert_eq!(outcome.findings_succeeded, 0);
    assert_eq!(outcome.synthesis.content, NO_FINDINGS_SYNTHESIS);
    assert_eq!(outcome.synthesis.source_count, 0);
    assert_eq!(llm.count(SYNTHESIZE), 0);
}

#[tokio::test]
async fn test_gap_check_failure_counts_as_no() {
    let llm = Arc::new(
        MockLLMClient::new("unused")
            .on(CLASSIFY, "SIMPLE")
            .on(DECOMPOSE, ONE_OBJECTIVE_PLAN)
            .on(EVALUATE, "0")
            .on(WORKER_SYNTHESIS, "Body")
            .on(SYNTHESIZE, "Summary")
            .fail_on(GAP_CHECK),
    );
    let retriever = Arc::new(MockRetriever::new(2));
    let session = session("cdn");
    let (ctx, _) = context(&session.id, llm, retriever);

    let outcome = ResearchCoordinator::new(ctx).research(&session).await.unwrap();
    assert_eq!(outcome.rounds, 1);
}

#[tokio::test]
async fn test_classification_failure_propagates() {
    let llm = Arc::new(MockLLMClient::new("unused").fail_on(CLASSIFY));
    let retriever = Arc::new(MockRetriever::new(2));
    let session = session("cdn");
    let (ctx, store) = context(&session.id, llm, retriever);

    let result = ResearchCoordinator::new(ctx).research(&session).await;
    assert!(matches!(result, Err(AppError::LLM(ref m)) if m.contains("classify")));
    assert!(store.get(&session.id, keys::PLAN).await.unwrap().is_none());
}

#[tokio::test]
async fn test_progress_events_are_reported() {
    let llm = Arc::new(
        MockLLMClient::new("unused")
            .on(CLASSIFY, "MODERATE")
            .on(DECOMPOSE, ONE_OBJECTIVE_PLAN)
            .on(EVALUATE, "0")
            .on(WORKER_SYNTHESIS, "Body")
            .on(SYNTHESIZE, "Summary")
            .on(GAP_CHECK, "NO"),
    );
    let retriever = Arc::new(MockRetriever::new(1));
    let session = session("cdn");
    let (ctx, _) = context(&session.id, llm, retriever);

    let (tx, mut rx) = mpsc::unbounded_channel();
    ResearchCoordinator::new(ctx)
        .with_progress(Some(tx))
        .research(&session)
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    assert_eq!(events.first(), Some(&ResearchProgress::Analyzing));
    assert!(events.contains(&ResearchProgress::Classified {
        complexity: Complexity::Moderate
    }));
    assert!(events.contains(&ResearchProgress::Planned {
        objectives: 1,
        fallback: false
    }));
    assert!(matches!(
        events.last(),
        Some(ResearchProgress::Completed { rounds: 1, .. })
    ));
}
