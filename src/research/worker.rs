//! Single-objective research worker.
//!
//! A worker walks a fixed sequence of phases:
//!
//! ```text
//! Idle → BroadSearch → EvaluateSources → NarrowSearch? → Scrape → Synthesize → Complete | Error
//! ```
//!
//! Narrow search only runs when evaluation kept fewer sources than the
//! objective's `max_sources`. Whatever happens, the worker writes exactly one
//! record to `research/<agent_id>` before returning, unless the session was
//! cancelled, in which case nothing is written.

use crate::agents::AgentContext;
use crate::memory::keys;
use crate::tools::SearchHit;
use crate::types::{AgentState, AppError, Finding, Objective, Result, SourceRecord};
use crate::utils::text::truncate_chars;
use chrono::Utc;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

pub const BROAD_SEARCH_LIMIT: usize = 5;
pub const NARROW_SEARCH_LIMIT: usize = 3;
/// Candidates shown to the model during evaluation.
pub const MAX_CANDIDATES_SHOWN: usize = 10;
/// Sources kept when the evaluation answer is unusable.
pub const FALLBACK_SELECTION: usize = 3;
pub const MAX_SCRAPED_SOURCES: usize = 3;
pub const SCRAPED_CONTENT_CHARS: usize = 3000;
pub const CONTEXT_CHARS_PER_SOURCE: usize = 1500;
pub const SNIPPET_CHARS: usize = 300;
const DESCRIPTION_CHARS: usize = 200;

const EVALUATE_MAX_TOKENS: u32 = 100;
const SYNTHESIZE_MAX_TOKENS: u32 = 1500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerPhase {
    Idle,
    BroadSearch,
    EvaluateSources,
    NarrowSearch,
    Scrape,
    Synthesize,
    Complete,
    Error,
}

impl fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WorkerPhase::Idle => "idle",
            WorkerPhase::BroadSearch => "broad_search",
            WorkerPhase::EvaluateSources => "evaluate_sources",
            WorkerPhase::NarrowSearch => "narrow_search",
            WorkerPhase::Scrape => "scrape",
            WorkerPhase::Synthesize => "synthesize",
            WorkerPhase::Complete => "complete",
            WorkerPhase::Error => "error",
        };
        f.write_str(label)
    }
}

/// Page content gathered for one selected source.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedSource {
    pub url: String,
    pub title: String,
    pub content: String,
    /// Set when the fetch failed and `content` is the search snippet
    pub error: Option<String>,
}

pub fn new_agent_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("research_{}", &id[..8])
}

pub struct ResearchWorker {
    agent_id: String,
    objective: Objective,
    ctx: AgentContext,
    phase: WorkerPhase,
    tool_calls: u32,
}

impl ResearchWorker {
    pub fn new(objective: Objective, ctx: AgentContext) -> Self {
        Self::with_agent_id(new_agent_id(), objective, ctx)
    }

    pub fn with_agent_id(
        agent_id: impl Into<String>,
        objective: Objective,
        ctx: AgentContext,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            objective,
            ctx,
            phase: WorkerPhase::Idle,
            tool_calls: 0,
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn phase(&self) -> WorkerPhase {
        self.phase
    }

    pub fn state(&self) -> AgentState {
        AgentState {
            agent_id: self.agent_id.clone(),
            agent_type: "research".to_string(),
            status: self.phase.to_string(),
            current_task: self.objective.description.clone(),
            tool_calls: self.tool_calls,
            findings_count: 0,
        }
    }

    /// Run the objective to completion and record the outcome.
    ///
    /// On failure the error finding is written before the error is returned.
    pub async fn execute(mut self) -> Result<Finding> {
        let key = keys::research(&self.agent_id);
        info!(
            session_id = %self.ctx.session_id,
            agent_id = %self.agent_id,
            objective = %self.objective.description,
            "Research worker started"
        );

        match self.run().await {
            Ok(finding) => {
                self.ctx.persist(&key, &finding).await?;
                self.phase = WorkerPhase::Complete;
                info!(
                    agent_id = %self.agent_id,
                    sources = finding.sources.len(),
                    tool_calls = self.tool_calls,
                    "Research worker complete"
                );
                Ok(finding)
            }
            Err(err @ AppError::Cancelled(_)) => {
                self.phase = WorkerPhase::Error;
                debug!(agent_id = %self.agent_id, "Research worker cancelled");
                Err(err)
            }
            Err(err) => {
                self.phase = WorkerPhase::Error;
                warn!(agent_id = %self.agent_id, error = %err, "Research worker failed");
                let failed = Finding::failed(
                    &self.agent_id,
                    &self.objective.description,
                    err.to_string(),
                    self.tool_calls,
                );
                self.ctx.persist(&key, &failed).await?;
                Err(err)
            }
        }
    }

    async fn run(&mut self) -> Result<Finding> {
        self.phase = WorkerPhase::BroadSearch;
        let broad = self.objective.broad_queries().to_vec();
        let candidates = self.search_all(&broad, BROAD_SEARCH_LIMIT).await?;

        self.phase = WorkerPhase::EvaluateSources;
        let mut selected = self.evaluate_sources(&candidates).await?;

        if selected.len() < self.objective.max_sources {
            self.phase = WorkerPhase::NarrowSearch;
            let narrow = self.objective.narrow_queries().to_vec();
            selected.extend(self.search_all(&narrow, NARROW_SEARCH_LIMIT).await?);
        }
        selected.truncate(self.objective.max_sources.max(1));

        if selected.is_empty() {
            return Err(AppError::Retrieval(format!(
                "No sources found for objective '{}'",
                self.objective.description
            )));
        }

        self.phase = WorkerPhase::Scrape;
        let scraped = self.scrape_sources(&selected).await?;

        self.phase = WorkerPhase::Synthesize;
        let summary = self.synthesize(&scraped).await?;

        Ok(Finding {
            agent_id: self.agent_id.clone(),
            objective: self.objective.description.clone(),
            summary,
            sources: scraped
                .iter()
                .map(|s| SourceRecord {
                    url: s.url.clone(),
                    title: s.title.clone(),
                    snippet: truncate_chars(&s.content, SNIPPET_CHARS).to_string(),
                })
                .collect(),
            tool_calls: self.tool_calls,
            completed_at: Utc::now(),
            error: None,
        })
    }

    /// Issue each query, skipping the ones that fail.
    async fn search_all(&mut self, queries: &[String], limit: usize) -> Result<Vec<SearchHit>> {
        let mut hits = Vec::new();
        for query in queries {
            self.tool_calls += 1;
            match self.ctx.search(query, limit).await {
                Ok(results) => hits.extend(results),
                Err(err @ AppError::Cancelled(_)) => return Err(err),
                Err(err) => {
                    debug!(agent_id = %self.agent_id, query = %query, error = %err, "Search query skipped");
                }
            }
        }
        Ok(hits)
    }

    async fn evaluate_sources(&self, candidates: &[SearchHit]) -> Result<Vec<SearchHit>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let shown = &candidates[..candidates.len().min(MAX_CANDIDATES_SHOWN)];
        let fallback =
            || -> Vec<SearchHit> { candidates.iter().take(FALLBACK_SELECTION).cloned().collect() };

        let prompt = evaluation_prompt(&self.objective, shown);
        let response = match self
            .ctx
            .complete("evaluate_sources", &prompt, EVALUATE_MAX_TOKENS)
            .await
        {
            Ok(text) => text,
            Err(err @ AppError::Cancelled(_)) => return Err(err),
            Err(err) => {
                debug!(agent_id = %self.agent_id, error = %err, "Evaluation failed, keeping first candidates");
                return Ok(fallback());
            }
        };

        let indices = parse_index_list(&response, shown.len());
        if indices.is_empty() {
            return Ok(fallback());
        }
        Ok(indices.into_iter().map(|i| shown[i].clone()).collect())
    }

    async fn scrape_sources(&mut self, selected: &[SearchHit]) -> Result<Vec<ScrapedSource>> {
        let targets: Vec<&SearchHit> = selected.iter().take(MAX_SCRAPED_SOURCES).collect();
        self.tool_calls += targets.len() as u32;

        let ctx = &self.ctx;
        let results =
            futures::future::join_all(targets.into_iter().map(|hit| scrape_one(ctx, hit))).await;

        results.into_iter().collect()
    }

    async fn synthesize(&self, scraped: &[ScrapedSource]) -> Result<String> {
        let prompt = synthesis_prompt(&self.objective, scraped);
        let body = self
            .ctx
            .complete("worker_synthesis", &prompt, SYNTHESIZE_MAX_TOKENS)
            .await?;
        Ok(ensure_citations(body, scraped))
    }
}

/// Degrade to the search snippet when a page cannot be fetched.
async fn scrape_one(ctx: &AgentContext, hit: &SearchHit) -> Result<ScrapedSource> {
    match ctx.fetch(&hit.url).await {
        Ok(page) => Ok(ScrapedSource {
            url: hit.url.clone(),
            title: hit.title.clone(),
            content: truncate_chars(&page.content, SCRAPED_CONTENT_CHARS).to_string(),
            error: None,
        }),
        Err(err @ AppError::Cancelled(_)) => Err(err),
        Err(err) => Ok(ScrapedSource {
            url: hit.url.clone(),
            title: hit.title.clone(),
            content: hit.description.clone(),
            error: Some(err.to_string()),
        }),
    }
}

/// Parse a comma-separated list of 0-based indices.
///
/// Out-of-range and repeated indices are dropped; order is preserved.
pub fn parse_index_list(text: &str, len: usize) -> Vec<usize> {
    let mut indices = Vec::new();
    for token in text.split(',') {
        let token = token
            .trim()
            .trim_matches(|c: char| matches!(c, '[' | ']' | '(' | ')' | '.' | '"' | '\''));
        if token.is_empty() || !token.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        if let Ok(index) = token.parse::<usize>() {
            if index < len && !indices.contains(&index) {
                indices.push(index);
            }
        }
    }
    indices
}

fn evaluation_prompt(objective: &Objective, shown: &[SearchHit]) -> String {
    let sources = shown
        .iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "{}. {}: {}\n   {}",
                i,
                hit.title,
                hit.url,
                truncate_chars(&hit.description, DESCRIPTION_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Evaluate these sources for the research task: "{}"

Sources:
{}

{}

Return the indices (0-based) of the most relevant and authoritative sources, separated by commas.
Consider: relevance to task, source authority, content quality.
Only return the numbers, like: 0, 2, 5"#,
        objective.description, sources, objective.tool_guidance
    )
}

fn synthesis_prompt(objective: &Objective, scraped: &[ScrapedSource]) -> String {
    let context = scraped
        .iter()
        .map(|s| {
            format!(
                "## {}\nURL: {}\n\n{}",
                s.title,
                s.url,
                truncate_chars(&s.content, CONTEXT_CHARS_PER_SOURCE)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    format!(
        r#"Synthesize research findings for: "{}"

Research context:
{}

Provide a {} that:
1. Answers the research objective
2. Cites sources with URLs
3. Highlights key facts and insights
4. Notes any gaps or conflicting information

Format as markdown."#,
        objective.description, context, objective.output_format
    )
}

/// Append a source list for any URL the body does not mention.
fn ensure_citations(mut body: String, scraped: &[ScrapedSource]) -> String {
    let missing: Vec<&ScrapedSource> = scraped
        .iter()
        .filter(|s| !s.url.is_empty() && !body.contains(&s.url))
        .collect();

    if !missing.is_empty() {
        body.push_str("\n\n## Sources\n");
        for source in missing {
            body.push_str(&format!("- [{}]({})\n", source.title, source.url));
        }
    }
    body
}
