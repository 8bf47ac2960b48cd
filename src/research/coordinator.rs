use super::fanout::{FanOutExecutor, FanOutReport};
use super::{ProgressSender, ResearchProgress};
use crate::{
    agents::AgentContext,
    memory::{aggregate_research, keys},
    types::{
        AppError, Complexity, Objective, OutputFormat, ResearchPlan, Result, Session, Synthesis,
    },
    utils::{
        extract::{extract_json_payload, extract_payload},
        text::truncate_chars,
    },
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Follow-up rounds allowed after the initial one.
pub const MAX_ADAPTIVE_ROUNDS: u8 = 1;
pub const MAX_FOLLOW_UP_OBJECTIVES: usize = 2;
pub const NO_FINDINGS_SYNTHESIS: &str = "No research findings available.";

const DECOMPOSED_MAX_SOURCES: usize = 5;
const FOLLOW_UP_MAX_SOURCES: usize = 3;
const GAP_CHECK_CHARS: usize = 2000;
const FOLLOW_UP_CHARS: usize = 1500;
const GAP_DESCRIPTION_CHARS: usize = 200;

const CLASSIFY_MAX_TOKENS: u32 = 10;
const DECOMPOSE_MAX_TOKENS: u32 = 1000;
const SYNTHESIZE_MAX_TOKENS: u32 = 2000;
const GAP_CHECK_MAX_TOKENS: u32 = 5;
const FOLLOW_UP_MAX_TOKENS: u32 = 500;

/// Result of a full research run.
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchOutcome {
    pub synthesis: Synthesis,
    pub complexity: Complexity,
    /// 1, or 2 when a gap-filling round ran
    pub rounds: u8,
    pub objectives_attempted: usize,
    pub findings_succeeded: usize,
}

#[derive(Debug, Deserialize)]
struct PlannedObjective {
    objective: String,
    #[serde(default, alias = "queries")]
    search_queries: Vec<String>,
    #[serde(default)]
    tool_guidance: String,
}

pub struct ResearchCoordinator {
    ctx: AgentContext,
    fan_out: FanOutExecutor,
    progress: Option<ProgressSender>,
}

impl ResearchCoordinator {
    pub fn new(ctx: AgentContext) -> Self {
        Self {
            fan_out: FanOutExecutor::new(ctx.clone()),
            ctx,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressSender>) -> Self {
        self.fan_out = self.fan_out.with_progress(progress.clone());
        self.progress = progress;
        self
    }

    fn emit(&self, event: ResearchProgress) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(event);
        }
    }

    /// Execute research for a session: classify, decompose, fan out,
    /// synthesize, then fill gaps at most once.
    pub async fn research(&self, session: &Session) -> Result<ResearchOutcome> {
        let session_id = session.id.as_str();

        self.emit(ResearchProgress::Analyzing);
        let complexity = self
            .classify_complexity(session)
            .await
            .map_err(|e| e.in_stage("classify", session_id))?;
        self.emit(ResearchProgress::Classified { complexity });

        let plan = self.decompose(session, complexity).await?;

        let mut rounds = 1;
        let mut report = self.run_round(plan.objectives, rounds).await?;
        let mut synthesis = self
            .synthesize(rounds)
            .await
            .map_err(|e| e.in_stage("synthesize", session_id))?;

        let mut objectives_attempted = report.attempted;
        let mut findings_succeeded = report.succeeded();

        while rounds <= MAX_ADAPTIVE_ROUNDS && self.needs_more_research(session, &synthesis).await? {
            let follow_ups = self.follow_up_objectives(session, &synthesis).await?;
            rounds += 1;
            info!(
                session_id,
                round = rounds,
                objectives = follow_ups.len(),
                "Starting gap-filling round"
            );

            report = self.run_round(follow_ups, rounds).await?;
            objectives_attempted += report.attempted;
            findings_succeeded += report.succeeded();

            synthesis = self
                .synthesize(rounds)
                .await
                .map_err(|e| e.in_stage("synthesize", session_id))?;
        }

        self.emit(ResearchProgress::Completed {
            rounds,
            total_sources: synthesis.source_count,
        });
        info!(
            session_id,
            rounds,
            objectives_attempted,
            findings_succeeded,
            "Research complete"
        );

        Ok(ResearchOutcome {
            synthesis,
            complexity,
            rounds,
            objectives_attempted,
            findings_succeeded,
        })
    }

    async fn run_round(&self, objectives: Vec<Objective>, round: u8) -> Result<FanOutReport> {
        self.emit(ResearchProgress::WorkersStarted {
            round,
            count: objectives.len(),
        });
        self.fan_out.run_all(objectives).await
    }

    /// Map the request to a complexity level.
    ///
    /// Unrecognized answers default to moderate; a failed call is an error.
    pub async fn classify_complexity(&self, session: &Session) -> Result<Complexity> {
        let prompt = format!(
            r#"Analyze the complexity of this content creation request:

Topic: {}
Content Type: {}
Target Length: {} words
Custom Instructions: {}

Classify as one of:
- SIMPLE: Straightforward topic, single focus area, facts readily available
- MODERATE: Multiple aspects to cover, some comparison or analysis needed
- COMPLEX: Broad topic, multiple perspectives, deep research required

Respond with just one word: SIMPLE, MODERATE, or COMPLEX"#,
            session.topic,
            session.parameters.content_type,
            session.parameters.word_count,
            session
                .parameters
                .custom_instructions
                .as_deref()
                .unwrap_or("None"),
        );

        let response = self
            .ctx
            .complete("classify", &prompt, CLASSIFY_MAX_TOKENS)
            .await?;
        Ok(parse_complexity(&response))
    }

    /// Break the topic into `complexity.objective_count()` objectives.
    ///
    /// Never yields an empty plan: unusable answers fall back to a single
    /// catch-all objective. The plan is persisted at `plan`.
    pub async fn decompose(&self, session: &Session, complexity: Complexity) -> Result<ResearchPlan> {
        let count = complexity.objective_count();
        let keywords = session.parameters.keyword_list();
        let prompt = format!(
            r#"Create a research plan for this content:

Topic: {}
Content Type: {}
Tone: {}
Audience: {}
Keywords: {}

Create exactly {} distinct research tasks. Each task should:
1. Have a clear, specific objective
2. Include 3-4 search queries (start broad, then narrow)
3. Not overlap with other tasks

Format your response as a JSON array:
[
  {{
    "objective": "What to research",
    "search_queries": ["broad query 1", "broad query 2", "narrow query 1", "narrow query 2"],
    "tool_guidance": "Special instructions for this search"
  }}
]

Only output the JSON array, no other text."#,
            session.topic,
            session.parameters.content_type,
            session.parameters.tone,
            session.parameters.audience_level,
            keywords,
            count
        );

        let mut objectives = match self
            .ctx
            .complete("decompose", &prompt, DECOMPOSE_MAX_TOKENS)
            .await
        {
            Ok(response) => parse_objectives(&response),
            Err(err @ AppError::Cancelled(_)) => return Err(err),
            Err(err) => {
                warn!(session_id = %session.id, error = %err, "Decomposition call failed");
                Vec::new()
            }
        };
        objectives.truncate(count);

        let fallback = objectives.is_empty();
        if fallback {
            debug!(session_id = %session.id, "Using catch-all research objective");
            objectives.push(fallback_objective(&session.topic));
        }

        let plan = ResearchPlan {
            topic: session.topic.clone(),
            complexity,
            objectives,
            created_at: Utc::now(),
        };
        self.ctx.persist(keys::PLAN, &plan).await?;

        self.emit(ResearchProgress::Planned {
            objectives: plan.objectives.len(),
            fallback,
        });
        Ok(plan)
    }

    /// Synthesize everything under `research/` and persist it at `synthesis`.
    pub async fn synthesize(&self, round: u8) -> Result<Synthesis> {
        self.emit(ResearchProgress::Synthesizing { round });
        let aggregated = aggregate_research(self.ctx.store.as_ref(), &self.ctx.session_id).await?;

        let content = if aggregated.is_empty() {
            NO_FINDINGS_SYNTHESIS.to_string()
        } else {
            let prompt = synthesis_prompt(&aggregated.findings);
            self.ctx
                .complete("synthesize", &prompt, SYNTHESIZE_MAX_TOKENS)
                .await?
        };

        let synthesis = Synthesis {
            content,
            source_count: aggregated.total_sources,
            round,
            created_at: Utc::now(),
        };
        self.ctx.persist(keys::SYNTHESIS, &synthesis).await?;
        Ok(synthesis)
    }

    /// Ask whether the synthesis covers the topic well enough.
    ///
    /// A failed call counts as "no".
    pub async fn needs_more_research(&self, session: &Session, synthesis: &Synthesis) -> Result<bool> {
        let prompt = format!(
            r#"Based on this research synthesis, is additional research needed?

Topic: {}
Content requirements: {} word {}

Current synthesis:
{}

Consider:
1. Are there major gaps in the research?
2. Are key aspects of the topic missing?
3. Is there enough material for the requested content length?

Respond with just YES or NO."#,
            session.topic,
            session.parameters.word_count,
            session.parameters.content_type,
            truncate_chars(&synthesis.content, GAP_CHECK_CHARS)
        );

        let needs_more = match self
            .ctx
            .complete("gap_check", &prompt, GAP_CHECK_MAX_TOKENS)
            .await
        {
            Ok(answer) => answer.to_uppercase().contains("YES"),
            Err(err @ AppError::Cancelled(_)) => return Err(err),
            Err(err) => {
                warn!(session_id = %session.id, error = %err, "Gap check failed, treating as complete");
                false
            }
        };

        self.emit(ResearchProgress::GapCheck { needs_more });
        Ok(needs_more)
    }

    /// One or two objectives targeting the gaps in `synthesis`.
    pub async fn follow_up_objectives(
        &self,
        session: &Session,
        synthesis: &Synthesis,
    ) -> Result<Vec<Objective>> {
        let prompt = format!(
            r#"Based on this synthesis, what specific gaps need more research?

{}

Create 1-2 targeted research tasks to fill the gaps.
Format as JSON array with objective and search_queries.
If no gaps, respond with empty array []."#,
            truncate_chars(&synthesis.content, FOLLOW_UP_CHARS)
        );

        let response = match self
            .ctx
            .complete("follow_up", &prompt, FOLLOW_UP_MAX_TOKENS)
            .await
        {
            Ok(text) => text,
            Err(err @ AppError::Cancelled(_)) => return Err(err),
            Err(err) => {
                warn!(session_id = %session.id, error = %err, "Follow-up planning failed");
                String::new()
            }
        };

        let mut gaps = parse_gap_descriptions(&response);
        if gaps.is_empty() {
            gaps.push(fallback_gap(&response, &session.topic));
        }

        Ok(gaps
            .iter()
            .take(MAX_FOLLOW_UP_OBJECTIVES)
            .map(|gap| gap_objective(gap))
            .collect())
    }
}

/// SIMPLE / MODERATE / COMPLEX, defaulting to moderate.
pub fn parse_complexity(text: &str) -> Complexity {
    let upper = text.trim().to_uppercase();
    if upper.contains("SIMPLE") {
        Complexity::Simple
    } else if upper.contains("COMPLEX") {
        Complexity::Complex
    } else {
        Complexity::Moderate
    }
}

fn parse_objectives(response: &str) -> Vec<Objective> {
    // Malformed entries are skipped one by one.
    let entries: Vec<Value> = extract_payload(response).unwrap_or_default();

    entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<PlannedObjective>(entry).ok())
        .filter(|p| !p.objective.trim().is_empty())
        .map(|p| {
            let mut queries: Vec<String> = p
                .search_queries
                .into_iter()
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty())
                .collect();
            if queries.is_empty() {
                queries.push(p.objective.clone());
            }
            Objective::new(p.objective, queries)
                .with_format(OutputFormat::Detailed)
                .with_max_sources(DECOMPOSED_MAX_SOURCES)
                .with_guidance(p.tool_guidance)
        })
        .collect()
}

/// Catch-all objective used when decomposition yields nothing.
pub fn fallback_objective(topic: &str) -> Objective {
    Objective::new(
        format!("Research key information about {}", topic),
        vec![
            topic.to_string(),
            format!("{} guide", topic),
            format!("{} best practices", topic),
            format!("{} examples", topic),
        ],
    )
    .with_format(OutputFormat::Detailed)
    .with_max_sources(DECOMPOSED_MAX_SOURCES)
    .with_guidance("Focus on authoritative sources")
}

/// Objective with a fixed three-query fan-out around a gap description.
pub fn gap_objective(gap: &str) -> Objective {
    Objective::new(
        gap,
        vec![
            gap.to_string(),
            format!("{} examples", gap),
            format!("{} details", gap),
        ],
    )
    .with_format(OutputFormat::Summary)
    .with_max_sources(FOLLOW_UP_MAX_SOURCES)
}

/// Gap descriptions from an array of objects or strings.
fn parse_gap_descriptions(response: &str) -> Vec<String> {
    let Some(Value::Array(items)) = extract_json_payload(response) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Object(map) => map
                .get("objective")
                .and_then(Value::as_str)
                .map(|s| s.trim().to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect()
}

/// Free text when the answer was prose, otherwise the topic.
fn fallback_gap(response: &str, topic: &str) -> String {
    let text = response.trim();
    if text.is_empty() || extract_json_payload(text).is_some() {
        return topic.to_string();
    }
    truncate_chars(text, GAP_DESCRIPTION_CHARS).to_string()
}

/// Prompt used to merge every successful finding into one synthesis.
pub fn synthesis_prompt(findings: &[String]) -> String {
    format!(
        r#"Synthesize these research findings into a coherent summary:

{}

Create a unified research summary that:
1. Identifies key themes and insights
2. Notes important facts with source references
3. Highlights any conflicting information
4. Suggests content structure based on findings

Format as markdown with clear sections."#,
        findings.join("\n\n---\n\n")
    )
}
