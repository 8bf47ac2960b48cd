use super::versions::{latest_version, stream_version};
use super::{AgentContext, EventStream, StreamEvent};
use crate::memory::keys;
use crate::research::FanOutExecutor;
use crate::types::{AppError, Objective, OutputFormat, Result, Synthesis};
use crate::utils::{extract::extract_payload, text::truncate_chars};
use async_stream::stream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const MAX_REVISION_OBJECTIVES: usize = 2;
const REVISION_MAX_SOURCES: usize = 3;
const ANALYSIS_CONTENT_CHARS: usize = 2000;
const CONTEXT_CHARS: usize = 2000;
const ANALYZE_MAX_TOKENS: u32 = 500;
const REVISE_MAX_TOKENS: u32 = 4000;

/// What a piece of feedback asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionAction {
    TargetedEdit,
    FullRewrite,
    Addition,
    NeedsMoreResearch,
}

impl RevisionAction {
    /// Parse the label used in the analysis prompt.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "MODIFY_SECTION" => Some(RevisionAction::TargetedEdit),
            "REWRITE" => Some(RevisionAction::FullRewrite),
            "ADD_CONTENT" => Some(RevisionAction::Addition),
            "RESEARCH_MORE" => Some(RevisionAction::NeedsMoreResearch),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RevisionAction::TargetedEdit => "MODIFY_SECTION",
            RevisionAction::FullRewrite => "REWRITE",
            RevisionAction::Addition => "ADD_CONTENT",
            RevisionAction::NeedsMoreResearch => "RESEARCH_MORE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackAnalysis {
    pub action: RevisionAction,
    pub sections_affected: Vec<String>,
    pub specific_changes: String,
    pub needs_research: bool,
    pub research_queries: Vec<String>,
}

#[derive(Deserialize)]
struct RawAnalysis {
    action: String,
    #[serde(default)]
    sections_affected: Vec<String>,
    #[serde(default)]
    specific_changes: String,
    #[serde(default)]
    needs_research: bool,
    #[serde(default)]
    research_queries: Vec<String>,
}

impl FeedbackAnalysis {
    /// Targeted edit carrying the feedback verbatim.
    pub fn fallback(feedback: &str) -> Self {
        Self {
            action: RevisionAction::TargetedEdit,
            sections_affected: Vec::new(),
            specific_changes: feedback.to_string(),
            needs_research: false,
            research_queries: Vec::new(),
        }
    }

    /// Parse a completion, falling back when the action is unknown or
    /// the payload is unusable.
    pub fn parse(response: &str, feedback: &str) -> Self {
        let Some(raw) = extract_payload::<RawAnalysis>(response) else {
            return Self::fallback(feedback);
        };
        let Some(action) = RevisionAction::from_label(&raw.action) else {
            return Self::fallback(feedback);
        };

        let specific_changes = if raw.specific_changes.trim().is_empty() {
            feedback.to_string()
        } else {
            raw.specific_changes
        };

        Self {
            action,
            sections_affected: raw.sections_affected,
            specific_changes,
            needs_research: raw.needs_research,
            research_queries: raw
                .research_queries
                .into_iter()
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty())
                .collect(),
        }
    }

    pub fn wants_research(&self) -> bool {
        self.needs_research && !self.research_queries.is_empty()
    }

    /// At most two small objectives built from the research queries.
    pub fn research_objectives(&self) -> Vec<Objective> {
        if !self.wants_research() {
            return Vec::new();
        }

        self.research_queries
            .iter()
            .take(MAX_REVISION_OBJECTIVES)
            .map(|q| {
                Objective::new(
                    format!("Find additional information: {}", q),
                    vec![q.clone(), format!("{} examples", q), format!("{} details", q)],
                )
                .with_format(OutputFormat::Summary)
                .with_max_sources(REVISION_MAX_SOURCES)
            })
            .collect()
    }
}

/// Applies user feedback to the latest version.
pub struct ContentReviser {
    ctx: AgentContext,
}

impl ContentReviser {
    pub fn new(ctx: AgentContext) -> Self {
        Self { ctx }
    }

    /// Classify feedback against the current content.
    ///
    /// Anything but cancellation degrades to [`FeedbackAnalysis::fallback`].
    pub async fn analyze_feedback(&self, feedback: &str, current: &str) -> Result<FeedbackAnalysis> {
        let prompt = format!(
            r#"Analyze this user feedback for content revision:

FEEDBACK: {}

CURRENT CONTENT (first {} chars):
{}

Determine:
1. What type of change is needed?
   - MODIFY_SECTION: Change specific parts
   - REWRITE: Significant rewrite needed
   - ADD_CONTENT: Add new sections/information
   - RESEARCH_MORE: Need additional research first

2. What specific changes should be made?

Respond in JSON format:
{{
  "action": "MODIFY_SECTION|REWRITE|ADD_CONTENT|RESEARCH_MORE",
  "sections_affected": ["section names if applicable"],
  "specific_changes": "detailed description of changes",
  "needs_research": true/false,
  "research_queries": ["queries if research needed"]
}}"#,
            feedback,
            ANALYSIS_CONTENT_CHARS,
            truncate_chars(current, ANALYSIS_CONTENT_CHARS)
        );

        match self
            .ctx
            .complete("analyze_feedback", &prompt, ANALYZE_MAX_TOKENS)
            .await
        {
            Ok(response) => Ok(FeedbackAnalysis::parse(&response, feedback)),
            Err(err @ AppError::Cancelled(_)) => Err(err),
            Err(err) => {
                warn!(session_id = %self.ctx.session_id, error = %err, "Feedback analysis failed, using targeted edit");
                Ok(FeedbackAnalysis::fallback(feedback))
            }
        }
    }

    async fn research_context(&self) -> Result<String> {
        Ok(self
            .ctx
            .read::<Synthesis>(keys::SYNTHESIS)
            .await?
            .map(|s| s.content)
            .unwrap_or_default())
    }

    /// Analysis, optional extra research, then the revised body streamed and
    /// saved with `feedback_applied` set to the feedback verbatim.
    pub fn revise_stream(self, feedback: String) -> EventStream {
        let ctx = self.ctx.clone();
        let output = stream! {
            let current = match latest_version(ctx.store.as_ref(), &ctx.session_id).await {
                Ok(Some(version)) => version,
                Ok(None) => {
                    yield Err(AppError::Precondition(format!(
                        "session {} has no version to revise",
                        ctx.session_id
                    )));
                    return;
                }
                Err(e) => {
                    yield Err(e.in_stage("iterate", &ctx.session_id));
                    return;
                }
            };

            let analysis = match self.analyze_feedback(&feedback, &current.content).await {
                Ok(analysis) => analysis,
                Err(e) => {
                    yield Err(e.in_stage("analyze_feedback", &ctx.session_id));
                    return;
                }
            };
            info!(
                session_id = %ctx.session_id,
                action = analysis.action.label(),
                needs_research = analysis.wants_research(),
                "Feedback analyzed"
            );
            yield Ok(StreamEvent::Analysis(analysis.clone()));

            let mut new_findings = Vec::new();
            if analysis.wants_research() {
                let objectives = analysis.research_objectives();
                yield Ok(StreamEvent::Researching {
                    queries: objectives.iter().map(|o| o.queries[0].clone()).collect(),
                });

                match FanOutExecutor::new(ctx.clone()).run_all(objectives).await {
                    Ok(report) => {
                        yield Ok(StreamEvent::ResearchComplete { findings: report.succeeded() });
                        new_findings = report.findings.into_iter().map(|f| f.summary).collect();
                    }
                    Err(e) => {
                        yield Err(e.in_stage("iterate_research", &ctx.session_id));
                        return;
                    }
                }
            }

            let mut context = match self.research_context().await {
                Ok(context) => context,
                Err(e) => {
                    yield Err(e.in_stage("iterate", &ctx.session_id));
                    return;
                }
            };
            for finding in new_findings {
                if !context.is_empty() {
                    context.push_str("\n\n");
                }
                context.push_str(&finding);
            }

            let prompt = revision_prompt(&current.content, &feedback, &analysis, &context);
            let mut body = Box::pin(stream_version(
                ctx.clone(),
                "iterate",
                prompt,
                REVISE_MAX_TOKENS,
                Some(feedback.clone()),
            ));
            while let Some(event) = body.next().await {
                yield event;
            }
        };

        Box::pin(output)
    }
}

fn revision_prompt(current: &str, feedback: &str, analysis: &FeedbackAnalysis, context: &str) -> String {
    let sections = if analysis.sections_affected.is_empty() {
        "Not specified".to_string()
    } else {
        analysis.sections_affected.join(", ")
    };
    let context = if context.is_empty() {
        "None"
    } else {
        truncate_chars(context, CONTEXT_CHARS)
    };

    format!(
        r#"Revise this content based on the feedback.

ORIGINAL CONTENT:
{}

USER FEEDBACK: {}
ACTION: {}
CHANGES NEEDED: {}
SECTIONS AFFECTED: {}

ADDITIONAL CONTEXT:
{}

Rewrite incorporating the feedback. Maintain the overall structure unless the feedback asks for structural changes. Output only the revised markdown content."#,
        current,
        feedback,
        analysis.action.label(),
        analysis.specific_changes,
        sections,
        context
    )
}
