use super::versions::stream_version;
use super::{AgentContext, EventStream, StreamEvent};
use crate::memory::{aggregate_research, keys};
use crate::types::{AgentState, Outline, Result, Session, Synthesis};
use crate::utils::text::truncate_chars;
use async_stream::stream;
use chrono::Utc;
use futures::StreamExt;
use tracing::info;

const OUTLINE_RESEARCH_CHARS: usize = 3000;
const BODY_RESEARCH_CHARS: usize = 4000;
const OUTLINE_MAX_TOKENS: u32 = 1000;
const BODY_MAX_TOKENS: u32 = 4000;

/// Turns research into a first (or regenerated) content version.
pub struct ContentProducer {
    ctx: AgentContext,
}

impl ContentProducer {
    pub fn new(ctx: AgentContext) -> Self {
        Self { ctx }
    }

    pub fn state(session: &Session, status: &str) -> AgentState {
        AgentState {
            agent_id: "generator".to_string(),
            agent_type: "generator".to_string(),
            status: status.to_string(),
            current_task: "streaming content generation".to_string(),
            tool_calls: 0,
            findings_count: session.versions.len(),
        }
    }

    /// The synthesis when one exists, otherwise the raw findings joined.
    pub async fn read_research(&self) -> Result<String> {
        if let Some(synthesis) = self.ctx.read::<Synthesis>(keys::SYNTHESIS).await? {
            return Ok(synthesis.content);
        }

        let aggregated = aggregate_research(self.ctx.store.as_ref(), &self.ctx.session_id).await?;
        Ok(aggregated.findings.join("\n\n"))
    }

    /// Ask for a markdown outline and persist it at `outline`.
    pub async fn plan_structure(&self, session: &Session, research: &str) -> Result<Outline> {
        let params = &session.parameters;
        let prompt = format!(
            r#"Plan the structure for this content:

TOPIC: {}
TYPE: {}
TONE: {}
AUDIENCE: {}
LENGTH: {} words
KEYWORDS: {}
CUSTOM INSTRUCTIONS: {}

RESEARCH SUMMARY:
{}

Create a detailed outline including:
1. Title (compelling, SEO-friendly)
2. Introduction approach
3. Main sections with key points
4. Conclusion approach
5. Estimated word count per section

Format as markdown outline."#,
            session.topic,
            params.content_type,
            params.tone,
            params.audience_level,
            params.word_count,
            params.keyword_list(),
            params.custom_instructions.as_deref().unwrap_or("None"),
            truncate_chars(research, OUTLINE_RESEARCH_CHARS)
        );

        let content = self
            .ctx
            .complete("outline", &prompt, OUTLINE_MAX_TOKENS)
            .await?;
        let outline = Outline {
            content,
            created_at: Utc::now(),
        };
        self.ctx.persist(keys::OUTLINE, &outline).await?;
        Ok(outline)
    }

    /// Outline first, then the body fragment by fragment, then the saved
    /// version.
    pub fn generate_stream(self, session: Session) -> EventStream {
        let ctx = self.ctx.clone();
        let output = stream! {
            let research = match self.read_research().await {
                Ok(research) => research,
                Err(e) => {
                    yield Err(e.in_stage("generate", &ctx.session_id));
                    return;
                }
            };

            let outline = match self.plan_structure(&session, &research).await {
                Ok(outline) => outline,
                Err(e) => {
                    yield Err(e.in_stage("outline", &ctx.session_id));
                    return;
                }
            };
            info!(session_id = %ctx.session_id, "Outline ready, streaming body");
            yield Ok(StreamEvent::Outline(outline.content.clone()));

            let prompt = body_prompt(&session, &outline.content, &research);
            let mut body = Box::pin(stream_version(ctx.clone(), "generate", prompt, BODY_MAX_TOKENS, None));
            while let Some(event) = body.next().await {
                yield event;
            }
        };

        Box::pin(output)
    }
}

fn body_prompt(session: &Session, outline: &str, research: &str) -> String {
    let params = &session.parameters;
    format!(
        r#"Write a {} based on this outline and research.

OUTLINE:
{}

RESEARCH:
{}

REQUIREMENTS:
- Tone: {}
- Audience: {}
- Target length: {} words
- Keywords: {}
- {}

Write in markdown format with a compelling H1 title and clear section headings.
Write the complete content:"#,
        params.content_type,
        outline,
        truncate_chars(research, BODY_RESEARCH_CHARS),
        params.tone,
        params.audience_level,
        params.word_count,
        params.keyword_list(),
        params.custom_instructions.as_deref().unwrap_or("")
    )
}
