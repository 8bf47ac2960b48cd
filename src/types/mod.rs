use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

// ============= Generation Parameters =============

/// Shape of the content a session produces.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    #[default]
    BlogPost,
    TechnicalTutorial,
    MarketingContent,
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ContentType::BlogPost => "blog_post",
            ContentType::TechnicalTutorial => "technical_tutorial",
            ContentType::MarketingContent => "marketing_content",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Professional,
    Casual,
    Technical,
    Friendly,
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Tone::Professional => "professional",
            Tone::Casual => "casual",
            Tone::Technical => "technical",
            Tone::Friendly => "friendly",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AudienceLevel {
    Beginner,
    Intermediate,
    Expert,
    #[default]
    General,
}

impl fmt::Display for AudienceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AudienceLevel::Beginner => "beginner",
            AudienceLevel::Intermediate => "intermediate",
            AudienceLevel::Expert => "expert",
            AudienceLevel::General => "general",
        };
        f.write_str(label)
    }
}

/// Smallest accepted target length in words.
pub const MIN_WORD_COUNT: u32 = 500;
/// Largest accepted target length in words.
pub const MAX_WORD_COUNT: u32 = 5000;

/// Parameters controlling content generation for a session.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct GenerationParameters {
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub audience_level: AudienceLevel,
    #[serde(default = "default_word_count")]
    pub word_count: u32,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_instructions: Option<String>,
}

fn default_word_count() -> u32 {
    1500
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            content_type: ContentType::default(),
            tone: Tone::default(),
            audience_level: AudienceLevel::default(),
            word_count: default_word_count(),
            keywords: Vec::new(),
            custom_instructions: None,
        }
    }
}

impl GenerationParameters {
    /// Reject parameters outside the accepted ranges.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_WORD_COUNT..=MAX_WORD_COUNT).contains(&self.word_count) {
            return Err(AppError::InvalidInput(format!(
                "word_count must be between {} and {}, got {}",
                MIN_WORD_COUNT, MAX_WORD_COUNT, self.word_count
            )));
        }
        Ok(())
    }

    /// Keywords rendered for prompt inclusion.
    pub fn keyword_list(&self) -> String {
        if self.keywords.is_empty() {
            "None specified".to_string()
        } else {
            self.keywords.join(", ")
        }
    }
}

// ============= Session Types =============

/// Ordinal complexity of a research request.
///
/// The level fixes how many research objectives the orchestrator asks for.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    /// Single focus area, facts readily available.
    Simple,
    /// Several aspects, some comparison needed.
    #[default]
    Moderate,
    /// Broad topic, multiple perspectives.
    Complex,
}

impl Complexity {
    /// Number of research objectives requested for this level.
    pub fn objective_count(self) -> usize {
        match self {
            Complexity::Simple => 1,
            Complexity::Moderate => 3,
            Complexity::Complex => 5,
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Complexity::Simple => "simple",
            Complexity::Moderate => "moderate",
            Complexity::Complex => "complex",
        };
        f.write_str(label)
    }
}

/// Lifecycle status of a session. Transitions live in `sessions::lifecycle`.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Created,
    Researching,
    ReadyForGeneration,
    Generating,
    ReadyForReview,
    Iterating,
    Published,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionStatus::Created => "created",
            SessionStatus::Researching => "researching",
            SessionStatus::ReadyForGeneration => "ready_for_generation",
            SessionStatus::Generating => "generating",
            SessionStatus::ReadyForReview => "ready_for_review",
            SessionStatus::Iterating => "iterating",
            SessionStatus::Published => "published",
        };
        f.write_str(label)
    }
}

/// Snapshot of an agent's progress, kept on the session for display.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct AgentState {
    pub agent_id: String,
    /// lead, research, generator, iterator, publisher
    pub agent_type: String,
    pub status: String,
    pub current_task: String,
    pub tool_calls: u32,
    pub findings_count: usize,
}

/// A content creation session.
///
/// The versions list is a cache of the `versions/` entries in the
/// coordination store and is never serialized with the session record.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Session {
    pub id: String,
    pub topic: String,
    pub parameters: GenerationParameters,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default)]
    pub complexity: Complexity,
    #[serde(skip)]
    pub versions: Vec<Version>,
    #[serde(default)]
    pub agents: Vec<AgentState>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(topic: impl Into<String>, parameters: GenerationParameters) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            topic: topic.into(),
            parameters,
            status: SessionStatus::Created,
            complexity: Complexity::default(),
            versions: Vec::new(),
            agents: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The current version is always the highest sequence number.
    pub fn latest_version(&self) -> Option<&Version> {
        self.versions.iter().max_by_key(|v| v.version_number)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

// ============= Research Records =============

/// How a worker should shape its finding.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Summary,
    Detailed,
    BulletPoints,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OutputFormat::Summary => "concise summary",
            OutputFormat::Detailed => "detailed report",
            OutputFormat::BulletPoints => "bullet-point list",
        };
        f.write_str(label)
    }
}

/// Number of leading queries treated as broad.
pub const BROAD_QUERY_COUNT: usize = 2;

/// A unit of research work handed to exactly one worker.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct Objective {
    pub description: String,
    /// Ordered queries: the first two are broad, the rest narrow.
    pub queries: Vec<String>,
    #[serde(default)]
    pub output_format: OutputFormat,
    pub max_sources: usize,
    #[serde(default)]
    pub tool_guidance: String,
}

impl Objective {
    pub fn new(description: impl Into<String>, queries: Vec<String>) -> Self {
        Self {
            description: description.into(),
            queries,
            output_format: OutputFormat::default(),
            max_sources: 5,
            tool_guidance: String::new(),
        }
    }

    pub fn with_format(mut self, output_format: OutputFormat) -> Self {
        self.output_format = output_format;
        self
    }

    pub fn with_max_sources(mut self, max_sources: usize) -> Self {
        self.max_sources = max_sources;
        self
    }

    pub fn with_guidance(mut self, tool_guidance: impl Into<String>) -> Self {
        self.tool_guidance = tool_guidance.into();
        self
    }

    pub fn broad_queries(&self) -> &[String] {
        &self.queries[..self.queries.len().min(BROAD_QUERY_COUNT)]
    }

    pub fn narrow_queries(&self) -> &[String] {
        self.queries.get(BROAD_QUERY_COUNT..).unwrap_or(&[])
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct SourceRecord {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

/// Durable result of one worker run, success or error.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct Finding {
    pub agent_id: String,
    pub objective: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub sources: Vec<SourceRecord>,
    #[serde(default)]
    pub tool_calls: u32,
    pub completed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Finding {
    /// Error-shaped finding recorded in place of a successful one.
    pub fn failed(
        agent_id: impl Into<String>,
        objective: impl Into<String>,
        error: impl Into<String>,
        tool_calls: u32,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            objective: objective.into(),
            summary: String::new(),
            sources: Vec::new(),
            tool_calls,
            completed_at: Utc::now(),
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Unified summary over all findings of a round.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct Synthesis {
    pub content: String,
    pub source_count: usize,
    pub round: u8,
    pub created_at: DateTime<Utc>,
}

/// Immutable content snapshot.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct Version {
    pub version_number: u32,
    pub content: String,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub feedback_applied: Option<String>,
}

/// Structural outline produced before the body is streamed.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct Outline {
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Decomposition recorded by the orchestrator.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct ResearchPlan {
    pub topic: String,
    pub complexity: Complexity,
    pub objectives: Vec<Objective>,
    pub created_at: DateTime<Utc>,
}

// ============= API Request/Response Types =============

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateSessionRequest {
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<GenerationParameters>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    pub session_id: String,
    pub topic: String,
    pub status: SessionStatus,
    pub complexity: Complexity,
    pub parameters: GenerationParameters,
    pub versions_count: usize,
    pub agents: Vec<AgentState>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Session> for SessionResponse {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.id.clone(),
            topic: session.topic.clone(),
            status: session.status,
            complexity: session.complexity,
            parameters: session.parameters.clone(),
            versions_count: session.versions.len(),
            agents: session.agents.clone(),
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IterateRequest {
    pub feedback: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VersionSummary {
    pub version_number: u32,
    pub generated_at: DateTime<Utc>,
    pub feedback_applied: Option<String>,
    pub content_preview: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VersionsResponse {
    pub session_id: String,
    pub versions: Vec<VersionSummary>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Default)]
pub struct PublishRequest {
    /// `draft` (default) or `publish`
    #[serde(default)]
    pub status: Option<String>,
}

// ============= Error Types =============

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("LLM error: {0}")]
    LLM(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Prefix the message with the stage and session it surfaced from.
    pub fn in_stage(self, stage: &str, session_id: &str) -> Self {
        let tag = |msg: String| format!("[{} | session {}] {}", stage, session_id, msg);
        match self {
            AppError::LLM(msg) => AppError::LLM(tag(msg)),
            AppError::Retrieval(msg) => AppError::Retrieval(tag(msg)),
            AppError::Storage(msg) => AppError::Storage(tag(msg)),
            AppError::Timeout(msg) => AppError::Timeout(tag(msg)),
            AppError::Cancelled(msg) => AppError::Cancelled(tag(msg)),
            AppError::Precondition(msg) => AppError::Precondition(tag(msg)),
            AppError::NotFound(msg) => AppError::NotFound(tag(msg)),
            AppError::InvalidInput(msg) => AppError::InvalidInput(tag(msg)),
            AppError::Publish(msg) => AppError::Publish(tag(msg)),
            AppError::Internal(msg) => AppError::Internal(tag(msg)),
        }
    }

    /// Failures that abort the whole operation rather than one item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Storage(_) | AppError::Cancelled(_))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match &self {
            AppError::Precondition(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Publish(_) => StatusCode::BAD_GATEWAY,
            AppError::LLM(_)
            | AppError::Retrieval(_)
            | AppError::Storage(_)
            | AppError::Cancelled(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.to_string()
        });

        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
