//! crates/interview_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the orchestrator's core logic.
//! These traits form the boundary of the hexagonal architecture: the language
//! model, the avatar provider, the media server and the vector store all sit
//! behind one of them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    AvatarSession, EvaluationMetric, GoalStatus, InterviewPlan, InterviewSession,
    PsychometricProfile, ResearchGoal, SessionStatus, SummaryChunk, TranscriptChunk,
    TranscriptEntry,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// `Clone` so a single upstream result can be handed to every waiting caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("{0} is not configured")]
    Configuration(String),
    #[error("Upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Language Model
//=========================================================================================

/// A single system + user prompt completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    /// Ask the model to constrain its output to a JSON object.
    pub json_mode: bool,
}

#[async_trait]
pub trait LanguageModelService: Send + Sync {
    /// Returns the text of the first choice.
    async fn complete(&self, request: CompletionRequest) -> PortResult<String>;
}

#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, text: &str) -> PortResult<Vec<f32>>;
}

//=========================================================================================
// Avatar Provider
//=========================================================================================

#[derive(Debug, Clone)]
pub struct CreateAvatarAgent {
    pub name: String,
    pub system_prompt: String,
    pub language: String,
    pub greeting: Option<String>,
}

/// Encoded audio relayed to the avatar provider.
#[derive(Debug, Clone)]
pub struct AudioPayload {
    pub data: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, Clone)]
pub struct CreateAvatarSession {
    pub livekit_url: String,
    pub livekit_token: String,
    pub agent_id: Option<String>,
}

/// Outcome of ending an avatar session. A provider 404 is a normal outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndOutcome {
    Ended,
    AlreadyGone,
}

/// A call the provider recorded for an agent. Call ids key the transcript endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct AvatarCall {
    pub call_id: String,
    pub agent_id: Option<String>,
    pub status: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

impl AvatarCall {
    pub fn is_finished(&self) -> bool {
        self.status.as_deref().is_some_and(|s| {
            matches!(
                s.to_lowercase().as_str(),
                "completed" | "ended" | "finished" | "done" | "stopped" | "closed"
            )
        })
    }
}

#[async_trait]
pub trait AvatarService: Send + Sync {
    async fn create_agent(&self, request: CreateAvatarAgent) -> PortResult<String>;
    async fn create_session(&self, request: CreateAvatarSession) -> PortResult<AvatarSession>;
    async fn start_session(&self, session_id: &str) -> PortResult<()>;
    async fn send_message(&self, session_id: &str, text: &str) -> PortResult<()>;
    async fn push_audio(&self, session_id: &str, audio: AudioPayload) -> PortResult<()>;
    /// Fails with `NotFound` when the provider no longer knows the session.
    async fn get_session(&self, session_id: &str) -> PortResult<AvatarSession>;
    async fn end_session(&self, session_id: &str) -> PortResult<EndOutcome>;
    /// Calls recorded for an agent, most recent first.
    async fn list_calls(&self, agent_id: &str) -> PortResult<Vec<AvatarCall>>;
    /// The messages the provider recorded for one call, in timestamp order.
    async fn fetch_transcript(&self, call_id: &str) -> PortResult<Vec<TranscriptEntry>>;
}

//=========================================================================================
// Media Server
//=========================================================================================

/// The room grants carried by an access token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomGrants {
    pub room: String,
    pub room_join: bool,
    pub can_publish: bool,
    pub can_subscribe: bool,
    pub can_publish_data: bool,
    pub can_update_own_metadata: bool,
}

impl RoomGrants {
    /// Join, publish, subscribe and publish-data in one room.
    pub fn participant(room: impl Into<String>) -> Self {
        Self {
            room: room.into(),
            room_join: true,
            can_publish: true,
            can_subscribe: true,
            can_publish_data: true,
            can_update_own_metadata: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub identity: String,
    pub name: String,
    pub metadata: Option<String>,
    pub grants: RoomGrants,
}

/// A remote participant seen in a media room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomParticipant {
    pub identity: String,
    pub name: String,
}

pub trait AccessTokenIssuer: Send + Sync {
    fn issue(&self, request: &TokenRequest) -> PortResult<String>;
}

#[async_trait]
pub trait RoomService: Send + Sync {
    async fn list_participants(&self, room: &str) -> PortResult<Vec<RoomParticipant>>;
}

//=========================================================================================
// Idempotency Cache
//=========================================================================================

/// What the orchestrator remembers about an avatar session it created.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedSession {
    pub session: AvatarSession,
    pub created_at: DateTime<Utc>,
    pub status: String,
}

/// A keyed cache of recently created avatar sessions.
///
/// The in-process implementation only deduplicates within one process; a
/// deployment with several instances needs a shared store behind this trait.
#[async_trait]
pub trait SessionCache: Send + Sync {
    async fn get(&self, key: &str) -> PortResult<Option<CachedSession>>;
    async fn put(&self, key: &str, entry: CachedSession) -> PortResult<()>;
    async fn remove(&self, key: &str) -> PortResult<()>;
    /// Drops whichever key maps to `session_id` and returns that key.
    async fn remove_by_session_id(&self, session_id: &str) -> PortResult<Option<String>>;
    /// Removes every entry created before `cutoff`; returns how many went.
    async fn evict_older_than(&self, cutoff: DateTime<Utc>) -> PortResult<usize>;
}

//=========================================================================================
// Vector Store Repository
//=========================================================================================

#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub status: Option<SessionStatus>,
    pub limit: Option<usize>,
}

/// A transcript chunk together with its embedding, if one could be produced.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: TranscriptChunk,
    pub vector: Option<Vec<f32>>,
}

#[async_trait]
pub trait InterviewRepository: Send + Sync {
    // --- Schema ---
    async fn ensure_schema(&self) -> PortResult<Vec<String>>;

    // --- Research Goals ---
    async fn create_research_goal(&self, goal: ResearchGoal) -> PortResult<ResearchGoal>;
    async fn get_research_goal(&self, goal_id: &str) -> PortResult<ResearchGoal>;
    async fn list_research_goals(&self, status: Option<GoalStatus>) -> PortResult<Vec<ResearchGoal>>;
    async fn update_research_goal(&self, goal: ResearchGoal) -> PortResult<()>;
    async fn search_research_goals(&self, query: &str, limit: usize) -> PortResult<Vec<ResearchGoal>>;

    // --- Interview Plans ---
    async fn save_interview_plan(&self, plan: InterviewPlan) -> PortResult<()>;
    async fn get_plans_for_goal(&self, goal_id: &str) -> PortResult<Vec<InterviewPlan>>;

    // --- Interview Sessions ---
    async fn upsert_session(&self, session: &InterviewSession) -> PortResult<()>;
    async fn get_session(&self, session_id: &str) -> PortResult<InterviewSession>;
    async fn list_sessions(&self, filter: SessionFilter) -> PortResult<Vec<InterviewSession>>;
    async fn delete_session(&self, session_id: &str) -> PortResult<()>;

    // --- Transcript Chunks ---
    /// Writes chunks keyed by a deterministic id; returns how many were stored.
    async fn save_transcript_chunks(
        &self,
        session_id: &str,
        chunks: Vec<EmbeddedChunk>,
    ) -> PortResult<usize>;
    /// Returns chunks in turn order.
    async fn get_transcript_chunks(&self, session_id: &str) -> PortResult<Vec<TranscriptChunk>>;
    async fn search_transcript_chunks(
        &self,
        query: &str,
        limit: usize,
    ) -> PortResult<Vec<TranscriptChunk>>;

    // --- Summaries & Profiles ---
    async fn save_summary_chunk(&self, summary: SummaryChunk) -> PortResult<()>;
    async fn get_summary_chunks(&self, session_id: &str) -> PortResult<Vec<SummaryChunk>>;
    /// Create-or-replace keyed by session id.
    async fn upsert_psychometric_profile(&self, profile: PsychometricProfile) -> PortResult<()>;
    async fn get_psychometric_profile(&self, session_id: &str) -> PortResult<PsychometricProfile>;

    // --- Evaluation Metrics ---
    async fn save_evaluation_metric(&self, metric: EvaluationMetric) -> PortResult<()>;
    async fn get_evaluation_metrics(
        &self,
        session_id: &str,
        metric_type: Option<&str>,
        limit: usize,
    ) -> PortResult<Vec<EvaluationMetric>>;
}
