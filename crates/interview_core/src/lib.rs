pub mod chunking;
pub mod domain;
pub mod matcher;
pub mod ports;
pub mod retry;
pub mod session_registry;

pub use chunking::{ChunkedTranscript, ChunkingOptions, ChunkingStats};
pub use domain::{
    AggregatedInsights, AvatarSession, AvatarSessionState, EvaluationMetric, GoalStatus,
    InterviewPlan, InterviewSession, PlanQuestion, PsychometricProfile, ResearchGoal,
    SessionAnalytics, SessionStatus, Speaker, SummaryChunk, TranscriptChunk, TranscriptEntry,
};
pub use matcher::{AgentMatch, AgentMatcher, PrefixMatcher};
pub use ports::{
    AccessTokenIssuer, AvatarService, EmbeddingService, InterviewRepository,
    LanguageModelService, PortError, PortResult, RoomService, SessionCache,
};
pub use retry::RetryPolicy;
pub use session_registry::{InMemorySessionCache, SessionRegistry};
