//! services/api/src/agents/mod.rs
//!
//! The language-model agents. Each one builds a fixed system prompt plus a
//! user prompt from the caller's context, runs a single completion through the
//! `LanguageModelService` port, and parses the text into a typed result.

pub mod clarification;
pub mod interviewer;
pub mod planner;
pub mod psychometric;
pub mod summarizer;

pub use clarification::{ClarificationAgent, ClarificationResponse, ClarificationStatus};
pub use interviewer::{
    InterviewerAction, InterviewerAgent, InterviewerDecision, InterviewerTurn, ParsedDecision,
};
pub use planner::{PlanRequest, PlannerAgent};
pub use psychometric::{PsychometricAgent, PsychometricAnalysis};
pub use summarizer::{SessionSummary, Sentiment, SummarizerAgent};

use interview_core::{
    domain::render_transcript,
    ports::{InterviewRepository, PortError, PortResult},
};
use tracing::debug;

/// Returns the outermost `{...}` span, which is how models tend to wrap JSON
/// in prose or markdown fences.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Finds the transcript an analysis agent should read: the inline text when it
/// has content, otherwise whatever is stored for the session.
pub async fn resolve_transcript(
    repo: &dyn InterviewRepository,
    inline: Option<&str>,
    session_id: Option<&str>,
) -> PortResult<String> {
    if let Some(text) = inline.map(str::trim).filter(|t| !t.is_empty()) {
        return Ok(text.to_string());
    }

    let session_id = session_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            PortError::InvalidInput("transcript or sessionId is required".to_string())
        })?;

    let chunks = repo.get_transcript_chunks(session_id).await?;
    let from_chunks = chunks
        .iter()
        .map(|c| format!("{}: {}", c.speaker.as_str(), c.text.trim()))
        .collect::<Vec<_>>()
        .join("\n");
    if !from_chunks.trim().is_empty() {
        debug!(session_id, chunks = chunks.len(), "Transcript resolved from stored chunks");
        return Ok(from_chunks);
    }

    match repo.get_session(session_id).await {
        Ok(session) => {
            let text = render_transcript(&session.transcript);
            if text.trim().is_empty() {
                Err(PortError::NotFound(format!("transcript for session {session_id}")))
            } else {
                Ok(text)
            }
        }
        Err(PortError::NotFound(_)) => Err(PortError::NotFound(format!(
            "transcript for session {session_id}"
        ))),
        Err(e) => Err(e),
    }
}
