//! services/api/src/agents/summarizer.rs

use chrono::Utc;
use interview_core::domain::SummaryChunk;
use interview_core::ports::{CompletionRequest, InterviewRepository, LanguageModelService, PortResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{extract_json_object, resolve_transcript};

const SYSTEM_PROMPT: &str = "You are an expert research analyst. Summarize interview transcripts in a \
concise, insightful way. Focus on what the participant actually said, the themes that recur, \
their emotional state and anything a product team should act on.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    #[default]
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub summary: String,
    #[serde(default)]
    pub key_themes: Vec<String>,
    #[serde(default)]
    pub sentiment: Sentiment,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub emotional_tone: String,
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub pain_points: Vec<String>,
    #[serde(default)]
    pub feature_requests: Vec<String>,
}

impl Default for SessionSummary {
    fn default() -> Self {
        Self {
            summary: "Summary could not be generated from the model output.".to_string(),
            key_themes: Vec::new(),
            sentiment: Sentiment::Neutral,
            keywords: Vec::new(),
            emotional_tone: "neutral".to_string(),
            insights: Vec::new(),
            pain_points: Vec::new(),
            feature_requests: Vec::new(),
        }
    }
}

/// Lenient parse: unknown sentiment values fall back to neutral, anything
/// unreadable becomes the default summary.
pub fn parse_summary(text: &str) -> SessionSummary {
    let Some(json) = extract_json_object(text) else {
        return SessionSummary::default();
    };
    let Ok(mut value) = serde_json::from_str::<serde_json::Value>(json) else {
        return SessionSummary::default();
    };
    if let Some(obj) = value.as_object_mut() {
        let sentiment = obj
            .get("sentiment")
            .and_then(|s| s.as_str())
            .map(str::to_lowercase);
        let normalized = match sentiment.as_deref() {
            Some("positive") => "positive",
            Some("negative") => "negative",
            _ => "neutral",
        };
        obj.insert("sentiment".into(), normalized.into());
    }
    serde_json::from_value(value).unwrap_or_default()
}

pub struct SummarizerAgent {
    llm: Arc<dyn LanguageModelService>,
    repo: Arc<dyn InterviewRepository>,
}

impl SummarizerAgent {
    pub fn new(llm: Arc<dyn LanguageModelService>, repo: Arc<dyn InterviewRepository>) -> Self {
        Self { llm, repo }
    }

    fn user_prompt(transcript: &str) -> String {
        format!(
            "Summarize the following interview transcript in at most two sentences, then \
             extract its structure.\n\n\
             Transcript:\n{transcript}\n\n\
             Return a JSON object with:\n\
             - summary: the summary, no more than two sentences\n\
             - keyThemes: array of the main themes discussed\n\
             - sentiment: one of positive, negative, neutral\n\
             - keywords: array of important keywords\n\
             - emotionalTone: a short description of the participant's emotional tone\n\
             - insights: array of key insights or learnings\n\
             - painPoints: array of problems or frustrations the participant described\n\
             - featureRequests: array of things the participant wished existed"
        )
    }

    pub async fn summarize(
        &self,
        transcript: Option<&str>,
        session_id: Option<&str>,
    ) -> PortResult<SessionSummary> {
        let transcript = resolve_transcript(self.repo.as_ref(), transcript, session_id).await?;

        let text = self
            .llm
            .complete(CompletionRequest {
                system: SYSTEM_PROMPT.to_string(),
                user: Self::user_prompt(&transcript),
                temperature: 0.3,
                json_mode: true,
            })
            .await?;

        let summary = parse_summary(&text);

        if let Some(session_id) = session_id.filter(|id| !id.trim().is_empty()) {
            let chunk = SummaryChunk {
                summary_id: Uuid::new_v4().to_string(),
                session_id: session_id.to_string(),
                chunk_id: String::new(),
                summary: summary.summary.clone(),
                keywords: summary.keywords.clone(),
                key_insights: summary.insights.clone(),
                pain_points: summary.pain_points.clone(),
                feature_requests: summary.feature_requests.clone(),
                created_at: Utc::now(),
            };
            match self.repo.save_summary_chunk(chunk).await {
                Ok(()) => info!(session_id, "Session summary stored"),
                Err(e) => warn!(session_id, error = %e, "Failed to store session summary"),
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_summary() {
        let text = "```json\n{\"summary\":\"Ada likes the app.\",\"keyThemes\":[\"onboarding\"],\
                    \"sentiment\":\"Positive\",\"keywords\":[\"app\"],\"emotionalTone\":\"warm\",\
                    \"insights\":[\"wants dark mode\"]}\n```";
        let summary = parse_summary(text);
        assert_eq!(summary.summary, "Ada likes the app.");
        assert_eq!(summary.sentiment, Sentiment::Positive);
        assert_eq!(summary.key_themes, vec!["onboarding"]);
        assert!(summary.pain_points.is_empty());
    }

    #[test]
    fn odd_sentiment_is_neutral() {
        let summary = parse_summary(r#"{"summary":"ok","sentiment":"mixed"}"#);
        assert_eq!(summary.sentiment, Sentiment::Neutral);
        assert_eq!(summary.summary, "ok");
    }

    #[test]
    fn garbage_recovers_to_default() {
        assert_eq!(parse_summary("not json at all"), SessionSummary::default());
        assert_eq!(parse_summary("{\"summary\": 12}"), SessionSummary::default());
    }
}
