//! services/api/src/agents/interviewer.rs
//!
//! Decides the next conversational move after each participant answer.

use interview_core::ports::{
    CompletionRequest, InterviewRepository, LanguageModelService, PortError, PortResult,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use utoipa::ToSchema;

const DEFAULT_FOLLOWUP: &str = "I understand. Can you tell me more about that?";
const SIMILAR_RESPONSES: usize = 3;

const SYSTEM_PROMPT: &str = r#"You are a friendly, non-judgmental interviewer. Introduce yourself, summarise the purpose of the study and ask the first question from the script. After each answer, decide whether to ask a follow-up or move on. Use active listening cues ("I see", "Can you tell me more about that?"). Respect pauses and only interrupt to clarify. Never share opinions or advice.

Guidelines:
- Maintain a warm and empathetic tone. Do not comment on the content of answers beyond prompting for elaboration.
- If the respondent goes off topic but shares something important, temporarily deviate from the script to explore the insight, then return to the planned questions.
- Use the conversation context to generate appropriate follow-ups.
- Return structured responses with action type and content."#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum InterviewerAction {
    AskFollowup,
    MoveToNext,
    Clarify,
    EndInterview,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InterviewerDecision {
    pub action: InterviewerAction,
    pub content: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_id: Option<String>,
}

/// A decision either parsed from well-formed model output or recovered from free text.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedDecision {
    Structured(InterviewerDecision),
    Recovered(InterviewerDecision),
}

impl ParsedDecision {
    pub fn decision(&self) -> &InterviewerDecision {
        match self {
            ParsedDecision::Structured(d) | ParsedDecision::Recovered(d) => d,
        }
    }

    pub fn into_decision(self) -> InterviewerDecision {
        match self {
            ParsedDecision::Structured(d) | ParsedDecision::Recovered(d) => d,
        }
    }

    pub fn is_recovered(&self) -> bool {
        matches!(self, ParsedDecision::Recovered(_))
    }
}

/// Parses model output strictly; anything else becomes a follow-up carrying the raw text.
pub fn parse_decision(text: &str) -> ParsedDecision {
    match serde_json::from_str::<InterviewerDecision>(text.trim()) {
        Ok(decision) => ParsedDecision::Structured(decision),
        Err(_) => {
            let content = if text.trim().is_empty() {
                DEFAULT_FOLLOWUP.to_string()
            } else {
                text.to_string()
            };
            ParsedDecision::Recovered(InterviewerDecision {
                action: InterviewerAction::AskFollowup,
                content,
                reason: "Generated from text response".to_string(),
                question_id: Some("followup".to_string()),
            })
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InterviewerTurn {
    #[serde(default)]
    #[schema(value_type = Object)]
    pub script: Option<Value>,
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub current_question: String,
    #[serde(default)]
    pub participant_response: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub session_context: Option<Value>,
}

pub struct InterviewerAgent {
    llm: Arc<dyn LanguageModelService>,
    repo: Option<Arc<dyn InterviewRepository>>,
}

impl InterviewerAgent {
    /// `repo` enables the similar-responses context; without it the prompt omits that section.
    pub fn new(
        llm: Arc<dyn LanguageModelService>,
        repo: Option<Arc<dyn InterviewRepository>>,
    ) -> Self {
        Self { llm, repo }
    }

    async fn similar_responses(&self, response: &str) -> String {
        let Some(repo) = &self.repo else {
            return String::new();
        };
        if response.trim().is_empty() {
            return String::new();
        }
        match repo.search_transcript_chunks(response, SIMILAR_RESPONSES).await {
            Ok(chunks) => chunks
                .into_iter()
                .map(|c| c.text)
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => {
                debug!(error = %e, "Similar-response search skipped");
                String::new()
            }
        }
    }

    fn user_prompt(turn: &InterviewerTurn, similar: &str) -> String {
        let json = |v: &Option<Value>| {
            v.as_ref()
                .map(Value::to_string)
                .unwrap_or_else(|| "null".to_string())
        };
        format!(
            "Interview Script: {}\n\
             Current Question: {}\n\
             Participant Response: {}\n\
             Session Context: {}\n\
             Full Transcript: {}\n\n\
             Similar responses from past interviews: {}\n\n\
             Based on the participant's response and similar past responses, decide what to do \
             next. Return a JSON object with:\n\
             {{\n  \"action\": \"ask_followup\" | \"move_to_next\" | \"clarify\" | \"end_interview\",\n  \
             \"content\": \"string\",\n  \"reason\": \"string\",\n  \"questionId\": \"string\" (if applicable)\n}}",
            json(&turn.script),
            turn.current_question,
            turn.participant_response,
            json(&turn.session_context),
            turn.transcript,
            similar,
        )
    }

    pub async fn decide(&self, turn: &InterviewerTurn) -> PortResult<ParsedDecision> {
        if turn.participant_response.trim().is_empty() && turn.transcript.trim().is_empty() {
            return Err(PortError::InvalidInput(
                "participantResponse or transcript is required".to_string(),
            ));
        }

        let similar = self.similar_responses(&turn.participant_response).await;
        let text = self
            .llm
            .complete(CompletionRequest {
                system: SYSTEM_PROMPT.to_string(),
                user: Self::user_prompt(turn, &similar),
                temperature: 0.7,
                json_mode: false,
            })
            .await?;

        let parsed = parse_decision(&text);
        if parsed.is_recovered() {
            warn!("Interviewer output was not a structured decision, using it as a follow-up");
        }
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn structured_json_passes_through() {
        let parsed = parse_decision(
            r#"{"action":"move_to_next","content":"Thanks! Next question.","reason":"answered","questionId":"q2"}"#,
        );
        assert_eq!(
            parsed,
            ParsedDecision::Structured(InterviewerDecision {
                action: InterviewerAction::MoveToNext,
                content: "Thanks! Next question.".into(),
                reason: "answered".into(),
                question_id: Some("q2".into()),
            })
        );
    }

    #[test]
    fn free_text_becomes_a_followup() {
        let parsed = parse_decision("Could you walk me through that last purchase?");
        assert!(parsed.is_recovered());
        let decision = parsed.into_decision();
        assert_eq!(decision.action, InterviewerAction::AskFollowup);
        assert_eq!(decision.content, "Could you walk me through that last purchase?");
        assert_eq!(decision.reason, "Generated from text response");
        assert_eq!(decision.question_id.as_deref(), Some("followup"));
    }

    #[test]
    fn unknown_action_is_recovered() {
        let parsed = parse_decision(r#"{"action":"dance","content":"x"}"#);
        assert!(parsed.is_recovered());
    }

    #[test]
    fn empty_output_uses_default_prompt() {
        let parsed = parse_decision("   ");
        assert_eq!(parsed.decision().content, DEFAULT_FOLLOWUP);
    }
}
