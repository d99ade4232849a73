//! services/api/src/agents/clarification.rs
//!
//! Asks the researcher a fixed number of clarification questions about their
//! goal, then hands back a brief for the planner.

use interview_core::ports::{CompletionRequest, LanguageModelService, PortError, PortResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;

pub const COMPLETION_SENTINEL: &str = "CLARIFICATION_COMPLETE";

/// Used when the model asks fewer questions than required.
const FALLBACK_QUESTIONS: [&str; 3] = [
    "Who is the primary audience you want to hear from in this research?",
    "What decisions should the findings of this research help you make?",
    "Are there any sensitive topics or boundaries the interviewer should be careful with?",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ClarificationStatus {
    Questions,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClarificationResponse {
    pub status: ClarificationStatus,
    pub questions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brief: Option<String>,
}

impl ClarificationResponse {
    fn complete(brief: String) -> Self {
        Self {
            status: ClarificationStatus::Complete,
            questions: Vec::new(),
            brief: Some(brief),
        }
    }
}

pub struct ClarificationAgent {
    llm: Arc<dyn LanguageModelService>,
    question_count: usize,
}

impl ClarificationAgent {
    pub fn new(llm: Arc<dyn LanguageModelService>, question_count: usize) -> Self {
        Self {
            llm,
            question_count: question_count.max(1),
        }
    }

    pub fn question_count(&self) -> usize {
        self.question_count
    }

    fn default_brief(&self, goal: &str, answers: usize) -> String {
        let rounds = if answers == 1 { "round" } else { "rounds" };
        format!(
            "Research goal clarified through {answers} {rounds} of questions. Ready to proceed \
             with interview script generation based on: {goal} and the provided clarifications."
        )
    }

    fn system_prompt(&self) -> String {
        let count = self.question_count;
        let noun = if count == 1 { "question" } else { "questions" };
        format!(
            "You are a senior user-research strategist working for a product team conducting \
             market and user research for possible product ideas. A researcher has provided a \
             high-level goal. Your job is to ask exactly {count} clarification {noun} to make \
             sure you understand the most critical aspects of the research goal. Do not generate \
             an interview plan yet. Frame questions neutrally and avoid assuming what the \
             researcher wants.\n\n\
             Guidelines:\n\
             - Ask exactly {count} {noun}, one per line, numbered.\n\
             - Use open, non-leading wording (\"How would you define...?\" instead of \"Is...?\").\n\
             - If the topic is sensitive (e.g. sexual behaviour or finances), ask about comfort \
             levels and consent processes.\n\
             - Focus on the target audience, the scope and context, or sensitive considerations.\n\
             - Once every question has been answered, respond with \"{COMPLETION_SENTINEL}\" \
             followed by a structured brief."
        )
    }

    fn user_prompt(&self, goal: &str, answers: &[String]) -> String {
        let remaining = self.question_count - answers.len();
        format!(
            "Research Goal: {goal}\n\n\
             Previous clarifications: {}\n\
             Number of clarifications received: {}\n\n\
             Ask the remaining {remaining} question(s) to reach exactly {} in total.",
            serde_json::to_string(answers).unwrap_or_default(),
            answers.len(),
            self.question_count
        )
    }

    /// Runs one clarification round.
    pub async fn clarify(&self, goal: &str, answers: &[String]) -> PortResult<ClarificationResponse> {
        let goal = goal.trim();
        if goal.is_empty() {
            return Err(PortError::InvalidInput("researchGoal is required".to_string()));
        }

        if answers.len() >= self.question_count {
            info!(answers = answers.len(), "Clarification complete by answer count");
            return Ok(ClarificationResponse::complete(
                self.default_brief(goal, answers.len()),
            ));
        }

        let text = self
            .llm
            .complete(CompletionRequest {
                system: self.system_prompt(),
                user: self.user_prompt(goal, answers),
                temperature: 0.7,
                json_mode: false,
            })
            .await?;

        Ok(self.parse(&text, goal, answers.len()))
    }

    fn parse(&self, text: &str, goal: &str, answered: usize) -> ClarificationResponse {
        if text.contains(COMPLETION_SENTINEL) {
            let brief = text.replace(COMPLETION_SENTINEL, "").trim().to_string();
            let brief = if brief.is_empty() {
                self.default_brief(goal, answered)
            } else {
                brief
            };
            return ClarificationResponse::complete(brief);
        }

        let wanted = self.question_count - answered;
        let mut questions = extract_questions(text);
        questions.truncate(wanted);

        if questions.len() < wanted {
            warn!(
                got = questions.len(),
                wanted, "Model asked too few clarification questions, padding"
            );
            let missing = wanted - questions.len();
            questions.extend(
                FALLBACK_QUESTIONS
                    .iter()
                    .cycle()
                    .take(missing)
                    .map(|q| q.to_string()),
            );
        }

        ClarificationResponse {
            status: ClarificationStatus::Questions,
            questions,
            brief: None,
        }
    }
}

/// Lines that look like questions: they contain `?` or start with `N.`.
pub fn extract_questions(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| line.contains('?') || starts_numbered(line))
        .map(|line| strip_numbering(line).to_string())
        .filter(|q| !q.is_empty())
        .collect()
}

fn starts_numbered(line: &str) -> bool {
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    digits > 0 && line[digits..].starts_with('.')
}

fn strip_numbering(line: &str) -> &str {
    if starts_numbered(line) {
        let digits = line.chars().take_while(char::is_ascii_digit).count();
        line[digits + 1..].trim_start()
    } else {
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_lines_are_stripped() {
        let text = "Sure! Here are my questions:\n1. Who are the participants?\n2. How long is each session\nThanks.";
        assert_eq!(
            extract_questions(text),
            vec!["Who are the participants?", "How long is each session"]
        );
    }

    #[test]
    fn question_marks_count_without_numbering() {
        assert_eq!(
            extract_questions("What market are you targeting?\n\nok"),
            vec!["What market are you targeting?"]
        );
    }
}
