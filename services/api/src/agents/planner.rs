//! services/api/src/agents/planner.rs
//!
//! Turns a clarified research goal into a versioned interview script.

use chrono::Utc;
use interview_core::domain::{InterviewPlan, PlanQuestion};
use interview_core::ports::{
    CompletionRequest, InterviewRepository, LanguageModelService, PortError, PortResult,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::extract_json_object;

const SYSTEM_PROMPT: &str = "You are an expert qualitative researcher. Design semi-structured \
interview scripts with 5-8 open-ended questions that explore experiences, motivations and pain \
points without leading the participant. Include a short neutral introduction, follow-up questions \
for each question, closing remarks and reminders for the interviewer.";

/// What the planner needs to know about the goal.
#[derive(Debug, Clone, Default)]
pub struct PlanRequest {
    pub research_goal_id: Option<String>,
    pub research_goal: String,
    pub clarifications: Vec<String>,
    pub brief: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQuestion {
    #[serde(default)]
    id: Option<String>,
    text: String,
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    intent: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPlan {
    #[serde(default)]
    introduction: String,
    questions: Vec<RawQuestion>,
    #[serde(default)]
    follow_ups: HashMap<String, Vec<String>>,
    #[serde(default)]
    closing_remarks: String,
    #[serde(default)]
    reminders: Vec<String>,
}

/// Parses the model's script. Unlike the analysis agents there is nothing
/// sensible to default to, so unreadable output is an error.
pub fn parse_plan(text: &str, research_goal_id: &str, version: u32) -> PortResult<InterviewPlan> {
    let json = extract_json_object(text).ok_or_else(|| PortError::Upstream {
        status: 502,
        message: "planner response contained no JSON object".to_string(),
    })?;
    let raw: RawPlan = serde_json::from_str(json).map_err(|e| PortError::Upstream {
        status: 502,
        message: format!("planner response was not a valid plan: {e}"),
    })?;

    let questions: Vec<PlanQuestion> = raw
        .questions
        .into_iter()
        .filter(|q| !q.text.trim().is_empty())
        .enumerate()
        .map(|(i, q)| PlanQuestion {
            id: q
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| format!("q{}", i + 1)),
            text: q.text.trim().to_string(),
            intent: q.intent,
            category: q.topic,
        })
        .collect();

    if questions.is_empty() {
        return Err(PortError::Upstream {
            status: 502,
            message: "planner response contained no questions".to_string(),
        });
    }

    Ok(InterviewPlan {
        plan_id: Uuid::new_v4().to_string(),
        research_goal_id: research_goal_id.to_string(),
        introduction: raw.introduction,
        questions,
        follow_ups: raw.follow_ups,
        closing_remarks: raw.closing_remarks,
        reminders: raw.reminders,
        version,
        created_at: Utc::now(),
    })
}

pub struct PlannerAgent {
    llm: Arc<dyn LanguageModelService>,
    repo: Arc<dyn InterviewRepository>,
}

impl PlannerAgent {
    pub fn new(llm: Arc<dyn LanguageModelService>, repo: Arc<dyn InterviewRepository>) -> Self {
        Self { llm, repo }
    }

    fn user_prompt(request: &PlanRequest) -> String {
        let clarifications = if request.clarifications.is_empty() {
            "None".to_string()
        } else {
            request
                .clarifications
                .iter()
                .enumerate()
                .map(|(i, c)| format!("{}. {}", i + 1, c))
                .collect::<Vec<_>>()
                .join("\n")
        };
        format!(
            "Research Goal: {}\n\n\
             Clarifications:\n{}\n\n\
             Brief: {}\n\n\
             Create an interview script. Return a JSON object with:\n\
             {{\n  \"introduction\": \"string\",\n  \
             \"questions\": [{{\"id\": \"q1\", \"text\": \"string\", \"topic\": \"string\"}}],\n  \
             \"followUps\": {{\"q1\": [\"string\"]}},\n  \
             \"closingRemarks\": \"string\",\n  \
             \"reminders\": [\"string\"]\n}}",
            request.research_goal.trim(),
            clarifications,
            request.brief.as_deref().unwrap_or("None"),
        )
    }

    /// The next version for a goal: one past the highest stored, or 1.
    async fn next_version(&self, goal_id: &str) -> u32 {
        match self.repo.get_plans_for_goal(goal_id).await {
            Ok(plans) => plans.iter().map(|p| p.version).max().unwrap_or(0) + 1,
            Err(e) => {
                warn!(goal_id, error = %e, "Could not read previous plans, starting at version 1");
                1
            }
        }
    }

    pub async fn plan(&self, request: PlanRequest) -> PortResult<InterviewPlan> {
        if request.research_goal.trim().is_empty() {
            return Err(PortError::InvalidInput("researchGoal is required".to_string()));
        }
        let goal_id = request
            .research_goal_id
            .clone()
            .filter(|id| !id.trim().is_empty());

        let text = self
            .llm
            .complete(CompletionRequest {
                system: SYSTEM_PROMPT.to_string(),
                user: Self::user_prompt(&request),
                temperature: 0.7,
                json_mode: false,
            })
            .await?;

        let Some(goal_id) = goal_id else {
            return parse_plan(&text, "", 1);
        };

        let version = self.next_version(&goal_id).await;
        let plan = parse_plan(&text, &goal_id, version)?;
        match self.repo.save_interview_plan(plan.clone()).await {
            Ok(()) => info!(goal_id, version, plan_id = %plan.plan_id, "Interview plan stored"),
            Err(e) => warn!(goal_id, error = %e, "Failed to store interview plan"),
        }
        Ok(plan)
    }
}
