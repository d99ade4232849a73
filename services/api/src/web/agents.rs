//! services/api/src/web/agents.rs
//!
//! HTTP handlers for the language-model agents.

use crate::{
    agents::{interviewer::InterviewerTurn, PlanRequest},
    error::ApiResult,
    web::{ok_json, state::AppState},
};
use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClarificationPayload {
    #[serde(default)]
    pub research_goal: String,
    /// Answers to earlier clarification questions, oldest first.
    #[serde(default, alias = "clarifications")]
    pub answers: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlannerPayload {
    #[serde(default)]
    pub research_goal_id: Option<String>,
    #[serde(default)]
    pub research_goal: String,
    #[serde(default)]
    pub clarifications: Vec<String>,
    #[serde(default)]
    pub brief: Option<String>,
}

/// Either an inline transcript or the session whose stored transcript to use.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptPayload {
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Ask clarification questions about a research goal.
#[utoipa::path(
    post,
    path = "/agents/clarification",
    request_body = ClarificationPayload,
    responses(
        (status = 200, description = "Questions to ask, or the completed brief"),
        (status = 400, description = "Missing research goal"),
        (status = 500, description = "Model unavailable or failed")
    )
)]
pub async fn clarification_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<ClarificationPayload>,
) -> ApiResult<Json<Value>> {
    let response = app_state
        .clarification
        .clarify(&payload.research_goal, &payload.answers)
        .await?;
    ok_json(response)
}

/// Generate and store an interview plan.
#[utoipa::path(
    post,
    path = "/agents/planner",
    request_body = PlannerPayload,
    responses(
        (status = 200, description = "The generated plan"),
        (status = 400, description = "Missing research goal"),
        (status = 500, description = "Model unavailable or unreadable plan")
    )
)]
pub async fn planner_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<PlannerPayload>,
) -> ApiResult<Json<Value>> {
    let plan = app_state
        .planner
        .plan(PlanRequest {
            research_goal_id: payload.research_goal_id,
            research_goal: payload.research_goal,
            clarifications: payload.clarifications,
            brief: payload.brief,
        })
        .await?;
    ok_json(json!({ "plan": plan }))
}

/// Decide the interviewer's next move.
#[utoipa::path(
    post,
    path = "/agents/interviewer",
    request_body = InterviewerTurn,
    responses(
        (status = 200, description = "The interviewer's decision"),
        (status = 400, description = "No participant response or transcript"),
        (status = 500, description = "Model unavailable or failed")
    )
)]
pub async fn interviewer_handler(
    State(app_state): State<Arc<AppState>>,
    Json(turn): Json<InterviewerTurn>,
) -> ApiResult<Json<Value>> {
    let parsed = app_state.interviewer.decide(&turn).await?;
    let recovered = parsed.is_recovered();
    ok_json(json!({ "decision": parsed.into_decision(), "recovered": recovered }))
}

/// Summarize an interview transcript.
#[utoipa::path(
    post,
    path = "/agents/summarizer",
    request_body = TranscriptPayload,
    responses(
        (status = 200, description = "The summary"),
        (status = 400, description = "Neither transcript nor sessionId given"),
        (status = 404, description = "No stored transcript for the session"),
        (status = 500, description = "Model unavailable or failed")
    )
)]
pub async fn summarizer_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<TranscriptPayload>,
) -> ApiResult<Json<Value>> {
    let summary = app_state
        .summarizer
        .summarize(payload.transcript.as_deref(), payload.session_id.as_deref())
        .await?;
    ok_json(json!({ "summary": summary }))
}

/// Assess the participant's personality from a transcript.
#[utoipa::path(
    post,
    path = "/agents/psychometric",
    request_body = TranscriptPayload,
    responses(
        (status = 200, description = "The assessment"),
        (status = 400, description = "Neither transcript nor sessionId given"),
        (status = 404, description = "No stored transcript for the session"),
        (status = 500, description = "Model unavailable or failed")
    )
)]
pub async fn psychometric_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<TranscriptPayload>,
) -> ApiResult<Json<Value>> {
    let analysis = app_state
        .psychometric
        .analyze(payload.transcript.as_deref(), payload.session_id.as_deref())
        .await?;
    ok_json(json!({ "profile": analysis }))
}
