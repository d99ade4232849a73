pub mod agents;
pub mod avatar;
pub mod rest;
pub mod state;
pub mod webhook;

use crate::error::{ApiError, ApiResult};
use axum::{
    routing::{get, patch, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use state::AppState;
use std::sync::Arc;

pub use rest::ApiDoc;

/// Serializes `body` and marks it successful. Objects get a `success` field
/// merged in; anything else is wrapped under `data`.
pub(crate) fn ok_json<T: Serialize>(body: T) -> ApiResult<Json<Value>> {
    let mut value = serde_json::to_value(body)
        .map_err(|e| ApiError::Internal(format!("Failed to serialize response: {e}")))?;
    match value.as_object_mut() {
        Some(object) => {
            object.insert("success".to_string(), Value::Bool(true));
        }
        None => value = json!({ "success": true, "data": value }),
    }
    Ok(Json(value))
}

/// Every API route, without docs or middleware layers.
pub fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        // Agents
        .route("/agents/clarification", post(agents::clarification_handler))
        .route("/agents/planner", post(agents::planner_handler))
        .route("/agents/interviewer", post(agents::interviewer_handler))
        .route("/agents/summarizer", post(agents::summarizer_handler))
        .route("/agents/psychometric", post(agents::psychometric_handler))
        // Avatar
        .route("/avatar/agents", post(avatar::create_agent_handler))
        .route("/avatar/sessions", post(avatar::start_session_handler))
        .route("/avatar/sessions/{id}/status", get(avatar::session_status_handler))
        .route("/avatar/sessions/{id}/wait", post(avatar::wait_ready_handler))
        .route("/avatar/sessions/{id}/speech", post(avatar::speech_handler))
        .route("/avatar/sessions/{id}/end", post(avatar::end_session_handler))
        .route("/avatar/webhook", post(avatar::webhook_handler))
        // Media
        .route(
            "/livekit/token",
            post(avatar::livekit_token_handler).get(avatar::livekit_token_query_handler),
        )
        .route("/livekit/rooms/{room}/wait-agent", post(avatar::wait_agent_handler))
        // Sessions
        .route(
            "/sessions",
            post(rest::create_session_handler).get(rest::list_sessions_handler),
        )
        .route(
            "/sessions/{id}",
            get(rest::get_session_handler)
                .patch(rest::update_session_handler)
                .delete(rest::delete_session_handler),
        )
        .route("/sessions/{id}/transcript", post(rest::append_transcript_handler))
        .route("/sessions/{id}/complete", post(rest::complete_session_handler))
        .route(
            "/sessions/{id}/export-transcript",
            post(rest::export_transcript_handler),
        )
        .route("/sessions/{id}/transcript-chunks", get(rest::transcript_chunks_handler))
        .route(
            "/sessions/{id}/summaries",
            get(rest::list_summaries_handler).post(rest::save_summary_handler),
        )
        .route("/sessions/{id}/insights", get(rest::insights_handler))
        .route(
            "/sessions/{id}/psychometric-profile",
            get(rest::psychometric_profile_handler),
        )
        .route("/transcripts/search", post(rest::search_transcripts_handler))
        // Evaluation & analytics
        .route(
            "/sessions/{id}/evaluation-metrics",
            get(rest::list_metrics_handler).post(rest::save_metric_handler),
        )
        .route("/analytics", get(rest::analytics_handler))
        // Research goals & plans
        .route(
            "/research-goals",
            post(rest::create_goal_handler).get(rest::list_goals_handler),
        )
        .route("/research-goals/search", post(rest::search_goals_handler))
        .route("/research-goals/{id}/status", patch(rest::update_goal_status_handler))
        .route("/research-goals/{id}/plans", get(rest::list_plans_handler))
        // Admin
        .route("/admin/schema", post(rest::ensure_schema_handler))
        .route("/health", get(rest::health_handler))
        .with_state(app_state)
}
