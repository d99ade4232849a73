//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the stored interview data and the master
//! definition for the OpenAPI specification.

use crate::{
    error::{ApiError, ApiResult},
    orchestrator::{ExportTranscriptRequest, TranscriptUpdate},
    web::{ok_json, state::AppState},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use interview_core::{
    domain::{
        AggregatedInsights, EvaluationMetric, GoalStatus, InterviewSession, ResearchGoal,
        SessionAnalytics, SessionStatus, Speaker, SummaryChunk, TranscriptEntry,
    },
    ports::SessionFilter,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

const DEFAULT_SEARCH_LIMIT: usize = 10;
const DEFAULT_METRIC_LIMIT: usize = 50;
const ANALYTICS_SESSION_LIMIT: usize = 1000;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::web::agents::clarification_handler,
        crate::web::agents::planner_handler,
        crate::web::agents::interviewer_handler,
        crate::web::agents::summarizer_handler,
        crate::web::agents::psychometric_handler,
        crate::web::avatar::create_agent_handler,
        crate::web::avatar::start_session_handler,
        crate::web::avatar::session_status_handler,
        crate::web::avatar::wait_ready_handler,
        crate::web::avatar::speech_handler,
        crate::web::avatar::end_session_handler,
        crate::web::avatar::webhook_handler,
        crate::web::avatar::livekit_token_handler,
        crate::web::avatar::livekit_token_query_handler,
        crate::web::avatar::wait_agent_handler,
        create_session_handler,
        list_sessions_handler,
        get_session_handler,
        update_session_handler,
        delete_session_handler,
        append_transcript_handler,
        complete_session_handler,
        export_transcript_handler,
        transcript_chunks_handler,
        search_transcripts_handler,
        list_summaries_handler,
        save_summary_handler,
        insights_handler,
        psychometric_profile_handler,
        save_metric_handler,
        list_metrics_handler,
        analytics_handler,
        create_goal_handler,
        list_goals_handler,
        update_goal_status_handler,
        search_goals_handler,
        list_plans_handler,
        ensure_schema_handler,
        health_handler,
    ),
    components(
        schemas(
            crate::web::agents::ClarificationPayload,
            crate::web::agents::PlannerPayload,
            crate::web::agents::TranscriptPayload,
            crate::agents::InterviewerTurn,
            crate::web::avatar::CreateAgentPayload,
            crate::web::avatar::WaitPayload,
            crate::web::avatar::SpeechPayload,
            crate::web::avatar::TokenPayload,
            crate::orchestrator::StartSessionRequest,
            crate::orchestrator::ExportTranscriptRequest,
            crate::orchestrator::TranscriptExport,
            CreateSessionPayload,
            UpdateSessionPayload,
            TranscriptEntryPayload,
            AppendTranscriptPayload,
            CompleteSessionPayload,
            SearchPayload,
            SaveSummaryPayload,
            MetricPayload,
            CreateGoalPayload,
            GoalStatusPayload,
        )
    ),
    tags(
        (name = "Interview Orchestrator API", description = "Research goals, AI interview sessions and their analysis.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Payload Structs
//=========================================================================================

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionPayload {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub research_goal: String,
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(default)]
    pub participant_email: Option<String>,
    #[serde(default)]
    pub participant_name: Option<String>,
    #[serde(default)]
    pub room_name: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSessionPayload {
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub status: Option<SessionStatus>,
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(default)]
    pub participant_email: Option<String>,
    #[serde(default)]
    pub participant_name: Option<String>,
    #[serde(default)]
    pub room_name: Option<String>,
    #[serde(default)]
    pub avatar_session_id: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub key_findings: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SessionListQuery {
    /// created, in_progress, completed or cancelled
    #[param(value_type = Option<String>)]
    pub status: Option<SessionStatus>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntryPayload {
    /// agent or participant; other labels count as the participant
    #[serde(default, alias = "sender", alias = "role")]
    pub speaker: String,
    pub text: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppendTranscriptPayload {
    #[serde(default)]
    pub entries: Vec<TranscriptEntryPayload>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompleteSessionPayload {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub key_findings: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchPayload {
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaveSummaryPayload {
    pub summary: String,
    #[serde(default)]
    pub chunk_id: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub key_insights: Vec<String>,
    #[serde(default)]
    pub pain_points: Vec<String>,
    #[serde(default)]
    pub feature_requests: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetricPayload {
    #[serde(default)]
    pub metric_id: Option<String>,
    pub metric_type: String,
    pub score: f64,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub trace_id: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct MetricListQuery {
    pub metric_type: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateGoalPayload {
    #[serde(default)]
    pub goal_text: String,
    #[serde(default)]
    pub target_audience: String,
    #[serde(default)]
    pub duration_minutes: u32,
    #[serde(default)]
    pub sensitive_topics: Vec<String>,
    #[serde(default)]
    pub admin_id: String,
    #[serde(default)]
    pub clarifications: Vec<String>,
    #[serde(default)]
    pub brief: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct GoalListQuery {
    /// draft, active or closed
    #[param(value_type = Option<String>)]
    pub status: Option<GoalStatus>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GoalStatusPayload {
    #[schema(value_type = String)]
    pub status: GoalStatus,
}

fn required(value: &str, field: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        Err(ApiError::bad_request(format!("{field} is required")))
    } else {
        Ok(())
    }
}

//=========================================================================================
// Sessions
//=========================================================================================

/// Create an interview session.
#[utoipa::path(
    post,
    path = "/sessions",
    request_body = CreateSessionPayload,
    responses(
        (status = 201, description = "Session created"),
        (status = 400, description = "Missing research goal")
    )
)]
pub async fn create_session_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CreateSessionPayload>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    required(&payload.research_goal, "researchGoal")?;
    let session_id = payload
        .session_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut session = InterviewSession::new(session_id, payload.research_goal.trim());
    session.plan_id = payload.plan_id;
    session.participant_email = payload.participant_email;
    session.participant_name = payload.participant_name;
    session.room_name = payload.room_name.unwrap_or_default();

    app_state.repo.upsert_session(&session).await?;
    info!(session_id = %session.session_id, "Interview session created");
    Ok((StatusCode::CREATED, ok_json(json!({ "session": session }))?))
}

/// List interview sessions, newest first.
#[utoipa::path(
    get,
    path = "/sessions",
    params(SessionListQuery),
    responses((status = 200, description = "Sessions"))
)]
pub async fn list_sessions_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<SessionListQuery>,
) -> ApiResult<Json<Value>> {
    let sessions = app_state
        .repo
        .list_sessions(SessionFilter {
            status: query.status,
            limit: query.limit,
        })
        .await?;
    ok_json(json!({ "sessions": sessions }))
}

/// Fetch one interview session with its transcript.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "The session"),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn get_session_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let session = app_state.repo.get_session(&session_id).await?;
    ok_json(json!({ "session": session }))
}

/// Update session metadata.
#[utoipa::path(
    patch,
    path = "/sessions/{id}",
    params(("id" = String, Path, description = "Session id")),
    request_body = UpdateSessionPayload,
    responses(
        (status = 200, description = "The updated session"),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn update_session_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(payload): Json<UpdateSessionPayload>,
) -> ApiResult<Json<Value>> {
    let mut session = app_state.repo.get_session(&session_id).await?;
    if let Some(status) = payload.status {
        session.status = status;
    }
    if payload.plan_id.is_some() {
        session.plan_id = payload.plan_id;
    }
    if payload.participant_email.is_some() {
        session.participant_email = payload.participant_email;
    }
    if payload.participant_name.is_some() {
        session.participant_name = payload.participant_name;
    }
    if let Some(room) = payload.room_name {
        session.room_name = room;
    }
    if payload.avatar_session_id.is_some() {
        session.avatar_session_id = payload.avatar_session_id;
    }
    if payload.summary.is_some() {
        session.summary = payload.summary;
    }
    if let Some(findings) = payload.key_findings {
        session.key_findings = findings;
    }
    session.updated_at = Utc::now();

    app_state.repo.upsert_session(&session).await?;
    app_state.orchestrator.forget_live(&session_id).await;
    ok_json(json!({ "session": session }))
}

/// Delete a session together with its chunks, summaries and profile.
#[utoipa::path(
    delete,
    path = "/sessions/{id}",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn delete_session_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Value>> {
    app_state.repo.delete_session(&session_id).await?;
    app_state.orchestrator.forget_live(&session_id).await;
    info!(session_id, "Interview session deleted");
    ok_json(json!({ "sessionId": session_id }))
}

/// Append transcript turns to an existing session.
#[utoipa::path(
    post,
    path = "/sessions/{id}/transcript",
    params(("id" = String, Path, description = "Session id")),
    request_body = AppendTranscriptPayload,
    responses(
        (status = 200, description = "Turns appended, chunked and stored"),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn append_transcript_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(payload): Json<AppendTranscriptPayload>,
) -> ApiResult<Json<Value>> {
    let entries = payload
        .entries
        .into_iter()
        .filter(|e| !e.text.trim().is_empty())
        .map(|e| {
            let speaker = match Speaker::from_label(&e.speaker) {
                Speaker::Agent => Speaker::Agent,
                _ => Speaker::Participant,
            };
            TranscriptEntry::new(speaker, e.text.trim(), e.timestamp.unwrap_or_else(Utc::now))
        })
        .collect();

    let ingest = app_state
        .orchestrator
        .apply_transcript(
            TranscriptUpdate {
                session_id,
                entries,
                ..TranscriptUpdate::default()
            },
            false,
        )
        .await?;
    ok_json(ingest)
}

/// Mark a session completed, attaching its summary and any stored profile.
#[utoipa::path(
    post,
    path = "/sessions/{id}/complete",
    params(("id" = String, Path, description = "Session id")),
    request_body = CompleteSessionPayload,
    responses(
        (status = 200, description = "The completed session"),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn complete_session_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    payload: Option<Json<CompleteSessionPayload>>,
) -> ApiResult<Json<Value>> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let session = app_state
        .orchestrator
        .complete_session(&session_id, payload.summary, payload.key_findings)
        .await?;
    ok_json(json!({ "session": session }))
}

/// Pull the avatar call's recorded transcript into the session and complete it.
#[utoipa::path(
    post,
    path = "/sessions/{id}/export-transcript",
    params(("id" = String, Path, description = "Session id")),
    request_body = ExportTranscriptRequest,
    responses(
        (status = 200, description = "Transcript exported and session completed", body = crate::orchestrator::TranscriptExport),
        (status = 404, description = "Unknown session, no avatar call or no transcript")
    )
)]
pub async fn export_transcript_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    payload: Option<Json<ExportTranscriptRequest>>,
) -> ApiResult<Json<Value>> {
    let request = payload.map(|Json(p)| p).unwrap_or_default();
    let export = app_state
        .orchestrator
        .export_transcript(&session_id, request)
        .await?;
    info!(
        session_id,
        call_id = %export.call_id,
        appended = export.appended,
        "Transcript exported"
    );
    ok_json(export)
}

//=========================================================================================
// Transcripts, Summaries & Profiles
//=========================================================================================

/// The stored transcript chunks of a session, in turn order.
#[utoipa::path(
    get,
    path = "/sessions/{id}/transcript-chunks",
    params(("id" = String, Path, description = "Session id")),
    responses((status = 200, description = "Chunks"))
)]
pub async fn transcript_chunks_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let chunks = app_state.repo.get_transcript_chunks(&session_id).await?;
    ok_json(json!({ "chunks": chunks }))
}

/// Semantic search over every stored transcript chunk.
#[utoipa::path(
    post,
    path = "/transcripts/search",
    request_body = SearchPayload,
    responses(
        (status = 200, description = "Matching chunks"),
        (status = 400, description = "Empty query")
    )
)]
pub async fn search_transcripts_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<SearchPayload>,
) -> ApiResult<Json<Value>> {
    required(&payload.query, "query")?;
    let chunks = app_state
        .repo
        .search_transcript_chunks(&payload.query, payload.limit.unwrap_or(DEFAULT_SEARCH_LIMIT))
        .await?;
    ok_json(json!({ "chunks": chunks }))
}

/// Summaries stored for a session.
#[utoipa::path(
    get,
    path = "/sessions/{id}/summaries",
    params(("id" = String, Path, description = "Session id")),
    responses((status = 200, description = "Summaries"))
)]
pub async fn list_summaries_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let summaries = app_state.repo.get_summary_chunks(&session_id).await?;
    ok_json(json!({ "summaries": summaries }))
}

/// Store a summary for a session.
#[utoipa::path(
    post,
    path = "/sessions/{id}/summaries",
    params(("id" = String, Path, description = "Session id")),
    request_body = SaveSummaryPayload,
    responses(
        (status = 201, description = "Stored"),
        (status = 400, description = "Empty summary")
    )
)]
pub async fn save_summary_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(payload): Json<SaveSummaryPayload>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    required(&payload.summary, "summary")?;
    let summary = SummaryChunk {
        summary_id: Uuid::new_v4().to_string(),
        session_id,
        chunk_id: payload.chunk_id.unwrap_or_default(),
        summary: payload.summary,
        keywords: payload.keywords,
        key_insights: payload.key_insights,
        pain_points: payload.pain_points,
        feature_requests: payload.feature_requests,
        created_at: Utc::now(),
    };
    app_state.repo.save_summary_chunk(summary.clone()).await?;
    Ok((StatusCode::CREATED, ok_json(json!({ "summary": summary }))?))
}

/// Every insight, pain point, feature request and keyword across a session's summaries.
#[utoipa::path(
    get,
    path = "/sessions/{id}/insights",
    params(("id" = String, Path, description = "Session id")),
    responses((status = 200, description = "Aggregated insights"))
)]
pub async fn insights_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let summaries = app_state.repo.get_summary_chunks(&session_id).await?;
    ok_json(json!({
        "sessionId": session_id,
        "summaryCount": summaries.len(),
        "insights": AggregatedInsights::from_chunks(&summaries),
    }))
}

/// The stored psychometric profile of a session.
#[utoipa::path(
    get,
    path = "/sessions/{id}/psychometric-profile",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "The profile"),
        (status = 404, description = "No profile stored")
    )
)]
pub async fn psychometric_profile_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let profile = app_state.repo.get_psychometric_profile(&session_id).await?;
    ok_json(json!({ "profile": profile }))
}

//=========================================================================================
// Evaluation & Analytics
//=========================================================================================

/// Record an evaluation score for a session.
#[utoipa::path(
    post,
    path = "/sessions/{id}/evaluation-metrics",
    params(("id" = String, Path, description = "Session id")),
    request_body = MetricPayload,
    responses(
        (status = 201, description = "Stored"),
        (status = 400, description = "Missing metric type or a non-finite score")
    )
)]
pub async fn save_metric_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(payload): Json<MetricPayload>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    required(&payload.metric_type, "metricType")?;
    if !payload.score.is_finite() {
        return Err(ApiError::bad_request("score must be a finite number"));
    }
    let metric = EvaluationMetric {
        metric_id: payload
            .metric_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        session_id,
        metric_type: payload.metric_type.trim().to_string(),
        score: payload.score,
        explanation: payload.explanation,
        trace_id: payload.trace_id,
        created_at: Utc::now(),
    };
    app_state.repo.save_evaluation_metric(metric.clone()).await?;
    Ok((StatusCode::CREATED, ok_json(json!({ "metric": metric }))?))
}

/// Evaluation scores of a session, newest first.
#[utoipa::path(
    get,
    path = "/sessions/{id}/evaluation-metrics",
    params(("id" = String, Path, description = "Session id"), MetricListQuery),
    responses((status = 200, description = "Metrics"))
)]
pub async fn list_metrics_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(query): Query<MetricListQuery>,
) -> ApiResult<Json<Value>> {
    let metric_type = query.metric_type.as_deref().filter(|t| !t.trim().is_empty());
    let metrics = app_state
        .repo
        .get_evaluation_metrics(
            &session_id,
            metric_type,
            query.limit.unwrap_or(DEFAULT_METRIC_LIMIT),
        )
        .await?;
    ok_json(json!({ "metrics": metrics }))
}

/// Session totals, completion rate and counts per status and research goal.
#[utoipa::path(
    get,
    path = "/analytics",
    responses((status = 200, description = "Session analytics"))
)]
pub async fn analytics_handler(State(app_state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let sessions = app_state
        .repo
        .list_sessions(SessionFilter {
            status: None,
            limit: Some(ANALYTICS_SESSION_LIMIT),
        })
        .await?;
    ok_json(json!({ "analytics": SessionAnalytics::from_sessions(&sessions) }))
}

//=========================================================================================
// Research Goals & Plans
//=========================================================================================

/// Create a research goal in draft.
#[utoipa::path(
    post,
    path = "/research-goals",
    request_body = CreateGoalPayload,
    responses(
        (status = 201, description = "Goal created"),
        (status = 400, description = "Missing goal text")
    )
)]
pub async fn create_goal_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CreateGoalPayload>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    required(&payload.goal_text, "goalText")?;
    let goal = app_state
        .repo
        .create_research_goal(ResearchGoal {
            id: Uuid::new_v4().to_string(),
            goal_text: payload.goal_text.trim().to_string(),
            target_audience: payload.target_audience,
            duration_minutes: payload.duration_minutes,
            sensitive_topics: payload.sensitive_topics,
            status: GoalStatus::Draft,
            admin_id: payload.admin_id,
            clarifications: payload.clarifications,
            brief: payload.brief,
            created_at: Utc::now(),
        })
        .await?;
    info!(goal_id = %goal.id, "Research goal created");
    Ok((StatusCode::CREATED, ok_json(json!({ "goal": goal }))?))
}

/// List research goals, optionally by status.
#[utoipa::path(
    get,
    path = "/research-goals",
    params(GoalListQuery),
    responses((status = 200, description = "Goals"))
)]
pub async fn list_goals_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<GoalListQuery>,
) -> ApiResult<Json<Value>> {
    let goals = app_state.repo.list_research_goals(query.status).await?;
    ok_json(json!({ "goals": goals }))
}

/// Move a research goal through draft, active and closed.
#[utoipa::path(
    patch,
    path = "/research-goals/{id}/status",
    params(("id" = String, Path, description = "Goal id")),
    request_body = GoalStatusPayload,
    responses(
        (status = 200, description = "The updated goal"),
        (status = 400, description = "Transition not allowed"),
        (status = 404, description = "Unknown goal")
    )
)]
pub async fn update_goal_status_handler(
    State(app_state): State<Arc<AppState>>,
    Path(goal_id): Path<String>,
    Json(payload): Json<GoalStatusPayload>,
) -> ApiResult<Json<Value>> {
    let mut goal = app_state.repo.get_research_goal(&goal_id).await?;
    if !goal.status.can_transition_to(payload.status) {
        return Err(ApiError::bad_request(format!(
            "cannot move a {} goal to {}",
            goal.status.as_str(),
            payload.status.as_str()
        )));
    }
    goal.status = payload.status;
    app_state.repo.update_research_goal(goal.clone()).await?;
    ok_json(json!({ "goal": goal }))
}

/// Semantic search over research goals.
#[utoipa::path(
    post,
    path = "/research-goals/search",
    request_body = SearchPayload,
    responses(
        (status = 200, description = "Matching goals"),
        (status = 400, description = "Empty query")
    )
)]
pub async fn search_goals_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<SearchPayload>,
) -> ApiResult<Json<Value>> {
    required(&payload.query, "query")?;
    let goals = app_state
        .repo
        .search_research_goals(&payload.query, payload.limit.unwrap_or(DEFAULT_SEARCH_LIMIT))
        .await?;
    ok_json(json!({ "goals": goals }))
}

/// Every plan generated for a goal, oldest version first.
#[utoipa::path(
    get,
    path = "/research-goals/{id}/plans",
    params(("id" = String, Path, description = "Goal id")),
    responses((status = 200, description = "Plans"))
)]
pub async fn list_plans_handler(
    State(app_state): State<Arc<AppState>>,
    Path(goal_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let plans = app_state.repo.get_plans_for_goal(&goal_id).await?;
    ok_json(json!({ "plans": plans }))
}

//=========================================================================================
// Admin
//=========================================================================================

/// Create any missing vector-store classes.
#[utoipa::path(
    post,
    path = "/admin/schema",
    responses(
        (status = 200, description = "Names of the classes that were created"),
        (status = 500, description = "Vector store not configured")
    )
)]
pub async fn ensure_schema_handler(
    State(app_state): State<Arc<AppState>>,
) -> ApiResult<Json<Value>> {
    let created = app_state.repo.ensure_schema().await?;
    info!(created = ?created, "Schema ensured");
    ok_json(json!({ "created": created }))
}

/// Liveness check.
#[utoipa::path(get, path = "/health", responses((status = 200, description = "Service is up")))]
pub async fn health_handler() -> ApiResult<Json<Value>> {
    ok_json(json!({ "status": "ok" }))
}
