//! services/api/src/web/avatar.rs
//!
//! Handlers for the speaking avatar, its webhook, and LiveKit media access.

use crate::{
    error::{ApiError, ApiResult},
    media_bridge::WaitOptions,
    orchestrator::StartSessionRequest,
    web::{ok_json, state::AppState, webhook},
};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use interview_core::ports::{AudioPayload, CreateAvatarAgent};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use utoipa::ToSchema;

const DEFAULT_AGENT_NAME: &str = "AI Interview Agent";

//=========================================================================================
// Payloads
//=========================================================================================

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateAgentPayload {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub greeting: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WaitPayload {
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// The requested wait, or `default_secs`. Anything above the configured maximum is rejected.
fn wait_timeout(
    app_state: &AppState,
    payload: Option<Json<WaitPayload>>,
    default_secs: u64,
) -> ApiResult<Duration> {
    let max = app_state.config.max_wait_timeout_secs;
    match payload.and_then(|Json(p)| p.timeout_secs) {
        Some(secs) if secs > max => Err(ApiError::bad_request(format!(
            "timeoutSecs must be at most {max}"
        ))),
        Some(secs) => Ok(Duration::from_secs(secs)),
        None => Ok(Duration::from_secs(default_secs.min(max))),
    }
}

/// Either base64 audio or text for the avatar to speak.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SpeechPayload {
    #[serde(default)]
    pub audio: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default, alias = "transcript")]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenPayload {
    #[serde(default, alias = "roomName")]
    pub room: String,
    #[serde(default, alias = "identity")]
    pub participant: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookQuery {
    #[serde(default)]
    pub secret: Option<String>,
}

//=========================================================================================
// Avatar Agents & Sessions
//=========================================================================================

/// Register an avatar agent with the provider.
#[utoipa::path(
    post,
    path = "/avatar/agents",
    request_body = CreateAgentPayload,
    responses(
        (status = 200, description = "The new agent id"),
        (status = 400, description = "Missing system prompt"),
        (status = 500, description = "Provider not configured or failed")
    )
)]
pub async fn create_agent_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CreateAgentPayload>,
) -> ApiResult<Json<Value>> {
    if payload.system_prompt.trim().is_empty() {
        return Err(ApiError::bad_request("systemPrompt is required"));
    }
    let agent_id = app_state
        .avatar
        .create_agent(CreateAvatarAgent {
            name: payload
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_AGENT_NAME.to_string()),
            system_prompt: payload.system_prompt,
            language: payload.language.unwrap_or_else(|| "en".to_string()),
            greeting: payload.greeting,
        })
        .await?;
    info!(agent_id, "Avatar agent created");
    ok_json(json!({ "agentId": agent_id }))
}

/// Start the avatar in a LiveKit room. Repeated calls with the same key reuse one session.
#[utoipa::path(
    post,
    path = "/avatar/sessions",
    request_body = StartSessionRequest,
    responses(
        (status = 200, description = "The avatar session"),
        (status = 400, description = "Missing room name or agent id"),
        (status = 500, description = "Provider or LiveKit not configured, or creation failed")
    )
)]
pub async fn start_session_handler(
    State(app_state): State<Arc<AppState>>,
    Json(request): Json<StartSessionRequest>,
) -> ApiResult<Json<Value>> {
    let started = app_state.orchestrator.start_session(request).await?;
    ok_json(started)
}

/// Report the provider-side state of an avatar session.
#[utoipa::path(
    get,
    path = "/avatar/sessions/{id}/status",
    params(("id" = String, Path, description = "Avatar session id")),
    responses((status = 200, description = "created, active, ended, not_found or error"))
)]
pub async fn session_status_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Value>> {
    ok_json(app_state.orchestrator.session_status(&session_id).await)
}

/// Block until the avatar session is active with a LiveKit room.
#[utoipa::path(
    post,
    path = "/avatar/sessions/{id}/wait",
    params(("id" = String, Path, description = "Avatar session id")),
    request_body = WaitPayload,
    responses(
        (status = 200, description = "The ready session"),
        (status = 400, description = "timeoutSecs above the configured maximum"),
        (status = 404, description = "The provider does not know the session"),
        (status = 500, description = "Timed out")
    )
)]
pub async fn wait_ready_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    payload: Option<Json<WaitPayload>>,
) -> ApiResult<Json<Value>> {
    let timeout = wait_timeout(
        &app_state,
        payload,
        app_state.config.session_ready_timeout_secs,
    )?;
    let session = app_state
        .orchestrator
        .wait_until_ready_within(&session_id, timeout)
        .await?;
    ok_json(json!({ "session": session }))
}

/// Relay audio or text to the avatar.
#[utoipa::path(
    post,
    path = "/avatar/sessions/{id}/speech",
    params(("id" = String, Path, description = "Avatar session id")),
    request_body = SpeechPayload,
    responses(
        (status = 200, description = "Relayed"),
        (status = 400, description = "No audio or text, or invalid base64"),
        (status = 404, description = "Unknown avatar session")
    )
)]
pub async fn speech_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(payload): Json<SpeechPayload>,
) -> ApiResult<Json<Value>> {
    if let Some(audio) = payload.audio.filter(|a| !a.is_empty()) {
        let data = STANDARD
            .decode(audio.trim())
            .map_err(|e| ApiError::bad_request(format!("audio is not valid base64: {e}")))?;
        let bytes = data.len();
        app_state
            .avatar
            .push_audio(
                &session_id,
                AudioPayload {
                    data,
                    mime_type: payload.mime_type.unwrap_or_else(|| "audio/pcm".to_string()),
                },
            )
            .await?;
        return ok_json(json!({ "relayed": "audio", "bytes": bytes }));
    }

    match payload.text.filter(|t| !t.trim().is_empty()) {
        Some(text) => {
            app_state.avatar.send_message(&session_id, &text).await?;
            ok_json(json!({ "relayed": "text" }))
        }
        None => Err(ApiError::bad_request("audio or text is required")),
    }
}

/// End an avatar session. Ending one the provider no longer knows succeeds.
#[utoipa::path(
    post,
    path = "/avatar/sessions/{id}/end",
    params(("id" = String, Path, description = "Avatar session id")),
    responses(
        (status = 200, description = "ended, not_found or api_error"),
        (status = 500, description = "The provider refused")
    )
)]
pub async fn end_session_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let report = app_state.orchestrator.end_session(&session_id).await?;
    if report.success {
        let body = serde_json::to_value(report).map_err(|e| ApiError::Internal(e.to_string()))?;
        return Ok((StatusCode::OK, Json(body)));
    }
    warn!(session_id, status = %report.status, "Avatar session could not be ended");
    let body = json!({
        "success": false,
        "error": report
            .message
            .unwrap_or_else(|| "the provider refused to end the session".to_string()),
        "sessionId": report.session_id,
        "status": report.status,
    });
    Ok((StatusCode::INTERNAL_SERVER_ERROR, Json(body)))
}

/// Receive transcript deliveries from the avatar provider.
#[utoipa::path(
    post,
    path = "/avatar/webhook",
    params(("secret" = Option<String>, Query, description = "Shared secret, if not sent as a header")),
    responses(
        (status = 200, description = "Transcript applied"),
        (status = 400, description = "No session identifier"),
        (status = 401, description = "Secret missing or wrong")
    )
)]
pub async fn webhook_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<WebhookQuery>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> ApiResult<Json<Value>> {
    if !webhook::verify_secret(
        app_state.config.bey_webhook_secret.as_deref(),
        &headers,
        query.secret.as_deref(),
    ) {
        warn!("Rejected webhook with a missing or wrong secret");
        return Err(ApiError::Unauthorized("invalid webhook secret".to_string()));
    }

    let update = webhook::normalize(&payload)?;
    let ingest = app_state.orchestrator.apply_transcript(update, true).await?;
    info!(
        session_id = %ingest.session_id,
        appended = ingest.appended,
        "Webhook transcript applied"
    );
    ok_json(ingest)
}

//=========================================================================================
// LiveKit
//=========================================================================================

fn issue_token(app_state: &AppState, payload: TokenPayload) -> ApiResult<Json<Value>> {
    let metadata = payload.metadata.map(|m| match m {
        Value::String(s) => s,
        other => other.to_string(),
    });
    let token = app_state.media.participant_token(
        &payload.room,
        &payload.participant,
        payload.name.as_deref(),
        metadata,
    )?;
    let url = app_state.config.livekit.as_ref().map(|lk| lk.url.clone());
    ok_json(json!({ "token": token, "url": url }))
}

/// Mint a participant token for a LiveKit room.
#[utoipa::path(
    post,
    path = "/livekit/token",
    request_body = TokenPayload,
    responses(
        (status = 200, description = "The token and server URL"),
        (status = 400, description = "Missing room or participant"),
        (status = 500, description = "LiveKit not configured")
    )
)]
pub async fn livekit_token_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<TokenPayload>,
) -> ApiResult<Json<Value>> {
    issue_token(&app_state, payload)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenQuery {
    #[serde(default, alias = "roomName")]
    pub room: String,
    #[serde(default, alias = "identity")]
    pub participant: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub metadata: Option<String>,
}

/// Mint a participant token from query parameters.
#[utoipa::path(
    get,
    path = "/livekit/token",
    params(
        ("room" = String, Query, description = "Room name"),
        ("participant" = String, Query, description = "Participant identity"),
        ("name" = Option<String>, Query, description = "Display name"),
        ("metadata" = Option<String>, Query, description = "Opaque participant metadata")
    ),
    responses(
        (status = 200, description = "The token and server URL"),
        (status = 400, description = "Missing room or participant"),
        (status = 500, description = "LiveKit not configured")
    )
)]
pub async fn livekit_token_query_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
) -> ApiResult<Json<Value>> {
    issue_token(
        &app_state,
        TokenPayload {
            room: query.room,
            participant: query.participant,
            name: query.name,
            metadata: query.metadata.map(Value::String),
        },
    )
}

/// Wait for the avatar to join a LiveKit room.
#[utoipa::path(
    post,
    path = "/livekit/rooms/{room}/wait-agent",
    params(("room" = String, Path, description = "Room name")),
    request_body = WaitPayload,
    responses(
        (status = 200, description = "The agent's identity and how it was recognised"),
        (status = 400, description = "timeoutSecs above the configured maximum"),
        (status = 500, description = "Timed out or LiveKit not configured")
    )
)]
pub async fn wait_agent_handler(
    State(app_state): State<Arc<AppState>>,
    Path(room): Path<String>,
    payload: Option<Json<WaitPayload>>,
) -> ApiResult<Json<Value>> {
    let options = WaitOptions {
        timeout: wait_timeout(&app_state, payload, app_state.config.agent_wait_timeout_secs)?,
        ..WaitOptions::default()
    };
    let found = app_state
        .media
        .wait_for_agent(&room, options, app_state.shutdown.child_token())
        .await?;

    let (identity, confident, prefix) = match &found {
        interview_core::AgentMatch::Confident { identity, prefix } => {
            (identity.clone(), true, Some(prefix.clone()))
        }
        other => (other.identity().unwrap_or_default().to_string(), false, None),
    };
    ok_json(json!({
        "room": room,
        "identity": identity,
        "confident": confident,
        "prefix": prefix,
    }))
}
