//! services/api/src/web/webhook.rs
//!
//! Normalizes avatar-provider webhook payloads into a `TranscriptUpdate`.
//!
//! The provider has shipped several payload shapes over time, so every field
//! is looked up through an ordered list of candidate paths and the first hit wins.

use axum::http::HeaderMap;
use chrono::{DateTime, TimeZone, Utc};
use interview_core::domain::{Speaker, TranscriptEntry};
use serde_json::Value;

use crate::error::{ApiError, ApiResult};
use crate::orchestrator::TranscriptUpdate;

pub const SECRET_HEADERS: [&str; 3] = ["x-bey-signature", "x-bey-secret", "x-webhook-secret"];

const SESSION_ID_PATHS: &[&str] = &[
    "sessionId",
    "session_id",
    "session",
    "data.sessionId",
    "data.session_id",
    "call.sessionId",
    "call.session_id",
    "metadata.sessionId",
    "metadata.session_id",
];
const CALL_ID_PATHS: &[&str] = &["callId", "call_id", "call.id", "data.callId", "data.call_id"];
const AGENT_ID_PATHS: &[&str] = &[
    "agentId",
    "agent_id",
    "agent.id",
    "data.agentId",
    "data.agent_id",
];
const TEXT_FIELDS: &[&str] = &["text", "message", "content"];
const SENDER_FIELDS: &[&str] = &["sender", "role", "kind"];
const TIME_FIELDS: &[&str] = &["sent_at", "timestamp", "created_at", "createdAt", "time"];

/// Accepts the request when no secret is configured, or when any of the
/// secret headers or the `secret` query parameter carries it.
pub fn verify_secret(expected: Option<&str>, headers: &HeaderMap, query_secret: Option<&str>) -> bool {
    let Some(expected) = expected.filter(|s| !s.is_empty()) else {
        return true;
    };
    SECRET_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()))
        .chain(query_secret)
        .any(|candidate| candidate == expected)
}

fn lookup<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(payload, |value, key| value.get(key))
}

fn as_identifier(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_identifier(payload: &Value, paths: &[&str]) -> Option<String> {
    paths
        .iter()
        .filter_map(|path| lookup(payload, path))
        .find_map(as_identifier)
}

fn first_string<'a>(message: &'a Value, fields: &[&str]) -> Option<&'a str> {
    fields
        .iter()
        .filter_map(|field| message.get(*field))
        .find_map(Value::as_str)
}

/// Seconds or milliseconds since the epoch, or an RFC 3339 string.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => {
            let raw = n.as_i64()?;
            if raw > 10_000_000_000 {
                Utc.timestamp_millis_opt(raw).single()
            } else {
                Utc.timestamp_opt(raw, 0).single()
            }
        }
        _ => None,
    }
}

/// Messages from `messages[]`, `message`, `data.messages[]` and `data.message`.
/// A bare string `message` means the enclosing object is the message.
fn collect_messages(payload: &Value) -> Vec<&Value> {
    let mut messages = Vec::new();
    for scope in [Some(payload), payload.get("data")].into_iter().flatten() {
        if let Some(list) = scope.get("messages").and_then(Value::as_array) {
            messages.extend(list.iter());
        }
        match scope.get("message") {
            Some(obj @ Value::Object(_)) => messages.push(obj),
            Some(Value::String(_)) => messages.push(scope),
            _ => {}
        }
    }
    messages
}

fn to_entry(message: &Value) -> Option<TranscriptEntry> {
    let text = first_string(message, TEXT_FIELDS)?.trim();
    if text.is_empty() {
        return None;
    }
    let speaker = match first_string(message, SENDER_FIELDS).map(Speaker::from_label) {
        Some(Speaker::Agent) => Speaker::Agent,
        _ => Speaker::Participant,
    };
    let timestamp = TIME_FIELDS
        .iter()
        .filter_map(|field| message.get(*field))
        .find_map(parse_timestamp)
        .unwrap_or_else(Utc::now);
    Some(TranscriptEntry::new(speaker, text, timestamp))
}

pub fn normalize(payload: &Value) -> ApiResult<TranscriptUpdate> {
    let session_id = first_identifier(payload, SESSION_ID_PATHS)
        .ok_or_else(|| ApiError::bad_request("webhook payload has no session identifier"))?;

    Ok(TranscriptUpdate {
        session_id,
        avatar_session_id: first_identifier(payload, CALL_ID_PATHS),
        avatar_agent_id: first_identifier(payload, AGENT_ID_PATHS),
        entries: collect_messages(payload)
            .into_iter()
            .filter_map(to_entry)
            .collect(),
    })
}
