//! services/api/src/adapters/avatar.rs
//!
//! This module contains the adapter for the Beyond Presence speaking-avatar API.
//! It implements the `AvatarService` port from the `core` crate.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use hound::{WavSpec, WavWriter};
use interview_core::{
    domain::{AvatarSession, Speaker, TranscriptEntry},
    ports::{
        AudioPayload, AvatarCall, AvatarService, CreateAvatarAgent, CreateAvatarSession,
        EndOutcome, PortError, PortResult,
    },
};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

const DEFAULT_GREETING: &str =
    "Hello! I'm your AI interviewer. I'm ready to begin our conversation.";
const PCM_SAMPLE_RATE: u32 = 48_000;

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Debug, Deserialize)]
struct AgentResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    #[serde(default)]
    avatar_id: Option<String>,
    #[serde(default)]
    livekit_url: Option<String>,
    #[serde(default)]
    transport_type: Option<String>,
    #[serde(default)]
    started_at: Option<String>,
    #[serde(default)]
    ended_at: Option<String>,
}

impl From<SessionResponse> for AvatarSession {
    fn from(raw: SessionResponse) -> Self {
        AvatarSession {
            session_id: raw.id,
            avatar_id: raw.avatar_id,
            livekit_url: raw.livekit_url,
            transport_type: raw.transport_type,
            started_at: raw.started_at,
            ended_at: raw.ended_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallResponse {
    id: String,
    #[serde(default)]
    agent_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    started_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallMessage {
    #[serde(default)]
    sender: Option<String>,
    #[serde(default, alias = "text", alias = "content")]
    message: Option<String>,
    #[serde(default, alias = "timestamp", alias = "created_at")]
    sent_at: Option<String>,
}

/// List endpoints answer with a bare array or wrap it under `data`, `calls` or `messages`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Bare(Vec<T>),
    Wrapped {
        #[serde(alias = "calls", alias = "messages")]
        data: Vec<T>,
    },
}

impl<T> Listing<T> {
    fn into_items(self) -> Vec<T> {
        match self {
            Listing::Bare(items) | Listing::Wrapped { data: items } => items,
        }
    }
}

fn parse_time(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

impl From<CallResponse> for AvatarCall {
    fn from(raw: CallResponse) -> Self {
        AvatarCall {
            started_at: parse_time(raw.started_at.as_deref()),
            call_id: raw.id,
            agent_id: raw.agent_id,
            status: raw.status,
        }
    }
}

impl CallMessage {
    /// `sender: "ai"` is the avatar; anything else is the participant.
    fn into_entry(self) -> Option<TranscriptEntry> {
        let text = self.message?.trim().to_string();
        if text.is_empty() {
            return None;
        }
        let speaker = match self.sender.as_deref().map(Speaker::from_label) {
            Some(Speaker::Agent) => Speaker::Agent,
            _ => Speaker::Participant,
        };
        let timestamp = parse_time(self.sent_at.as_deref()).unwrap_or_else(Utc::now);
        Some(TranscriptEntry::new(speaker, text, timestamp))
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `AvatarService` over the Beyond Presence REST API.
#[derive(Clone)]
pub struct BeyondPresenceAdapter {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    avatar_id: Option<String>,
}

impl BeyondPresenceAdapter {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        avatar_id: Option<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            avatar_id,
        }
    }

    fn api_key(&self) -> PortResult<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| PortError::Configuration("BEY_API_KEY".to_string()))
    }

    fn avatar_id(&self) -> PortResult<&str> {
        self.avatar_id
            .as_deref()
            .ok_or_else(|| PortError::Configuration("BEY_AVATAR_ID".to_string()))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn post(&self, path: &str) -> PortResult<RequestBuilder> {
        Ok(self.http.post(self.url(path)).header("x-api-key", self.api_key()?))
    }

    fn get(&self, path: &str) -> PortResult<RequestBuilder> {
        Ok(self.http.get(self.url(path)).header("x-api-key", self.api_key()?))
    }

    /// Sends the request and turns non-2xx responses into port errors.
    async fn send(&self, request: RequestBuilder) -> PortResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("network error calling avatar API: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::NOT_FOUND => PortError::NotFound(format!("avatar resource: {body}")),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PortError::Unauthorized,
            _ => PortError::Upstream {
                status: status.as_u16(),
                message: body,
            },
        })
    }

    async fn json<T: serde::de::DeserializeOwned>(response: Response) -> PortResult<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| PortError::Unexpected(format!("unreadable avatar API response: {e}")))
    }

    /// Wraps little-endian mono PCM16 in a WAV container.
    fn pcm16_to_wav(pcm_data: &[u8], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for chunk in pcm_data.chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([chunk[0], chunk[1]]))?;
        }
        writer.finalize()?;
        Ok(cursor.into_inner())
    }

    /// Raw PCM is re-encoded as WAV; every other container is relayed as-is.
    fn encode_audio(audio: AudioPayload) -> PortResult<(Bytes, String)> {
        let mime = audio.mime_type.to_lowercase();
        if mime.starts_with("audio/pcm") || mime.starts_with("audio/l16") {
            let wav = Self::pcm16_to_wav(&audio.data, PCM_SAMPLE_RATE)
                .map_err(|e| PortError::Unexpected(format!("Failed to encode WAV: {}", e)))?;
            Ok((Bytes::from(wav), "audio/wav".to_string()))
        } else {
            Ok((Bytes::from(audio.data), audio.mime_type))
        }
    }
}

//=========================================================================================
// `AvatarService` Trait Implementation
//=========================================================================================

#[async_trait]
impl AvatarService for BeyondPresenceAdapter {
    async fn create_agent(&self, request: CreateAvatarAgent) -> PortResult<String> {
        let body = json!({
            "name": request.name,
            "avatar_id": self.avatar_id()?,
            "system_prompt": request.system_prompt,
            "language": request.language,
            "greeting": request.greeting.as_deref().unwrap_or(DEFAULT_GREETING),
            "max_session_length_minutes": 30,
            "capabilities": [{ "type": "webcam_vision" }],
            "llm": { "type": "openai" },
        });

        let response = self.send(self.post("/v1/agents")?.json(&body)).await?;
        let agent: AgentResponse = Self::json(response).await?;
        info!(agent_id = %agent.id, "Created avatar agent");
        Ok(agent.id)
    }

    async fn create_session(&self, request: CreateAvatarSession) -> PortResult<AvatarSession> {
        let mut body = json!({
            "avatar_id": self.avatar_id()?,
            "livekit_url": request.livekit_url,
            "livekit_token": request.livekit_token,
            "transport_type": "livekit",
        });
        if let Some(agent_id) = &request.agent_id {
            body["agent_id"] = json!(agent_id);
        }

        let response = self.send(self.post("/v1/sessions")?.json(&body)).await?;
        let raw: SessionResponse = Self::json(response).await?;
        info!(session_id = %raw.id, "Created avatar session");
        Ok(raw.into())
    }

    async fn start_session(&self, session_id: &str) -> PortResult<()> {
        let path = format!("/v1/sessions/{session_id}/start");
        self.send(self.post(&path)?).await?;
        debug!(session_id, "Started avatar session");
        Ok(())
    }

    async fn send_message(&self, session_id: &str, text: &str) -> PortResult<()> {
        let path = format!("/v1/sessions/{session_id}/messages");
        let body = json!({
            "type": "user_message",
            "text": text,
            "timestamp": Utc::now().to_rfc3339(),
        });
        self.send(self.post(&path)?.json(&body)).await?;
        Ok(())
    }

    async fn push_audio(&self, session_id: &str, audio: AudioPayload) -> PortResult<()> {
        if audio.data.is_empty() {
            return Err(PortError::InvalidInput("Audio payload is empty".to_string()));
        }
        let (body, content_type) = Self::encode_audio(audio)?;
        let path = format!("/v1/sessions/{session_id}/audio");
        debug!(session_id, bytes = body.len(), %content_type, "Relaying audio to avatar session");
        self.send(
            self.post(&path)?
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .body(body),
        )
        .await?;
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> PortResult<AvatarSession> {
        let response = self
            .send(self.get(&format!("/v1/sessions/{session_id}"))?)
            .await?;
        let raw: SessionResponse = Self::json(response).await?;
        Ok(raw.into())
    }

    async fn end_session(&self, session_id: &str) -> PortResult<EndOutcome> {
        let path = format!("/v1/sessions/{session_id}/end");
        match self.send(self.post(&path)?).await {
            Ok(_) => {
                info!(session_id, "Ended avatar session");
                Ok(EndOutcome::Ended)
            }
            Err(PortError::NotFound(_)) => {
                warn!(session_id, "Avatar session already gone");
                Ok(EndOutcome::AlreadyGone)
            }
            Err(e) => Err(e),
        }
    }

    async fn list_calls(&self, agent_id: &str) -> PortResult<Vec<AvatarCall>> {
        let request = self.get("/v1/calls")?.query(&[("agent_id", agent_id)]);
        let response = self.send(request).await?;
        let listing: Listing<CallResponse> = Self::json(response).await?;
        let mut calls: Vec<AvatarCall> = listing.into_items().into_iter().map(Into::into).collect();
        calls.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        debug!(agent_id, calls = calls.len(), "Listed avatar calls");
        Ok(calls)
    }

    async fn fetch_transcript(&self, call_id: &str) -> PortResult<Vec<TranscriptEntry>> {
        let response = self
            .send(self.get(&format!("/v1/calls/{call_id}/messages"))?)
            .await?;
        let listing: Listing<CallMessage> = Self::json(response).await?;
        let mut entries: Vec<TranscriptEntry> = listing
            .into_items()
            .into_iter()
            .filter_map(CallMessage::into_entry)
            .collect();
        entries.sort_by_key(|e| e.timestamp);
        debug!(call_id, entries = entries.len(), "Fetched call transcript");
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(server: &MockServer) -> BeyondPresenceAdapter {
        BeyondPresenceAdapter::new(
            reqwest::Client::new(),
            server.uri(),
            Some("test-key".into()),
            Some("avatar-123".into()),
        )
    }

    #[tokio::test]
    async fn create_session_posts_livekit_transport() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/sessions"))
            .and(header("x-api-key", "test-key"))
            .and(body_partial_json(json!({
                "avatar_id": "avatar-123",
                "transport_type": "livekit",
                "livekit_url": "wss://lk.example",
                "agent_id": "agent-9",
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "sess-1",
                "avatar_id": "avatar-123",
                "livekit_url": "wss://lk.example",
                "transport_type": "livekit",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = adapter(&server)
            .create_session(CreateAvatarSession {
                livekit_url: "wss://lk.example".into(),
                livekit_token: "jwt".into(),
                agent_id: Some("agent-9".into()),
            })
            .await
            .unwrap();
        assert_eq!(session.session_id, "sess-1");
        assert_eq!(session.transport_type.as_deref(), Some("livekit"));
    }

    #[tokio::test]
    async fn get_session_reads_timestamps() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/sessions/sess-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "sess-2",
                "started_at": "2024-05-01T10:00:00Z",
                "ended_at": null,
                "livekit_url": "wss://lk.example",
                "transport_type": "livekit",
            })))
            .mount(&server)
            .await;

        let session = adapter(&server).get_session("sess-2").await.unwrap();
        assert!(session.is_ready());
    }

    #[tokio::test]
    async fn end_session_treats_404_as_gone() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/sessions/missing/end"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such session"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/sessions/broken/end"))
            .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
            .mount(&server)
            .await;

        let adapter = adapter(&server);
        assert_eq!(
            adapter.end_session("missing").await.unwrap(),
            EndOutcome::AlreadyGone
        );
        let err = adapter.end_session("broken").await.unwrap_err();
        assert!(matches!(err, PortError::Upstream { status: 500, .. }));
    }

    #[tokio::test]
    async fn call_messages_become_ordered_transcript_turns() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/calls/call-7/messages"))
            .and(header("x-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "sender": "user", "message": "Mostly pasta.", "sent_at": "2024-05-01T10:00:05Z" },
                { "sender": "ai", "message": "What do you cook?", "sent_at": "2024-05-01T10:00:00Z" },
                { "sender": "ai", "message": "   ", "sent_at": "2024-05-01T10:00:09Z" }
            ])))
            .mount(&server)
            .await;

        let entries = adapter(&server).fetch_transcript("call-7").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].speaker, interview_core::domain::Speaker::Agent);
        assert_eq!(entries[0].text, "What do you cook?");
        assert_eq!(entries[1].text, "Mostly pasta.");
    }

    #[tokio::test]
    async fn calls_are_listed_newest_first() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/calls"))
            .and(query_param("agent_id", "agent-9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "id": "old", "agent_id": "agent-9", "status": "ended", "started_at": "2024-05-01T09:00:00Z" },
                    { "id": "new", "agent_id": "agent-9", "status": "active", "started_at": "2024-05-01T10:00:00Z" }
                ]
            })))
            .mount(&server)
            .await;

        let calls = adapter(&server).list_calls("agent-9").await.unwrap();
        let ids: Vec<&str> = calls.iter().map(|c| c.call_id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
        assert!(calls[1].is_finished());
        assert!(!calls[0].is_finished());
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let adapter = BeyondPresenceAdapter::new(reqwest::Client::new(), "http://unused", None, None);
        let err = adapter.start_session("s").await.unwrap_err();
        assert_eq!(err.to_string(), "BEY_API_KEY is not configured");
    }

    #[test]
    fn pcm_is_wrapped_as_wav() {
        let (body, mime) = BeyondPresenceAdapter::encode_audio(AudioPayload {
            data: vec![0, 0, 1, 0, 2, 0, 3, 0],
            mime_type: "audio/pcm".into(),
        })
        .unwrap();
        assert_eq!(mime, "audio/wav");
        assert_eq!(&body[..4], b"RIFF");
        assert_eq!(body.len(), 44 + 8);

        let (body, mime) = BeyondPresenceAdapter::encode_audio(AudioPayload {
            data: vec![1, 2, 3],
            mime_type: "audio/webm".into(),
        })
        .unwrap();
        assert_eq!(mime, "audio/webm");
        assert_eq!(body.len(), 3);
    }
}
