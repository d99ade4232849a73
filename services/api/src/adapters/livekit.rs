//! services/api/src/adapters/livekit.rs
//!
//! LiveKit access tokens and room inspection.
//!
//! Tokens are HS256 JWTs signed with the API secret and carry a `video` grant.
//! Room inspection goes through the server's Twirp `RoomService`, which takes
//! a short-lived admin token for the room being inspected.

use async_trait::async_trait;
use chrono::Utc;
use interview_core::ports::{
    AccessTokenIssuer, PortError, PortResult, RoomParticipant, RoomService, TokenRequest,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::config::LiveKitConfig;

/// Participant tokens live for six hours.
pub const PARTICIPANT_TOKEN_TTL: Duration = Duration::from_secs(6 * 60 * 60);
const ADMIN_TOKEN_TTL: Duration = Duration::from_secs(10 * 60);

//=========================================================================================
// Claims
//=========================================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VideoGrant {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub room: String,
    #[serde(default)]
    pub room_join: bool,
    #[serde(default)]
    pub room_admin: bool,
    #[serde(default)]
    pub can_publish: bool,
    #[serde(default)]
    pub can_subscribe: bool,
    #[serde(default)]
    pub can_publish_data: bool,
    #[serde(default)]
    pub can_update_own_metadata: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub sub: String,
    pub jti: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    pub nbf: i64,
    pub exp: i64,
    pub video: VideoGrant,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Clone)]
pub struct LiveKitAdapter {
    http: reqwest::Client,
    config: Option<LiveKitConfig>,
}

#[derive(Debug, Deserialize)]
struct ListParticipantsResponse {
    #[serde(default)]
    participants: Vec<ParticipantInfo>,
}

#[derive(Debug, Deserialize)]
struct ParticipantInfo {
    identity: String,
    #[serde(default)]
    name: String,
}

impl LiveKitAdapter {
    pub fn new(http: reqwest::Client, config: Option<LiveKitConfig>) -> Self {
        Self { http, config }
    }

    fn config(&self) -> PortResult<&LiveKitConfig> {
        self.config
            .as_ref()
            .ok_or_else(|| PortError::Configuration("LiveKit".to_string()))
    }

    /// The public server URL handed to clients and to the avatar provider.
    pub fn server_url(&self) -> PortResult<&str> {
        Ok(self.config()?.url.as_str())
    }

    fn sign(&self, claims: &Claims) -> PortResult<String> {
        let config = self.config()?;
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(config.api_secret.as_bytes()),
        )
        .map_err(|e| PortError::Unexpected(format!("Failed to sign LiveKit token: {e}")))
    }

    fn claims(&self, identity: &str, ttl: Duration, video: VideoGrant) -> PortResult<Claims> {
        let config = self.config()?;
        let now = Utc::now().timestamp();
        Ok(Claims {
            iss: config.api_key.clone(),
            sub: identity.to_string(),
            jti: identity.to_string(),
            name: String::new(),
            metadata: None,
            nbf: now,
            exp: now + ttl.as_secs() as i64,
            video,
        })
    }

    /// Twirp lives on the HTTP(S) side of the server URL.
    fn twirp_url(&self, method: &str) -> PortResult<String> {
        let base = self.config()?.url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("wss://") {
            format!("https://{rest}")
        } else if let Some(rest) = base.strip_prefix("ws://") {
            format!("http://{rest}")
        } else {
            base.to_string()
        };
        Ok(format!("{base}/twirp/livekit.RoomService/{method}"))
    }
}

impl AccessTokenIssuer for LiveKitAdapter {
    fn issue(&self, request: &TokenRequest) -> PortResult<String> {
        if request.identity.trim().is_empty() {
            return Err(PortError::InvalidInput("identity is required".to_string()));
        }
        let grants = &request.grants;
        let video = VideoGrant {
            room: grants.room.clone(),
            room_join: grants.room_join,
            room_admin: false,
            can_publish: grants.can_publish,
            can_subscribe: grants.can_subscribe,
            can_publish_data: grants.can_publish_data,
            can_update_own_metadata: grants.can_update_own_metadata,
        };
        let mut claims = self.claims(&request.identity, PARTICIPANT_TOKEN_TTL, video)?;
        claims.name = request.name.clone();
        claims.metadata = request.metadata.clone();
        self.sign(&claims)
    }
}

#[async_trait]
impl RoomService for LiveKitAdapter {
    async fn list_participants(&self, room: &str) -> PortResult<Vec<RoomParticipant>> {
        let admin = VideoGrant {
            room: room.to_string(),
            room_admin: true,
            ..VideoGrant::default()
        };
        let token = self.sign(&self.claims("interview-orchestrator", ADMIN_TOKEN_TTL, admin)?)?;

        let response = self
            .http
            .post(self.twirp_url("ListParticipants")?)
            .bearer_auth(token)
            .json(&json!({ "room": room }))
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("network error calling LiveKit: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // Twirp reports an unknown room as 404; the room simply has nobody in it yet.
            if status == reqwest::StatusCode::NOT_FOUND {
                debug!(room, "Room does not exist yet");
                return Ok(Vec::new());
            }
            return Err(PortError::Upstream {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: ListParticipantsResponse = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(format!("unreadable LiveKit response: {e}")))?;
        Ok(parsed
            .participants
            .into_iter()
            .map(|p| RoomParticipant {
                identity: p.identity,
                name: p.name,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interview_core::ports::RoomGrants;
    use jsonwebtoken::{decode, DecodingKey, Validation};
    use wiremock::matchers::{body_json, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(url: &str) -> LiveKitConfig {
        LiveKitConfig {
            url: url.to_string(),
            api_key: "APIkey".to_string(),
            api_secret: "a-secret-long-enough-for-hmac-signing".to_string(),
        }
    }

    #[test]
    fn issued_token_carries_room_grants() {
        let adapter = LiveKitAdapter::new(reqwest::Client::new(), Some(config("wss://lk.example")));
        let token = adapter
            .issue(&TokenRequest {
                identity: "participant-1".into(),
                name: "Ada".into(),
                metadata: Some("{\"role\":\"participant\"}".into()),
                grants: RoomGrants::participant("room-42"),
            })
            .unwrap();

        let mut validation = Validation::default();
        validation.set_required_spec_claims(&["exp"]);
        let decoded = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"a-secret-long-enough-for-hmac-signing"),
            &validation,
        )
        .unwrap();
        let claims = decoded.claims;
        assert_eq!(claims.iss, "APIkey");
        assert_eq!(claims.sub, "participant-1");
        assert_eq!(claims.name, "Ada");
        assert_eq!(claims.video.room, "room-42");
        assert!(claims.video.room_join && claims.video.can_publish && claims.video.can_subscribe);
        assert!(!claims.video.room_admin);
        assert_eq!(claims.exp - claims.nbf, PARTICIPANT_TOKEN_TTL.as_secs() as i64);
    }

    #[test]
    fn unconfigured_issuer_fails() {
        let adapter = LiveKitAdapter::new(reqwest::Client::new(), None);
        let err = adapter
            .issue(&TokenRequest {
                identity: "x".into(),
                name: "x".into(),
                metadata: None,
                grants: RoomGrants::participant("r"),
            })
            .unwrap_err();
        assert!(matches!(err, PortError::Configuration(_)));
    }

    #[tokio::test]
    async fn lists_participants_over_twirp() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/twirp/livekit.RoomService/ListParticipants"))
            .and(header_exists("authorization"))
            .and(body_json(json!({ "room": "room-1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "participants": [
                    { "identity": "user-1", "name": "Ada" },
                    { "identity": "bey-agent-99" }
                ]
            })))
            .mount(&server)
            .await;

        let adapter = LiveKitAdapter::new(reqwest::Client::new(), Some(config(&server.uri())));
        let participants = adapter.list_participants("room-1").await.unwrap();
        assert_eq!(participants.len(), 2);
        assert_eq!(participants[1].identity, "bey-agent-99");
        assert_eq!(participants[1].name, "");
    }

    #[test]
    fn twirp_url_uses_https_for_wss() {
        let adapter = LiveKitAdapter::new(reqwest::Client::new(), Some(config("wss://lk.example/")));
        assert_eq!(
            adapter.twirp_url("ListParticipants").unwrap(),
            "https://lk.example/twirp/livekit.RoomService/ListParticipants"
        );
    }
}
