//! services/api/src/media_bridge.rs
//!
//! The LiveKit side of an interview: participant tokens for the browser and
//! waiting for the avatar to show up in the room.

use interview_core::{
    matcher::{AgentMatch, AgentMatcher},
    ports::{AccessTokenIssuer, PortError, PortResult, RoomGrants, RoomService, TokenRequest},
    retry::USER_ABORT_REASON,
    RetryPolicy,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy)]
pub struct WaitOptions {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            interval: Duration::from_millis(500),
        }
    }
}

pub struct MediaBridge {
    tokens: Arc<dyn AccessTokenIssuer>,
    rooms: Arc<dyn RoomService>,
    matcher: Arc<dyn AgentMatcher>,
    retry: RetryPolicy,
}

impl MediaBridge {
    pub fn new(
        tokens: Arc<dyn AccessTokenIssuer>,
        rooms: Arc<dyn RoomService>,
        matcher: Arc<dyn AgentMatcher>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            tokens,
            rooms,
            matcher,
            retry,
        }
    }

    /// A participant token for `room`: join, publish, subscribe and publish data.
    pub fn participant_token(
        &self,
        room: &str,
        identity: &str,
        name: Option<&str>,
        metadata: Option<String>,
    ) -> PortResult<String> {
        let room = room.trim();
        let identity = identity.trim();
        if room.is_empty() || identity.is_empty() {
            return Err(PortError::InvalidInput(
                "room and participant are required".to_string(),
            ));
        }
        let token = self.tokens.issue(&TokenRequest {
            identity: identity.to_string(),
            name: name.unwrap_or(identity).to_string(),
            metadata,
            grants: RoomGrants::participant(room),
        })?;
        debug!(room, identity, "Participant token issued");
        Ok(token)
    }

    /// Polls the room until the matcher finds the avatar, the timeout passes,
    /// or `cancel` fires.
    pub async fn wait_for_agent(
        &self,
        room: &str,
        options: WaitOptions,
        cancel: CancellationToken,
    ) -> PortResult<AgentMatch> {
        if room.trim().is_empty() {
            return Err(PortError::InvalidInput("room is required".to_string()));
        }

        let deadline = tokio::time::Instant::now()
            .checked_add(options.timeout)
            .ok_or_else(|| {
                PortError::InvalidInput(format!(
                    "timeout of {}s is too large",
                    options.timeout.as_secs()
                ))
            })?;
        let mut polls = 0u32;
        let mut seen = BTreeSet::new();
        let timed_out = |polls: u32, seen: BTreeSet<String>| {
            let identities = seen.into_iter().collect::<Vec<_>>().join(", ");
            PortError::Unexpected(format!(
                "Agent did not join room {room} after {polls} polls; participants seen: [{identities}]"
            ))
        };

        loop {
            if cancel.is_cancelled() {
                return Err(PortError::Unexpected(format!(
                    "{USER_ABORT_REASON}: stopped waiting for the agent in room {room}"
                )));
            }

            polls += 1;
            let listing = self.retry.retry(|_| self.rooms.list_participants(room));
            let participants = match tokio::time::timeout_at(deadline, listing).await {
                Ok(result) => result?,
                Err(_) => return Err(timed_out(polls, seen)),
            };
            seen.extend(participants.iter().map(|p| p.identity.clone()));

            let found = self.matcher.classify(&participants);
            match &found {
                AgentMatch::Confident { identity, prefix } => {
                    info!(room, identity, prefix, polls, "Agent joined the room");
                    return Ok(found);
                }
                AgentMatch::Guess { identity } => {
                    info!(room, identity, polls, "No agent prefix matched, assuming first participant");
                    return Ok(found);
                }
                AgentMatch::NoParticipants => debug!(room, polls, "Room is still empty"),
            }

            let next_poll = tokio::time::Instant::now().checked_add(options.interval);
            if next_poll.map_or(true, |next| next > deadline) {
                return Err(timed_out(polls, seen));
            }

            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(options.interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use interview_core::{ports::RoomParticipant, PrefixMatcher};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct ScriptedRoom {
        polls: AtomicU32,
        /// Participant lists returned in order; the last one repeats.
        script: Mutex<Vec<Vec<&'static str>>>,
    }

    #[async_trait]
    impl RoomService for ScriptedRoom {
        async fn list_participants(&self, _room: &str) -> PortResult<Vec<RoomParticipant>> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            let current = if script.len() > 1 {
                script.remove(0)
            } else {
                script[0].clone()
            };
            Ok(current
                .into_iter()
                .map(|id| RoomParticipant {
                    identity: id.to_string(),
                    name: String::new(),
                })
                .collect())
        }
    }

    struct NoTokens;

    impl AccessTokenIssuer for NoTokens {
        fn issue(&self, _request: &TokenRequest) -> PortResult<String> {
            Err(PortError::Configuration("LiveKit".to_string()))
        }
    }

    fn bridge(script: Vec<Vec<&'static str>>) -> (Arc<ScriptedRoom>, MediaBridge) {
        let room = Arc::new(ScriptedRoom {
            polls: AtomicU32::new(0),
            script: Mutex::new(script),
        });
        let bridge = MediaBridge::new(
            Arc::new(NoTokens),
            room.clone(),
            Arc::new(PrefixMatcher::default()),
            RetryPolicy {
                max_retries: 1,
                delay: Duration::from_millis(1),
            },
        );
        (room, bridge)
    }

    fn fast(timeout_ms: u64) -> WaitOptions {
        WaitOptions {
            timeout: Duration::from_millis(timeout_ms),
            interval: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn finds_agent_after_it_joins() {
        let (room, bridge) = bridge(vec![vec![], vec![], vec!["user-1", "bey-agent-123"]]);
        let found = bridge
            .wait_for_agent("room-1", fast(1_000), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            found,
            AgentMatch::Confident {
                identity: "bey-agent-123".into(),
                prefix: "bey-agent-".into()
            }
        );
        assert_eq!(room.polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn timeout_lists_what_was_seen() {
        let (_, bridge) = bridge(vec![vec![]]);
        let err = bridge
            .wait_for_agent("room-9", fast(30), CancellationToken::new())
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("room-9"), "{message}");
        assert!(message.contains("polls"), "{message}");
    }

    #[tokio::test]
    async fn cancellation_stops_the_wait() {
        let (_, bridge) = bridge(vec![vec![]]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = bridge
            .wait_for_agent("room-1", fast(5_000), cancel)
            .await
            .unwrap_err();
        assert!(err.to_string().contains(USER_ABORT_REASON));
    }

    #[tokio::test]
    async fn oversized_timeout_is_rejected_not_panicking() {
        let (room, bridge) = bridge(vec![vec![]]);
        let options = WaitOptions {
            timeout: Duration::from_secs(u64::MAX),
            interval: Duration::from_millis(5),
        };
        let err = bridge
            .wait_for_agent("room-1", options, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::InvalidInput(_)));
        assert_eq!(room.polls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn token_requires_room_and_identity() {
        let (_, bridge) = bridge(vec![vec![]]);
        assert!(matches!(
            bridge.participant_token("", "ada", None, None),
            Err(PortError::InvalidInput(_))
        ));
        assert!(matches!(
            bridge.participant_token("room", "ada", None, None),
            Err(PortError::Configuration(_))
        ));
    }
}
