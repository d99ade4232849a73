//! services/api/src/orchestrator.rs
//!
//! Coordinates the avatar provider, the media server and the vector store for
//! one interview: starting the speaking avatar exactly once per room, watching
//! it become ready, tearing it down, and folding transcript turns into the
//! stored session.

use chrono::{Duration as ChronoDuration, Utc};
use interview_core::{
    chunking::{chunk_transcript, embedding_prompt, ChunkingOptions},
    domain::{AvatarSession, AvatarSessionState, InterviewSession, SessionStatus, TranscriptEntry},
    ports::{
        AccessTokenIssuer, AvatarCall, AvatarService, CreateAvatarSession, EmbeddedChunk,
        EmbeddingService, EndOutcome, InterviewRepository, PortError, PortResult, RoomGrants,
        SessionCache, TokenRequest,
    },
    RetryPolicy, SessionRegistry,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

pub const AGENT_IDENTITY_PREFIX: &str = "bey-agent-";
pub const AGENT_DISPLAY_NAME: &str = "Beyond Presence Agent";
pub const DEFAULT_GREETING: &str = "Hello, I'm ready to start the interview.";

//=========================================================================================
// Settings & Request Types
//=========================================================================================

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// The LiveKit server the avatar joins. `None` when LiveKit is not configured.
    pub livekit_url: Option<String>,
    pub freshness: ChronoDuration,
    pub ready_timeout: Duration,
    pub ready_interval: Duration,
    pub retry: RetryPolicy,
    /// How many times a transcript export asks the provider before giving up.
    pub export_attempts: u32,
    pub export_interval: Duration,
    pub chunking: ChunkingOptions,
    pub greeting: String,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            livekit_url: None,
            freshness: ChronoDuration::minutes(30),
            ready_timeout: Duration::from_secs(20),
            ready_interval: Duration::from_millis(500),
            retry: RetryPolicy::default(),
            export_attempts: 4,
            export_interval: Duration::from_millis(1500),
            chunking: ChunkingOptions::default(),
            greeting: DEFAULT_GREETING.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    #[serde(default)]
    pub room_name: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    /// Requests with the same key share one avatar session. Defaults to the room name.
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub require_agent: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartedSession {
    #[schema(value_type = Object)]
    pub session: AvatarSession,
    pub idempotency_key: String,
    pub created_at: chrono::DateTime<Utc>,
    /// Whether this request created the session or joined an existing one.
    pub created: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusReport {
    pub session_id: String,
    #[schema(value_type = String)]
    pub status: AvatarSessionState,
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub session: Option<AvatarSession>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EndSessionReport {
    pub success: bool,
    pub session_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Canonical form of a transcript delivery, whichever way it arrived.
#[derive(Debug, Clone, Default)]
pub struct TranscriptUpdate {
    pub session_id: String,
    pub avatar_session_id: Option<String>,
    pub avatar_agent_id: Option<String>,
    pub entries: Vec<TranscriptEntry>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptIngest {
    pub session_id: String,
    pub appended: usize,
    pub total_entries: usize,
    pub chunks_stored: usize,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExportTranscriptRequest {
    /// The provider call to read. Falls back to the one stored on the session.
    #[serde(default, alias = "beySessionId")]
    pub avatar_session_id: Option<String>,
    #[serde(default, alias = "beyAgentId")]
    pub avatar_agent_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptExport {
    pub session_id: String,
    pub call_id: String,
    /// Turns the provider returned, after de-duplication.
    pub fetched: usize,
    pub appended: usize,
    pub total_entries: usize,
    pub chunks_stored: usize,
    /// The provider had nothing and the stored transcript was kept.
    pub used_stored_transcript: bool,
    #[schema(value_type = String)]
    pub status: SessionStatus,
}

/// Picks the call to export: an explicit id first, then the most recent
/// finished call, then the most recent call of any status.
pub fn resolve_call_id(explicit: &[Option<String>], calls: &[AvatarCall]) -> Option<String> {
    explicit
        .iter()
        .flatten()
        .map(|id| id.trim())
        .find(|id| !id.is_empty())
        .map(str::to_string)
        .or_else(|| calls.iter().find(|c| c.is_finished()).map(|c| c.call_id.clone()))
        .or_else(|| calls.first().map(|c| c.call_id.clone()))
}

//=========================================================================================
// The Orchestrator
//=========================================================================================

pub struct SessionOrchestrator {
    avatar: Arc<dyn AvatarService>,
    tokens: Arc<dyn AccessTokenIssuer>,
    repo: Arc<dyn InterviewRepository>,
    embeddings: Arc<dyn EmbeddingService>,
    registry: SessionRegistry,
    /// Sessions receiving transcript deliveries. Each slot's lock is held from
    /// the append through the store write, so snapshots land in order.
    live: RwLock<HashMap<String, Arc<Mutex<InterviewSession>>>>,
    settings: OrchestratorSettings,
}

impl SessionOrchestrator {
    pub fn new(
        avatar: Arc<dyn AvatarService>,
        tokens: Arc<dyn AccessTokenIssuer>,
        repo: Arc<dyn InterviewRepository>,
        embeddings: Arc<dyn EmbeddingService>,
        cache: Arc<dyn SessionCache>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            avatar,
            tokens,
            repo,
            embeddings,
            registry: SessionRegistry::new(cache, settings.freshness),
            live: RwLock::new(HashMap::new()),
            settings,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    fn agent_token(&self, room: &str) -> PortResult<String> {
        let identity = format!("{AGENT_IDENTITY_PREFIX}{}", Utc::now().timestamp_millis());
        let mut grants = RoomGrants::participant(room);
        grants.can_update_own_metadata = true;
        self.tokens.issue(&TokenRequest {
            identity,
            name: AGENT_DISPLAY_NAME.to_string(),
            metadata: None,
            grants,
        })
    }

    //=====================================================================================
    // Start
    //=====================================================================================

    /// Creates the avatar session for a room, or hands back the one already
    /// created (or being created) under the same idempotency key.
    pub async fn start_session(&self, request: StartSessionRequest) -> PortResult<StartedSession> {
        let room = request.room_name.trim();
        if room.is_empty() {
            return Err(PortError::InvalidInput("roomName is required".to_string()));
        }
        let agent_id = request.agent_id.filter(|id| !id.trim().is_empty());
        if request.require_agent && agent_id.is_none() {
            return Err(PortError::InvalidInput("agentId is required".to_string()));
        }
        let livekit_url = self
            .settings
            .livekit_url
            .clone()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| PortError::Configuration("LiveKit".to_string()))?;

        let key = request
            .idempotency_key
            .filter(|k| !k.trim().is_empty())
            .unwrap_or_else(|| room.to_string());

        let livekit_token = self.agent_token(room)?;
        let avatar = self.avatar.clone();
        let mut created = false;
        let cached = self
            .registry
            .create_or_get(&key, || {
                created = true;
                async move {
                    avatar
                        .create_session(CreateAvatarSession {
                            livekit_url,
                            livekit_token,
                            agent_id,
                        })
                        .await
                }
            })
            .await?;

        let session_id = cached.session.session_id.clone();
        if created {
            info!(room, key, session_id, "Avatar session created");
            if let Err(e) = self.avatar.start_session(&session_id).await {
                warn!(session_id, error = %e, "Failed to start avatar session");
            }
            if !self.settings.greeting.is_empty() {
                if let Err(e) = self
                    .avatar
                    .send_message(&session_id, &self.settings.greeting)
                    .await
                {
                    warn!(session_id, error = %e, "Failed to send avatar greeting");
                }
            }
        }

        Ok(StartedSession {
            session: cached.session,
            idempotency_key: key,
            created_at: cached.created_at,
            created,
        })
    }

    //=====================================================================================
    // Status & Readiness
    //=====================================================================================

    /// Reads the provider's view of a session. Missing sessions and failures
    /// are reported as states rather than errors.
    pub async fn session_status(&self, session_id: &str) -> SessionStatusReport {
        let lookup = self
            .settings
            .retry
            .retry(|_| self.avatar.get_session(session_id))
            .await;
        Self::status_report(session_id, lookup)
    }

    fn status_report(session_id: &str, lookup: PortResult<AvatarSession>) -> SessionStatusReport {
        match lookup {
            Ok(session) => SessionStatusReport {
                session_id: session_id.to_string(),
                status: session.state(),
                ready: session.is_ready(),
                session: Some(session),
                error: None,
            },
            Err(PortError::NotFound(_)) => SessionStatusReport {
                session_id: session_id.to_string(),
                status: AvatarSessionState::NotFound,
                ready: false,
                session: None,
                error: None,
            },
            Err(e) => SessionStatusReport {
                session_id: session_id.to_string(),
                status: AvatarSessionState::Error,
                ready: false,
                session: None,
                error: Some(e.to_string()),
            },
        }
    }

    /// Polls until the session is active with a LiveKit room attached.
    pub async fn wait_until_ready(&self, session_id: &str) -> PortResult<AvatarSession> {
        self.wait_until_ready_within(session_id, self.settings.ready_timeout)
            .await
    }

    pub async fn wait_until_ready_within(
        &self,
        session_id: &str,
        timeout: Duration,
    ) -> PortResult<AvatarSession> {
        let deadline = tokio::time::Instant::now()
            .checked_add(timeout)
            .ok_or_else(|| {
                PortError::InvalidInput(format!("timeout of {}s is too large", timeout.as_secs()))
            })?;
        let not_ready = |polls: u32| {
            PortError::Unexpected(format!(
                "avatar session {session_id} was not ready after {}s ({polls} polls)",
                timeout.as_secs()
            ))
        };
        let mut polls = 0u32;
        loop {
            polls += 1;
            // One attempt per poll; the loop itself is the retry.
            let lookup = tokio::time::timeout_at(deadline, self.avatar.get_session(session_id))
                .await
                .map_err(|_| not_ready(polls))?;
            let report = Self::status_report(session_id, lookup);
            match (report.status, report.session) {
                (_, Some(session)) if report.ready => {
                    info!(session_id, polls, "Avatar session is ready");
                    return Ok(session);
                }
                (AvatarSessionState::NotFound, _) => {
                    return Err(PortError::NotFound(format!("avatar session {session_id}")));
                }
                (AvatarSessionState::Ended, _) => {
                    return Err(PortError::InvalidInput(format!(
                        "avatar session {session_id} has already ended"
                    )));
                }
                (state, _) => debug!(session_id, ?state, polls, "Avatar session not ready yet"),
            }

            let next_poll = tokio::time::Instant::now().checked_add(self.settings.ready_interval);
            if next_poll.map_or(true, |next| next > deadline) {
                return Err(not_ready(polls));
            }
            tokio::time::sleep(self.settings.ready_interval).await;
        }
    }

    //=====================================================================================
    // Cleanup
    //=====================================================================================

    pub async fn end_session(&self, session_id: &str) -> PortResult<EndSessionReport> {
        if session_id.trim().is_empty() {
            return Err(PortError::InvalidInput("sessionId is required".to_string()));
        }
        if let Some(key) = self.registry.forget_session(session_id).await? {
            debug!(session_id, key, "Dropped cached avatar session");
        }

        let report = |success: bool, status: &str, message: Option<String>| EndSessionReport {
            success,
            session_id: session_id.to_string(),
            status: status.to_string(),
            message,
        };

        match self.avatar.end_session(session_id).await {
            Ok(EndOutcome::Ended) => {
                info!(session_id, "Avatar session ended");
                Ok(report(true, "ended", None))
            }
            Ok(EndOutcome::AlreadyGone) => {
                info!(session_id, "Avatar session was already gone");
                Ok(report(true, "not_found", None))
            }
            Err(PortError::Upstream { status, message }) => {
                warn!(session_id, status, "Provider refused to end avatar session");
                Ok(report(false, "error", Some(message)))
            }
            Err(e @ PortError::Configuration(_)) => Err(e),
            Err(e) => {
                warn!(session_id, error = %e, "Could not reach provider to end avatar session");
                Ok(report(true, "api_error", Some(e.to_string())))
            }
        }
    }

    /// Drops cached avatar sessions past the freshness window.
    pub async fn evict_stale(&self) -> PortResult<usize> {
        self.registry.evict_stale().await
    }

    //=====================================================================================
    // Transcripts
    //=====================================================================================

    async fn load_session(&self, session_id: &str, create_missing: bool) -> PortResult<InterviewSession> {
        match self.repo.get_session(session_id).await {
            Ok(session) => Ok(session),
            Err(PortError::NotFound(_)) if create_missing => {
                info!(session_id, "Starting a new interview session from transcript delivery");
                Ok(InterviewSession::new(session_id, ""))
            }
            Err(e) => Err(e),
        }
    }

    /// The live slot for a session, loading it from storage on first use.
    async fn live_slot(
        &self,
        session_id: &str,
        create_missing: bool,
    ) -> PortResult<Arc<Mutex<InterviewSession>>> {
        if let Some(slot) = self.live.read().await.get(session_id) {
            return Ok(slot.clone());
        }
        let loaded = self.load_session(session_id, create_missing).await?;
        let mut live = self.live.write().await;
        Ok(live
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(loaded)))
            .clone())
    }

    /// Appends turns in arrival order, persists the session, then chunks,
    /// embeds and stores the new turns.
    pub async fn apply_transcript(
        &self,
        update: TranscriptUpdate,
        create_missing: bool,
    ) -> PortResult<TranscriptIngest> {
        let session_id = update.session_id.trim().to_string();
        if session_id.is_empty() {
            return Err(PortError::InvalidInput("sessionId is required".to_string()));
        }

        let slot = self.live_slot(&session_id, create_missing).await?;
        let appended = update.entries.len();
        let (snapshot, first_new_turn) = {
            let mut session = slot.lock().await;
            if update.avatar_session_id.is_some() {
                session.avatar_session_id = update.avatar_session_id;
            }
            if update.avatar_agent_id.is_some() {
                session.avatar_agent_id = update.avatar_agent_id;
            }
            let first_new_turn = session.transcript.len();
            session.append_transcript(update.entries);
            let snapshot = session.clone();
            self.repo.upsert_session(&snapshot).await?;
            (snapshot, first_new_turn)
        };

        let chunks_stored = if appended == 0 {
            0
        } else {
            self.store_chunks(&snapshot, first_new_turn).await?
        };

        debug!(session_id, appended, chunks_stored, "Transcript applied");
        Ok(TranscriptIngest {
            session_id,
            appended,
            total_entries: snapshot.transcript.len(),
            chunks_stored,
        })
    }

    async fn store_chunks(&self, session: &InterviewSession, first_new_turn: usize) -> PortResult<usize> {
        let chunked = chunk_transcript(&session.transcript, self.settings.chunking);
        let mut embedded = Vec::new();
        for chunk in chunked
            .chunks
            .into_iter()
            .filter(|c| c.turn_index >= first_new_turn)
        {
            let prompt = embedding_prompt(&chunk).unwrap_or_else(|| chunk.text.clone());
            let vector = match self.embeddings.embed(&prompt).await {
                Ok(vector) => Some(vector),
                Err(e) => {
                    warn!(session_id = %session.session_id, error = %e, "Embedding failed, storing chunk without a vector");
                    None
                }
            };
            embedded.push(EmbeddedChunk { chunk, vector });
        }
        if embedded.is_empty() {
            return Ok(0);
        }
        self.repo
            .save_transcript_chunks(&session.session_id, embedded)
            .await
    }

    /// Marks a session completed and stops tracking it as live.
    pub async fn complete_session(
        &self,
        session_id: &str,
        summary: Option<String>,
        key_findings: Vec<String>,
    ) -> PortResult<InterviewSession> {
        let live = self.live.write().await.remove(session_id);
        let mut session = match live {
            Some(slot) => slot.lock().await.clone(),
            None => self.repo.get_session(session_id).await?,
        };
        let profile = self.repo.get_psychometric_profile(session_id).await.ok();
        session.complete(summary, key_findings, profile);
        self.repo.upsert_session(&session).await?;
        info!(session_id, duration_minutes = ?session.duration_minutes(), "Interview session completed");
        Ok(session)
    }

    /// Forgets the in-process copy so the next delivery reloads from storage.
    pub async fn forget_live(&self, session_id: &str) {
        self.live.write().await.remove(session_id);
    }

    //=====================================================================================
    // Transcript Export
    //=====================================================================================

    /// Asks the provider for a call's messages until some arrive or the
    /// attempts run out. Repeated turns are dropped by signature.
    async fn poll_call_transcript(&self, call_id: &str) -> Vec<TranscriptEntry> {
        let attempts = self.settings.export_attempts.max(1);
        let mut seen = HashSet::new();
        let mut collected = Vec::new();
        for attempt in 1..=attempts {
            match self.avatar.fetch_transcript(call_id).await {
                Ok(entries) => {
                    for entry in entries {
                        if seen.insert(entry.signature()) {
                            collected.push(entry);
                        }
                    }
                }
                Err(e) => warn!(call_id, attempt, error = %e, "Transcript fetch failed"),
            }
            if !collected.is_empty() {
                debug!(call_id, attempt, entries = collected.len(), "Collected call transcript");
                break;
            }
            if attempt < attempts {
                tokio::time::sleep(self.settings.export_interval).await;
            }
        }
        collected.sort_by_key(|e| e.timestamp);
        collected
    }

    /// Pulls the recorded transcript for a session's avatar call, appends the
    /// turns not already stored, and completes the session.
    pub async fn export_transcript(
        &self,
        session_id: &str,
        request: ExportTranscriptRequest,
    ) -> PortResult<TranscriptExport> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(PortError::InvalidInput("sessionId is required".to_string()));
        }
        let stored = self.repo.get_session(session_id).await?;

        let agent_id = request
            .avatar_agent_id
            .clone()
            .or_else(|| stored.avatar_agent_id.clone())
            .filter(|id| !id.trim().is_empty());
        let explicit = [request.avatar_session_id, stored.avatar_session_id.clone()];
        let has_explicit = explicit.iter().flatten().any(|id| !id.trim().is_empty());
        let calls = match &agent_id {
            Some(agent_id) if !has_explicit => {
                self.avatar.list_calls(agent_id).await.unwrap_or_else(|e| {
                    warn!(session_id, agent_id, error = %e, "Could not list avatar calls");
                    Vec::new()
                })
            }
            _ => Vec::new(),
        };
        let call_id = resolve_call_id(&explicit, &calls).ok_or_else(|| {
            PortError::NotFound(format!("avatar call for session {session_id}"))
        })?;
        info!(session_id, call_id, "Exporting avatar call transcript");

        let fetched = self.poll_call_transcript(&call_id).await;
        let used_stored_transcript = fetched.is_empty();
        if used_stored_transcript && stored.transcript.is_empty() {
            return Err(PortError::NotFound(format!(
                "transcript messages for avatar call {call_id}"
            )));
        }

        let live = self.live.read().await.get(session_id).cloned();
        let known: HashSet<String> = match live {
            Some(slot) => slot
                .lock()
                .await
                .transcript
                .iter()
                .map(TranscriptEntry::signature)
                .collect(),
            None => stored.transcript.iter().map(TranscriptEntry::signature).collect(),
        };
        let new_entries: Vec<TranscriptEntry> = fetched
            .iter()
            .filter(|e| !known.contains(&e.signature()))
            .cloned()
            .collect();

        let ingest = self
            .apply_transcript(
                TranscriptUpdate {
                    session_id: session_id.to_string(),
                    avatar_session_id: Some(call_id.clone()),
                    avatar_agent_id: agent_id,
                    entries: new_entries,
                },
                false,
            )
            .await?;

        let completed = self
            .complete_session(session_id, stored.summary.clone(), stored.key_findings.clone())
            .await?;

        Ok(TranscriptExport {
            session_id: session_id.to_string(),
            call_id,
            fetched: fetched.len(),
            appended: ingest.appended,
            total_entries: ingest.total_entries,
            chunks_stored: ingest.chunks_stored,
            used_stored_transcript,
            status: completed.status,
        })
    }
}
