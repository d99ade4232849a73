//! In-memory stand-ins for every port, and a helper that wires them into an `AppState`.

#![allow(dead_code)]

use api_lib::{
    agents::{
        ClarificationAgent, InterviewerAgent, PlannerAgent, PsychometricAgent, SummarizerAgent,
    },
    config::Config,
    media_bridge::MediaBridge,
    orchestrator::{OrchestratorSettings, SessionOrchestrator},
    web::state::AppState,
};
use async_trait::async_trait;
use chrono::Utc;
use interview_core::{
    domain::{
        AvatarSession, EvaluationMetric, GoalStatus, InterviewPlan, InterviewSession,
        PsychometricProfile, ResearchGoal, SummaryChunk, TranscriptChunk, TranscriptEntry,
    },
    ports::{
        AccessTokenIssuer, AudioPayload, AvatarCall, AvatarService, CompletionRequest, CreateAvatarAgent,
        CreateAvatarSession, EmbeddedChunk, EmbeddingService, EndOutcome, InterviewRepository,
        LanguageModelService, PortError, PortResult, RoomParticipant, RoomService, SessionFilter,
        TokenRequest,
    },
    InMemorySessionCache, PrefixMatcher, RetryPolicy,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

//=========================================================================================
// Language Model
//=========================================================================================

/// Replays canned completions in order. With nothing queued it behaves like
/// an adapter without an API key.
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<Vec<String>>,
    pub calls: AtomicU32,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    pub fn replying<I, S>(replies: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            ..Self::default()
        })
    }

    pub fn unconfigured() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl LanguageModelService for ScriptedLlm {
    async fn complete(&self, request: CompletionRequest) -> PortResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            return Err(PortError::Configuration("OPENAI_API_KEY".to_string()));
        }
        Ok(replies.remove(0))
    }
}

pub struct FixedEmbeddings;

#[async_trait]
impl EmbeddingService for FixedEmbeddings {
    async fn embed(&self, text: &str) -> PortResult<Vec<f32>> {
        Ok(vec![text.len() as f32, 0.5, 0.25])
    }
}

//=========================================================================================
// Repository
//=========================================================================================

#[derive(Default)]
pub struct MemoryRepo {
    pub goals: Mutex<HashMap<String, ResearchGoal>>,
    pub plans: Mutex<Vec<InterviewPlan>>,
    pub sessions: Mutex<HashMap<String, InterviewSession>>,
    pub chunks: Mutex<HashMap<String, Vec<EmbeddedChunk>>>,
    pub summaries: Mutex<Vec<SummaryChunk>>,
    pub profiles: Mutex<HashMap<String, PsychometricProfile>>,
    pub metrics: Mutex<Vec<EvaluationMetric>>,
    /// Each `upsert_session` call pops one delay and sleeps before writing.
    pub upsert_delays: Mutex<VecDeque<Duration>>,
}

impl MemoryRepo {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn stored_chunks(&self, session_id: &str) -> Vec<EmbeddedChunk> {
        self.chunks
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl InterviewRepository for MemoryRepo {
    async fn ensure_schema(&self) -> PortResult<Vec<String>> {
        Ok(vec!["ResearchGoal".to_string()])
    }

    async fn create_research_goal(&self, goal: ResearchGoal) -> PortResult<ResearchGoal> {
        self.goals
            .lock()
            .unwrap()
            .insert(goal.id.clone(), goal.clone());
        Ok(goal)
    }

    async fn get_research_goal(&self, goal_id: &str) -> PortResult<ResearchGoal> {
        self.goals
            .lock()
            .unwrap()
            .get(goal_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("research goal {goal_id}")))
    }

    async fn list_research_goals(&self, status: Option<GoalStatus>) -> PortResult<Vec<ResearchGoal>> {
        Ok(self
            .goals
            .lock()
            .unwrap()
            .values()
            .filter(|g| status.map_or(true, |s| g.status == s))
            .cloned()
            .collect())
    }

    async fn update_research_goal(&self, goal: ResearchGoal) -> PortResult<()> {
        self.goals.lock().unwrap().insert(goal.id.clone(), goal);
        Ok(())
    }

    async fn search_research_goals(&self, query: &str, limit: usize) -> PortResult<Vec<ResearchGoal>> {
        let query = query.to_lowercase();
        Ok(self
            .goals
            .lock()
            .unwrap()
            .values()
            .filter(|g| g.goal_text.to_lowercase().contains(&query))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn save_interview_plan(&self, plan: InterviewPlan) -> PortResult<()> {
        self.plans.lock().unwrap().push(plan);
        Ok(())
    }

    async fn get_plans_for_goal(&self, goal_id: &str) -> PortResult<Vec<InterviewPlan>> {
        Ok(self
            .plans
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.research_goal_id == goal_id)
            .cloned()
            .collect())
    }

    async fn upsert_session(&self, session: &InterviewSession) -> PortResult<()> {
        let delay = self.upsert_delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.sessions
            .lock()
            .unwrap()
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> PortResult<InterviewSession> {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("session {session_id}")))
    }

    async fn list_sessions(&self, filter: SessionFilter) -> PortResult<Vec<InterviewSession>> {
        let mut sessions: Vec<_> = self
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| filter.status.map_or(true, |st| s.status == st))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            sessions.truncate(limit);
        }
        Ok(sessions)
    }

    async fn delete_session(&self, session_id: &str) -> PortResult<()> {
        self.sessions
            .lock()
            .unwrap()
            .remove(session_id)
            .map(|_| ())
            .ok_or_else(|| PortError::NotFound(format!("session {session_id}")))?;
        self.chunks.lock().unwrap().remove(session_id);
        self.profiles.lock().unwrap().remove(session_id);
        self.summaries
            .lock()
            .unwrap()
            .retain(|s| s.session_id != session_id);
        Ok(())
    }

    async fn save_transcript_chunks(
        &self,
        session_id: &str,
        chunks: Vec<EmbeddedChunk>,
    ) -> PortResult<usize> {
        let count = chunks.len();
        self.chunks
            .lock()
            .unwrap()
            .entry(session_id.to_string())
            .or_default()
            .extend(chunks);
        Ok(count)
    }

    async fn get_transcript_chunks(&self, session_id: &str) -> PortResult<Vec<TranscriptChunk>> {
        let mut chunks: Vec<TranscriptChunk> = self
            .stored_chunks(session_id)
            .into_iter()
            .map(|c| c.chunk)
            .collect();
        chunks.sort_by_key(|c| (c.turn_index, c.part_number));
        Ok(chunks)
    }

    async fn search_transcript_chunks(&self, query: &str, limit: usize) -> PortResult<Vec<TranscriptChunk>> {
        let query = query.to_lowercase();
        Ok(self
            .chunks
            .lock()
            .unwrap()
            .values()
            .flatten()
            .filter(|c| c.chunk.text.to_lowercase().contains(&query))
            .take(limit)
            .map(|c| c.chunk.clone())
            .collect())
    }

    async fn save_summary_chunk(&self, summary: SummaryChunk) -> PortResult<()> {
        self.summaries.lock().unwrap().push(summary);
        Ok(())
    }

    async fn get_summary_chunks(&self, session_id: &str) -> PortResult<Vec<SummaryChunk>> {
        Ok(self
            .summaries
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn upsert_psychometric_profile(&self, profile: PsychometricProfile) -> PortResult<()> {
        self.profiles
            .lock()
            .unwrap()
            .insert(profile.session_id.clone(), profile);
        Ok(())
    }

    async fn get_psychometric_profile(&self, session_id: &str) -> PortResult<PsychometricProfile> {
        self.profiles
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("psychometric profile {session_id}")))
    }

    async fn save_evaluation_metric(&self, metric: EvaluationMetric) -> PortResult<()> {
        self.metrics.lock().unwrap().push(metric);
        Ok(())
    }

    async fn get_evaluation_metrics(
        &self,
        session_id: &str,
        metric_type: Option<&str>,
        limit: usize,
    ) -> PortResult<Vec<EvaluationMetric>> {
        let mut metrics: Vec<_> = self
            .metrics
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.session_id == session_id)
            .filter(|m| metric_type.map_or(true, |t| m.metric_type == t))
            .cloned()
            .collect();
        metrics.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        metrics.truncate(limit);
        Ok(metrics)
    }
}

//=========================================================================================
// Avatar Provider & Media Server
//=========================================================================================

pub struct FakeAvatar {
    pub creates: AtomicU32,
    pub starts: AtomicU32,
    pub messages: Mutex<Vec<String>>,
    pub audio: Mutex<Vec<AudioPayload>>,
    /// What `get_session` reports; `None` means the provider has never heard of it.
    pub remote: Mutex<Option<AvatarSession>>,
    pub end_result: Mutex<PortResult<EndOutcome>>,
    /// When set, `get_session` fails with this instead of reading `remote`.
    pub lookup_error: Mutex<Option<PortError>>,
    pub lookups: AtomicU32,
    pub calls: Mutex<Vec<AvatarCall>>,
    /// Recorded messages per call id.
    pub transcripts: Mutex<HashMap<String, Vec<TranscriptEntry>>>,
    pub transcript_fetches: AtomicU32,
    pub create_delay: Duration,
}

impl Default for FakeAvatar {
    fn default() -> Self {
        Self {
            creates: AtomicU32::new(0),
            starts: AtomicU32::new(0),
            messages: Mutex::new(Vec::new()),
            audio: Mutex::new(Vec::new()),
            remote: Mutex::new(None),
            end_result: Mutex::new(Ok(EndOutcome::Ended)),
            lookup_error: Mutex::new(None),
            lookups: AtomicU32::new(0),
            calls: Mutex::new(Vec::new()),
            transcripts: Mutex::new(HashMap::new()),
            transcript_fetches: AtomicU32::new(0),
            create_delay: Duration::from_millis(20),
        }
    }
}

impl FakeAvatar {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn creates(&self) -> u32 {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn set_remote(&self, session: Option<AvatarSession>) {
        *self.remote.lock().unwrap() = session;
    }

    pub fn set_end_result(&self, result: PortResult<EndOutcome>) {
        *self.end_result.lock().unwrap() = result;
    }

    pub fn fail_lookups(&self, error: PortError) {
        *self.lookup_error.lock().unwrap() = Some(error);
    }

    pub fn record_call(&self, call_id: &str, status: &str, entries: Vec<TranscriptEntry>) {
        self.calls.lock().unwrap().push(AvatarCall {
            call_id: call_id.to_string(),
            agent_id: Some("agent-1".to_string()),
            status: Some(status.to_string()),
            started_at: Some(Utc::now()),
        });
        self.transcripts
            .lock()
            .unwrap()
            .insert(call_id.to_string(), entries);
    }

    pub fn transcript_fetches(&self) -> u32 {
        self.transcript_fetches.load(Ordering::SeqCst)
    }
}

pub fn avatar_session(id: &str, started: bool) -> AvatarSession {
    AvatarSession {
        session_id: id.to_string(),
        avatar_id: Some("avatar-1".to_string()),
        livekit_url: Some("wss://lk.example".to_string()),
        transport_type: Some("livekit".to_string()),
        started_at: started.then(|| Utc::now().to_rfc3339()),
        ended_at: None,
    }
}

#[async_trait]
impl AvatarService for FakeAvatar {
    async fn create_agent(&self, request: CreateAvatarAgent) -> PortResult<String> {
        Ok(format!("agent-{}", request.name.len()))
    }

    async fn create_session(&self, request: CreateAvatarSession) -> PortResult<AvatarSession> {
        let n = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.create_delay).await;
        assert!(request.livekit_token.starts_with("token-for-bey-agent-"));
        Ok(avatar_session(&format!("avatar-session-{n}"), false))
    }

    async fn start_session(&self, _session_id: &str) -> PortResult<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send_message(&self, _session_id: &str, text: &str) -> PortResult<()> {
        self.messages.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn push_audio(&self, _session_id: &str, audio: AudioPayload) -> PortResult<()> {
        self.audio.lock().unwrap().push(audio);
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> PortResult<AvatarSession> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.lookup_error.lock().unwrap().clone() {
            return Err(error);
        }
        self.remote
            .lock()
            .unwrap()
            .clone()
            .filter(|s| s.session_id == session_id)
            .ok_or_else(|| PortError::NotFound(format!("avatar session {session_id}")))
    }

    async fn end_session(&self, _session_id: &str) -> PortResult<EndOutcome> {
        self.end_result.lock().unwrap().clone()
    }

    async fn list_calls(&self, agent_id: &str) -> PortResult<Vec<AvatarCall>> {
        let mut calls: Vec<_> = self
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.agent_id.as_deref() == Some(agent_id))
            .cloned()
            .collect();
        calls.reverse();
        Ok(calls)
    }

    async fn fetch_transcript(&self, call_id: &str) -> PortResult<Vec<TranscriptEntry>> {
        self.transcript_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .transcripts
            .lock()
            .unwrap()
            .get(call_id)
            .cloned()
            .unwrap_or_default())
    }
}

pub struct FakeTokens;

impl AccessTokenIssuer for FakeTokens {
    fn issue(&self, request: &TokenRequest) -> PortResult<String> {
        Ok(format!("token-for-{}@{}", request.identity, request.grants.room))
    }
}

pub struct FakeRoom {
    pub participants: Vec<&'static str>,
}

#[async_trait]
impl RoomService for FakeRoom {
    async fn list_participants(&self, _room: &str) -> PortResult<Vec<RoomParticipant>> {
        Ok(self
            .participants
            .iter()
            .map(|id| RoomParticipant {
                identity: id.to_string(),
                name: String::new(),
            })
            .collect())
    }
}

//=========================================================================================
// Wiring
//=========================================================================================

pub struct Harness {
    pub llm: Arc<ScriptedLlm>,
    pub repo: Arc<MemoryRepo>,
    pub avatar: Arc<FakeAvatar>,
    pub state: Arc<AppState>,
}

pub fn fast_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        livekit_url: Some("wss://lk.example".to_string()),
        ready_timeout: Duration::from_millis(200),
        ready_interval: Duration::from_millis(10),
        retry: RetryPolicy {
            max_retries: 1,
            delay: Duration::from_millis(1),
        },
        export_attempts: 2,
        export_interval: Duration::from_millis(1),
        ..OrchestratorSettings::default()
    }
}

pub fn harness_with(llm: Arc<ScriptedLlm>, config: Config) -> Harness {
    harness_from(llm, config, fast_settings())
}

pub fn harness_from(
    llm: Arc<ScriptedLlm>,
    config: Config,
    settings: OrchestratorSettings,
) -> Harness {
    let repo = MemoryRepo::new();
    let avatar = FakeAvatar::new();
    let tokens = Arc::new(FakeTokens);

    let orchestrator = Arc::new(SessionOrchestrator::new(
        avatar.clone(),
        tokens.clone(),
        repo.clone(),
        Arc::new(FixedEmbeddings),
        Arc::new(InMemorySessionCache::new()),
        settings,
    ));
    let media = Arc::new(MediaBridge::new(
        tokens,
        Arc::new(FakeRoom {
            participants: vec!["user-1", "bey-agent-42"],
        }),
        Arc::new(PrefixMatcher::default()),
        RetryPolicy {
            max_retries: 0,
            delay: Duration::from_millis(1),
        },
    ));

    let state = Arc::new(AppState {
        config: Arc::new(config),
        repo: repo.clone(),
        avatar: avatar.clone(),
        orchestrator,
        media,
        clarification: Arc::new(ClarificationAgent::new(llm.clone(), 2)),
        planner: Arc::new(PlannerAgent::new(llm.clone(), repo.clone())),
        interviewer: Arc::new(InterviewerAgent::new(
            llm.clone(),
            Some(repo.clone() as Arc<dyn InterviewRepository>),
        )),
        summarizer: Arc::new(SummarizerAgent::new(llm.clone(), repo.clone())),
        psychometric: Arc::new(PsychometricAgent::new(llm.clone(), repo.clone())),
        shutdown: CancellationToken::new(),
    });

    Harness {
        llm,
        repo,
        avatar,
        state,
    }
}

pub fn harness(llm: Arc<ScriptedLlm>) -> Harness {
    harness_with(llm, Config::default())
}
