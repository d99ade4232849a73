//! crates/interview_core/src/domain.rs
//!
//! Defines the core data structures for the interview orchestrator.
//! They derive `serde` so adapters and handlers can move them across the
//! vector store and HTTP boundaries without a separate record layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

//=========================================================================================
// Research Goals & Plans
//=========================================================================================

/// Lifecycle of a research goal. Goals are never physically deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    #[default]
    Draft,
    Active,
    Closed,
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalStatus::Draft => "draft",
            GoalStatus::Active => "active",
            GoalStatus::Closed => "closed",
        }
    }

    /// Draft goals may be activated or closed, active goals may only be closed.
    pub fn can_transition_to(&self, next: GoalStatus) -> bool {
        matches!(
            (self, next),
            (GoalStatus::Draft, GoalStatus::Active)
                | (GoalStatus::Draft, GoalStatus::Closed)
                | (GoalStatus::Active, GoalStatus::Closed)
        ) || *self == next
    }
}

/// A researcher's high-level goal, refined through clarification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchGoal {
    pub id: String,
    pub goal_text: String,
    #[serde(default)]
    pub target_audience: String,
    #[serde(default)]
    pub duration_minutes: u32,
    #[serde(default)]
    pub sensitive_topics: Vec<String>,
    #[serde(default)]
    pub status: GoalStatus,
    #[serde(default)]
    pub admin_id: String,
    #[serde(default)]
    pub clarifications: Vec<String>,
    #[serde(default)]
    pub brief: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanQuestion {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

/// The script the avatar follows during an interview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewPlan {
    pub plan_id: String,
    pub research_goal_id: String,
    pub introduction: String,
    pub questions: Vec<PlanQuestion>,
    #[serde(default)]
    pub follow_ups: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub closing_remarks: String,
    #[serde(default)]
    pub reminders: Vec<String>,
    pub version: u32,
    pub created_at: DateTime<Utc>,
}

//=========================================================================================
// Sessions & Transcripts
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Created,
    InProgress,
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Created => "created",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Agent,
    Participant,
    #[default]
    Unknown,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::Agent => "agent",
            Speaker::Participant => "participant",
            Speaker::Unknown => "unknown",
        }
    }

    /// Maps the sender labels used by the avatar provider and older clients.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "ai" | "assistant" | "agent" | "system" | "bot" => Speaker::Agent,
            "participant" | "user" | "respondent" | "human" => Speaker::Participant,
            _ => Speaker::Unknown,
        }
    }
}

/// One conversational turn, as delivered by the avatar webhook or a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

impl TranscriptEntry {
    pub fn new(speaker: Speaker, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            speaker,
            text: text.into(),
            timestamp,
            topic: None,
            sentiment: None,
            confidence: None,
            summary: None,
            keywords: Vec::new(),
        }
    }

    /// `timestamp:speaker:text`, used to drop repeated deliveries of one turn.
    pub fn signature(&self) -> String {
        format!(
            "{}:{}:{}",
            self.timestamp.to_rfc3339(),
            self.speaker.as_str(),
            self.text.trim()
        )
    }
}

/// A bounded fragment of a transcript turn, ready for embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptChunk {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub turn_index: usize,
    pub part_number: usize,
    pub total_parts: usize,
    pub original_message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

/// The root aggregate of one interview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewSession {
    pub session_id: String,
    #[serde(default)]
    pub research_goal: String,
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(default)]
    pub participant_email: Option<String>,
    #[serde(default)]
    pub participant_name: Option<String>,
    #[serde(default)]
    pub room_name: String,
    #[serde(default)]
    pub avatar_agent_id: Option<String>,
    #[serde(default)]
    pub avatar_session_id: Option<String>,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub transcript: Vec<TranscriptEntry>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub key_findings: Vec<String>,
    #[serde(default)]
    pub psychometric_profile: Option<PsychometricProfile>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InterviewSession {
    pub fn new(session_id: impl Into<String>, research_goal: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            research_goal: research_goal.into(),
            plan_id: None,
            participant_email: None,
            participant_name: None,
            room_name: String::new(),
            avatar_agent_id: None,
            avatar_session_id: None,
            status: SessionStatus::Created,
            start_time: None,
            end_time: None,
            transcript: Vec::new(),
            summary: None,
            key_findings: Vec::new(),
            psychometric_profile: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Appends transcript turns in arrival order and moves a fresh session into progress.
    pub fn append_transcript(&mut self, entries: Vec<TranscriptEntry>) {
        if entries.is_empty() {
            return;
        }
        self.transcript.extend(entries);
        if self.status == SessionStatus::Created {
            self.status = SessionStatus::InProgress;
        }
        if self.start_time.is_none() {
            self.start_time = Some(Utc::now());
        }
        self.updated_at = Utc::now();
    }

    /// Finalizes the session with its summary and profile attached.
    pub fn complete(
        &mut self,
        summary: Option<String>,
        key_findings: Vec<String>,
        profile: Option<PsychometricProfile>,
    ) {
        let now = Utc::now();
        self.status = SessionStatus::Completed;
        self.end_time = Some(now);
        self.summary = summary;
        self.key_findings = key_findings;
        if profile.is_some() {
            self.psychometric_profile = profile;
        }
        self.updated_at = now;
    }

    pub fn duration_minutes(&self) -> Option<i64> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some((end - start).num_minutes()),
            _ => None,
        }
    }

    /// Renders the transcript as `speaker: text` lines.
    pub fn transcript_text(&self) -> String {
        render_transcript(&self.transcript)
    }
}

pub fn render_transcript(entries: &[TranscriptEntry]) -> String {
    entries
        .iter()
        .filter(|e| !e.text.trim().is_empty())
        .map(|e| format!("{}: {}", e.speaker.as_str(), e.text.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

//=========================================================================================
// Analysis Results
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryChunk {
    pub summary_id: String,
    pub session_id: String,
    #[serde(default)]
    pub chunk_id: String,
    pub summary: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub key_insights: Vec<String>,
    #[serde(default)]
    pub pain_points: Vec<String>,
    #[serde(default)]
    pub feature_requests: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// The flattened view over every summary chunk of a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedInsights {
    pub all_key_insights: Vec<String>,
    pub all_pain_points: Vec<String>,
    pub all_feature_requests: Vec<String>,
    pub all_keywords: Vec<String>,
}

impl AggregatedInsights {
    pub fn from_chunks(chunks: &[SummaryChunk]) -> Self {
        Self {
            all_key_insights: chunks.iter().flat_map(|c| c.key_insights.clone()).collect(),
            all_pain_points: chunks.iter().flat_map(|c| c.pain_points.clone()).collect(),
            all_feature_requests: chunks
                .iter()
                .flat_map(|c| c.feature_requests.clone())
                .collect(),
            all_keywords: chunks.iter().flat_map(|c| c.keywords.clone()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PsychometricProfile {
    pub session_id: String,
    pub openness: u8,
    pub conscientiousness: u8,
    pub extraversion: u8,
    pub agreeableness: u8,
    pub neuroticism: u8,
    #[serde(default)]
    pub enneagram_type: Option<u8>,
    pub explanation: String,
    #[serde(default)]
    pub overall_profile: String,
    #[serde(default)]
    pub key_insights: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// A scored quality measurement recorded against a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationMetric {
    pub metric_id: String,
    pub session_id: String,
    pub metric_type: String,
    pub score: f64,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub trace_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Session counts across the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionAnalytics {
    pub total_sessions: usize,
    pub completed_sessions: usize,
    /// Whole percent, rounded half up.
    pub completion_rate: u32,
    pub by_status: BTreeMap<String, usize>,
    pub by_research_goal: BTreeMap<String, usize>,
}

impl SessionAnalytics {
    pub fn from_sessions(sessions: &[InterviewSession]) -> Self {
        let mut by_status = BTreeMap::new();
        let mut by_research_goal = BTreeMap::new();
        for session in sessions {
            *by_status.entry(session.status.as_str().to_string()).or_insert(0) += 1;
            let goal = match session.research_goal.trim() {
                "" => "Unknown",
                goal => goal,
            };
            *by_research_goal.entry(goal.to_string()).or_insert(0) += 1;
        }

        let total_sessions = sessions.len();
        let completed_sessions = sessions
            .iter()
            .filter(|s| s.status == SessionStatus::Completed)
            .count();
        let completion_rate = if total_sessions == 0 {
            0
        } else {
            ((completed_sessions * 200 + total_sessions) / (total_sessions * 2)) as u32
        };

        Self {
            total_sessions,
            completed_sessions,
            completion_rate,
            by_status,
            by_research_goal,
        }
    }
}

//=========================================================================================
// Avatar Sessions
//=========================================================================================

/// A speaking-avatar session as reported by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarSession {
    pub session_id: String,
    #[serde(default)]
    pub avatar_id: Option<String>,
    #[serde(default)]
    pub livekit_url: Option<String>,
    #[serde(default)]
    pub transport_type: Option<String>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub ended_at: Option<String>,
}

/// Derived lifecycle of an avatar session: `created -> active -> ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvatarSessionState {
    Created,
    Active,
    Ended,
    NotFound,
    Error,
}

impl AvatarSession {
    pub fn state(&self) -> AvatarSessionState {
        match (&self.started_at, &self.ended_at) {
            (_, Some(_)) => AvatarSessionState::Ended,
            (Some(_), None) => AvatarSessionState::Active,
            (None, None) => AvatarSessionState::Created,
        }
    }

    /// Active, with a LiveKit room the bridge can join.
    pub fn is_ready(&self) -> bool {
        self.state() == AvatarSessionState::Active
            && self.livekit_url.as_deref().is_some_and(|u| !u.is_empty())
            && self.transport_type.as_deref() == Some("livekit")
    }
}
