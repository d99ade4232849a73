//! services/api/src/agents/psychometric.rs
//!
//! Big Five and Enneagram assessment of a participant from their transcript.

use chrono::Utc;
use interview_core::domain::PsychometricProfile;
use interview_core::ports::{CompletionRequest, InterviewRepository, LanguageModelService, PortResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;

use super::{extract_json_object, resolve_transcript};

const NEUTRAL_SCORE: u8 = 50;

const SYSTEM_PROMPT: &str = "You are a psychologist specializing in personality assessment. \
Analyze interview transcripts to assess personality traits using the Big Five model (OCEAN) and \
the Enneagram. Base every score on evidence in the transcript and say when the evidence is thin.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TraitScore {
    pub score: u8,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TraitScores {
    pub openness: TraitScore,
    pub conscientiousness: TraitScore,
    pub extraversion: TraitScore,
    pub agreeableness: TraitScore,
    pub neuroticism: TraitScore,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EnneagramResult {
    #[serde(rename = "type")]
    pub enneagram_type: Option<u8>,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PsychometricAnalysis {
    pub traits: TraitScores,
    pub enneagram: EnneagramResult,
    pub overall_profile: String,
    pub key_insights: Vec<String>,
}

impl PsychometricAnalysis {
    /// Placeholder used when the model output cannot be read.
    pub fn neutral() -> Self {
        let unknown = || TraitScore {
            score: NEUTRAL_SCORE,
            explanation: "Not enough evidence to assess.".to_string(),
        };
        Self {
            traits: TraitScores {
                openness: unknown(),
                conscientiousness: unknown(),
                extraversion: unknown(),
                agreeableness: unknown(),
                neuroticism: unknown(),
            },
            enneagram: EnneagramResult {
                enneagram_type: None,
                explanation: "Not enough evidence to assess.".to_string(),
            },
            overall_profile: "The assessment could not be generated from the model output."
                .to_string(),
            key_insights: Vec::new(),
        }
    }

    pub fn to_profile(&self, session_id: &str) -> PsychometricProfile {
        PsychometricProfile {
            session_id: session_id.to_string(),
            openness: self.traits.openness.score,
            conscientiousness: self.traits.conscientiousness.score,
            extraversion: self.traits.extraversion.score,
            agreeableness: self.traits.agreeableness.score,
            neuroticism: self.traits.neuroticism.score,
            enneagram_type: self.enneagram.enneagram_type,
            explanation: self.enneagram.explanation.clone(),
            overall_profile: self.overall_profile.clone(),
            key_insights: self.key_insights.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Scores may arrive as numbers or numeric strings; they are rounded and clamped to 0..=100.
fn read_score(value: Option<&Value>) -> u8 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').parse::<f64>().ok(),
        _ => None,
    };
    raw.filter(|v| v.is_finite())
        .map(|v| v.round().clamp(0.0, 100.0) as u8)
        .unwrap_or(NEUTRAL_SCORE)
}

/// Accepts `5`, `"5"` or `"Type 5"`; anything outside 1..=9 is dropped.
fn read_enneagram_type(value: Option<&Value>) -> Option<u8> {
    let raw = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let digits: String = s.chars().filter(char::is_ascii_digit).collect();
            digits.parse::<f64>().ok()?
        }
        _ => return None,
    };
    (raw.fract() == 0.0 && (1.0..=9.0).contains(&raw)).then_some(raw as u8)
}

fn read_string(value: Option<&Value>) -> String {
    value.and_then(Value::as_str).unwrap_or_default().to_string()
}

fn read_trait(traits: &Value, name: &str) -> TraitScore {
    let entry = traits.get(name);
    // Some models flatten a trait to a bare score.
    let (score, explanation) = match entry {
        Some(obj @ Value::Object(_)) => (obj.get("score"), obj.get("explanation")),
        other => (other, None),
    };
    TraitScore {
        score: read_score(score),
        explanation: read_string(explanation),
    }
}

/// Returns `None` when the text holds no readable JSON object.
pub fn parse_analysis(text: &str) -> Option<PsychometricAnalysis> {
    let value: Value = serde_json::from_str(extract_json_object(text)?).ok()?;
    if !value.is_object() {
        return None;
    }
    let traits = value.get("traits").cloned().unwrap_or(Value::Null);
    let enneagram = value.get("enneagram").cloned().unwrap_or(Value::Null);

    Some(PsychometricAnalysis {
        traits: TraitScores {
            openness: read_trait(&traits, "openness"),
            conscientiousness: read_trait(&traits, "conscientiousness"),
            extraversion: read_trait(&traits, "extraversion"),
            agreeableness: read_trait(&traits, "agreeableness"),
            neuroticism: read_trait(&traits, "neuroticism"),
        },
        enneagram: EnneagramResult {
            enneagram_type: read_enneagram_type(enneagram.get("type")),
            explanation: read_string(enneagram.get("explanation")),
        },
        overall_profile: read_string(value.get("overallProfile")),
        key_insights: value
            .get("keyInsights")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
    })
}

pub struct PsychometricAgent {
    llm: Arc<dyn LanguageModelService>,
    repo: Arc<dyn InterviewRepository>,
}

impl PsychometricAgent {
    pub fn new(llm: Arc<dyn LanguageModelService>, repo: Arc<dyn InterviewRepository>) -> Self {
        Self { llm, repo }
    }

    fn user_prompt(transcript: &str) -> String {
        format!(
            "Analyze this interview transcript and provide a psychometric assessment:\n\n\
             Transcript:\n{transcript}\n\n\
             Return a JSON object with:\n\
             {{\n  \"traits\": {{\n    \
             \"openness\": {{\"score\": 0-100, \"explanation\": \"string\"}},\n    \
             \"conscientiousness\": {{\"score\": 0-100, \"explanation\": \"string\"}},\n    \
             \"extraversion\": {{\"score\": 0-100, \"explanation\": \"string\"}},\n    \
             \"agreeableness\": {{\"score\": 0-100, \"explanation\": \"string\"}},\n    \
             \"neuroticism\": {{\"score\": 0-100, \"explanation\": \"string\"}}\n  }},\n  \
             \"enneagram\": {{\"type\": 1-9, \"explanation\": \"string\"}},\n  \
             \"overallProfile\": \"string\",\n  \
             \"keyInsights\": [\"string\"]\n}}"
        )
    }

    /// Assesses the transcript. A readable result is stored against the
    /// session (create-or-replace); an unreadable one is returned as a neutral
    /// placeholder and never stored.
    pub async fn analyze(
        &self,
        transcript: Option<&str>,
        session_id: Option<&str>,
    ) -> PortResult<PsychometricAnalysis> {
        let transcript = resolve_transcript(self.repo.as_ref(), transcript, session_id).await?;

        let text = self
            .llm
            .complete(CompletionRequest {
                system: SYSTEM_PROMPT.to_string(),
                user: Self::user_prompt(&transcript),
                temperature: 0.3,
                json_mode: true,
            })
            .await?;

        let Some(analysis) = parse_analysis(&text) else {
            warn!("Psychometric output was not valid JSON, returning a neutral profile");
            return Ok(PsychometricAnalysis::neutral());
        };

        if let Some(session_id) = session_id.filter(|id| !id.trim().is_empty()) {
            match self
                .repo
                .upsert_psychometric_profile(analysis.to_profile(session_id))
                .await
            {
                Ok(()) => info!(session_id, "Psychometric profile stored"),
                Err(e) => warn!(session_id, error = %e, "Failed to store psychometric profile"),
            }
        }

        Ok(analysis)
    }
}
