//! crates/interview_core/src/matcher.rs
//!
//! Decides which participant in a media room is the speaking avatar.

use crate::ports::RoomParticipant;

pub const DEFAULT_AGENT_PREFIXES: [&str; 5] =
    ["bey-agent-", "bp-session-", "agent-", "bey-", "avatar-"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentMatch {
    /// The identity carries one of the known agent prefixes.
    Confident { identity: String, prefix: String },
    /// Nobody matched, so the first remote participant is assumed to be the agent.
    Guess { identity: String },
    NoParticipants,
}

impl AgentMatch {
    pub fn identity(&self) -> Option<&str> {
        match self {
            AgentMatch::Confident { identity, .. } | AgentMatch::Guess { identity } => {
                Some(identity)
            }
            AgentMatch::NoParticipants => None,
        }
    }
}

pub trait AgentMatcher: Send + Sync {
    fn classify(&self, participants: &[RoomParticipant]) -> AgentMatch;
}

#[derive(Debug, Clone)]
pub struct PrefixMatcher {
    prefixes: Vec<String>,
}

impl Default for PrefixMatcher {
    fn default() -> Self {
        Self::with_prefixes(DEFAULT_AGENT_PREFIXES)
    }
}

impl PrefixMatcher {
    pub fn with_prefixes<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }
}

impl AgentMatcher for PrefixMatcher {
    fn classify(&self, participants: &[RoomParticipant]) -> AgentMatch {
        for participant in participants {
            if let Some(prefix) = self
                .prefixes
                .iter()
                .find(|p| participant.identity.starts_with(p.as_str()))
            {
                return AgentMatch::Confident {
                    identity: participant.identity.clone(),
                    prefix: prefix.clone(),
                };
            }
        }

        match participants.first() {
            Some(first) => AgentMatch::Guess {
                identity: first.identity.clone(),
            },
            None => AgentMatch::NoParticipants,
        }
    }
}
