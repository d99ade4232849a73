//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::{
    agents::{
        ClarificationAgent, InterviewerAgent, PlannerAgent, PsychometricAgent, SummarizerAgent,
    },
    config::Config,
    media_bridge::MediaBridge,
    orchestrator::SessionOrchestrator,
};
use interview_core::ports::{AvatarService, InterviewRepository};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub repo: Arc<dyn InterviewRepository>,
    pub avatar: Arc<dyn AvatarService>,
    pub orchestrator: Arc<SessionOrchestrator>,
    pub media: Arc<MediaBridge>,
    pub clarification: Arc<ClarificationAgent>,
    pub planner: Arc<PlannerAgent>,
    pub interviewer: Arc<InterviewerAgent>,
    pub summarizer: Arc<SummarizerAgent>,
    pub psychometric: Arc<PsychometricAgent>,
    /// Cancelled on shutdown; long polls run on child tokens of this one.
    pub shutdown: CancellationToken,
}
