mod common;

use api_lib::{
    config::Config,
    orchestrator::{
        ExportTranscriptRequest, OrchestratorSettings, StartSessionRequest, TranscriptUpdate,
    },
};
use chrono::{Duration as ChronoDuration, Utc};
use common::{avatar_session, fast_settings, harness, harness_from, ScriptedLlm};
use futures::future::join_all;
use interview_core::{
    domain::{AvatarSessionState, InterviewSession, SessionStatus, Speaker, TranscriptEntry},
    ports::{EndOutcome, InterviewRepository, PortError},
    RetryPolicy,
};
use pretty_assertions::assert_eq;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

fn start(room: &str, key: Option<&str>) -> StartSessionRequest {
    StartSessionRequest {
        room_name: room.to_string(),
        idempotency_key: key.map(str::to_string),
        ..StartSessionRequest::default()
    }
}

fn turn(speaker: Speaker, text: &str) -> TranscriptEntry {
    TranscriptEntry::new(speaker, text, Utc::now())
}

#[tokio::test]
async fn concurrent_starts_share_one_avatar_session() {
    let h = harness(ScriptedLlm::unconfigured());
    let orchestrator = h.state.orchestrator.clone();

    let results = join_all((0..8).map(|_| {
        let orchestrator = orchestrator.clone();
        async move { orchestrator.start_session(start("room-a", None)).await }
    }))
    .await;

    let sessions: Vec<_> = results.into_iter().map(Result::unwrap).collect();
    assert!(sessions
        .iter()
        .all(|s| s.session.session_id == sessions[0].session.session_id));
    assert_eq!(sessions.iter().filter(|s| s.created).count(), 1);
    assert_eq!(h.avatar.creates(), 1);
    assert_eq!(h.avatar.starts.load(Ordering::SeqCst), 1);
    assert_eq!(h.avatar.messages.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn distinct_keys_create_distinct_sessions() {
    let h = harness(ScriptedLlm::unconfigured());
    let first = h
        .state
        .orchestrator
        .start_session(start("room-a", Some("attempt-1")))
        .await
        .unwrap();
    let second = h
        .state
        .orchestrator
        .start_session(start("room-a", Some("attempt-2")))
        .await
        .unwrap();
    let again = h
        .state
        .orchestrator
        .start_session(start("room-a", Some("attempt-1")))
        .await
        .unwrap();

    assert_ne!(first.session.session_id, second.session.session_id);
    assert_eq!(first.session.session_id, again.session.session_id);
    assert!(!again.created);
    assert_eq!(h.avatar.creates(), 2);
}

#[tokio::test]
async fn start_requires_a_room_and_optionally_an_agent() {
    let h = harness(ScriptedLlm::unconfigured());
    let err = h
        .state
        .orchestrator
        .start_session(start("  ", None))
        .await
        .unwrap_err();
    assert!(matches!(err, PortError::InvalidInput(_)));

    let err = h
        .state
        .orchestrator
        .start_session(StartSessionRequest {
            room_name: "room-b".into(),
            require_agent: true,
            ..StartSessionRequest::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Invalid input: agentId is required");
    assert_eq!(h.avatar.creates(), 0);
}

#[tokio::test]
async fn ending_forgets_the_cached_session() {
    let h = harness(ScriptedLlm::unconfigured());
    let first = h
        .state
        .orchestrator
        .start_session(start("room-c", None))
        .await
        .unwrap();

    let report = h
        .state
        .orchestrator
        .end_session(&first.session.session_id)
        .await
        .unwrap();
    assert!(report.success);
    assert_eq!(report.status, "ended");

    let next = h
        .state
        .orchestrator
        .start_session(start("room-c", None))
        .await
        .unwrap();
    assert!(next.created);
    assert_ne!(next.session.session_id, first.session.session_id);
}

#[tokio::test]
async fn end_outcomes_map_to_reports() {
    let h = harness(ScriptedLlm::unconfigured());
    let orchestrator = &h.state.orchestrator;

    h.avatar.set_end_result(Ok(EndOutcome::AlreadyGone));
    let report = orchestrator.end_session("gone").await.unwrap();
    assert!(report.success);
    assert_eq!(report.status, "not_found");

    h.avatar.set_end_result(Err(PortError::Upstream {
        status: 409,
        message: "session is locked".into(),
    }));
    let report = orchestrator.end_session("locked").await.unwrap();
    assert!(!report.success);
    assert_eq!(report.status, "error");
    assert_eq!(report.message.as_deref(), Some("session is locked"));

    h.avatar
        .set_end_result(Err(PortError::Unexpected("connection reset".into())));
    let report = orchestrator.end_session("flaky").await.unwrap();
    assert!(report.success);
    assert_eq!(report.status, "api_error");

    h.avatar
        .set_end_result(Err(PortError::Configuration("BEY_API_KEY".into())));
    assert!(orchestrator.end_session("unconfigured").await.is_err());
}

#[tokio::test]
async fn status_reports_missing_and_active_sessions() {
    let h = harness(ScriptedLlm::unconfigured());
    let report = h.state.orchestrator.session_status("nope").await;
    assert_eq!(report.status, AvatarSessionState::NotFound);
    assert!(!report.ready);

    h.avatar.set_remote(Some(avatar_session("live", true)));
    let report = h.state.orchestrator.session_status("live").await;
    assert_eq!(report.status, AvatarSessionState::Active);
    assert!(report.ready);
}

#[tokio::test]
async fn waiting_returns_once_the_session_is_ready() {
    let h = harness(ScriptedLlm::unconfigured());
    h.avatar.set_remote(Some(avatar_session("warming", false)));

    let avatar = h.avatar.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        avatar.set_remote(Some(avatar_session("warming", true)));
    });

    let session = h
        .state
        .orchestrator
        .wait_until_ready("warming")
        .await
        .unwrap();
    assert!(session.is_ready());
}

#[tokio::test]
async fn waiting_gives_up_after_the_timeout() {
    let h = harness(ScriptedLlm::unconfigured());
    h.avatar.set_remote(Some(avatar_session("stuck", false)));

    let err = h
        .state
        .orchestrator
        .wait_until_ready_within("stuck", Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, PortError::Unexpected(_)));
    assert!(err.to_string().contains("not ready"));
}

#[tokio::test]
async fn waiting_on_an_unknown_session_fails_fast() {
    let h = harness(ScriptedLlm::unconfigured());
    let err = h
        .state
        .orchestrator
        .wait_until_ready("unknown")
        .await
        .unwrap_err();
    assert!(matches!(err, PortError::NotFound(_)));
}

#[tokio::test]
async fn transcript_deliveries_append_and_chunk_only_new_turns() {
    let h = harness(ScriptedLlm::unconfigured());
    let orchestrator = &h.state.orchestrator;

    let first = orchestrator
        .apply_transcript(
            TranscriptUpdate {
                session_id: "s-10".into(),
                avatar_session_id: Some("avatar-9".into()),
                entries: vec![
                    turn(Speaker::Agent, "How do you plan your groceries?"),
                    turn(Speaker::Participant, "I write a list on my phone."),
                ],
                ..TranscriptUpdate::default()
            },
            true,
        )
        .await
        .unwrap();
    assert_eq!(first.appended, 2);
    assert_eq!(first.total_entries, 2);
    assert_eq!(first.chunks_stored, 2);

    let second = orchestrator
        .apply_transcript(
            TranscriptUpdate {
                session_id: "s-10".into(),
                entries: vec![turn(Speaker::Participant, "Sometimes I forget it at home.")],
                ..TranscriptUpdate::default()
            },
            true,
        )
        .await
        .unwrap();
    assert_eq!(second.total_entries, 3);
    assert_eq!(second.chunks_stored, 1);

    let stored = h.repo.get_session("s-10").await.unwrap();
    assert_eq!(stored.transcript.len(), 3);
    assert_eq!(stored.avatar_session_id.as_deref(), Some("avatar-9"));

    let chunks = h.repo.get_transcript_chunks("s-10").await.unwrap();
    let turns: Vec<_> = chunks.iter().map(|c| c.turn_index).collect();
    assert_eq!(turns, vec![0, 1, 2]);
}

#[tokio::test]
async fn transcript_for_unknown_session_is_rejected_unless_created() {
    let h = harness(ScriptedLlm::unconfigured());
    let err = h
        .state
        .orchestrator
        .apply_transcript(
            TranscriptUpdate {
                session_id: "missing".into(),
                entries: vec![turn(Speaker::Participant, "hello")],
                ..TranscriptUpdate::default()
            },
            false,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PortError::NotFound(_)));
}

#[tokio::test]
async fn completing_attaches_the_stored_profile() {
    let h = harness(ScriptedLlm::unconfigured());
    h.state
        .orchestrator
        .apply_transcript(
            TranscriptUpdate {
                session_id: "s-11".into(),
                entries: vec![turn(Speaker::Participant, "I like routines.")],
                ..TranscriptUpdate::default()
            },
            true,
        )
        .await
        .unwrap();
    let profile = api_lib::agents::PsychometricAnalysis::neutral().to_profile("s-11");
    h.repo.upsert_psychometric_profile(profile).await.unwrap();

    let session = h
        .state
        .orchestrator
        .complete_session("s-11", Some("Prefers routines".into()), vec!["routine".into()])
        .await
        .unwrap();

    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session.psychometric_profile.is_some());
    assert_eq!(
        h.repo.get_session("s-11").await.unwrap().summary.as_deref(),
        Some("Prefers routines")
    );
}

#[tokio::test]
async fn oversized_wait_is_rejected_instead_of_overflowing() {
    let h = harness(ScriptedLlm::unconfigured());
    h.avatar.set_remote(Some(avatar_session("warming", false)));

    let err = h
        .state
        .orchestrator
        .wait_until_ready_within("warming", Duration::MAX)
        .await
        .unwrap_err();
    assert!(matches!(err, PortError::InvalidInput(_)));
    assert_eq!(h.avatar.lookups.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failing_lookups_do_not_stretch_the_wait_past_its_timeout() {
    let settings = OrchestratorSettings {
        retry: RetryPolicy {
            max_retries: 3,
            delay: Duration::from_secs(2),
        },
        ..fast_settings()
    };
    let h = harness_from(ScriptedLlm::unconfigured(), Config::default(), settings);
    h.avatar.fail_lookups(PortError::Upstream {
        status: 503,
        message: "warming up".into(),
    });

    let started = Instant::now();
    let err = h
        .state
        .orchestrator
        .wait_until_ready_within("busy", Duration::from_millis(100))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("not ready"));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(h.avatar.lookups.load(Ordering::SeqCst) > 1);
}

#[tokio::test]
async fn overlapping_deliveries_store_every_turn() {
    let h = harness(ScriptedLlm::unconfigured());
    h.repo
        .upsert_session(&InterviewSession::new("s-30", "Commuting"))
        .await
        .unwrap();
    h.repo
        .upsert_delays
        .lock()
        .unwrap()
        .push_back(Duration::from_millis(60));

    let orchestrator = &h.state.orchestrator;
    let first = orchestrator.apply_transcript(
        TranscriptUpdate {
            session_id: "s-30".into(),
            entries: vec![turn(Speaker::Agent, "How do you get to work?")],
            ..TranscriptUpdate::default()
        },
        false,
    );
    let second = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        orchestrator
            .apply_transcript(
                TranscriptUpdate {
                    session_id: "s-30".into(),
                    entries: vec![turn(Speaker::Participant, "By bike, mostly.")],
                    ..TranscriptUpdate::default()
                },
                false,
            )
            .await
    };
    let (first, second) = tokio::join!(first, second);
    assert_eq!(first.unwrap().total_entries, 1);
    assert_eq!(second.unwrap().total_entries, 2);

    let stored = h.repo.get_session("s-30").await.unwrap();
    let texts: Vec<_> = stored.transcript.iter().map(|e| e.text.as_str()).collect();
    assert_eq!(texts, vec!["How do you get to work?", "By bike, mostly."]);
}

fn at(seconds: i64, speaker: Speaker, text: &str) -> TranscriptEntry {
    let base = Utc::now() - ChronoDuration::minutes(10);
    TranscriptEntry::new(speaker, text, base + ChronoDuration::seconds(seconds))
}

#[tokio::test]
async fn export_appends_only_unseen_turns_and_completes() {
    let h = harness(ScriptedLlm::unconfigured());
    let greeting = at(0, Speaker::Agent, "Welcome! How do you commute?");
    let mut session = InterviewSession::new("s-40", "Commuting");
    session.avatar_session_id = Some("call-1".into());
    session.append_transcript(vec![greeting.clone()]);
    h.repo.upsert_session(&session).await.unwrap();

    h.avatar.record_call(
        "call-1",
        "ended",
        vec![
            greeting.clone(),
            greeting,
            at(5, Speaker::Participant, "I take the tram."),
        ],
    );

    let export = h
        .state
        .orchestrator
        .export_transcript("s-40", ExportTranscriptRequest::default())
        .await
        .unwrap();

    assert_eq!(export.call_id, "call-1");
    assert_eq!(export.fetched, 2);
    assert_eq!(export.appended, 1);
    assert_eq!(export.total_entries, 2);
    assert!(!export.used_stored_transcript);
    assert_eq!(export.status, SessionStatus::Completed);

    let stored = h.repo.get_session("s-40").await.unwrap();
    assert_eq!(stored.status, SessionStatus::Completed);
    assert_eq!(stored.transcript[1].text, "I take the tram.");
}

#[tokio::test]
async fn export_finds_the_call_through_the_agent() {
    let h = harness(ScriptedLlm::unconfigured());
    h.repo
        .upsert_session(&InterviewSession::new("s-41", "Commuting"))
        .await
        .unwrap();
    h.avatar.record_call("old-call", "ended", vec![at(0, Speaker::Participant, "Old answer.")]);
    h.avatar.record_call("live-call", "active", Vec::new());

    let export = h
        .state
        .orchestrator
        .export_transcript(
            "s-41",
            ExportTranscriptRequest {
                avatar_agent_id: Some("agent-1".into()),
                ..ExportTranscriptRequest::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(export.call_id, "old-call");
    assert_eq!(export.appended, 1);
}

#[tokio::test]
async fn export_keeps_the_stored_transcript_when_the_call_has_none() {
    let h = harness(ScriptedLlm::unconfigured());
    let mut session = InterviewSession::new("s-42", "Commuting");
    session.avatar_session_id = Some("quiet-call".into());
    session.append_transcript(vec![at(0, Speaker::Participant, "Walking, always.")]);
    h.repo.upsert_session(&session).await.unwrap();

    let export = h
        .state
        .orchestrator
        .export_transcript("s-42", ExportTranscriptRequest::default())
        .await
        .unwrap();

    assert!(export.used_stored_transcript);
    assert_eq!(export.appended, 0);
    assert_eq!(export.total_entries, 1);
    assert_eq!(h.avatar.transcript_fetches(), 2);
    assert_eq!(
        h.repo.get_session("s-42").await.unwrap().status,
        SessionStatus::Completed
    );
}

#[tokio::test]
async fn export_without_a_call_or_session_is_not_found() {
    let h = harness(ScriptedLlm::unconfigured());
    let err = h
        .state
        .orchestrator
        .export_transcript("ghost", ExportTranscriptRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PortError::NotFound(_)));

    h.repo
        .upsert_session(&InterviewSession::new("s-43", "Commuting"))
        .await
        .unwrap();
    let err = h
        .state
        .orchestrator
        .export_transcript("s-43", ExportTranscriptRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PortError::NotFound(_)));
    assert_eq!(h.avatar.transcript_fetches(), 0);
}
