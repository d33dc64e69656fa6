use sketchrelay::config::EngineConfig;
use sketchrelay::protocol::{ClientMessage, ContentPayload, ServerMessage};
use sketchrelay::state::AppState;
use sketchrelay::types::{
    EntryKind, GameMode, ModeSettings, Phase, QuizPrompt, QuizSettings, SessionResult,
    SessionStatus,
};
use sketchrelay::ws::handlers::{handle_message, Connection};
use std::sync::Arc;
use std::time::Duration;

/// Everything queued for this connection's participant so far
fn drain(conn: &mut Connection) -> Vec<ServerMessage> {
    let participant_id = conn.participant_id.clone().expect("connection has a seat");
    let rx = conn.rx.as_mut().expect("connection is subscribed");
    let mut messages = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        if envelope.is_for(&participant_id) {
            messages.push(envelope.message);
        }
    }
    messages
}

fn content_of(messages: &[ServerMessage]) -> Option<ContentPayload> {
    messages.iter().rev().find_map(|m| match m {
        ServerMessage::Content { payload } => Some(payload.clone()),
        _ => None,
    })
}

async fn create(state: &Arc<AppState>, name: &str) -> (Connection, String) {
    let mut conn = Connection::default();
    let result = handle_message(
        ClientMessage::CreateSession {
            display_name: name.to_string(),
        },
        &mut conn,
        state,
    )
    .await;
    match result {
        Some(ServerMessage::Welcome { session_id, .. }) => (conn, session_id),
        other => panic!("Expected Welcome, got {:?}", other),
    }
}

async fn join(state: &Arc<AppState>, session_id: &str, name: &str) -> Connection {
    let mut conn = Connection::default();
    let result = handle_message(
        ClientMessage::Join {
            session_id: session_id.to_string(),
            display_name: name.to_string(),
        },
        &mut conn,
        state,
    )
    .await;
    assert!(
        matches!(result, Some(ServerMessage::Welcome { .. })),
        "Expected Welcome, got {:?}",
        result
    );
    conn
}

async fn submit(
    state: &Arc<AppState>,
    conn: &mut Connection,
    kind: EntryKind,
    payload: &str,
) -> Option<ServerMessage> {
    handle_message(
        ClientMessage::Submit {
            kind,
            payload: payload.to_string(),
            strokes: None,
        },
        conn,
        state,
    )
    .await
}

/// Three participants play a relay to the end, one submission each per turn
#[tokio::test]
async fn test_relay_three_participants() {
    let state = Arc::new(AppState::default());
    let (host, session_id) = create(&state, "Alice").await;
    let bob = join(&state, &session_id, "Bob").await;
    let carol = join(&state, &session_id, "Carol").await;
    let mut conns = vec![host, bob, carol];
    let ids: Vec<String> = conns
        .iter()
        .map(|c| c.participant_id.clone().unwrap())
        .collect();

    let result = handle_message(ClientMessage::StartSession, &mut conns[0], &state).await;
    assert!(result.is_none(), "Start failed: {:?}", result);
    for conn in conns.iter_mut() {
        let messages = drain(conn);
        assert!(messages
            .iter()
            .any(|m| matches!(m, ServerMessage::Phase { phase: Phase::Prompt, .. })));
        assert!(content_of(&messages).is_none());
    }

    // Turn 0: everybody writes a prompt
    for (i, conn) in conns.iter_mut().enumerate() {
        let result = submit(&state, conn, EntryKind::Text, &format!("prompt {}", i)).await;
        assert!(result.is_none());
    }
    let session = state.snapshot(&session_id).await.unwrap();
    assert_eq!(session.phase, Phase::Drawing);
    assert_eq!(session.turn, 1);

    // Turn 1: seat i draws the prompt of seat i+1
    for (i, conn) in conns.iter_mut().enumerate() {
        let messages = drain(conn);
        assert!(messages
            .iter()
            .any(|m| matches!(m, ServerMessage::SubmissionConfirmed)));
        assert_eq!(
            content_of(&messages),
            Some(ContentPayload::Text(format!("prompt {}", (i + 1) % 3)))
        );
    }
    for (i, conn) in conns.iter_mut().enumerate() {
        submit(&state, conn, EntryKind::Drawing, &format!("drawing {}", i)).await;
    }

    // Turn 2: seat i guesses the drawing made by seat i+1
    for (i, conn) in conns.iter_mut().enumerate() {
        let messages = drain(conn);
        assert_eq!(
            content_of(&messages),
            Some(ContentPayload::Drawing(format!("drawing {}", (i + 1) % 3)))
        );
    }
    for (i, conn) in conns.iter_mut().enumerate() {
        submit(&state, conn, EntryKind::Text, &format!("guess {}", i)).await;
    }

    let session = state.snapshot(&session_id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Finished);

    let messages = drain(&mut conns[1]);
    let result = messages
        .iter()
        .find_map(|m| match m {
            ServerMessage::Result { result } => Some(result.clone()),
            _ => None,
        })
        .expect("Result broadcast");

    match result {
        SessionResult::Chains { chains, roster, .. } => {
            assert_eq!(roster.len(), 3);
            assert_eq!(chains.len(), 3);
            for (k, chain) in chains.iter().enumerate() {
                assert_eq!(chain.owner, ids[k]);
                assert_eq!(chain.entries.len(), 3);
                assert_eq!(chain.entries[0].payload, format!("prompt {}", k));
                let mut authors: Vec<&String> =
                    chain.entries.iter().map(|e| &e.author).collect();
                authors.sort();
                authors.dedup();
                assert_eq!(authors.len(), 3, "Every seat touches chain {} once", k);
            }
        }
        other => panic!("Expected chains, got {:?}", other),
    }
}

#[tokio::test]
async fn test_wrong_kind_and_duplicate_submissions() {
    let state = Arc::new(AppState::default());
    let (mut host, session_id) = create(&state, "Alice").await;
    let mut bob = join(&state, &session_id, "Bob").await;
    let mut carol = join(&state, &session_id, "Carol").await;
    handle_message(ClientMessage::StartSession, &mut host, &state).await;

    // Prompt phase wants text
    match submit(&state, &mut host, EntryKind::Drawing, "img").await {
        Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "INVALID_PHASE"),
        other => panic!("Expected error, got {:?}", other),
    }

    submit(&state, &mut host, EntryKind::Text, "a cat").await;
    submit(&state, &mut host, EntryKind::Text, "a cat").await;
    submit(&state, &mut bob, EntryKind::Text, "a dog").await;

    // Two of three in, repeat submission did not count twice
    let session = state.snapshot(&session_id).await.unwrap();
    assert_eq!(session.phase, Phase::Prompt);

    let progress: Vec<usize> = drain(&mut carol)
        .into_iter()
        .filter_map(|m| match m {
            ServerMessage::SubmissionProgress {
                submitted_count, ..
            } => Some(submitted_count),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![1, 2]);

    submit(&state, &mut carol, EntryKind::Text, "a bird").await;
    let session = state.snapshot(&session_id).await.unwrap();
    assert_eq!(session.phase, Phase::Drawing);
}

/// Drawer plus three guessers: 3/2/1 by guess order and the drawer bonus once
#[tokio::test]
async fn test_quiz_round_scoring() {
    let state = Arc::new(AppState::default());
    let (mut drawer, session_id) = create(&state, "Drawer").await;
    let mut guessers = Vec::new();
    for name in ["A", "B", "C"] {
        guessers.push(join(&state, &session_id, name).await);
    }

    let settings = QuizSettings {
        rounds: Some(1),
        prompts: vec![QuizPrompt {
            answer: "りんご".to_string(),
            hint: None,
        }],
        ..QuizSettings::default()
    };
    let result = handle_message(
        ClientMessage::UpdateModeSettings {
            settings: ModeSettings::Quiz(settings),
        },
        &mut drawer,
        &state,
    )
    .await;
    assert!(result.is_none());
    handle_message(ClientMessage::StartSession, &mut drawer, &state).await;

    // Only the drawer learns the answer
    let round_answer = |messages: Vec<ServerMessage>| {
        messages.into_iter().find_map(|m| match m {
            ServerMessage::QuizRound { answer, .. } => Some(answer),
            _ => None,
        })
    };
    assert_eq!(round_answer(drain(&mut drawer)), Some(Some("りんご".to_string())));
    assert_eq!(round_answer(drain(&mut guessers[0])), Some(None));

    submit(&state, &mut drawer, EntryKind::Drawing, "canvas").await;
    submit(&state, &mut guessers[0], EntryKind::Text, "みかん").await;
    for guesser in guessers.iter_mut() {
        submit(&state, guesser, EntryKind::Text, "りんご").await;
    }

    let session = state.snapshot(&session_id).await.unwrap();
    assert_eq!(session.phase, Phase::RoundResult);

    let reveal = drain(&mut guessers[2]).into_iter().find_map(|m| match m {
        ServerMessage::QuizReveal { scores, winners, .. } => Some((scores, winners)),
        _ => None,
    });
    let (scores, winners) = reveal.expect("QuizReveal broadcast");
    assert_eq!(winners.len(), 3);
    let total_of = |conn: &Connection| {
        let id = conn.participant_id.clone().unwrap();
        scores
            .iter()
            .find(|s| s.participant_id == id)
            .map(|s| s.total)
    };
    assert_eq!(total_of(&guessers[0]), Some(3));
    assert_eq!(total_of(&guessers[1]), Some(2));
    assert_eq!(total_of(&guessers[2]), Some(1));
    assert_eq!(total_of(&drawer), Some(2));

    // Everyone acknowledges the reveal, which ends the single round
    handle_message(ClientMessage::MarkReady, &mut drawer, &state).await;
    for guesser in guessers.iter_mut() {
        handle_message(ClientMessage::MarkReady, guesser, &state).await;
    }
    let session = state.snapshot(&session_id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Finished);
    match state.result(&session_id).await.unwrap() {
        Some(SessionResult::Quiz { scores, rounds }) => {
            assert_eq!(rounds.len(), 1);
            assert_eq!(scores[0].total, 3);
        }
        other => panic!("Expected quiz result, got {:?}", other),
    }
}

#[tokio::test]
async fn test_rejoin_resumes_with_same_content() {
    let state = Arc::new(AppState::default());
    let (mut host, session_id) = create(&state, "Alice").await;
    let mut bob = join(&state, &session_id, "Bob").await;
    handle_message(ClientMessage::StartSession, &mut host, &state).await;
    submit(&state, &mut host, EntryKind::Text, "a cat").await;
    submit(&state, &mut bob, EntryKind::Text, "a dog").await;

    let bob_id = bob.participant_id.clone().unwrap();
    let before = state.snapshot(&session_id).await.unwrap();
    assert_eq!(before.phase, Phase::Drawing);

    // Socket drops
    state.disconnect(&session_id, &bob_id).await.unwrap();
    drop(bob);
    let session = state.snapshot(&session_id).await.unwrap();
    assert!(!session.participant(&bob_id).unwrap().connected);

    let mut conn = Connection::default();
    let result = handle_message(
        ClientMessage::Rejoin {
            session_id: session_id.clone(),
            participant_id: bob_id.clone(),
        },
        &mut conn,
        &state,
    )
    .await;

    match result {
        Some(ServerMessage::Resume { state: resume }) => {
            assert_eq!(resume.phase, Phase::Drawing);
            assert_eq!(resume.deadline, before.deadline.map(|d| d.to_rfc3339()));
            assert_eq!(resume.content, Some(ContentPayload::Text("a cat".into())));
            assert!(!resume.has_submitted);
        }
        other => panic!("Expected Resume, got {:?}", other),
    }
    assert_eq!(conn.participant_id.as_deref(), Some(bob_id.as_str()));
    let session = state.snapshot(&session_id).await.unwrap();
    assert!(session.participant(&bob_id).unwrap().connected);
}

#[tokio::test]
async fn test_rejoin_unknown_participant() {
    let state = Arc::new(AppState::default());
    let (_host, session_id) = create(&state, "Alice").await;

    let mut conn = Connection::default();
    let result = handle_message(
        ClientMessage::Rejoin {
            session_id,
            participant_id: "ghost".into(),
        },
        &mut conn,
        &state,
    )
    .await;
    match result {
        Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "PARTICIPANT_NOT_FOUND"),
        other => panic!("Expected error, got {:?}", other),
    }
    assert!(conn.seat().is_none());
}

#[tokio::test]
async fn test_join_after_start_rejected() {
    let state = Arc::new(AppState::default());
    let (mut host, session_id) = create(&state, "Alice").await;
    let _bob = join(&state, &session_id, "Bob").await;
    handle_message(
        ClientMessage::SelectMode {
            mode: GameMode::FrameRelay,
        },
        &mut host,
        &state,
    )
    .await;
    handle_message(ClientMessage::StartSession, &mut host, &state).await;

    let mut late = Connection::default();
    let result = handle_message(
        ClientMessage::Join {
            session_id,
            display_name: "Late".into(),
        },
        &mut late,
        &state,
    )
    .await;
    match result {
        Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "NOT_WAITING"),
        other => panic!("Expected error, got {:?}", other),
    }
}

/// Nobody submits; the deadline backfills and the session still finishes
#[tokio::test(start_paused = true)]
async fn test_relay_finishes_on_timeouts() {
    let state = Arc::new(AppState::new(EngineConfig {
        timeout_grace: Duration::from_secs(1),
        ..EngineConfig::default()
    }));
    let (mut host, session_id) = create(&state, "Alice").await;
    let _bob = join(&state, &session_id, "Bob").await;
    handle_message(ClientMessage::StartSession, &mut host, &state).await;

    // Prompt 60s, then drawing 120s, each plus grace
    tokio::time::sleep(Duration::from_secs(200)).await;

    let session = state.snapshot(&session_id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Finished);
    match state.result(&session_id).await.unwrap() {
        Some(SessionResult::Chains { chains, .. }) => {
            for chain in chains {
                assert_eq!(chain.entries.len(), 2);
                assert!(chain.entries.iter().all(|e| e.placeholder));
            }
        }
        other => panic!("Expected chains, got {:?}", other),
    }
    assert!(!state.has_pending_deadline(&session_id).await.unwrap());
}
