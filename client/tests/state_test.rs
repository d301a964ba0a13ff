use wybe_lib::network::{Frame, ServerMessage, VadEvent};
use wybe_lib::state::{
    ConversationState, SessionEvent, SessionStatus, StateManager, StatusError, TranscriptEntry,
    TranscriptRole,
};

/// Decode wire frames and feed them through the state machine
fn feed(state: &mut ConversationState, frames: &[Frame]) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    for frame in frames {
        if let Some(message) = ServerMessage::from_frame(frame).unwrap() {
            events.extend(state.apply(&message));
        }
    }
    events
}

#[test]
fn test_streamed_turn_yields_one_assistant_entry() {
    let mut state = ConversationState::new();

    feed(
        &mut state,
        &[
            Frame::asr("hello"),
            Frame::llm("Hi", false),
            Frame::llm(" there", true),
        ],
    );

    assert_eq!(
        state.transcript(),
        &[
            TranscriptEntry::user("hello"),
            TranscriptEntry::assistant("Hi there"),
        ]
    );
    let assistant_entries = state
        .transcript()
        .iter()
        .filter(|e| e.role == TranscriptRole::Assistant)
        .count();
    assert_eq!(assistant_entries, 1);
}

#[test]
fn test_server_done_frame_with_empty_text() {
    let mut state = ConversationState::new();

    let events = feed(
        &mut state,
        &[
            Frame::llm("One", false),
            Frame::llm(" two", false),
            Frame::llm("", true),
            Frame::llm("Three", false),
        ],
    );

    assert_eq!(
        state.transcript(),
        &[
            TranscriptEntry::assistant("One two"),
            TranscriptEntry::assistant("Three"),
        ]
    );
    assert_eq!(
        events,
        vec![
            SessionEvent::TranscriptAppended {
                index: 0,
                entry: TranscriptEntry::assistant("One"),
            },
            SessionEvent::TranscriptUpdated {
                index: 0,
                entry: TranscriptEntry::assistant("One two"),
            },
            SessionEvent::TranscriptAppended {
                index: 1,
                entry: TranscriptEntry::assistant("Three"),
            },
        ]
    );
}

#[test]
fn test_second_asr_closes_open_accumulation() {
    let mut state = ConversationState::new();

    feed(
        &mut state,
        &[
            Frame::asr("first"),
            Frame::llm("Interrupted", false),
            Frame::asr("second"),
            Frame::llm("Fresh", false),
        ],
    );

    assert_eq!(
        state.transcript(),
        &[
            TranscriptEntry::user("first"),
            TranscriptEntry::assistant("Interrupted"),
            TranscriptEntry::user("second"),
            TranscriptEntry::assistant("Fresh"),
        ]
    );
    assert_eq!(state.open_entry().map(|e| e.index()), Some(3));
}

#[test]
fn test_speech_start_moves_to_listening_from_every_status() {
    let starts = [
        SessionStatus::Disconnected,
        SessionStatus::Ready,
        SessionStatus::Thinking,
        SessionStatus::Speaking,
        SessionStatus::Listening,
        SessionStatus::Error(StatusError::Server("oops".to_string())),
        SessionStatus::Other("custom".to_string()),
    ];

    for start in starts {
        let mut state = ConversationState::new();
        match &start {
            SessionStatus::Ready => {
                state.on_open();
            }
            SessionStatus::Error(_) => {
                feed(&mut state, &[Frame::error("oops")]);
            }
            SessionStatus::Other(token) => {
                feed(&mut state, &[Frame::status(token.clone())]);
            }
            SessionStatus::Disconnected => {}
            other => {
                feed(&mut state, &[Frame::status(other.token())]);
            }
        }
        assert_eq!(*state.status(), start);

        feed(&mut state, &[Frame::vad("speech_start")]);
        assert_eq!(*state.status(), SessionStatus::Listening, "from {:?}", start);
    }
}

#[test]
fn test_unknown_status_kept_verbatim() {
    let mut state = ConversationState::new();

    let events = feed(&mut state, &[Frame::status("warming_up")]);

    assert_eq!(
        events,
        vec![SessionEvent::StatusChanged {
            status: SessionStatus::Other("warming_up".to_string())
        }]
    );
    assert_eq!(state.status().label(), "warming_up");
}

#[test]
fn test_server_error_does_not_touch_transcript() {
    let mut state = ConversationState::new();
    feed(&mut state, &[Frame::llm("partial", false)]);

    let events = feed(&mut state, &[Frame::error("Audio decode error")]);

    assert_eq!(state.status().label(), "Error: Audio decode error");
    assert_eq!(events.len(), 1);

    // Accumulation continues after an error
    feed(&mut state, &[Frame::llm(" more", false)]);
    assert_eq!(state.transcript(), &[TranscriptEntry::assistant("partial more")]);
}

#[test]
fn test_redelivered_status_is_idempotent() {
    let mut state = ConversationState::new();
    let frames = [Frame::status("speaking"), Frame::status("speaking")];

    let events = feed(&mut state, &frames);
    assert_eq!(events.len(), 1);

    let again = feed(&mut state, &[Frame::vad("speech_start"), Frame::vad("speech_start")]);
    assert_eq!(again.len(), 1);
}

#[test]
fn test_speech_end_is_ignored() {
    let mut state = ConversationState::new();
    state.on_open();

    let events = state.apply(&ServerMessage::Vad(VadEvent::SpeechEnd));
    assert!(events.is_empty());
    assert_eq!(*state.status(), SessionStatus::Ready);
}

#[test]
fn test_transport_close_closes_open_entry() {
    let mut state = ConversationState::new();
    state.on_connecting();
    state.on_open();
    feed(&mut state, &[Frame::llm("cut off", false)]);

    assert_eq!(
        state.on_closed(),
        Some(SessionEvent::StatusChanged {
            status: SessionStatus::Disconnected
        })
    );

    state.on_open();
    feed(&mut state, &[Frame::llm("new reply", false)]);
    assert_eq!(
        state.transcript(),
        &[
            TranscriptEntry::assistant("cut off"),
            TranscriptEntry::assistant("new reply"),
        ]
    );
}

#[test]
fn test_state_manager_snapshot() {
    let manager = StateManager::new();
    let mut state = ConversationState::new();
    state.on_open();
    feed(&mut state, &[Frame::asr("hello")]);

    manager.publish(&state);

    assert_eq!(*manager.status(), SessionStatus::Ready);
    assert_eq!(manager.transcript().as_slice(), state.transcript());
}
