/// Integration tests for the frame codec and typed server messages

use wybe_lib::network::{decode, encode, CodecError, Frame, FrameKind, ServerMessage, VadEvent};

#[test]
fn test_every_kind_round_trips() {
    let kinds = [
        FrameKind::Handshake,
        FrameKind::AudioIn,
        FrameKind::AudioOut,
        FrameKind::TextAsr,
        FrameKind::TextLlm,
        FrameKind::VadEvent,
        FrameKind::Error,
        FrameKind::Status,
        FrameKind::Unknown(0x7F),
    ];

    for kind in kinds {
        let payload = [kind.tag(), 0x00, 0xFF];
        let bytes = encode(kind, &payload);
        assert_eq!(bytes.len(), 1 + payload.len());

        let frame = decode(&bytes).unwrap();
        assert_eq!(frame, Frame::new(kind, payload.to_vec()), "kind {}", kind.name());
    }
}

#[test]
fn test_wire_tags() {
    assert_eq!(Frame::handshake(1).encode()[0], 0x01);
    assert_eq!(Frame::audio_in(vec![0u8; 2]).encode()[0], 0x02);
    assert_eq!(Frame::audio_out(vec![0u8; 2]).encode()[0], 0x03);
    assert_eq!(Frame::asr("a").encode()[0], 0x04);
    assert_eq!(Frame::llm("a", false).encode()[0], 0x05);
    assert_eq!(Frame::vad("speech_start").encode()[0], 0x06);
    assert_eq!(Frame::error("e").encode()[0], 0x07);
    assert_eq!(Frame::status("ready").encode()[0], 0x08);
}

#[test]
fn test_empty_message_is_malformed() {
    assert!(matches!(decode(&[]), Err(CodecError::MalformedFrame)));
}

#[test]
fn test_tag_only_message_has_empty_payload() {
    let frame = decode(&[0x03]).unwrap();
    assert_eq!(frame.kind, FrameKind::AudioOut);
    assert!(frame.payload.is_empty());
}

#[test]
fn test_handshake_payload() {
    let frame = Frame::handshake(1);
    let record: serde_json::Value = serde_json::from_slice(&frame.payload).unwrap();
    assert_eq!(record, serde_json::json!({ "version": 1 }));
}

#[test]
fn test_server_messages_from_wire_json() {
    let cases = [
        (
            Frame::new(FrameKind::TextAsr, br#"{"text":"hello"}"#.to_vec()),
            ServerMessage::Asr {
                text: "hello".to_string(),
            },
        ),
        (
            Frame::new(FrameKind::TextLlm, br#"{"text":"","done":true}"#.to_vec()),
            ServerMessage::Llm {
                text: String::new(),
                done: true,
            },
        ),
        (
            Frame::new(FrameKind::VadEvent, br#"{"event":"speech_start"}"#.to_vec()),
            ServerMessage::Vad(VadEvent::SpeechStart),
        ),
        (
            Frame::new(FrameKind::Error, br#"{"error":"Audio decode error"}"#.to_vec()),
            ServerMessage::Error {
                message: "Audio decode error".to_string(),
            },
        ),
        (
            Frame::new(FrameKind::Status, br#"{"status":"warming_up"}"#.to_vec()),
            ServerMessage::Status {
                status: "warming_up".to_string(),
            },
        ),
        (
            Frame::audio_out(vec![0x00, 0x80]),
            ServerMessage::AudioOut(vec![0x00, 0x80]),
        ),
    ];

    for (frame, expected) in cases {
        assert_eq!(ServerMessage::from_frame(&frame).unwrap(), Some(expected));
    }
}

#[test]
fn test_invalid_payload_is_scoped_to_frame() {
    let bad = Frame::new(FrameKind::Status, b"not json".to_vec());
    assert!(matches!(
        ServerMessage::from_frame(&bad),
        Err(CodecError::InvalidPayload { .. })
    ));

    // The next frame decodes normally
    let good = Frame::status("ready");
    assert!(ServerMessage::from_frame(&good).unwrap().is_some());
}

#[test]
fn test_client_and_unknown_kinds_are_not_server_messages() {
    assert_eq!(ServerMessage::from_frame(&Frame::handshake(1)).unwrap(), None);
    assert_eq!(ServerMessage::from_frame(&Frame::audio_in(vec![1, 2])).unwrap(), None);
    assert_eq!(
        ServerMessage::from_frame(&Frame::new(FrameKind::Unknown(0x42), vec![1])).unwrap(),
        None
    );
}
