/// Integration tests for the connection manager
///
/// Each test runs an in-process WebSocket server on an ephemeral port.

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use wybe_lib::network::{
    ConnectionConfig, ConnectionEvent, ConnectionManager, ConnectionState, Frame, FrameKind,
};

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

async fn next_event(events: &mut mpsc::Receiver<ConnectionEvent>) -> ConnectionEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for connection event")
        .expect("event channel closed")
}

/// Skip events until one matches, returning everything seen on the way
async fn collect_until<F>(
    events: &mut mpsc::Receiver<ConnectionEvent>,
    mut done: F,
) -> Vec<ConnectionEvent>
where
    F: FnMut(&ConnectionEvent) -> bool,
{
    let mut seen = Vec::new();
    loop {
        let event = next_event(events).await;
        let stop = done(&event);
        seen.push(event);
        if stop {
            return seen;
        }
    }
}

#[tokio::test]
async fn test_handshake_is_first_frame() {
    let (listener, addr) = bind().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        let first = ws.next().await.unwrap().unwrap();
        let frame = match first {
            Message::Binary(bytes) => Frame::decode(&bytes).unwrap(),
            other => panic!("Expected binary handshake, got {:?}", other),
        };

        let second = ws.next().await.unwrap().unwrap();
        let audio = match second {
            Message::Binary(bytes) => Frame::decode(&bytes).unwrap(),
            other => panic!("Expected binary audio, got {:?}", other),
        };
        (frame, audio)
    });

    let (events_tx, mut events) = mpsc::channel(64);
    let mut handle =
        ConnectionManager::spawn(ConnectionConfig::new(addr.clone()), events_tx).unwrap();

    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connecting { attempt: 1 });
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Opened);
    assert_eq!(handle.state(), ConnectionState::Open);

    assert!(handle.sender().send(Frame::audio_in(vec![1, 2, 3, 4])));

    let (handshake, audio) = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(handshake, Frame::handshake(1));
    assert_eq!(audio, Frame::audio_in(vec![1, 2, 3, 4]));

    handle.shutdown().await;
}

#[tokio::test]
async fn test_inbound_frames_in_order_and_bad_frames_dropped() {
    let (listener, addr) = bind().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let _handshake = ws.next().await;

        let messages = vec![
            Frame::status("thinking").encode(),
            Vec::new(),
            Frame::new(FrameKind::Unknown(0x42), vec![9, 9]).encode(),
            Frame::asr("hello").encode(),
            Frame::llm("Hi", false).encode(),
        ];
        for bytes in messages {
            ws.send(Message::Binary(bytes.into())).await.unwrap();
        }
        ws.send(Message::Text("ignored".into())).await.unwrap();
        ws.send(Message::Binary(Frame::llm("", true).encode().into()))
            .await
            .unwrap();

        // Hold the socket until the client is done
        let _ = ws.next().await;
    });

    let (events_tx, mut events) = mpsc::channel(64);
    let mut handle =
        ConnectionManager::spawn(ConnectionConfig::new(addr.clone()), events_tx).unwrap();

    collect_until(&mut events, |e| *e == ConnectionEvent::Opened).await;

    let mut frames = Vec::new();
    for _ in 0..4 {
        match next_event(&mut events).await {
            ConnectionEvent::Frame(frame) => frames.push(frame),
            other => panic!("Expected frame, got {:?}", other),
        }
    }

    assert_eq!(
        frames,
        vec![
            Frame::status("thinking"),
            Frame::asr("hello"),
            Frame::llm("Hi", false),
            Frame::llm("", true),
        ]
    );

    handle.shutdown().await;
    server.abort();
}

#[tokio::test]
async fn test_close_schedules_exactly_one_reconnect() {
    let (listener, addr) = bind().await;

    let server = tokio::spawn(async move {
        // First socket: handshake, then close
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let _handshake = ws.next().await;
        ws.close(None).await.unwrap();
        drop(ws);

        // Second socket stays open
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let handshake = match ws.next().await {
            Some(Ok(Message::Binary(bytes))) => Frame::decode(&bytes).ok(),
            _ => None,
        };
        let _ = ws.next().await;
        handshake
    });

    let (events_tx, mut events) = mpsc::channel(64);
    let config = ConnectionConfig::new(addr.clone()).with_reconnect_delay(300);
    let mut handle = ConnectionManager::spawn(config, events_tx).unwrap();

    collect_until(&mut events, |e| *e == ConnectionEvent::Opened).await;

    assert!(matches!(
        next_event(&mut events).await,
        ConnectionEvent::Closed { .. }
    ));

    // Capture frames are refused while the transport is down
    let sender = handle.sender();
    assert!(!sender.is_open());
    assert!(!sender.send(Frame::audio_in(vec![0, 0])));

    let after_close =
        collect_until(&mut events, |e| *e == ConnectionEvent::Opened).await;

    let scheduled: Vec<_> = after_close
        .iter()
        .filter(|e| matches!(e, ConnectionEvent::ReconnectScheduled { .. }))
        .collect();
    assert_eq!(scheduled.len(), 1);
    assert_eq!(
        scheduled[0],
        &ConnectionEvent::ReconnectScheduled {
            delay: Duration::from_millis(300)
        }
    );

    // The attempt counter restarts after a successful open
    assert!(after_close.contains(&ConnectionEvent::Connecting { attempt: 1 }));
    assert!(sender.is_open());

    handle.shutdown().await;
    let handshake = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(handshake, Some(Frame::handshake(1)));
}

#[tokio::test]
async fn test_refused_connection_keeps_retrying() {
    let (listener, addr) = bind().await;
    drop(listener);

    let (events_tx, mut events) = mpsc::channel(64);
    let config = ConnectionConfig::new(addr).with_reconnect_delay(20);
    let mut handle = ConnectionManager::spawn(config, events_tx).unwrap();

    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connecting { attempt: 1 });
    match next_event(&mut events).await {
        ConnectionEvent::Closed { error } => assert!(error.is_some()),
        other => panic!("Expected Closed, got {:?}", other),
    }
    assert!(matches!(
        next_event(&mut events).await,
        ConnectionEvent::ReconnectScheduled { .. }
    ));
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connecting { attempt: 2 });

    handle.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_cancels_pending_reconnect() {
    let (listener, addr) = bind().await;
    drop(listener);

    let (events_tx, mut events) = mpsc::channel(64);
    let config = ConnectionConfig::new(addr).with_reconnect_delay(60_000);
    let mut handle = ConnectionManager::spawn(config, events_tx).unwrap();

    collect_until(&mut events, |e| {
        matches!(e, ConnectionEvent::ReconnectScheduled { .. })
    })
    .await;

    tokio::time::timeout(Duration::from_secs(2), handle.shutdown())
        .await
        .expect("shutdown should not wait for the reconnect delay");
    assert_eq!(handle.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_shutdown_with_full_event_queue() {
    let (listener, addr) = bind().await;
    drop(listener);

    // Room for one event and nobody draining it
    let (events_tx, _events) = mpsc::channel(1);
    let config = ConnectionConfig::new(addr).with_reconnect_delay(10);
    let mut handle = ConnectionManager::spawn(config, events_tx).unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;

    tokio::time::timeout(Duration::from_secs(2), handle.shutdown())
        .await
        .expect("shutdown should not wait for the event queue");
    assert_eq!(handle.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_invalid_host_rejected_before_spawn() {
    let (events_tx, _events) = mpsc::channel(1);
    let result = ConnectionManager::spawn(ConnectionConfig::new(""), events_tx);
    assert!(result.is_err());
}
