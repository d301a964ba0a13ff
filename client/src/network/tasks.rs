/// Frame pumps for one open WebSocket
///
/// The connection manager runs both pumps concurrently while a socket is
/// open and tears them down together when either one ends.

use crate::network::connection::{ConnectionEvent, WsReader, WsWriter};
use crate::network::error::{CodecError, NetworkError, NetworkResult};
use crate::network::frame::Frame;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Why the receiver pump stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundEnd {
    /// Server closed the socket or the stream ended
    Closed,
    /// Nobody is listening for connection events anymore
    ObserverGone,
}

/// Sender pump: writes queued frames to the socket in queue order
///
/// # Arguments
/// * `ws_writer` - The write half of the WebSocket stream
/// * `frame_rx` - Outbound frame queue
///
/// # Returns
/// `Ok(())` once every `FrameSender` is dropped, or the first write error
pub async fn sender_task(
    ws_writer: &mut WsWriter,
    frame_rx: &mut mpsc::Receiver<Frame>,
) -> NetworkResult<()> {
    debug!("Sender task started");

    let mut frame_count = 0u64;

    while let Some(frame) = frame_rx.recv().await {
        frame_count += 1;
        debug!(
            "Sending frame #{} ({}, {} bytes)",
            frame_count,
            frame.kind.name(),
            frame.encoded_len()
        );

        ws_writer
            .send(Message::Binary(frame.encode().into()))
            .await
            .map_err(NetworkError::WebSocketError)?;
    }

    info!("Sender task completed: {} frames sent, queue closed", frame_count);
    Ok(())
}

/// Receiver pump: decodes binary messages and forwards them in arrival order
///
/// Empty messages are logged and dropped. Frames with unknown tags are
/// ignored. Neither ends the pump.
///
/// # Arguments
/// * `ws_reader` - The read half of the WebSocket stream
/// * `event_tx` - Channel receiving `ConnectionEvent::Frame`
///
/// # Errors
/// Returns the transport error that broke the stream.
pub async fn receiver_task(
    mut ws_reader: WsReader,
    event_tx: &mpsc::Sender<ConnectionEvent>,
) -> NetworkResult<InboundEnd> {
    debug!("Receiver task started");

    let mut frame_count = 0u64;

    while let Some(msg_result) = ws_reader.next().await {
        match msg_result {
            Ok(Message::Binary(data)) => match Frame::decode(&data) {
                Ok(frame) if frame.kind.is_unknown() => {
                    debug!("Ignoring frame with unknown tag 0x{:02x}", frame.kind.tag());
                }
                Ok(frame) => {
                    frame_count += 1;
                    debug!(
                        "Received frame #{} ({}, {} bytes)",
                        frame_count,
                        frame.kind.name(),
                        frame.payload.len()
                    );

                    if event_tx.send(ConnectionEvent::Frame(frame)).await.is_err() {
                        warn!("Event receiver dropped, stopping receiver task");
                        return Ok(InboundEnd::ObserverGone);
                    }
                }
                Err(CodecError::MalformedFrame) => {
                    warn!("Dropping malformed frame: empty message");
                }
                Err(e) => {
                    warn!("Dropping frame: {}", e);
                }
            },
            Ok(Message::Text(text)) => {
                warn!("Ignoring unexpected text message: {} bytes", text.len());
            }
            Ok(Message::Close(frame)) => {
                info!("Received close frame: {:?}", frame);
                return Ok(InboundEnd::Closed);
            }
            Ok(Message::Ping(data)) => {
                debug!("Received ping, length: {} bytes", data.len());
            }
            Ok(Message::Pong(_)) => {
                debug!("Received pong");
            }
            Ok(Message::Frame(_)) => {
                debug!("Received raw frame");
            }
            Err(e) => {
                error!("WebSocket error: {}", e);
                return Err(NetworkError::WebSocketError(e));
            }
        }
    }

    info!("Receiver task completed: {} frames received, stream ended", frame_count);
    Ok(InboundEnd::Closed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::frame::FrameKind;
    use std::time::Duration;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::{accept_async, connect_async, WebSocketStream};

    /// Client halves of a local socket plus the server end
    async fn open_pair() -> (WsWriter, WsReader, WebSocketStream<TcpStream>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            accept_async(stream).await.unwrap()
        });

        let (client, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        let server = accept.await.unwrap();
        let (writer, reader) = client.split();
        (writer, reader, server)
    }

    #[tokio::test]
    async fn test_receiver_drops_bad_messages_and_runs_until_close() {
        let (_writer, reader, mut server) = open_pair().await;
        let (event_tx, mut event_rx) = mpsc::channel(8);

        let pump = tokio::spawn(async move { receiver_task(reader, &event_tx).await });

        server.send(Message::Binary(Vec::<u8>::new().into())).await.unwrap();
        server.send(Message::Binary(vec![0xEE, 1, 2].into())).await.unwrap();
        server.send(Message::Text("not a frame".into())).await.unwrap();
        server
            .send(Message::Binary(Frame::status("ready").encode().into()))
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), event_rx.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            ConnectionEvent::Frame(frame) => {
                assert_eq!(frame.kind, FrameKind::Status);
                assert_eq!(frame, Frame::status("ready"));
            }
            other => panic!("Expected a status frame, got {:?}", other),
        }

        // Still pumping after the bad messages
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!pump.is_finished());
        assert!(event_rx.try_recv().is_err());

        server.close(None).await.unwrap();
        let end = tokio::time::timeout(Duration::from_secs(2), pump)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(end.unwrap(), InboundEnd::Closed);
        assert!(event_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_receiver_stops_when_observer_gone() {
        let (_writer, reader, mut server) = open_pair().await;
        let (event_tx, event_rx) = mpsc::channel(8);
        drop(event_rx);

        server
            .send(Message::Binary(Frame::asr("hello").encode().into()))
            .await
            .unwrap();

        let end = tokio::time::timeout(Duration::from_secs(2), receiver_task(reader, &event_tx))
            .await
            .unwrap();
        assert_eq!(end.unwrap(), InboundEnd::ObserverGone);
    }

    #[tokio::test]
    async fn test_sender_writes_in_queue_order() {
        let (mut writer, _reader, mut server) = open_pair().await;
        let (frame_tx, mut frame_rx) = mpsc::channel(8);

        for i in 0..5u8 {
            frame_tx.send(Frame::audio_in(vec![i])).await.unwrap();
        }
        drop(frame_tx);

        sender_task(&mut writer, &mut frame_rx).await.unwrap();

        for i in 0..5u8 {
            let message = server.next().await.unwrap().unwrap();
            let frame = match message {
                Message::Binary(bytes) => Frame::decode(&bytes).unwrap(),
                other => panic!("Expected binary frame, got {:?}", other),
            };
            assert_eq!(frame, Frame::audio_in(vec![i]));
        }
    }
}
