//! 模拟对话服务端
//!
//! 每收到约 1 秒麦克风音频，回放一轮脚本化的对话：
//! VAD -> ASR -> 流式 LLM 文本 -> 语音（440Hz 提示音）-> ready
//!
//! 运行: cargo run --example mock_server
//! 然后: cargo run -- --host 127.0.0.1:8080

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use wybe_lib::network::{Frame, FrameKind};

/// 触发一轮回复所需的 AudioIn 帧数（200ms * 5 = 1s）
const CHUNKS_PER_TURN: usize = 5;

/// 回复语音采样率
const REPLY_RATE: u32 = 24000;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    wybe_lib::utils::logging::init_logging();

    let listener = TcpListener::bind("127.0.0.1:8080").await?;
    println!("Mock server listening on ws://127.0.0.1:8080/ws/conversation");

    loop {
        let (stream, peer) = listener.accept().await?;
        println!("Client connected: {}", peer);
        tokio::spawn(async move {
            if let Err(e) = serve(stream).await {
                println!("Client {} error: {}", peer, e);
            }
            println!("Client disconnected: {}", peer);
        });
    }
}

async fn serve(stream: TcpStream) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut ws = accept_async(stream).await?;
    let mut chunks = 0usize;
    let mut turn = 0usize;

    while let Some(message) = ws.next().await {
        let bytes = match message? {
            Message::Binary(bytes) => bytes,
            Message::Close(_) => break,
            _ => continue,
        };

        let frame = match Frame::decode(&bytes) {
            Ok(frame) => frame,
            Err(e) => {
                println!("Bad frame: {}", e);
                continue;
            }
        };

        match frame.kind {
            FrameKind::Handshake => {
                println!("Handshake: {}", String::from_utf8_lossy(&frame.payload));
                send(&mut ws, Frame::status("ready")).await?;
            }
            FrameKind::AudioIn => {
                chunks += 1;
                if chunks % CHUNKS_PER_TURN == 0 {
                    turn += 1;
                    for reply in script(turn) {
                        send(&mut ws, reply).await?;
                    }
                }
            }
            other => println!("Unexpected {} frame", other.name()),
        }
    }

    Ok(())
}

async fn send(
    ws: &mut tokio_tungstenite::WebSocketStream<TcpStream>,
    frame: Frame,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    ws.send(Message::Binary(frame.encode().into())).await?;
    Ok(())
}

fn script(turn: usize) -> Vec<Frame> {
    let mut frames = vec![
        Frame::vad("speech_start"),
        Frame::vad("speech_end"),
        Frame::asr(format!("Test utterance {}", turn)),
        Frame::status("thinking"),
    ];
    for token in ["Heard ", "you ", "loud ", "and ", "clear."] {
        frames.push(Frame::llm(token, false));
    }
    frames.push(Frame::llm("", true));
    frames.push(Frame::status("speaking"));

    // Two 250 ms buffers back to back
    for _ in 0..2 {
        frames.push(Frame::audio_out(tone(440.0, REPLY_RATE as usize / 4)));
    }
    frames.push(Frame::status("ready"));
    frames
}

fn tone(freq: f32, samples: usize) -> Vec<u8> {
    (0..samples)
        .flat_map(|i| {
            let t = i as f32 / REPLY_RATE as f32;
            let value = (t * freq * std::f32::consts::TAU).sin() * 0.2;
            ((value * 32767.0) as i16).to_le_bytes()
        })
        .collect()
}
