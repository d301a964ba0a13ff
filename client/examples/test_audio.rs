//! 音频设备测试
//!
//! 采集 3 秒麦克风音频并显示音量，然后通过扬声器播放 1 秒提示音
//!
//! 运行: cargo run --example test_audio

use std::time::Duration;
use wybe_lib::audio::{
    list_input_devices, list_output_devices, AudioCapture, CaptureSource, CpalPlayback,
    PlaybackBackend, PlaybackSink,
};
use wybe_lib::state::{CaptureConfig, PlaybackConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    wybe_lib::utils::logging::init_logging();

    println!("=== 音频设备测试 ===\n");

    println!("输入设备:");
    for device in list_input_devices()? {
        println!("  {} {}", if device.is_default { "*" } else { " " }, device.name);
    }
    println!("输出设备:");
    for device in list_output_devices()? {
        println!("  {} {}", if device.is_default { "*" } else { " " }, device.name);
    }
    println!();

    println!("开始采集音频 (3秒)...");
    let (tx, mut rx) = tokio::sync::mpsc::channel(100);
    let mut capture = AudioCapture::new(&CaptureConfig::default());
    let rate = capture.open(tx)?;
    println!("设备采样率: {} Hz", rate);

    let mut sample_count = 0;
    let start = std::time::Instant::now();

    while start.elapsed() < Duration::from_secs(3) {
        if let Ok(samples) = rx.try_recv() {
            sample_count += samples.len();

            let max_sample = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
            let level = (max_sample * 50.0) as usize;
            let bar: String = "█".repeat(level.min(50));
            print!("\r音量: {:50} ({:.3})", bar, max_sample);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    capture.close();
    println!("\n\n采集完成! 共采集 {} 个样本\n", sample_count);

    println!("播放 440Hz 提示音 (1秒)...");
    let config = PlaybackConfig::default();
    let tone: Vec<f32> = (0..config.sample_rate)
        .map(|i| {
            let t = i as f32 / config.sample_rate as f32;
            (t * 440.0 * std::f32::consts::TAU).sin() * 0.2
        })
        .collect();

    let mut sink = CpalPlayback::new().open(&config)?;
    sink.play(tone);
    tokio::time::sleep(Duration::from_millis(1200)).await;

    println!("播放完成!");
    Ok(())
}
