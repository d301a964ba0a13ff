use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use wybe_lib::audio::{list_input_devices, list_output_devices, AudioDevice, PlaybackMode};
use wybe_lib::session::ConversationClient;
use wybe_lib::state::{ConfigManager, SessionEvent};
use wybe_lib::utils::logging::init_logging;
use wybe_lib::utils::AppError;

/// Real-time voice conversation client
#[derive(Parser, Debug)]
#[command(name = "wybe", version, about)]
struct Cli {
    /// Configuration file (defaults to <config_dir>/wybe/config.json)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Server host and port, e.g. localhost:8080
    #[arg(long)]
    host: Option<String>,

    /// Connect with wss:// instead of ws://
    #[arg(long)]
    secure: bool,

    /// Playback scheduling: overlap or fifo
    #[arg(long, value_name = "MODE")]
    playback_mode: Option<PlaybackMode>,

    /// Print the audio devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Listen only, never open the microphone
    #[arg(long)]
    no_capture: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    if cli.list_devices {
        print_devices("Input", list_input_devices().context("listing input devices")?);
        print_devices("Output", list_output_devices().context("listing output devices")?);
        return Ok(());
    }

    let mut config =
        ConfigManager::load_or_default(cli.config.as_deref()).context("loading configuration")?;
    config.apply_env_overrides()?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if cli.secure {
        config.server.secure = true;
    }
    if let Some(mode) = cli.playback_mode {
        config.playback.mode = mode;
    }
    config.validate()?;

    let mut client = ConversationClient::start(&config, render_event)?;

    if cli.no_capture {
        println!("Listen-only mode. Type q to quit.");
    } else {
        println!("Press Enter (or m) to toggle the microphone, q to quit.");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.trim() {
                    "q" => break,
                    "" | "m" if cli.no_capture => println!("Microphone disabled (--no-capture)"),
                    "" | "m" => {
                        if let Err(e) = client.toggle_capture().await {
                            println!("[mic] {}", AppError::from(e).user_message());
                        }
                    }
                    other => println!("Unknown command: {}", other),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.shutdown().await;
    Ok(())
}

fn render_event(event: SessionEvent) {
    match event {
        SessionEvent::StatusChanged { status } => println!("[{}]", status.label()),
        SessionEvent::TranscriptAppended { entry, .. } => {
            println!("{}: {}", entry.role.label(), entry.text)
        }
        SessionEvent::TranscriptUpdated { entry, .. } => {
            println!("{} ... {}", entry.role.label(), entry.text)
        }
        SessionEvent::AudioReady { samples } => {
            tracing::debug!("Playing {} samples", samples.len())
        }
        SessionEvent::CaptureChanged { recording } => {
            println!("[mic {}]", if recording { "on" } else { "off" })
        }
    }
}

fn print_devices(label: &str, devices: Vec<AudioDevice>) {
    println!("{} devices:", label);
    for device in devices {
        let marker = if device.is_default { "*" } else { " " };
        println!("  {} {} {:?}", marker, device.name, device.sample_rates);
    }
}
