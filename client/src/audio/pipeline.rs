use crate::audio::capture::CaptureSource;
use crate::audio::encoder::{AudioEncoder, Pcm16Encoder};
use crate::audio::error::{AudioError, AudioResult};
use crate::audio::resampler::AudioResampler;
use crate::network::{Frame, FrameSender};
use crate::state::config::CaptureConfig;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Sent when capture ends on its own (device lost), tagged with the run
/// that ended so a notice from an old run can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureEnded {
    /// Run counter value of the run that ended
    pub generation: u64,
}

/// Microphone to `AudioIn` frames
///
/// This pipeline:
/// 1. Opens the capture source (mono f32 blocks)
/// 2. Resamples to the capture rate when the device runs at another rate
/// 3. Cuts fixed-length chunks (200 ms by default)
/// 4. Encodes each chunk and hands it to `FrameSender::send`
///
/// Chunks produced while the transport is not open are dropped by the
/// sender. A partial chunk left at `stop` is discarded.
///
/// # Example
/// ```no_run
/// use wybe_lib::audio::{AudioCapture, CapturePipeline};
/// use wybe_lib::network::{ConnectionConfig, ConnectionManager};
/// use wybe_lib::state::config::CaptureConfig;
/// use tokio::sync::mpsc;
///
/// #[tokio::main]
/// async fn main() {
///     let (events_tx, _events_rx) = mpsc::channel(64);
///     let connection = ConnectionManager::spawn(ConnectionConfig::default(), events_tx).unwrap();
///
///     let config = CaptureConfig::default();
///     let mut pipeline = CapturePipeline::new(Box::new(AudioCapture::new(&config)), config);
///     pipeline.start(connection.sender()).unwrap();
///
///     // Later...
///     pipeline.stop().await;
/// }
/// ```
pub struct CapturePipeline {
    source: Box<dyn CaptureSource>,
    encoder: Arc<dyn AudioEncoder>,
    config: CaptureConfig,
    processing_task: Option<JoinHandle<()>>,
    stop_signal: Option<oneshot::Sender<()>>,
    end_notifier: Option<mpsc::UnboundedSender<CaptureEnded>>,
    generation: u64,
}

impl CapturePipeline {
    /// Create a pipeline over a capture source, encoding PCM16
    pub fn new(source: Box<dyn CaptureSource>, config: CaptureConfig) -> Self {
        Self {
            source,
            encoder: Arc::new(Pcm16Encoder),
            config,
            processing_task: None,
            stop_signal: None,
            end_notifier: None,
            generation: 0,
        }
    }

    /// Use a different chunk encoder
    pub fn with_encoder(mut self, encoder: Arc<dyn AudioEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    /// Get notified when capture ends without `stop`
    pub fn with_end_notifier(mut self, notifier: mpsc::UnboundedSender<CaptureEnded>) -> Self {
        self.end_notifier = Some(notifier);
        self
    }

    /// Start capturing
    ///
    /// Must be called inside a Tokio runtime. Calling it while running is a
    /// no-op.
    ///
    /// # Errors
    /// Returns the source's open error (`AudioError::PermissionDenied` when
    /// access is refused) or a resampler setup error. The device is released
    /// on every error path.
    pub fn start(&mut self, sender: FrameSender) -> AudioResult<()> {
        if self.is_running() {
            warn!("Capture pipeline already running");
            return Ok(());
        }

        let chunk_samples = self.config.chunk_samples();
        if chunk_samples == 0 {
            return Err(AudioError::UnsupportedConfig(format!(
                "{} ms chunks at {} Hz hold no samples",
                self.config.chunk_ms, self.config.sample_rate
            )));
        }

        info!("Starting capture pipeline");

        let (block_tx, block_rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let input_rate = self.source.open(block_tx)?;

        let resampler = if input_rate != self.config.sample_rate {
            match AudioResampler::new(input_rate, self.config.sample_rate) {
                Ok(resampler) => Some(resampler),
                Err(e) => {
                    self.source.close();
                    return Err(e);
                }
            }
        } else {
            None
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        self.generation += 1;

        let chunker = Chunker {
            resampler,
            encoder: Arc::clone(&self.encoder),
            chunk_samples,
            pending: Vec::new(),
        };

        let generation = self.generation;
        let notifier = self.end_notifier.clone();

        self.processing_task = Some(tokio::spawn(async move {
            let ended_by_source = processing_loop(block_rx, sender, stop_rx, chunker).await;
            if ended_by_source {
                if let Some(notifier) = notifier {
                    let _ = notifier.send(CaptureEnded { generation });
                }
            }
        }));
        self.stop_signal = Some(stop_tx);

        info!(
            "Capture pipeline started: {} Hz in, {} Hz out, {} ms chunks",
            input_rate, self.config.sample_rate, self.config.chunk_ms
        );
        Ok(())
    }

    /// Stop capturing and release the device. Safe to call when not running.
    pub async fn stop(&mut self) {
        if self.processing_task.is_none() {
            self.source.close();
            return;
        }

        info!("Stopping capture pipeline");

        if let Some(stop_tx) = self.stop_signal.take() {
            let _ = stop_tx.send(());
        }

        self.source.close();

        if let Some(task) = self.processing_task.take() {
            if let Err(e) = task.await {
                error!("Capture processing task failed: {}", e);
            }
        }

        info!("Capture pipeline stopped");
    }

    /// Whether a run is active
    pub fn is_running(&self) -> bool {
        self.processing_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Counter of the current (or last) run
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Output sample rate
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_signal.take() {
            let _ = stop_tx.send(());
        }
        self.source.close();
    }
}

/// Resample, accumulate and encode
struct Chunker {
    resampler: Option<AudioResampler>,
    encoder: Arc<dyn AudioEncoder>,
    chunk_samples: usize,
    pending: Vec<f32>,
}

impl Chunker {
    /// Feed one block, returning every complete encoded chunk
    fn feed(&mut self, block: &[f32]) -> Vec<Vec<u8>> {
        match self.resampler.as_mut() {
            Some(resampler) => match resampler.push(block) {
                Ok(resampled) => self.pending.extend(resampled),
                Err(e) => {
                    error!("Resampling error: {}", e);
                    return Vec::new();
                }
            },
            None => self.pending.extend_from_slice(block),
        }

        let mut chunks = Vec::new();
        while self.pending.len() >= self.chunk_samples {
            let chunk: Vec<f32> = self.pending.drain(..self.chunk_samples).collect();
            let encoded = self.encoder.encode(&chunk);
            if !encoded.is_empty() {
                chunks.push(encoded);
            }
        }
        chunks
    }
}

/// Returns true when the source ended the run
async fn processing_loop(
    mut block_rx: mpsc::Receiver<Vec<f32>>,
    sender: FrameSender,
    mut stop_rx: oneshot::Receiver<()>,
    mut chunker: Chunker,
) -> bool {
    let mut sent = 0u64;
    let mut dropped = 0u64;

    debug!(
        "Processing loop started: {} samples per chunk ({})",
        chunker.chunk_samples,
        chunker.encoder.name()
    );

    let ended_by_source = loop {
        tokio::select! {
            biased;

            _ = &mut stop_rx => {
                debug!("Stop signal received");
                break false;
            }

            block = block_rx.recv() => match block {
                Some(block) => {
                    for chunk in chunker.feed(&block) {
                        if sender.send(Frame::audio_in(chunk)) {
                            sent += 1;
                        } else {
                            dropped += 1;
                        }
                    }
                }
                None => {
                    warn!("Capture source closed");
                    break true;
                }
            }
        }
    };

    info!(
        "Processing loop finished: {} chunks sent, {} dropped, {} samples discarded",
        sent,
        dropped,
        chunker.pending.len()
    );
    ended_by_source
}
