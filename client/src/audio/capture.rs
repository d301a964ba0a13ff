use crate::audio::device::resolve_input_device;
use crate::audio::error::{AudioError, AudioResult};
use crate::state::config::CaptureConfig;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// A microphone-like source of mono f32 blocks
///
/// `open` acquires the device and starts delivering blocks to `sink`;
/// `close` releases it. Dropping `sink` (or the source closing it) tells the
/// consumer that capture ended.
pub trait CaptureSource: Send {
    /// Acquire the device and start delivering blocks
    ///
    /// # Returns
    /// The sample rate of the delivered blocks
    ///
    /// # Errors
    /// `AudioError::PermissionDenied` if access is refused, other variants
    /// for missing devices or stream failures.
    fn open(&mut self, sink: mpsc::Sender<Vec<f32>>) -> AudioResult<u32>;

    /// Release the device. Safe to call when not open.
    fn close(&mut self);

    /// Whether the device is currently held
    fn is_open(&self) -> bool;
}

/// Settings carried into the capture thread
#[derive(Debug, Clone)]
struct CaptureSettings {
    device_name: Option<String>,
    preferred_rate: u32,
    echo_cancellation: bool,
    noise_suppression: bool,
}

struct CaptureWorker {
    stop_tx: std_mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

/// Microphone capture through cpal
///
/// cpal streams are not `Send`, so the stream lives on a dedicated thread
/// that owns it from creation to drop. `close` signals that thread and
/// joins it, which releases the device before returning.
pub struct AudioCapture {
    settings: CaptureSettings,
    worker: Option<CaptureWorker>,
}

impl AudioCapture {
    /// Create a capture source; the device is not touched until `open`
    ///
    /// # Example
    /// ```no_run
    /// use wybe_lib::audio::capture::{AudioCapture, CaptureSource};
    /// use wybe_lib::state::config::CaptureConfig;
    /// use tokio::sync::mpsc;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let (tx, mut rx) = mpsc::channel(64);
    ///     let mut capture = AudioCapture::new(&CaptureConfig::default());
    ///
    ///     let rate = capture.open(tx).unwrap();
    ///     while let Some(block) = rx.recv().await {
    ///         println!("{} samples @ {} Hz", block.len(), rate);
    ///     }
    /// }
    /// ```
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            settings: CaptureSettings {
                device_name: config.input_device.clone(),
                preferred_rate: config.sample_rate,
                echo_cancellation: config.echo_cancellation,
                noise_suppression: config.noise_suppression,
            },
            worker: None,
        }
    }
}

impl CaptureSource for AudioCapture {
    fn open(&mut self, sink: mpsc::Sender<Vec<f32>>) -> AudioResult<u32> {
        if self.worker.is_some() {
            warn!("Audio capture already open");
            return Err(AudioError::StreamBuildFailed("capture already open".to_string()));
        }

        info!("Opening audio capture");

        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<AudioResult<u32>>(1);
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let lost_tx = stop_tx.clone();
        let settings = self.settings.clone();

        let thread = std::thread::Builder::new()
            .name("wybe-capture".to_string())
            .spawn(move || capture_thread(settings, sink, ready_tx, stop_rx, lost_tx))
            .map_err(|e| AudioError::StreamBuildFailed(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(rate)) => {
                self.worker = Some(CaptureWorker { stop_tx, thread });
                info!("Audio capture started at {} Hz", rate);
                Ok(rate)
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(AudioError::StreamError("capture thread exited".to_string()))
            }
        }
    }

    fn close(&mut self) {
        if let Some(worker) = self.worker.take() {
            info!("Stopping audio capture");
            let _ = worker.stop_tx.send(());
            if worker.thread.join().is_err() {
                error!("Capture thread panicked");
            }
            debug!("Audio capture stopped");
        }
    }

    fn is_open(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.thread.is_finished())
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.close();
    }
}

fn capture_thread(
    settings: CaptureSettings,
    sink: mpsc::Sender<Vec<f32>>,
    ready_tx: std_mpsc::SyncSender<AudioResult<u32>>,
    stop_rx: std_mpsc::Receiver<()>,
    lost_tx: std_mpsc::Sender<()>,
) {
    let stream = match open_stream(&settings, sink, lost_tx) {
        Ok((stream, rate)) => {
            let _ = ready_tx.send(Ok(rate));
            stream
        }
        Err(e) => {
            error!("Failed to open capture stream: {}", e);
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    // Runs until close() or until the device disappears
    let _ = stop_rx.recv();
    drop(stream);
    debug!("Capture stream released");
}

fn open_stream(
    settings: &CaptureSettings,
    sink: mpsc::Sender<Vec<f32>>,
    lost_tx: std_mpsc::Sender<()>,
) -> AudioResult<(Stream, u32)> {
    let host = cpal::default_host();
    let device = resolve_input_device(&host, settings.device_name.as_deref())?;

    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    info!("Using audio input device: {}", device_name);

    // cpal exposes no voice-processing switches; these follow the OS input chain.
    debug!(
        echo_cancellation = settings.echo_cancellation,
        noise_suppression = settings.noise_suppression,
        "Input processing requested"
    );

    let supported = choose_input_config(&device, settings.preferred_rate)?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.config();
    let rate = config.sample_rate.0;

    info!(
        "Device config: {} Hz, {} channels, {:?}",
        rate, config.channels, sample_format
    );

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, sink, lost_tx)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, sink, lost_tx)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, sink, lost_tx)?,
        SampleFormat::I32 => build_stream::<i32>(&device, &config, sink, lost_tx)?,
        other => {
            return Err(AudioError::UnsupportedConfig(format!(
                "sample format {:?}",
                other
            )));
        }
    };

    stream.play().map_err(AudioError::from_play_error)?;
    Ok((stream, rate))
}

/// Prefer the fewest channels at the requested rate, else the device default
fn choose_input_config(
    device: &Device,
    preferred_rate: u32,
) -> AudioResult<cpal::SupportedStreamConfig> {
    let preferred = cpal::SampleRate(preferred_rate);

    if let Ok(ranges) = device.supported_input_configs() {
        let mut ranges: Vec<_> = ranges
            .filter(|range| {
                range.min_sample_rate() <= preferred && preferred <= range.max_sample_rate()
            })
            .filter(|range| {
                matches!(
                    range.sample_format(),
                    SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16 | SampleFormat::I32
                )
            })
            .collect();
        ranges.sort_by_key(|range| range.channels());

        if let Some(range) = ranges.into_iter().next() {
            return Ok(range.with_sample_rate(preferred));
        }
    }

    debug!("{} Hz not offered, using the default input config", preferred_rate);
    Ok(device.default_input_config()?)
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    sink: mpsc::Sender<Vec<f32>>,
    lost_tx: std_mpsc::Sender<()>,
) -> AudioResult<Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels as usize;

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // Never block the audio thread; a full channel drops the block
                let _ = sink.try_send(downmix(data, channels));
            },
            move |err| {
                error!("Audio stream error: {}", err);
                if matches!(err, cpal::StreamError::DeviceNotAvailable) {
                    let _ = lost_tx.send(());
                }
            },
            None,
        )
        .map_err(AudioError::from_build_error)
}

/// Average interleaved frames down to mono f32
pub fn downmix<T>(data: &[T], channels: usize) -> Vec<f32>
where
    T: Sample,
    f32: FromSample<T>,
{
    if channels <= 1 {
        return data.iter().map(|&s| s.to_sample::<f32>()).collect();
    }

    data.chunks(channels)
        .map(|frame| frame.iter().map(|&s| s.to_sample::<f32>()).sum::<f32>() / frame.len() as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_downmix_mono_passthrough() {
        assert_eq!(downmix(&[0.1f32, -0.2, 0.3], 1), vec![0.1, -0.2, 0.3]);
    }

    #[test]
    fn test_downmix_stereo_averages() {
        let mono = downmix(&[0.5f32, -0.5, 1.0, 0.0], 2);
        assert_eq!(mono, vec![0.0, 0.5]);
    }

    #[test]
    fn test_downmix_i16_input() {
        let mono = downmix(&[i16::MIN, i16::MIN], 2);
        assert_eq!(mono, vec![-1.0]);
    }

    #[test]
    fn test_close_without_open_is_noop() {
        let mut capture = AudioCapture::new(&CaptureConfig::default());
        assert!(!capture.is_open());
        capture.close();
        capture.close();
        assert!(!capture.is_open());
    }

    #[tokio::test]
    async fn test_audio_capture_open_close() {
        let (tx, mut rx) = mpsc::channel(64);
        let mut capture = AudioCapture::new(&CaptureConfig::default());

        let rate = match capture.open(tx) {
            Ok(rate) => rate,
            Err(e) => {
                eprintln!("Warning: No audio device available for testing: {}", e);
                return;
            }
        };
        assert!(rate > 0);
        assert!(capture.is_open());

        match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
            Ok(Some(block)) => println!("Received {} samples", block.len()),
            Ok(None) => eprintln!("Warning: Channel closed unexpectedly"),
            Err(_) => eprintln!("Warning: Timeout waiting for audio data"),
        }

        capture.close();
        assert!(!capture.is_open());
    }

    #[test]
    fn test_audio_capture_with_unknown_device() {
        let config = CaptureConfig {
            input_device: Some("NonExistentDevice".to_string()),
            ..CaptureConfig::default()
        };
        let mut capture = AudioCapture::new(&config);
        let (tx, _rx) = mpsc::channel(4);

        assert!(capture.open(tx).is_err());
        assert!(!capture.is_open());
    }
}
