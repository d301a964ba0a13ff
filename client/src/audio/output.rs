/// cpal output backend for speech playback
///
/// The output stream lives on its own thread (cpal streams are not `Send`).
/// Buffers cross to the audio callback through a lock-free queue; the
/// callback schedules them and renders the mix. When the device does not run
/// at the stream rate, the rendered mix is resampled as one continuous signal.

use crate::audio::buffer::{BufferConsumer, BufferProducer, PlaybackQueue};
use crate::audio::device::resolve_output_device;
use crate::audio::error::{AudioError, AudioResult};
use crate::audio::playback::{PlaybackBackend, PlaybackSink};
use crate::audio::resampler::AudioResampler;
use crate::audio::scheduler::{PlaybackMode, PlaybackScheduler};
use crate::state::config::PlaybackConfig;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::collections::VecDeque;
use std::sync::mpsc as std_mpsc;
use tracing::{debug, error, info, warn};

/// Default-host speaker output
#[derive(Debug, Default)]
pub struct CpalPlayback;

impl CpalPlayback {
    /// Create the backend; nothing is opened until the first buffer
    pub fn new() -> Self {
        Self
    }
}

impl PlaybackBackend for CpalPlayback {
    fn open(&mut self, config: &PlaybackConfig) -> AudioResult<Box<dyn PlaybackSink>> {
        let (producer, consumer) = PlaybackQueue::new(config.queue_capacity);
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<AudioResult<u32>>(1);
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let device_name = config.output_device.clone();
        let stream_rate = config.sample_rate;
        let mode = config.mode;

        std::thread::Builder::new()
            .name("wybe-playback".to_string())
            .spawn(move || output_thread(device_name, stream_rate, mode, consumer, ready_tx, stop_rx))
            .map_err(|e| AudioError::StreamBuildFailed(e.to_string()))?;

        let device_rate = ready_rx
            .recv()
            .map_err(|_| AudioError::StreamError("playback thread exited".to_string()))??;
        debug!("Playback sink ready at {} Hz", device_rate);

        Ok(Box::new(CpalSink {
            producer,
            _stop: stop_tx,
        }))
    }
}

/// Sink over a running output stream; dropping it stops the stream
struct CpalSink {
    producer: BufferProducer,
    _stop: std_mpsc::Sender<()>,
}

impl PlaybackSink for CpalSink {
    fn play(&mut self, samples: Vec<f32>) -> bool {
        if samples.is_empty() {
            return true;
        }
        self.producer.push(samples)
    }
}

/// Renders the scheduled mix at the stream rate and hands it out at the
/// device rate
///
/// The resampler sees the mix as one unbroken signal, silence included, so
/// buffer boundaries never reach the filter.
pub(crate) struct DeviceMixer {
    scheduler: PlaybackScheduler,
    resampler: Option<AudioResampler>,
    block: Vec<f32>,
    converted: VecDeque<f32>,
}

impl DeviceMixer {
    pub(crate) fn new(
        scheduler: PlaybackScheduler,
        stream_rate: u32,
        device_rate: u32,
    ) -> AudioResult<Self> {
        let resampler = if device_rate != stream_rate {
            info!(
                "Output runs at {} Hz, resampling from {} Hz",
                device_rate, stream_rate
            );
            Some(AudioResampler::new(stream_rate, device_rate)?)
        } else {
            None
        };
        let block = vec![0.0; resampler.as_ref().map_or(0, |r| r.chunk_size())];

        Ok(Self {
            scheduler,
            resampler,
            block,
            converted: VecDeque::new(),
        })
    }

    pub(crate) fn scheduler_mut(&mut self) -> &mut PlaybackScheduler {
        &mut self.scheduler
    }

    /// Fill `out` with device-rate samples
    pub(crate) fn render(&mut self, out: &mut [f32]) {
        let Some(resampler) = self.resampler.as_mut() else {
            self.scheduler.render(out);
            return;
        };

        while self.converted.len() < out.len() {
            self.scheduler.render(&mut self.block);
            match resampler.process(&self.block) {
                Ok(produced) if !produced.is_empty() => self.converted.extend(produced),
                Ok(_) => break,
                Err(e) => {
                    error!("Playback resampling failed: {}", e);
                    break;
                }
            }
        }

        let ready = out.len().min(self.converted.len());
        for (slot, sample) in out.iter_mut().zip(self.converted.drain(..ready)) {
            *slot = sample;
        }
        out[ready..].fill(0.0);
    }
}

fn output_thread(
    device_name: Option<String>,
    stream_rate: u32,
    mode: PlaybackMode,
    consumer: BufferConsumer,
    ready_tx: std_mpsc::SyncSender<AudioResult<u32>>,
    stop_rx: std_mpsc::Receiver<()>,
) {
    let stream = match open_output(device_name.as_deref(), stream_rate, mode, consumer) {
        Ok((stream, rate)) => {
            let _ = ready_tx.send(Ok(rate));
            stream
        }
        Err(e) => {
            error!("Failed to open playback stream: {}", e);
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    // Returns once the sink is dropped
    let _ = stop_rx.recv();
    drop(stream);
    debug!("Playback stream released");
}

fn open_output(
    device_name: Option<&str>,
    stream_rate: u32,
    mode: PlaybackMode,
    consumer: BufferConsumer,
) -> AudioResult<(Stream, u32)> {
    let host = cpal::default_host();
    let device = resolve_output_device(&host, device_name)?;
    info!(
        "Using audio output device: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );

    let supported = choose_output_config(&device, stream_rate)?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.config();
    let rate = config.sample_rate.0;

    info!(
        "Output config: {} Hz, {} channels, {:?}, mode {}",
        rate, config.channels, sample_format, mode
    );

    let mixer = DeviceMixer::new(PlaybackScheduler::new(mode), stream_rate, rate)?;
    let stream = match sample_format {
        SampleFormat::F32 => build_output::<f32>(&device, &config, consumer, mixer)?,
        SampleFormat::I16 => build_output::<i16>(&device, &config, consumer, mixer)?,
        SampleFormat::U16 => build_output::<u16>(&device, &config, consumer, mixer)?,
        SampleFormat::I32 => build_output::<i32>(&device, &config, consumer, mixer)?,
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

/// Prefer the stream rate with the fewest channels, else the device default
fn choose_output_config(
    device: &Device,
    preferred_rate: u32,
) -> AudioResult<cpal::SupportedStreamConfig> {
    let preferred = cpal::SampleRate(preferred_rate);

    if let Ok(ranges) = device.supported_output_configs() {
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

    warn!("{} Hz output not offered, using the device default", preferred_rate);
    Ok(device.default_output_config()?)
}

fn build_output<T>(
    device: &Device,
    config: &StreamConfig,
    mut consumer: BufferConsumer,
    mut mixer: DeviceMixer,
) -> AudioResult<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels.max(1) as usize;
    let mut mono: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                consumer.drain_into(mixer.scheduler_mut());

                let frames = data.len() / channels;
                if mono.len() < frames {
                    mono.resize(frames, 0.0);
                }
                mixer.render(&mut mono[..frames]);

                // Same mono sample on every channel
                for (frame, &sample) in data.chunks_mut(channels).zip(mono.iter()) {
                    let value = T::from_sample(sample);
                    for slot in frame.iter_mut() {
                        *slot = value;
                    }
                }
            },
            move |err| {
                error!("Playback stream error: {}", err);
            },
            None,
        )
        .map_err(AudioError::from_build_error)
}
